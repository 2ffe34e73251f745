use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A contiguous unit of source text selected for embedding.
///
/// Blocks are immutable: when a file changes, its old blocks are superseded
/// (deleted from the vector store) and freshly parsed blocks take their place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeBlock {
    /// Workspace-relative path with forward slashes.
    pub file_path: String,
    /// Symbol name of the enclosing declaration, when the grammar exposes one.
    pub identifier: Option<String>,
    /// Syntactic node kind, `"fallback_chunk"`, or `"oversized_line"`.
    pub block_type: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    pub content: String,
    /// Hash over `(file_path, start_line, end_line, content)`.
    pub content_hash: String,
    /// Hash of the whole file at parse time.
    pub file_hash: String,
}

impl CodeBlock {
    pub fn new(
        file_path: impl Into<String>,
        identifier: Option<String>,
        block_type: impl Into<String>,
        start_line: usize,
        end_line: usize,
        content: impl Into<String>,
        file_hash: impl Into<String>,
    ) -> Self {
        let file_path = file_path.into();
        let content = content.into();
        let content_hash = hash_content(&file_path, start_line, end_line, &content);
        Self {
            file_path,
            identifier,
            block_type: block_type.into(),
            start_line,
            end_line,
            content,
            content_hash,
            file_hash: file_hash.into(),
        }
    }
}

/// Fine-grained block identity: hash of `(file_path, start_line, end_line, content)`.
pub fn hash_content(file_path: &str, start_line: usize, end_line: usize, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_path.as_bytes());
    hasher.update(start_line.to_le_bytes());
    hasher.update(end_line.to_le_bytes());
    hasher.update(content.as_bytes());
    hex_digest(hasher)
}

/// Whole-file identity used for change detection.
pub fn hash_file_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex_digest(hasher)
}

fn hex_digest(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
