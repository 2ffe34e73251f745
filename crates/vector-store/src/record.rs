use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use uuid::Uuid;

/// Fixed namespace for deterministic point ids.
const POINT_NAMESPACE: Uuid = Uuid::from_bytes([
    0x9b, 0x1d, 0xeb, 0x4d, 0x3b, 0x7d, 0x4b, 0xad, 0x9b, 0xdd, 0x2b, 0x0d, 0x7b, 0x3d, 0xcb,
    0x6d,
]);

/// Payload stored alongside each vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordPayload {
    pub file_path: String,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// One vector plus its payload, addressed by a deterministic id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: RecordPayload,
}

/// One similarity-search result, in the store's native score ordering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub file_path: String,
    pub score: f32,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
}

/// Deterministic point id from `(normalized absolute path, start_line)`.
///
/// Re-upserting a changed block at the same location replaces the previous
/// record instead of accumulating a duplicate. A block whose start line
/// shifts gets a fresh id; the stale one is removed by the per-file
/// delete-before-upsert pass.
pub fn point_id(workspace_root: &Path, relative_path: &str, start_line: usize) -> String {
    let absolute = workspace_root.join(relative_path);
    let normalized = absolute.to_string_lossy().replace('\\', "/");
    let key = format!("{normalized}:{start_line}");
    Uuid::new_v5(&POINT_NAMESPACE, key.as_bytes()).to_string()
}

/// Collection name for one workspace: a hash of the workspace path keeps
/// collections from colliding across projects on a shared cluster.
pub fn collection_name_for_workspace(workspace_root: &Path) -> String {
    let normalized = workspace_root.to_string_lossy().replace('\\', "/");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(32);
    for byte in digest.iter().take(8) {
        hex.push_str(&format!("{byte:02x}"));
    }
    format!("ws-{hex}")
}
