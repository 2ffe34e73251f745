use crate::block::CodeBlock;
use crate::error::{ChunkerError, Result};
use crate::language::Language;
use std::collections::VecDeque;

/// Size bounds for emitted blocks.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub min_block_chars: usize,
    pub max_block_chars: usize,
    /// A node may exceed `max_block_chars` by this factor before it is split.
    pub max_chars_tolerance: f64,
    /// A split must not leave a tail shorter than this.
    pub min_chunk_remainder_chars: usize,
}

impl ChunkerConfig {
    /// Bounds tuned for embedding-model context windows.
    pub fn for_embeddings() -> Self {
        Self {
            min_block_chars: 50,
            max_block_chars: 1000,
            max_chars_tolerance: 1.15,
            min_chunk_remainder_chars: 200,
        }
    }

    fn max_with_tolerance(&self) -> usize {
        (self.max_block_chars as f64 * self.max_chars_tolerance) as usize
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self::for_embeddings()
    }
}

/// Splits one file's text into code blocks.
///
/// Holds configuration only; a tree-sitter parser is created per call, so a
/// single `Chunker` can be shared across concurrent parse tasks.
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Parse `content` into code blocks.
    ///
    /// Files in a language without grammar support, files whose parse yields
    /// no candidate nodes, and files that fail to parse all take the
    /// line-based fallback path as long as the content is non-trivial.
    pub fn parse(&self, file_path: &str, content: &str, file_hash: &str) -> Result<Vec<CodeBlock>> {
        let language = Language::from_path(file_path);

        if language.supports_ast() {
            match self.parse_ast(file_path, content, file_hash, language) {
                Ok(blocks) if !blocks.is_empty() => return Ok(blocks),
                Ok(_) => {}
                Err(err) => {
                    log::debug!("AST parse failed for {file_path}: {err}; using fallback");
                }
            }
        }

        if content.len() >= self.config.min_block_chars {
            let lines: Vec<&str> = content.lines().collect();
            return Ok(self.chunk_lines(file_path, &lines, 1, "fallback_chunk", file_hash));
        }

        Ok(Vec::new())
    }

    fn parse_ast(
        &self,
        file_path: &str,
        content: &str,
        file_hash: &str,
        language: Language,
    ) -> Result<Vec<CodeBlock>> {
        let ts_language = language.tree_sitter_language()?;
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&ts_language)
            .map_err(|e| ChunkerError::Parser(e.to_string()))?;

        let tree = parser
            .parse(content, None)
            .ok_or_else(|| ChunkerError::Parser(format!("parse returned no tree: {file_path}")))?;

        let max_ceiling = self.config.max_with_tolerance();
        let mut blocks = Vec::new();
        let mut queue: VecDeque<tree_sitter::Node> = VecDeque::new();

        let root = tree.root_node();
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            queue.push_back(child);
        }

        // Breadth-first: a node that fits becomes a block, an oversized node
        // with children is descended into, an oversized leaf is line-split.
        while let Some(node) = queue.pop_front() {
            let text = node
                .utf8_text(content.as_bytes())
                .map_err(|e| ChunkerError::Parser(e.to_string()))?;

            if text.len() < self.config.min_block_chars {
                continue;
            }

            if text.len() <= max_ceiling {
                blocks.push(CodeBlock::new(
                    file_path,
                    node_identifier(&node, content),
                    node.kind(),
                    node.start_position().row + 1,
                    node.end_position().row + 1,
                    text,
                    file_hash,
                ));
                continue;
            }

            if node.named_child_count() > 0 {
                let mut child_cursor = node.walk();
                for child in node.named_children(&mut child_cursor) {
                    queue.push_back(child);
                }
            } else {
                let lines: Vec<&str> = text.lines().collect();
                blocks.extend(self.chunk_lines(
                    file_path,
                    &lines,
                    node.start_position().row + 1,
                    &format!("{}_chunk", node.kind()),
                    file_hash,
                ));
            }
        }

        blocks.sort_by_key(|b| (b.start_line, b.end_line));
        Ok(blocks)
    }

    /// Line-based re-balancing chunker.
    ///
    /// Accumulates lines up to `max_block_chars`; before finalizing a split,
    /// looks ahead: a tail shorter than `min_chunk_remainder_chars` pulls
    /// the split point backward so both sides stay viable.
    fn chunk_lines(
        &self,
        file_path: &str,
        lines: &[&str],
        base_line: usize,
        block_type: &str,
        file_hash: &str,
    ) -> Vec<CodeBlock> {
        let sizes: Vec<usize> = lines.iter().map(|l| l.len() + 1).collect();
        let total: usize = sizes.iter().sum();

        let mut blocks = Vec::new();
        let mut start = 0usize;
        let mut consumed = 0usize;

        while start < lines.len() {
            // A single line beyond the ceiling cannot be split further.
            if sizes[start] > self.config.max_block_chars {
                blocks.push(self.make_line_block(
                    file_path,
                    lines,
                    start,
                    start,
                    base_line,
                    "oversized_line",
                    file_hash,
                ));
                consumed += sizes[start];
                start += 1;
                continue;
            }

            let mut end = start;
            let mut size = 0usize;
            while end < lines.len() && size + sizes[end] <= self.config.max_block_chars {
                size += sizes[end];
                end += 1;
            }

            if end < lines.len() {
                let remainder = total - consumed - size;
                if remainder < self.config.min_chunk_remainder_chars {
                    let (cut, cut_size) = self.rebalance(&sizes, start, end, size, total, consumed);
                    end = cut;
                    size = cut_size;
                }
            }

            if size >= self.config.min_block_chars {
                blocks.push(self.make_line_block(
                    file_path, lines, start, end - 1, base_line, block_type, file_hash,
                ));
            } else {
                log::debug!(
                    "dropping {size}-char tail of {file_path} (below block floor)"
                );
            }

            consumed += size;
            start = end;
        }

        blocks
    }

    /// Walk the split point backward until the tail reaches the remainder
    /// floor, without shrinking the current chunk below the block floor.
    /// Returns the original split when no such point exists.
    fn rebalance(
        &self,
        sizes: &[usize],
        start: usize,
        end: usize,
        size: usize,
        total: usize,
        consumed: usize,
    ) -> (usize, usize) {
        let mut cut = end;
        let mut cut_size = size;

        while cut > start + 1 {
            let shrunk = cut_size - sizes[cut - 1];
            if shrunk < self.config.min_block_chars {
                break;
            }
            cut -= 1;
            cut_size = shrunk;
            if total - consumed - cut_size >= self.config.min_chunk_remainder_chars {
                return (cut, cut_size);
            }
        }

        (end, size)
    }

    #[allow(clippy::too_many_arguments)]
    fn make_line_block(
        &self,
        file_path: &str,
        lines: &[&str],
        first: usize,
        last: usize,
        base_line: usize,
        block_type: &str,
        file_hash: &str,
    ) -> CodeBlock {
        CodeBlock::new(
            file_path,
            None,
            block_type,
            base_line + first,
            base_line + last,
            lines[first..=last].join("\n"),
            file_hash,
        )
    }
}

fn node_identifier(node: &tree_sitter::Node, content: &str) -> Option<String> {
    node.child_by_field_name("name")
        .and_then(|name| name.utf8_text(content.as_bytes()).ok())
        .map(str::to_string)
}
