//! # Atlas Code Chunker
//!
//! Splits source files into embedding-sized code blocks.
//!
//! ## Pipeline
//!
//! ```text
//! File content
//!     │
//!     ├──> Language detection (extension based)
//!     │
//!     ├──> AST walk (tree-sitter, breadth-first)
//!     │      └─> Blocks within [MIN_BLOCK_CHARS, MAX_BLOCK_CHARS·tolerance]
//!     │
//!     └──> Line-based fallback (no grammar / oversized leaves)
//!            └─> Re-balanced line chunks
//! ```

mod block;
mod chunker;
mod error;
mod language;

pub use block::{hash_content, hash_file_content, CodeBlock};
pub use chunker::{Chunker, ChunkerConfig};
pub use error::{ChunkerError, Result};
pub use language::{is_supported_extension, Language, SUPPORTED_EXTENSIONS};
