// Per-user cache: writable-location fallback and the persisted toolchain choice
pub mod manager;
pub mod metadata;
pub mod path;

// Re-exports for convenience
pub use manager::ToolchainCache;
pub use metadata::ToolchainRecord;
pub use path::{Writable, cache_root, make_writable, mirror_path, touch};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("could not determine the per-user cache directory")]
    NoCacheDir,
    #[error("no writable location for {} (also tried {})", .path.display(), .fallback.display())]
    NotWritable { path: PathBuf, fallback: PathBuf },
}
