// Public modules
pub mod api;
pub mod batch;
pub mod build;
pub mod cleanup;
pub mod config;
pub mod defaults;
pub mod error;
pub mod package;
pub mod pipeline;
pub mod ssh;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, ErrorKind, Result};
