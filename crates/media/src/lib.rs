//! Attachment pipeline: download, store under a flat cache directory, expire
//! by file age.
//!
//! The cache keeps no manifest or in-memory index; a file's validity is
//! always recomputed from its modification time, so the directory itself is
//! the single source of truth.

pub mod cleanup;
pub mod error;
pub mod store;

pub use {
    cleanup::CleanupTask,
    error::{FetchError, Result},
    store::MediaCache,
};
