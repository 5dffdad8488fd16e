//! # Lenswork Stores
//!
//! Store implementations for the Lenswork runtime.
//!
//! This crate provides:
//! - InMemory TaskStore with TTL-based cleanup and a concurrency cap

mod task_store;

pub use task_store::{InMemoryTaskStore, InMemoryTaskStoreConfig};

// Re-export core traits for convenience
pub use lenswork_core::store::{StoreError, TaskStore};
