//! # Lenswork API
//!
//! Single-dispatcher surface over tasks and upstream pass-throughs.
//!
//! This crate provides:
//! - OperationRequest parsing (`{operation, args}`)
//! - Task handlers (create / get / result / list / cancel)
//! - Projected pass-through handlers for upstream primitives

mod dispatcher;
mod dto;
mod error;

pub use dispatcher::Dispatcher;
pub use dto::{OperationRequest, TaskSummary, TaskView};
pub use error::{ApiError, ErrorCode};
