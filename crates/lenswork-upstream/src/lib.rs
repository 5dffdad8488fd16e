//! # Lenswork Upstream
//!
//! HTTP implementation of the upstream client facade.
//!
//! This crate provides:
//! - HttpUpstream: reqwest-based client over the websets API

mod http;

pub use http::{HttpUpstream, HttpUpstreamConfig};

// Re-export the trait for convenience
pub use lenswork_core::upstream::{UpstreamClient, UpstreamError};
