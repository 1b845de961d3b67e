//! Daemon surface: configuration and the HTTP/push-channel router.
//!
//! This module provides:
//! - Configuration types (`config`)
//! - The axum router and serve loop (`http`)

pub mod config;
pub mod http;

pub use http::{PushMessage, QuestionRequest, router, serve};
