//! Library crate for quiz-live-back, exposing modules for binaries and integration tests.

/// In-process session clients with the push + poll sync loop.
pub mod client;
/// Configuration loading.
pub mod config;
/// Storage models and backends.
pub mod dao;
/// HTTP and SSE payloads.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// axum routers.
pub mod routes;
/// Business operations.
pub mod services;
/// Shared application state and the session state machine.
pub mod state;
