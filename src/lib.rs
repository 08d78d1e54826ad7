//! Library crate for live-quiz-back, exposing modules for binaries and integration tests.

/// Runtime configuration.
pub mod config;
/// Storage models, backends and the publishing repository.
pub mod dao;
/// Request and response payloads.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// HTTP routes.
pub mod routes;
/// Business logic behind the routes.
pub mod services;
/// Shared application state and host sessions.
pub mod state;
