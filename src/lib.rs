//! Library crate for columns-back, exposing modules for binaries and integration tests.

/// Runtime configuration.
pub mod config;
/// Match storage.
pub mod dao;
/// Wire types.
pub mod dto;
/// Service and HTTP errors.
pub mod error;
/// Columns game rules.
pub mod game;
/// HTTP and WebSocket routes.
pub mod routes;
/// Request handling and background tasks.
pub mod services;
/// Shared in-memory state.
pub mod state;
