//! Library crate for live-scoring-back, exposing modules for binaries and integration tests.

/// Session controller and live API transports.
pub mod client;
pub mod config;
/// Storage backends for final scores and roster lookups.
pub mod dao;
/// Wire types of the HTTP and SSE surfaces.
pub mod dto;
pub mod error;
/// HTTP routers.
pub mod routes;
/// Operations behind the routes.
pub mod services;
/// Shared runtime state: sessions, channels and tickets.
pub mod state;
