/// Health check payloads.
pub mod health;
/// Live session requests and responses.
pub mod session;
/// Events pushed over the live streams.
pub mod sse;
