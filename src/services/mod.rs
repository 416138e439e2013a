/// Capability checks over account memberships.
pub mod authorization;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Per-connection forwarders behind the live streams.
pub mod live_feed;
/// Periodic cleanup of tickets and ended sessions.
pub mod maintenance;
/// Live session commands.
pub mod session_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Score store connection supervisor.
pub mod storage_supervisor;
/// Stream ticket issuing.
pub mod ticket_service;
