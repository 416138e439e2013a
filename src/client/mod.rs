//! Client side of the live protocol: transports, the local session replica and the
//! reconnecting session controller.

/// Reconnect delay schedule.
pub mod backoff;
/// Connection manager.
pub mod controller;
/// Client error type.
pub mod error;
/// Remote transport over HTTP and SSE.
#[cfg(feature = "http-client")]
pub mod http;
/// Transport calling the service layer directly.
pub mod in_process;
/// Notification callbacks.
pub mod listeners;
/// Local replica of a session.
pub mod local;
/// Incremental event-stream parser.
#[cfg(feature = "http-client")]
pub mod sse_decoder;
/// Transport abstraction.
pub mod transport;

pub use controller::{ConnectionState, ControllerConfig, LiveSessionController};
pub use error::{ClientError, ClientResult};
#[cfg(feature = "http-client")]
pub use http::HttpApi;
pub use in_process::InProcessApi;
pub use transport::{EventStream, LiveApi};
