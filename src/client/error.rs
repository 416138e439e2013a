use thiserror::Error;

use crate::error::{AppError, ErrorCode, ServiceError};

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Failures surfaced by live API transports and the session controller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The caller is not allowed to act on the subject.
    #[error("not authorized: {0}")]
    Authorization(String),
    /// The subject, session or connection does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The session already ended.
    #[error("session already ended: {0}")]
    TerminalState(String),
    /// The stream ticket was refused.
    #[error("ticket rejected: {0}")]
    TicketRejected(String),
    /// The request itself was refused as malformed or out of range.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The request conflicts with a pending transition.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The server or the link to it failed.
    #[error("transport failure: {0}")]
    Transport(String),
    /// No answer within the configured deadline.
    #[error("timed out: {0}")]
    Timeout(String),
    /// A response could not be decoded.
    #[error("undecodable response: {0}")]
    Decode(String),
    /// The controller is not attached to a subject.
    #[error("not connected to a live session")]
    NotConnected,
}

impl ClientError {
    /// Map an error body code returned by the server.
    pub fn from_code(code: ErrorCode, message: String) -> Self {
        match code {
            ErrorCode::Unauthorized | ErrorCode::Forbidden => ClientError::Authorization(message),
            ErrorCode::NotFound => ClientError::NotFound(message),
            ErrorCode::TerminalState => ClientError::TerminalState(message),
            ErrorCode::TicketRejected => ClientError::TicketRejected(message),
            ErrorCode::BadRequest => ClientError::InvalidRequest(message),
            ErrorCode::Conflict => ClientError::Conflict(message),
            ErrorCode::ServiceUnavailable | ErrorCode::Internal => ClientError::Transport(message),
        }
    }

    /// Whether reconnecting cannot help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClientError::Authorization(_) | ClientError::NotFound(_) | ClientError::TerminalState(_)
        )
    }
}

impl From<AppError> for ClientError {
    fn from(err: AppError) -> Self {
        ClientError::from_code(err.code(), err.to_string())
    }
}

impl From<ServiceError> for ClientError {
    fn from(err: ServiceError) -> Self {
        AppError::from(err).into()
    }
}
