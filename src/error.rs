use thiserror::Error;

/// The crate-wide error type.
///
/// Every fallible operation in `dapcore` resolves to one of these kinds.
/// Errors raised inside an awaited call (e.g. `protocol::Client::request`)
/// propagate to the caller; errors raised inside scheduler tasks are logged
/// and swallowed instead (see `scheduler`).
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request '{command}' timed out after {elapsed_ms}ms")]
    Timeout { command: String, elapsed_ms: u64 },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("adapter error: {0}")]
    Adapter(String),

    #[error("breakpoint verification failed: {0}")]
    BreakpointVerification(String),

    #[error("startDebugging exceeded max session depth ({max})")]
    SessionDepthExceeded { max: u32 },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("no handler registered for reverse request '{0}'")]
    ReverseRequestHandlerMissing(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// A short, stable-ish code for the error kind. Mirrors the JSON-RPC-like
    /// negative error codes a host integration might want to surface.
    pub fn error_code(&self) -> i32 {
        match self {
            Error::SessionNotFound(_) => -32001,
            Error::Adapter(_) => -32002,
            Error::Transport(_) => -32003,
            Error::Timeout { .. } => -32004,
            Error::Protocol(_) => -32005,
            Error::BreakpointVerification(_) => -32006,
            Error::SessionDepthExceeded { .. } => -32007,
            Error::InvalidUrl(_) => -32008,
            Error::ReverseRequestHandlerMissing(_) => -32009,
            Error::InvalidState(_) => -32010,
            Error::Cancelled(_) => -32011,
            Error::Internal(_) => -32603,
            Error::Io(_) | Error::Json(_) => -32603,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
