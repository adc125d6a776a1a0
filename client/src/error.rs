use hyper::StatusCode;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Failures at the TCP/HTTP layer, shared by the dispatch call and the live
/// channel. The channel recovers from these by reconnecting and only surfaces
/// them as state; the dispatcher propagates them to the caller.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid backend base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("failed to connect to backend: {0}")]
    Connect(#[source] std::io::Error),

    #[error("HTTP handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("HTTP exchange failed: {0}")]
    Http(#[source] hyper::Error),

    #[error("failed to build request: {0}")]
    Request(#[from] http::Error),

    #[error("backend answered HTTP {0}")]
    Status(StatusCode),
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Errors from the one-shot start-generation call. Never retried
/// automatically; the caller decides whether to dispatch again.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// A required input was blank. The request was never sent.
    #[error("cannot dispatch generation: missing {field}")]
    MissingPrecondition { field: &'static str },

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The backend answered with `success: false`; carries the
    /// server-supplied message when one was present.
    #[error("generation request rejected: {message}")]
    Rejected { message: String },

    #[error("generation request failed with HTTP {0}")]
    Status(StatusCode),

    #[error("could not encode dispatch request: {0}")]
    EncodeRequest(#[source] serde_json::Error),

    #[error("could not decode dispatch response: {0}")]
    DecodeResponse(#[source] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Channel / identity / session
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ChannelError {
    /// The channel was closed. Closed channels are never reopened; build a
    /// new session instead.
    #[error("live channel is closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("cannot mint a session token without a signed-in user id")]
    MissingUserId,
}

/// Errors from building a [`GenerationSession`](crate::GenerationSession).
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
