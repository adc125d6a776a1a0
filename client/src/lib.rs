//! Async client for the MathVision script-generation backend.
//!
//! The backend turns one topic into three candidate animation scripts and
//! pushes them back over a server-sent-events stream. This crate owns the
//! client side of that exchange:
//!
//! - [`SessionIdentity`] mints the per-session token everything is keyed on
//! - [`Dispatcher`] issues the one-shot `POST /submit` that starts a run
//! - [`LiveChannel`] subscribes to `/events/{token}` and reconnects on loss
//! - [`SessionState`] folds pushed events into three version slots plus a
//!   progress reading
//! - [`GenerationSession`] ties the four together behind one handle
//!
//! Wire types and configuration live in the `shared` crate.

pub mod channel;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod session;
pub mod sse;
pub mod state;

mod net;

pub use channel::{ChannelEvent, ChannelState, LiveChannel};
pub use dispatch::{DispatchAck, Dispatcher};
pub use error::{ChannelError, DispatchError, IdentityError, SessionError, TransportError};
pub use identity::SessionIdentity;
pub use session::GenerationSession;
pub use state::{
    GenerationJob, JobStatus, Progress, SessionPhase, SessionState, VersionSlot,
};
