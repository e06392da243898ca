//! In-process session clients: local question timer, view reconciliation and the
//! push + poll sync loop that keeps every participant and the controller consistent.

/// Bounded wait for results to become readable.
pub mod readiness;
/// Client roles and what they may do.
pub mod role;
/// Per-client sync task.
pub mod sync;
/// Local question countdown.
pub mod timer;
/// Client-side session snapshot.
pub mod view;

use thiserror::Error;

use crate::error::ServiceError;

pub use self::{
    readiness::{GateOutcome, ReadinessGate},
    role::{Capability, ClientRole},
    sync::{ClientEvent, SessionClient},
    timer::{AnswerWindow, QuestionTimer, TimerEvent},
    view::{Delta, Reconciled, SessionView, ViewChange},
};

/// Errors returned by client operations. Sync failures never surface here.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The client's role lacks the capability.
    #[error("role is not allowed to {0:?}")]
    NotPermitted(Capability),
    /// Nothing to answer yet.
    #[error("no question is in play")]
    NoActiveQuestion,
    /// The session moved on or stopped before the answer was sent.
    #[error("question is no longer accepting answers")]
    QuestionClosed,
    /// The local countdown ran out or is frozen.
    #[error("answer window is closed")]
    WindowClosed,
    /// The sync task has exited.
    #[error("client has stopped")]
    Stopped,
    /// The server refused the operation.
    #[error(transparent)]
    Service(#[from] ServiceError),
}
