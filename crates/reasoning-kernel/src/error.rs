//! Invariant faults raised by the resolution actors.
//!
//! None of these are retryable. A handler that hits one logs it and abandons
//! the message that caused it; they indicate a topology or bookkeeping bug,
//! never a transient condition.

use thiserror::Error;

use crate::messages::RequestId;
use crate::path::StepKind;

/// Errors raised while an actor processes a resolution message.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// A response arrived for a downstream request this actor never sent.
    #[error("no route recorded for downstream request {0}")]
    UnroutedResponse(RequestId),

    /// A producer lookup missed for a request the actor should own.
    #[error("no response producer for request {0}")]
    UnknownRequest(RequestId),

    /// An answer came back from a kind of actor the receiver never dispatches to.
    #[error("{receiver} cannot handle an answer from a {source_kind} step")]
    UnexpectedSource {
        receiver: String,
        source_kind: StepKind,
    },

    /// A conjunction or rule received a request that plans further steps.
    #[error("request {request} reached a {kind} before the end of its path")]
    NotAtEnd { request: RequestId, kind: StepKind },

    /// A reply was due but the request's path has nobody before the receiver.
    #[error("request {0} has no step to reply to")]
    MissingPreviousStep(RequestId),

    /// The control loop tried to dispatch with an empty alternative queue.
    #[error("no available downstream request to dispatch")]
    NoAvailableDownstream,

    /// A flow-control counter was decremented past zero.
    #[error("{counter} would drop below zero")]
    CounterUnderflow { counter: &'static str },

    /// The path cursor was moved outside the appended steps.
    #[error("path cursor cannot move from step {cursor} of {len}")]
    PathOverrun { cursor: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, ResolutionError>;
