//! Resolution actors.
//!
//! Three kinds of actor cooperate to answer a query:
//! - [`AtomicResolver`]: one per pattern, ORs a retrieval source with the
//!   rules whose head is that pattern
//! - [`ConjunctionActor`]: ANDs a fixed list of atomic resolvers as a pipeline
//! - [`RuleActor`]: one per rule, forwards to its body conjunction
//!
//! Every handler runs the same way: the state computes the outbound messages
//! for one inbound message synchronously, then the reply future sends them in
//! order. A [`ResolutionError`] abandons the inbound message after logging it.

pub mod atomic;
pub mod conjunction;
pub mod rule;

pub use atomic::{AtomicResolver, AtomicResolverState};
pub use conjunction::{ConjunctionActor, ConjunctionActorState};
pub use rule::{RuleActor, RuleActorState};

use std::collections::HashMap;

use acton_reactive::prelude::*;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::error::{ResolutionError, Result};
use crate::messages::{Answer, Exhausted, QueryOutput, Request, RequestId};
use crate::producer::ResponseProducer;

/// A message a handler wants sent once it has finished mutating its state.
#[derive(Debug)]
pub enum Outbound {
    /// Delivered to the step under the request's path cursor.
    Request(Request),
    Answer {
        to: ActorHandle,
        answer: Answer,
    },
    Exhausted {
        to: ActorHandle,
        exhausted: Exhausted,
    },
    /// Written to the query's output channel.
    Output(QueryOutput),
}

pub(crate) async fn deliver(outbound: Vec<Outbound>, sink: Option<mpsc::Sender<QueryOutput>>) {
    for message in outbound {
        match message {
            Outbound::Request(request) => {
                let to = request.receiver().handle().clone();
                to.send(request).await;
            }
            Outbound::Answer { to, answer } => {
                to.send(answer).await;
            }
            Outbound::Exhausted { to, exhausted } => {
                to.send(exhausted).await;
            }
            Outbound::Output(output) => match &sink {
                Some(tx) => {
                    if tx.send(output).await.is_err() {
                        warn!(?output, "Query output receiver dropped");
                    }
                }
                None => warn!(?output, "No output channel for query output"),
            },
        }
    }
}

/// Log a handler fault and fall back to sending nothing.
pub(crate) fn settle(actor: &str, outcome: Result<Vec<Outbound>>) -> Vec<Outbound> {
    outcome.unwrap_or_else(|e| {
        error!(actor = %actor, error = %e, "Abandoning message");
        Vec::new()
    })
}

/// Where a downstream pull came from, so its responses can be attributed.
#[derive(Debug, Clone)]
pub(crate) struct Route {
    pub upstream: Request,
    pub downstream: Request,
}

/// Producers and router of one actor, keyed by request id.
#[derive(Debug, Clone, Default)]
pub(crate) struct Sessions {
    producers: HashMap<RequestId, ResponseProducer>,
    router: HashMap<RequestId, Route>,
}

impl Sessions {
    pub fn contains(&self, id: &RequestId) -> bool {
        self.producers.contains_key(id)
    }

    pub fn open(&mut self, id: RequestId, producer: ResponseProducer) {
        self.producers.insert(id, producer);
    }

    /// Drop a lineage whose exhaustion has been reported.
    pub fn close(&mut self, id: &RequestId) -> Option<ResponseProducer> {
        self.producers.remove(id)
    }

    pub fn producer_mut(&mut self, id: &RequestId) -> Result<&mut ResponseProducer> {
        self.producers
            .get_mut(id)
            .ok_or_else(|| ResolutionError::UnknownRequest(id.clone()))
    }

    pub fn route(&self, downstream: &RequestId) -> Result<Route> {
        self.router
            .get(downstream)
            .cloned()
            .ok_or_else(|| ResolutionError::UnroutedResponse(downstream.clone()))
    }

    pub fn forget_route(&mut self, downstream: &RequestId) -> Result<Route> {
        self.router
            .remove(downstream)
            .ok_or_else(|| ResolutionError::UnroutedResponse(downstream.clone()))
    }

    /// Send one more pull downstream if the upstream request is still owed
    /// answers and an alternative is available.
    pub fn request_more(&mut self, upstream: &Request, outbound: &mut Vec<Outbound>) -> Result<()> {
        let producer = self
            .producers
            .get_mut(&upstream.id)
            .ok_or_else(|| ResolutionError::UnknownRequest(upstream.id.clone()))?;
        if !producer.upstream_outstanding() || producer.is_downstream_exhausted_of_alternatives() {
            return Ok(());
        }
        let downstream = producer.dispatch_next()?;
        self.router.insert(
            downstream.id.clone(),
            Route {
                upstream: upstream.clone(),
                downstream: downstream.clone(),
            },
        );
        outbound.push(Outbound::Request(downstream));
        Ok(())
    }

    pub fn open_count(&self) -> usize {
        self.producers.len()
    }

    pub fn route_count(&self) -> usize {
        self.router.len()
    }
}

/// Answer `upstream` by sending to the step before its receiver.
pub(crate) fn answer_upstream(upstream: &Request, partial_answer: Vec<i64>) -> Result<Outbound> {
    let to = reply_target(upstream)?;
    Ok(Outbound::Answer {
        to,
        answer: Answer {
            source: upstream.clone(),
            path: upstream.path.retreat()?,
            partial_answer,
            constraints: upstream.constraints.clone(),
            unifiers: upstream.unifiers.clone(),
        },
    })
}

pub(crate) fn exhausted_upstream(upstream: &Request) -> Result<Outbound> {
    let to = reply_target(upstream)?;
    Ok(Outbound::Exhausted {
        to,
        exhausted: Exhausted {
            source: upstream.clone(),
            path: upstream.path.retreat()?,
        },
    })
}

fn reply_target(upstream: &Request) -> Result<ActorHandle> {
    upstream
        .path
        .previous_step()
        .map(|step| step.handle().clone())
        .ok_or_else(|| ResolutionError::MissingPreviousStep(upstream.id.clone()))
}
