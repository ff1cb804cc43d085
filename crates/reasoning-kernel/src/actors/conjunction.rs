//! ConjunctionActor: AND-composition of atomic resolvers as a pipeline.
//!
//! The conjunction plans its atomics once (declaration order reversed) and
//! sends each candidate value down that pipeline as a single request. The
//! pipeline's answers come back holding one value per atomic; the conjunction
//! merges them into one value.
//!
//! A conjunction with nothing before it on the path is the top of a query and
//! writes into the query's output channel instead of replying to an actor.

use acton_reactive::prelude::*;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::actors::{answer_upstream, deliver, exhausted_upstream, settle, Outbound, Sessions};
use crate::error::{ResolutionError, Result};
use crate::messages::{Answer, Exhausted, QueryOutput, Request};
use crate::path::{Step, StepKind};
use crate::producer::{ResponseProducer, TraversalProducer};
use crate::program::{Merge, Pattern};
use crate::retrieval::Traversal;

/// Actor state for a ConjunctionActor.
#[derive(Debug, Default, Clone)]
pub struct ConjunctionActorState {
    name: String,
    patterns: Vec<Pattern>,
    /// Atomic steps in execution order
    plan: Vec<Step>,
    merge: Merge,
    sink: Option<mpsc::Sender<QueryOutput>>,
    sessions: Sessions,
}

impl ConjunctionActorState {
    pub fn receive_request(&mut self, upstream: Request) -> Result<Vec<Outbound>> {
        trace!(actor = %self.name, request = %upstream.id, "Received request");
        if !upstream.path.at_end() {
            return Err(ResolutionError::NotAtEnd {
                request: upstream.id.clone(),
                kind: StepKind::Conjunction,
            });
        }
        if !self.sessions.contains(&upstream.id) {
            let producer = self.initialise_producer(&upstream);
            self.sessions.open(upstream.id.clone(), producer);
        }

        let mut outbound = Vec::new();
        let producer = self.sessions.producer_mut(&upstream.id)?;
        if producer.finished() {
            outbound.push(self.exhausted(&upstream)?);
            self.sessions.close(&upstream.id);
            return Ok(outbound);
        }
        producer.grant_credit();

        self.serve(&upstream, &mut outbound)?;
        Ok(outbound)
    }

    pub fn receive_answer(&mut self, answer: Answer) -> Result<Vec<Outbound>> {
        let route = self.sessions.route(&answer.source.id)?;
        let upstream = route.upstream;
        let source_kind = route.downstream.receiver().kind();
        if source_kind != StepKind::Atomic {
            return Err(ResolutionError::UnexpectedSource {
                receiver: self.name.clone(),
                source_kind,
            });
        }

        let value = self.combine(&upstream, &answer.partial_answer);
        trace!(actor = %self.name, request = %upstream.id, value, "Pipeline answer");

        let producer = self.sessions.producer_mut(&upstream.id)?;
        producer.downstream_responded()?;
        producer.add_available_downstream(route.downstream);
        producer.buffer_answer(extend(&upstream.partial_answer, value));

        let mut outbound = Vec::new();
        self.serve(&upstream, &mut outbound)?;
        Ok(outbound)
    }

    pub fn receive_exhausted(&mut self, exhausted: Exhausted) -> Result<Vec<Outbound>> {
        let route = self.sessions.forget_route(&exhausted.source.id)?;
        let upstream = route.upstream;
        trace!(actor = %self.name, request = %upstream.id, "Pipeline exhausted");

        let producer = self.sessions.producer_mut(&upstream.id)?;
        producer.downstream_responded()?;
        producer.mark_downstream_done(&route.downstream.id);

        let mut outbound = Vec::new();
        self.serve(&upstream, &mut outbound)?;
        Ok(outbound)
    }

    /// The single starting candidate is the merge of the incoming partial
    /// answer.
    fn initialise_producer(&self, upstream: &Request) -> ResponseProducer {
        let candidate = self.merge.apply(&upstream.partial_answer);
        debug!(
            actor = %self.name,
            request = %upstream.id,
            patterns = ?self.patterns,
            candidate,
            "Opening conjunction"
        );
        let mut producer = ResponseProducer::new();
        producer.add_traversal_producer(TraversalProducer::new(
            Vec::new(),
            Traversal::from_values(vec![candidate]),
        ));
        producer
    }

    fn serve(&mut self, upstream: &Request, outbound: &mut Vec<Outbound>) -> Result<()> {
        let producer = self.sessions.producer_mut(&upstream.id)?;
        if producer.upstream_outstanding() && producer.is_downstream_exhausted_of_alternatives() {
            if let Some(candidate) = producer.next_traversal_answer() {
                if self.plan.is_empty() {
                    let value = self.combine(upstream, &candidate);
                    let producer = self.sessions.producer_mut(&upstream.id)?;
                    producer.buffer_answer(extend(&upstream.partial_answer, value));
                } else {
                    let path = upstream
                        .path
                        .truncate()
                        .append_all(self.plan.iter().cloned())
                        .advance()?;
                    producer.add_available_downstream(upstream.derive(path, candidate));
                }
            }
        }

        let producer = self.sessions.producer_mut(&upstream.id)?;
        for answer in producer.take_deliverable() {
            outbound.push(self.answer(upstream, answer)?);
        }

        self.sessions.request_more(upstream, outbound)?;

        let producer = self.sessions.producer_mut(&upstream.id)?;
        if producer.take_exhausted_report() {
            debug!(actor = %self.name, request = %upstream.id, "Exhausted");
            outbound.push(self.exhausted(upstream)?);
            self.sessions.close(&upstream.id);
        }
        Ok(())
    }

    /// One value for a pipeline answer, which starts with the candidate.
    ///
    /// The top of a query merges everything. A rule body leaves the candidate
    /// out: the caller already holds that context in its own partial answer.
    fn combine(&self, upstream: &Request, pipeline_answer: &[i64]) -> i64 {
        if Self::is_top_level(upstream) {
            self.merge.apply(pipeline_answer)
        } else {
            self.merge.apply(pipeline_answer.get(1..).unwrap_or_default())
        }
    }

    fn is_top_level(upstream: &Request) -> bool {
        upstream.path.previous_step().is_none()
    }

    fn answer(&self, upstream: &Request, answer: Vec<i64>) -> Result<Outbound> {
        if Self::is_top_level(upstream) {
            let value = answer.last().copied().unwrap_or_default();
            return Ok(Outbound::Output(QueryOutput::Answer(value)));
        }
        answer_upstream(upstream, answer)
    }

    fn exhausted(&self, upstream: &Request) -> Result<Outbound> {
        if Self::is_top_level(upstream) {
            return Ok(Outbound::Output(QueryOutput::Exhausted));
        }
        exhausted_upstream(upstream)
    }
}

fn extend(partial_answer: &[i64], value: i64) -> Vec<i64> {
    let mut extended = partial_answer.to_vec();
    extended.push(value);
    extended
}

/// Resolves a conjunction of atomic patterns.
pub struct ConjunctionActor {
    pub name: String,
    pub patterns: Vec<Pattern>,
    pub plan: Vec<Step>,
    pub merge: Merge,
    /// Present only for the conjunction at the top of a query
    pub sink: Option<mpsc::Sender<QueryOutput>>,
}

impl ConjunctionActor {
    pub fn new(name: String, patterns: Vec<Pattern>, plan: Vec<Step>) -> Self {
        Self {
            name,
            patterns,
            plan,
            merge: Merge::default(),
            sink: None,
        }
    }

    pub fn with_merge(mut self, merge: Merge) -> Self {
        self.merge = merge;
        self
    }

    pub fn with_sink(mut self, sink: mpsc::Sender<QueryOutput>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Execution order for a conjunction: declaration order reversed.
    pub fn plan_order(patterns: &[Pattern]) -> Vec<Pattern> {
        patterns.iter().rev().copied().collect()
    }

    pub async fn start(self, mut actor: ManagedActor<Idle, ConjunctionActorState>) -> ActorHandle {
        debug!(conjunction = %self.name, patterns = ?self.patterns, "Starting conjunction");
        actor.model.name = self.name;
        actor.model.patterns = self.patterns;
        actor.model.plan = self.plan;
        actor.model.merge = self.merge;
        actor.model.sink = self.sink;

        configure_handlers(&mut actor);

        actor.start().await
    }
}

fn configure_handlers(actor: &mut ManagedActor<Idle, ConjunctionActorState>) {
    actor.mutate_on::<Request>(|actor, context| {
        let request = context.message().clone();
        let outcome = actor.model.receive_request(request);
        let outbound = settle(&actor.model.name, outcome);
        if outbound.is_empty() {
            return Reply::ready();
        }
        Reply::pending(deliver(outbound, actor.model.sink.clone()))
    });

    actor.mutate_on::<Answer>(|actor, context| {
        let answer = context.message().clone();
        let outcome = actor.model.receive_answer(answer);
        let outbound = settle(&actor.model.name, outcome);
        if outbound.is_empty() {
            return Reply::ready();
        }
        Reply::pending(deliver(outbound, actor.model.sink.clone()))
    });

    actor.mutate_on::<Exhausted>(|actor, context| {
        let exhausted = context.message().clone();
        let outcome = actor.model.receive_exhausted(exhausted);
        let outbound = settle(&actor.model.name, outcome);
        if outbound.is_empty() {
            return Reply::ready();
        }
        Reply::pending(deliver(outbound, actor.model.sink.clone()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_reverses_declaration_order() {
        assert_eq!(ConjunctionActor::plan_order(&[1, 2, 3]), vec![3, 2, 1]);
        assert!(ConjunctionActor::plan_order(&[]).is_empty());
    }

    #[test]
    fn test_extend_appends_value() {
        assert_eq!(extend(&[0, 3], 7), vec![0, 3, 7]);
    }
}
