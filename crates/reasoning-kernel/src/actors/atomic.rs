//! AtomicResolver: OR-composition of a retrieval source and rule rewrites.
//!
//! A request that reaches an atomic resolver at the end of its path is a leaf
//! lookup. The resolver answers it from a traversal of the retrieval source
//! and, as alternatives, from each rule whose head is its pattern.
//!
//! A request whose path plans further steps is a pipeline stage. The resolver
//! forwards it to the next step and, for every answer that comes back, runs
//! its own lookup seeded with that answer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use acton_reactive::prelude::*;
use tracing::{debug, trace};

use crate::actors::{answer_upstream, deliver, exhausted_upstream, settle, Outbound, Sessions};
use crate::error::{ResolutionError, Result};
use crate::messages::{Answer, Exhausted, Request, RequestId};
use crate::path::{Step, StepKind};
use crate::producer::{ResponseProducer, TraversalProducer};
use crate::program::{Merge, Pattern};
use crate::retrieval::Retrieval;

/// Open producers and rule triggers of one top-level query in this actor.
#[derive(Debug, Default, Clone)]
struct Lineage {
    open: usize,
    /// (partial answer, constraints) that already triggered the rules
    triggered: HashSet<(Vec<i64>, Vec<String>)>,
}

/// Actor state for an AtomicResolver.
#[derive(Default, Clone)]
pub struct AtomicResolverState {
    name: String,
    pattern: Pattern,
    retrieval: Option<Arc<dyn Retrieval>>,
    merge: Merge,
    /// One step per rule with this pattern as its head
    rules: Vec<Step>,
    deduplicate_rule_triggers: bool,
    /// Keyed by root request id; dropped once the query has nothing open here
    lineages: HashMap<RequestId, Lineage>,
    sessions: Sessions,
}

impl std::fmt::Debug for AtomicResolverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicResolverState")
            .field("pattern", &self.pattern)
            .field("retrieval", &self.retrieval.is_some())
            .field("rules", &self.rules.len())
            .field("deduplicate_rule_triggers", &self.deduplicate_rule_triggers)
            .field("requests", &self.sessions.open_count())
            .field("lineages", &self.lineages.len())
            .field("routes", &self.sessions.route_count())
            .finish()
    }
}

impl AtomicResolverState {
    pub fn receive_request(&mut self, upstream: Request) -> Result<Vec<Outbound>> {
        trace!(actor = %self.name, request = %upstream.id, "Received request");
        if !self.sessions.contains(&upstream.id) {
            let producer = self.initialise_producer(&upstream)?;
            self.sessions.open(upstream.id.clone(), producer);
            self.lineages.entry(upstream.root.clone()).or_default().open += 1;
        }

        let mut outbound = Vec::new();
        let producer = self.sessions.producer_mut(&upstream.id)?;
        if producer.finished() {
            outbound.push(exhausted_upstream(&upstream)?);
            self.close(&upstream);
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
        trace!(
            actor = %self.name,
            request = %upstream.id,
            source = %source_kind,
            "Received answer"
        );

        let producer = self.sessions.producer_mut(&upstream.id)?;
        producer.downstream_responded()?;
        producer.add_available_downstream(route.downstream);

        match source_kind {
            StepKind::Atomic => {
                let traversal = self.traversal_for(answer.partial_answer.clone());
                let triggers =
                    self.rule_alternatives(&upstream, &answer.partial_answer, &answer.constraints)?;
                let producer = self.sessions.producer_mut(&upstream.id)?;
                if let Some(traversal) = traversal {
                    producer.add_traversal_producer(traversal);
                }
                for trigger in triggers {
                    producer.add_available_downstream(trigger);
                }
            }
            StepKind::Rule => producer.buffer_answer(answer.partial_answer),
            StepKind::Conjunction => {
                return Err(ResolutionError::UnexpectedSource {
                    receiver: self.name.clone(),
                    source_kind,
                })
            }
        }

        let mut outbound = Vec::new();
        self.serve(&upstream, &mut outbound)?;
        Ok(outbound)
    }

    pub fn receive_exhausted(&mut self, exhausted: Exhausted) -> Result<Vec<Outbound>> {
        let route = self.sessions.forget_route(&exhausted.source.id)?;
        let upstream = route.upstream;
        trace!(actor = %self.name, request = %upstream.id, "Downstream exhausted");

        let producer = self.sessions.producer_mut(&upstream.id)?;
        producer.downstream_responded()?;
        producer.mark_downstream_done(&route.downstream.id);

        let mut outbound = Vec::new();
        self.serve(&upstream, &mut outbound)?;
        Ok(outbound)
    }

    fn initialise_producer(&mut self, upstream: &Request) -> Result<ResponseProducer> {
        let mut producer = ResponseProducer::new();
        if upstream.path.next_step().is_some() {
            debug!(actor = %self.name, request = %upstream.id, "Forwarding to next step");
            let forward = upstream.derive(upstream.path.advance()?, upstream.partial_answer.clone());
            producer.add_available_downstream(forward);
        } else {
            if let Some(traversal) = self.traversal_for(upstream.partial_answer.clone()) {
                producer.add_traversal_producer(traversal);
            }
            for trigger in
                self.rule_alternatives(upstream, &upstream.partial_answer, &upstream.constraints)?
            {
                producer.add_available_downstream(trigger);
            }
        }
        Ok(producer)
    }

    /// Serve from traversals, flush what credits allow, pull once more if
    /// still owed, and report completion if nothing is left.
    fn serve(&mut self, upstream: &Request, outbound: &mut Vec<Outbound>) -> Result<()> {
        let producer = self.sessions.producer_mut(&upstream.id)?;
        if producer.upstream_outstanding() {
            if let Some(answer) = producer.next_traversal_answer() {
                producer.buffer_answer(answer);
            }
        }
        for answer in producer.take_deliverable() {
            outbound.push(answer_upstream(upstream, answer)?);
        }

        self.sessions.request_more(upstream, outbound)?;

        let producer = self.sessions.producer_mut(&upstream.id)?;
        if producer.take_exhausted_report() {
            debug!(actor = %self.name, request = %upstream.id, "Exhausted");
            outbound.push(exhausted_upstream(upstream)?);
            self.close(upstream);
        }
        Ok(())
    }

    fn close(&mut self, upstream: &Request) {
        self.sessions.close(&upstream.id);
        if let Some(lineage) = self.lineages.get_mut(&upstream.root) {
            lineage.open = lineage.open.saturating_sub(1);
            if lineage.open == 0 {
                self.lineages.remove(&upstream.root);
            }
        }
    }

    /// A lookup of this pattern seeded by `context`, whose values extend it.
    fn traversal_for(&self, context: Vec<i64>) -> Option<TraversalProducer> {
        let retrieval = self.retrieval.as_ref()?;
        let seed = self.merge.apply(&context);
        Some(TraversalProducer::new(
            context,
            retrieval.query(self.pattern, seed),
        ))
    }

    /// One request per rule, each on a path that ends at the rule.
    fn rule_alternatives(
        &mut self,
        upstream: &Request,
        partial_answer: &[i64],
        constraints: &[String],
    ) -> Result<Vec<Request>> {
        if self.rules.is_empty() {
            return Ok(Vec::new());
        }
        if self.deduplicate_rule_triggers
            && !self
                .lineages
                .entry(upstream.root.clone())
                .or_default()
                .triggered
                .insert((partial_answer.to_vec(), constraints.to_vec()))
        {
            trace!(actor = %self.name, ?partial_answer, "Rules already triggered");
            return Ok(Vec::new());
        }

        let base = upstream.path.truncate();
        self.rules
            .iter()
            .map(|rule| {
                let path = base.append(rule.clone()).advance()?;
                Ok(upstream.derive_constrained(
                    path,
                    partial_answer.to_vec(),
                    constraints.to_vec(),
                ))
            })
            .collect()
    }
}

/// Resolves one atomic pattern.
pub struct AtomicResolver {
    pub pattern: Pattern,
    pub retrieval: Arc<dyn Retrieval>,
    pub merge: Merge,
    pub rules: Vec<Step>,
    pub deduplicate_rule_triggers: bool,
}

impl AtomicResolver {
    pub fn new(pattern: Pattern, retrieval: Arc<dyn Retrieval>, rules: Vec<Step>) -> Self {
        Self {
            pattern,
            retrieval,
            merge: Merge::default(),
            rules,
            deduplicate_rule_triggers: false,
        }
    }

    pub fn with_merge(mut self, merge: Merge) -> Self {
        self.merge = merge;
        self
    }

    pub fn with_rule_deduplication(mut self, enabled: bool) -> Self {
        self.deduplicate_rule_triggers = enabled;
        self
    }

    /// Install state and handlers on an actor created ahead of time, then
    /// start it. Creation is split from start so the actor's handle can be
    /// registered before its rules are built.
    pub async fn start(self, mut actor: ManagedActor<Idle, AtomicResolverState>) -> ActorHandle {
        actor.model.name = format!("Atomic:{}", self.pattern);
        actor.model.pattern = self.pattern;
        actor.model.retrieval = Some(self.retrieval);
        actor.model.merge = self.merge;
        actor.model.rules = self.rules;
        actor.model.deduplicate_rule_triggers = self.deduplicate_rule_triggers;

        configure_handlers(&mut actor);

        actor.start().await
    }
}

fn configure_handlers(actor: &mut ManagedActor<Idle, AtomicResolverState>) {
    actor.mutate_on::<Request>(|actor, context| {
        let request = context.message().clone();
        let outcome = actor.model.receive_request(request);
        let outbound = settle(&actor.model.name, outcome);
        if outbound.is_empty() {
            return Reply::ready();
        }
        Reply::pending(deliver(outbound, None))
    });

    actor.mutate_on::<Answer>(|actor, context| {
        let answer = context.message().clone();
        let outcome = actor.model.receive_answer(answer);
        let outbound = settle(&actor.model.name, outcome);
        if outbound.is_empty() {
            return Reply::ready();
        }
        Reply::pending(deliver(outbound, None))
    });

    actor.mutate_on::<Exhausted>(|actor, context| {
        let exhausted = context.message().clone();
        let outcome = actor.model.receive_exhausted(exhausted);
        let outbound = settle(&actor.model.name, outcome);
        if outbound.is_empty() {
            return Reply::ready();
        }
        Reply::pending(deliver(outbound, None))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Path;

    async fn idle_handle(runtime: &mut ActorRuntime, name: &str) -> ActorHandle {
        let actor = runtime.new_actor_with_name::<AtomicResolverState>(name.to_string());
        actor.start().await
    }

    fn leaf_state(deduplicate_rule_triggers: bool) -> AtomicResolverState {
        AtomicResolverState {
            name: "Atomic:5".to_string(),
            pattern: 5,
            retrieval: Some(Arc::new(|_pattern: Pattern, _seed: i64| -> Vec<i64> { vec![1] })),
            deduplicate_rule_triggers,
            ..AtomicResolverState::default()
        }
    }

    #[tokio::test]
    async fn test_exhausted_lineage_is_dropped() {
        let mut runtime = ActonApp::launch_async().await;
        let top = idle_handle(&mut runtime, "Top").await;
        let me = idle_handle(&mut runtime, "Me").await;

        let mut state = leaf_state(false);
        let path = Path::new(Step::conjunction(top))
            .append(Step::atomic(me))
            .advance()
            .unwrap();
        let request = Request::new(path, vec![0], Vec::new(), Vec::new());

        let first = state.receive_request(request.clone()).unwrap();
        assert!(matches!(
            first.as_slice(),
            [Outbound::Answer { answer, .. }] if answer.partial_answer == vec![0, 1]
        ));
        assert_eq!(state.sessions.open_count(), 1);
        assert_eq!(state.lineages.len(), 1);

        let second = state.receive_request(request).unwrap();
        assert!(matches!(second.as_slice(), [Outbound::Exhausted { .. }]));
        assert_eq!(state.sessions.open_count(), 0);
        assert!(state.lineages.is_empty());

        runtime.shutdown_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_rule_triggers_are_deduplicated_per_query() {
        let mut runtime = ActonApp::launch_async().await;
        let top = idle_handle(&mut runtime, "Top").await;
        let me = idle_handle(&mut runtime, "Me").await;
        let rule = idle_handle(&mut runtime, "Rule").await;

        let mut state = leaf_state(true);
        state.rules = vec![Step::rule(rule)];
        let path = Path::new(Step::conjunction(top))
            .append(Step::atomic(me))
            .advance()
            .unwrap();

        let query = Request::new(path.clone(), vec![0], Vec::new(), Vec::new());
        let same_query = query.derive(path.clone(), vec![0]);
        let other_query = Request::new(path, vec![0], Vec::new(), Vec::new());

        assert_eq!(state.rule_alternatives(&query, &[0], &[]).unwrap().len(), 1);
        assert!(state.rule_alternatives(&same_query, &[0], &[]).unwrap().is_empty());

        let triggered = state.rule_alternatives(&other_query, &[0], &[]).unwrap();
        assert_eq!(triggered.len(), 1);
        assert_eq!(triggered[0].root, other_query.id);

        runtime.shutdown_all().await.unwrap();
    }
}
