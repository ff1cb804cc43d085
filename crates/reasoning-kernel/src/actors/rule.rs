//! RuleActor: answers a rule head by resolving its body conjunction.

use acton_reactive::prelude::*;
use tracing::{debug, trace};

use crate::actors::{answer_upstream, deliver, exhausted_upstream, settle, Outbound, Sessions};
use crate::error::{ResolutionError, Result};
use crate::messages::{Answer, Exhausted, Request};
use crate::path::{Step, StepKind};
use crate::producer::ResponseProducer;
use crate::program::{Materializer, RuleDefinition};

/// Actor state for a RuleActor.
#[derive(Debug, Default, Clone)]
pub struct RuleActorState {
    name: String,
    rule: RuleDefinition,
    body: Option<Step>,
    materializer: Materializer,
    sessions: Sessions,
}

impl RuleActorState {
    pub fn receive_request(&mut self, upstream: Request) -> Result<Vec<Outbound>> {
        trace!(actor = %self.name, request = %upstream.id, "Received request");
        if !upstream.path.at_end() {
            return Err(ResolutionError::NotAtEnd {
                request: upstream.id.clone(),
                kind: StepKind::Rule,
            });
        }
        if !self.sessions.contains(&upstream.id) {
            let producer = self.initialise_producer(&upstream)?;
            self.sessions.open(upstream.id.clone(), producer);
        }

        let mut outbound = Vec::new();
        let producer = self.sessions.producer_mut(&upstream.id)?;
        if producer.finished() {
            outbound.push(exhausted_upstream(&upstream)?);
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
        if source_kind != StepKind::Conjunction {
            return Err(ResolutionError::UnexpectedSource {
                receiver: self.name.clone(),
                source_kind,
            });
        }

        let producer = self.sessions.producer_mut(&upstream.id)?;
        producer.downstream_responded()?;
        producer.add_available_downstream(route.downstream);
        match self
            .materializer
            .apply(&answer.partial_answer, &self.rule.head_constraints)
        {
            Some(derived) => producer.buffer_answer(derived),
            None => trace!(
                actor = %self.name,
                partial_answer = ?answer.partial_answer,
                "Body answer rejected"
            ),
        }

        let mut outbound = Vec::new();
        self.serve(&upstream, &mut outbound)?;
        Ok(outbound)
    }

    pub fn receive_exhausted(&mut self, exhausted: Exhausted) -> Result<Vec<Outbound>> {
        let route = self.sessions.forget_route(&exhausted.source.id)?;
        let upstream = route.upstream;
        trace!(actor = %self.name, request = %upstream.id, "Body exhausted");

        let producer = self.sessions.producer_mut(&upstream.id)?;
        producer.downstream_responded()?;
        producer.mark_downstream_done(&route.downstream.id);

        let mut outbound = Vec::new();
        self.serve(&upstream, &mut outbound)?;
        Ok(outbound)
    }

    /// No traversal: the body request is the only way to answer.
    fn initialise_producer(&self, upstream: &Request) -> Result<ResponseProducer> {
        let mut producer = ResponseProducer::new();
        if let Some(body) = &self.body {
            let path = upstream.path.truncate().append(body.clone()).advance()?;
            producer.add_available_downstream(upstream.derive(path, upstream.partial_answer.clone()));
        }
        Ok(producer)
    }

    fn serve(&mut self, upstream: &Request, outbound: &mut Vec<Outbound>) -> Result<()> {
        let producer = self.sessions.producer_mut(&upstream.id)?;
        for answer in producer.take_deliverable() {
            outbound.push(answer_upstream(upstream, answer)?);
        }

        self.sessions.request_more(upstream, outbound)?;

        let producer = self.sessions.producer_mut(&upstream.id)?;
        if producer.take_exhausted_report() {
            debug!(actor = %self.name, request = %upstream.id, "Exhausted");
            outbound.push(exhausted_upstream(upstream)?);
            self.sessions.close(&upstream.id);
        }
        Ok(())
    }
}

/// Resolves one rule through its body conjunction.
pub struct RuleActor {
    pub rule: RuleDefinition,
    pub body: Step,
    pub materializer: Materializer,
}

impl RuleActor {
    pub fn new(rule: RuleDefinition, body: Step) -> Self {
        Self {
            rule,
            body,
            materializer: Materializer::default(),
        }
    }

    pub fn with_materializer(mut self, materializer: Materializer) -> Self {
        self.materializer = materializer;
        self
    }

    pub async fn start(self, mut actor: ManagedActor<Idle, RuleActorState>) -> ActorHandle {
        actor.model.name = format!("Rule:{}", self.rule.label());
        actor.model.rule = self.rule;
        actor.model.body = Some(self.body);
        actor.model.materializer = self.materializer;

        configure_handlers(&mut actor);

        actor.start().await
    }
}

fn configure_handlers(actor: &mut ManagedActor<Idle, RuleActorState>) {
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
