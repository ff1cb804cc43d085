//! The reasoner: builds the resolver actor graph for a query and exposes the
//! query's answers as a pull-based stream.
//!
//! ## Usage
//!
//! ```ignore
//! use reasoning_kernel::{Reasoner, RuleDefinition, ResolutionConfig};
//! use acton_reactive::prelude::*;
//!
//! let mut runtime = ActonApp::launch_async().await;
//!
//! let reasoner = Reasoner::builder()
//!     .config(ResolutionConfig::default())
//!     .rule(RuleDefinition::new(5, vec![7]))
//!     .build();
//!
//! // One pull per answer; `None` once the query is exhausted
//! let mut query = reasoner.query(&mut runtime, vec![2, 3], 0).await?;
//! while let Some(answer) = query.next_answer().await {
//!     println!("{answer}");
//! }
//! ```

use std::sync::Arc;

use acton_reactive::prelude::*;
use anyhow::{bail, Result};
use mti::prelude::*;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::actors::{
    AtomicResolver, AtomicResolverState, ConjunctionActor, ConjunctionActorState, RuleActor,
    RuleActorState,
};
use crate::config::ResolutionConfig;
use crate::messages::{QueryOutput, Request, RequestId};
use crate::path::{Path, Step};
use crate::program::{Materializer, Merge, Pattern, Program, RuleDefinition};
use crate::registry::Registry;
use crate::retrieval::{MockRetrieval, Retrieval};

/// Owns a program, a retrieval source, and the registry of resolver actors
/// built for it. Actors are shared by every query run through the same
/// reasoner.
pub struct Reasoner {
    config: ResolutionConfig,
    program: Program,
    retrieval: Arc<dyn Retrieval>,
    merge: Merge,
    materializer: Materializer,
    registry: Arc<Registry>,
}

impl Reasoner {
    pub fn builder() -> ReasonerBuilder {
        ReasonerBuilder::default()
    }

    pub fn config(&self) -> &ResolutionConfig {
        &self.config
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Build (or reuse) the actors for a conjunction of `patterns` and return
    /// a handle that pulls its answers. `initial` seeds the conjunction.
    pub async fn query(
        &self,
        runtime: &mut ActorRuntime,
        patterns: Vec<Pattern>,
        initial: i64,
    ) -> Result<QueryHandle> {
        if patterns.is_empty() {
            bail!("a query needs at least one pattern");
        }

        let (tx, rx) = mpsc::channel(self.config.output_capacity.max(1));
        let name = format!("Query:{}", "query".create_type_id::<V7>());

        let mut spawner = Spawner::new(runtime, self);
        let step = spawner.conjunction(name.clone(), patterns.clone(), Some(tx));
        spawner.start_pending().await;

        info!(
            query = %name,
            patterns = ?patterns,
            initial,
            atomics = self.registry.atomic_count(),
            rules = self.registry.rule_count(),
            "Query ready"
        );

        let request = Request::new(Path::new(step.clone()), vec![initial], Vec::new(), Vec::new());
        Ok(QueryHandle {
            name,
            patterns,
            conjunction: step.handle().clone(),
            request,
            outputs: rx,
            exhausted: false,
            answers_received: 0,
        })
    }

    /// Run a query to completion.
    pub async fn answers(
        &self,
        runtime: &mut ActorRuntime,
        patterns: Vec<Pattern>,
        initial: i64,
    ) -> Result<Vec<i64>> {
        let query = self.query(runtime, patterns, initial).await?;
        Ok(query.collect_all().await)
    }
}

#[derive(Default)]
pub struct ReasonerBuilder {
    config: ResolutionConfig,
    program: Program,
    retrieval: Option<Arc<dyn Retrieval>>,
    merge: Merge,
    materializer: Materializer,
    registry: Option<Arc<Registry>>,
}

impl ReasonerBuilder {
    pub fn config(mut self, config: ResolutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn program(mut self, program: Program) -> Self {
        self.program = program;
        self
    }

    pub fn rule(mut self, rule: RuleDefinition) -> Self {
        self.program.add_rule(rule);
        self
    }

    /// Defaults to a [`MockRetrieval`] sized by the config.
    pub fn retrieval(mut self, retrieval: impl Retrieval + 'static) -> Self {
        self.retrieval = Some(Arc::new(retrieval));
        self
    }

    pub fn shared_retrieval(mut self, retrieval: Arc<dyn Retrieval>) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    pub fn merge(mut self, merge: impl Fn(&[i64]) -> i64 + Send + Sync + 'static) -> Self {
        self.merge = Merge::new(merge);
        self
    }

    pub fn materializer(
        mut self,
        materializer: impl Fn(&[i64], &[String]) -> Option<Vec<i64>> + Send + Sync + 'static,
    ) -> Self {
        self.materializer = Materializer::new(materializer);
        self
    }

    /// Share an existing registry instead of starting an empty one.
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Reasoner {
        let retrieval = self.retrieval.unwrap_or_else(|| {
            Arc::new(MockRetrieval::new(
                self.config.traversal_size,
                self.config.answer_interval,
            ))
        });
        Reasoner {
            config: self.config,
            program: self.program,
            retrieval,
            merge: self.merge,
            materializer: self.materializer,
            registry: self.registry.unwrap_or_default(),
        }
    }
}

/// An actor created but not yet started.
enum PendingActor {
    Atomic {
        actor: ManagedActor<Idle, AtomicResolverState>,
        pattern: Pattern,
    },
    Rule {
        actor: ManagedActor<Idle, RuleActorState>,
        rule: RuleDefinition,
    },
    Conjunction {
        actor: ManagedActor<Idle, ConjunctionActorState>,
        name: String,
        patterns: Vec<Pattern>,
        sink: Option<mpsc::Sender<QueryOutput>>,
    },
}

/// Builds the actor graph in two phases: an actor is created and its handle
/// registered first, and its children are resolved only when it is started.
/// A rule that refers back to a pattern already being built therefore finds
/// the registered handle instead of recursing.
struct Spawner<'a> {
    runtime: &'a mut ActorRuntime,
    reasoner: &'a Reasoner,
    pending: Vec<PendingActor>,
}

impl<'a> Spawner<'a> {
    fn new(runtime: &'a mut ActorRuntime, reasoner: &'a Reasoner) -> Self {
        Self {
            runtime,
            reasoner,
            pending: Vec::new(),
        }
    }

    fn atomic(&mut self, pattern: Pattern) -> Step {
        let registry = Arc::clone(&self.reasoner.registry);
        if let Some(handle) = registry.atomic(pattern) {
            return Step::atomic(handle);
        }
        let handle = registry.register_atomic(pattern, |pattern| {
            let actor = self
                .runtime
                .new_actor_with_name::<AtomicResolverState>(format!("Atomic:{pattern}"));
            let handle = actor.handle().clone();
            debug!(pattern, "Registered atomic resolver");
            self.pending.push(PendingActor::Atomic { actor, pattern });
            handle
        });
        Step::atomic(handle)
    }

    fn rule(&mut self, rule: &RuleDefinition) -> Step {
        let registry = Arc::clone(&self.reasoner.registry);
        if let Some(handle) = registry.rule(rule) {
            return Step::rule(handle);
        }
        let handle = registry.register_rule(rule, |rule| {
            let actor = self
                .runtime
                .new_actor_with_name::<RuleActorState>(format!("Rule:{}", rule.label()));
            let handle = actor.handle().clone();
            debug!(rule = %rule.label(), "Registered rule");
            self.pending.push(PendingActor::Rule {
                actor,
                rule: rule.clone(),
            });
            handle
        });
        Step::rule(handle)
    }

    /// Conjunctions are never shared, so they bypass the registry.
    fn conjunction(
        &mut self,
        name: String,
        patterns: Vec<Pattern>,
        sink: Option<mpsc::Sender<QueryOutput>>,
    ) -> Step {
        let actor = self
            .runtime
            .new_actor_with_name::<ConjunctionActorState>(name.clone());
        let handle = actor.handle().clone();
        self.pending.push(PendingActor::Conjunction {
            actor,
            name,
            patterns,
            sink,
        });
        Step::conjunction(handle)
    }

    async fn start_pending(&mut self) {
        let reasoner = self.reasoner;
        while let Some(pending) = self.pending.pop() {
            match pending {
                PendingActor::Atomic { actor, pattern } => {
                    let rules: Vec<Step> = reasoner
                        .program
                        .rules_for(pattern)
                        .iter()
                        .map(|rule| self.rule(rule))
                        .collect();
                    AtomicResolver::new(pattern, Arc::clone(&reasoner.retrieval), rules)
                        .with_merge(reasoner.merge.clone())
                        .with_rule_deduplication(reasoner.config.deduplicate_rule_triggers)
                        .start(actor)
                        .await;
                }
                PendingActor::Rule { actor, rule } => {
                    let body = self.conjunction(
                        format!("RuleBody:{}", rule.label()),
                        rule.when.clone(),
                        None,
                    );
                    RuleActor::new(rule, body)
                        .with_materializer(reasoner.materializer.clone())
                        .start(actor)
                        .await;
                }
                PendingActor::Conjunction {
                    actor,
                    name,
                    patterns,
                    sink,
                } => {
                    let plan: Vec<Step> = ConjunctionActor::plan_order(&patterns)
                        .into_iter()
                        .map(|pattern| self.atomic(pattern))
                        .collect();
                    let mut conjunction = ConjunctionActor::new(name, patterns, plan)
                        .with_merge(reasoner.merge.clone());
                    if let Some(sink) = sink {
                        conjunction = conjunction.with_sink(sink);
                    }
                    conjunction.start(actor).await;
                }
            }
        }
    }
}

/// Pull-based access to one query's answers.
///
/// Every pull re-sends the same top-level request, asking the conjunction for
/// exactly one more output.
#[derive(Debug)]
pub struct QueryHandle {
    name: String,
    patterns: Vec<Pattern>,
    conjunction: ActorHandle,
    request: Request,
    outputs: mpsc::Receiver<QueryOutput>,
    exhausted: bool,
    answers_received: usize,
}

impl QueryHandle {
    /// Ask for one more output. After the completion sentinel every further
    /// pull yields the sentinel again without touching the actors.
    pub async fn pull(&mut self) -> QueryOutput {
        if self.exhausted {
            return QueryOutput::Exhausted;
        }
        self.conjunction.send(self.request.clone()).await;
        match self.outputs.recv().await {
            Some(QueryOutput::Answer(value)) => {
                self.answers_received += 1;
                QueryOutput::Answer(value)
            }
            Some(QueryOutput::Exhausted) => {
                info!(
                    query = %self.name,
                    answers = self.answers_received,
                    "Query exhausted"
                );
                self.exhausted = true;
                QueryOutput::Exhausted
            }
            None => {
                warn!(query = %self.name, "Query output channel closed");
                self.exhausted = true;
                QueryOutput::Exhausted
            }
        }
    }

    pub async fn next_answer(&mut self) -> Option<i64> {
        match self.pull().await {
            QueryOutput::Answer(value) => Some(value),
            QueryOutput::Exhausted => None,
        }
    }

    /// Pull until the query is exhausted.
    pub async fn collect_all(mut self) -> Vec<i64> {
        let mut answers = Vec::new();
        while let Some(answer) = self.next_answer().await {
            answers.push(answer);
        }
        answers
    }

    /// Outputs that arrived without a pull. Each pull is answered by exactly
    /// one output, so anything here means the actors over-delivered.
    pub fn unsolicited(&mut self) -> Vec<QueryOutput> {
        let mut outputs = Vec::new();
        while let Ok(output) = self.outputs.try_recv() {
            outputs.push(output);
        }
        if !outputs.is_empty() {
            warn!(query = %self.name, ?outputs, "Unsolicited query outputs");
        }
        outputs
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request.id
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn answers_received(&self) -> usize {
        self.answers_received
    }
}
