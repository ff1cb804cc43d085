//! Per-request flow-control state.
//!
//! Every request an actor receives gets one [`ResponseProducer`], keyed by the
//! request id. It tracks three counts that must never be conflated:
//!
//! - credits: pulls received from upstream that have not been answered yet
//! - in flight: pulls this actor has sent downstream and not heard back from
//! - buffered: answers ready to go but not yet covered by a credit
//!
//! The actor only pulls downstream while credits exceed in-flight plus
//! buffered, which keeps fan-out bounded by demand.

use std::collections::{HashSet, VecDeque};

use crate::error::{ResolutionError, Result};
use crate::messages::{Request, RequestId};
use crate::retrieval::Traversal;

/// Something a producer can hand out as a downstream pull.
pub trait Dispatchable: Clone {
    fn request_id(&self) -> &RequestId;
}

impl Dispatchable for Request {
    fn request_id(&self) -> &RequestId {
        &self.id
    }
}

/// A traversal tagged with the partial answer its values extend.
#[derive(Debug, Clone)]
pub struct TraversalProducer {
    pub context: Vec<i64>,
    pub traversal: Traversal,
}

impl TraversalProducer {
    pub fn new(context: Vec<i64>, traversal: Traversal) -> Self {
        Self { context, traversal }
    }

    pub fn is_exhausted(&self) -> bool {
        self.traversal.is_exhausted()
    }

    /// The context extended by the next value, if any remain.
    pub fn next_answer(&self) -> Option<Vec<i64>> {
        let value = self.traversal.next_value()?;
        let mut answer = self.context.clone();
        answer.push(value);
        Some(answer)
    }
}

#[derive(Debug, Clone)]
pub struct ResponseProducer<D = Request> {
    requests_from_upstream: usize,
    requests_to_downstream: usize,
    answers: VecDeque<Vec<i64>>,
    traversals: VecDeque<TraversalProducer>,
    available_downstream: VecDeque<D>,
    dispatched: HashSet<RequestId>,
    downstream_done: HashSet<RequestId>,
    exhausted_reported: bool,
}

impl<D> Default for ResponseProducer<D> {
    fn default() -> Self {
        Self {
            requests_from_upstream: 0,
            requests_to_downstream: 0,
            answers: VecDeque::new(),
            traversals: VecDeque::new(),
            available_downstream: VecDeque::new(),
            dispatched: HashSet::new(),
            downstream_done: HashSet::new(),
            exhausted_reported: false,
        }
    }
}

impl<D: Dispatchable> ResponseProducer<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exhausted traversals are dropped on arrival.
    pub fn add_traversal_producer(&mut self, producer: TraversalProducer) {
        if !producer.is_exhausted() {
            self.traversals.push_back(producer);
        }
    }

    /// Check out the oldest live traversal. The caller hands it back through
    /// [`add_traversal_producer`](Self::add_traversal_producer) or lets it go.
    pub fn take_traversal_producer(&mut self) -> Option<TraversalProducer> {
        while let Some(producer) = self.traversals.pop_front() {
            if !producer.is_exhausted() {
                return Some(producer);
            }
        }
        None
    }

    /// Pull one value from the oldest live traversal, rotating it to the back
    /// if it still has values.
    pub fn next_traversal_answer(&mut self) -> Option<Vec<i64>> {
        let producer = self.take_traversal_producer()?;
        let answer = producer.next_answer();
        self.add_traversal_producer(producer);
        answer
    }

    pub fn add_available_downstream(&mut self, downstream: D) {
        self.available_downstream.push_back(downstream);
    }

    pub fn take_available_downstream(&mut self) -> Result<D> {
        self.available_downstream
            .pop_front()
            .ok_or(ResolutionError::NoAvailableDownstream)
    }

    /// Take the next alternative and count it as an in-flight pull.
    pub fn dispatch_next(&mut self) -> Result<D> {
        let downstream = self.take_available_downstream()?;
        self.dispatched.insert(downstream.request_id().clone());
        self.requests_to_downstream += 1;
        Ok(downstream)
    }

    pub fn is_downstream_exhausted_of_alternatives(&self) -> bool {
        self.available_downstream.is_empty()
    }

    pub fn mark_downstream_done(&mut self, id: &RequestId) {
        self.downstream_done.insert(id.clone());
    }

    /// A pulled downstream answered or completed.
    pub fn downstream_responded(&mut self) -> Result<()> {
        self.requests_to_downstream = self.requests_to_downstream.checked_sub(1).ok_or(
            ResolutionError::CounterUnderflow {
                counter: "requests_to_downstream",
            },
        )?;
        Ok(())
    }

    pub fn finished(&self) -> bool {
        self.traversals.iter().all(TraversalProducer::is_exhausted)
            && self.available_downstream.is_empty()
            && self.dispatched.is_subset(&self.downstream_done)
            && self.answers.is_empty()
    }

    pub fn grant_credit(&mut self) {
        self.requests_from_upstream += 1;
    }

    pub fn upstream_outstanding(&self) -> bool {
        self.requests_from_upstream > self.requests_to_downstream + self.answers.len()
    }

    pub fn buffer_answer(&mut self, answer: Vec<i64>) {
        self.answers.push_back(answer);
    }

    /// Pop as many buffered answers as there are credits, one credit each.
    pub fn take_deliverable(&mut self) -> Vec<Vec<i64>> {
        let count = self.requests_from_upstream.min(self.answers.len());
        self.requests_from_upstream -= count;
        self.answers.drain(..count).collect()
    }

    /// True exactly once: the first time the producer is finished while a
    /// credit is still owed.
    pub fn take_exhausted_report(&mut self) -> bool {
        if self.exhausted_reported || self.requests_from_upstream == 0 || !self.finished() {
            return false;
        }
        self.exhausted_reported = true;
        true
    }

    pub fn credits(&self) -> usize {
        self.requests_from_upstream
    }

    pub fn in_flight(&self) -> usize {
        self.requests_to_downstream
    }

    pub fn buffered(&self) -> usize {
        self.answers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Pull(RequestId);

    impl Pull {
        fn fresh() -> Self {
            Self(RequestId::generate())
        }
    }

    impl Dispatchable for Pull {
        fn request_id(&self) -> &RequestId {
            &self.0
        }
    }

    fn traversal(context: Vec<i64>, values: Vec<i64>) -> TraversalProducer {
        TraversalProducer::new(context, Traversal::from_values(values))
    }

    #[test]
    fn test_new_producer_is_finished() {
        let producer: ResponseProducer<Pull> = ResponseProducer::new();
        assert!(producer.finished());
        assert!(!producer.upstream_outstanding());
    }

    #[test]
    fn test_traversal_answers_extend_context_in_order() {
        let mut producer: ResponseProducer<Pull> = ResponseProducer::new();
        producer.add_traversal_producer(traversal(vec![0], vec![3, 4]));
        assert!(!producer.finished());

        assert_eq!(producer.next_traversal_answer(), Some(vec![0, 3]));
        assert_eq!(producer.next_traversal_answer(), Some(vec![0, 4]));
        assert_eq!(producer.next_traversal_answer(), None);
        assert!(producer.finished());
    }

    #[test]
    fn test_traversals_are_served_round_robin() {
        let mut producer: ResponseProducer<Pull> = ResponseProducer::new();
        producer.add_traversal_producer(traversal(vec![1], vec![10, 11]));
        producer.add_traversal_producer(traversal(vec![2], vec![20]));

        assert_eq!(producer.next_traversal_answer(), Some(vec![1, 10]));
        assert_eq!(producer.next_traversal_answer(), Some(vec![2, 20]));
        assert_eq!(producer.next_traversal_answer(), Some(vec![1, 11]));
    }

    #[test]
    fn test_exhausted_traversal_is_never_registered() {
        let mut producer: ResponseProducer<Pull> = ResponseProducer::new();
        producer.add_traversal_producer(traversal(vec![], vec![]));
        assert!(producer.take_traversal_producer().is_none());
        assert!(producer.finished());
    }

    #[test]
    fn test_credit_accounting() {
        let mut producer: ResponseProducer<Pull> = ResponseProducer::new();
        producer.grant_credit();
        producer.grant_credit();
        assert!(producer.upstream_outstanding());

        producer.add_available_downstream(Pull::fresh());
        producer.dispatch_next().unwrap();
        assert_eq!(producer.in_flight(), 1);
        assert!(producer.upstream_outstanding());

        producer.buffer_answer(vec![1]);
        assert!(!producer.upstream_outstanding());

        let delivered = producer.take_deliverable();
        assert_eq!(delivered, vec![vec![1]]);
        assert_eq!(producer.credits(), 1);
        assert_eq!(producer.buffered(), 0);
    }

    #[test]
    fn test_deliverable_is_bounded_by_credits() {
        let mut producer: ResponseProducer<Pull> = ResponseProducer::new();
        producer.buffer_answer(vec![1]);
        producer.buffer_answer(vec![2]);
        assert!(producer.take_deliverable().is_empty());

        producer.grant_credit();
        assert_eq!(producer.take_deliverable(), vec![vec![1]]);
        assert_eq!(producer.buffered(), 1);
        assert_eq!(producer.credits(), 0);
    }

    #[test]
    fn test_finished_waits_for_every_dispatched_downstream() {
        let mut producer: ResponseProducer<Pull> = ResponseProducer::new();
        let first = Pull::fresh();
        let second = Pull::fresh();
        producer.add_available_downstream(first.clone());
        producer.add_available_downstream(second.clone());

        producer.dispatch_next().unwrap();
        producer.dispatch_next().unwrap();
        assert!(producer.is_downstream_exhausted_of_alternatives());
        assert!(!producer.finished());

        producer.downstream_responded().unwrap();
        producer.mark_downstream_done(&first.0);
        assert!(!producer.finished());

        producer.downstream_responded().unwrap();
        producer.mark_downstream_done(&second.0);
        assert!(producer.finished());
    }

    #[test]
    fn test_empty_queue_and_underflow_are_errors() {
        let mut producer: ResponseProducer<Pull> = ResponseProducer::new();
        assert!(matches!(
            producer.take_available_downstream(),
            Err(ResolutionError::NoAvailableDownstream)
        ));
        assert!(matches!(
            producer.downstream_responded(),
            Err(ResolutionError::CounterUnderflow { .. })
        ));
    }

    #[test]
    fn test_exhausted_is_reported_once_and_only_with_credit() {
        let mut producer: ResponseProducer<Pull> = ResponseProducer::new();
        assert!(!producer.take_exhausted_report());

        producer.grant_credit();
        assert!(producer.take_exhausted_report());
        assert!(!producer.take_exhausted_report());
    }
}
