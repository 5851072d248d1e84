// src/engine/gate.rs

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::errors::RenderError;
use crate::types::OverloadPolicy;

use super::JobId;

/// Bounds the number of renderer processes running at once.
///
/// Semantics:
/// - Up to `capacity` jobs hold an [`AdmittedToken`] at any time.
/// - With [`OverloadPolicy::Queue`], further jobs wait in a FIFO queue of at
///   most `queue_depth` entries; anything beyond that is rejected.
/// - With [`OverloadPolicy::Reject`], jobs are rejected as soon as every
///   slot is taken.
/// - A released slot is handed straight to the oldest waiter still
///   interested in it, so the running count never dips and re-rises between
///   jobs.
///
/// All counters and the queue live behind a single mutex. The gate is cheap
/// to clone; clones share state.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    shared: Arc<GateShared>,
}

#[derive(Debug)]
struct GateShared {
    capacity: usize,
    queue_depth: usize,
    policy: OverloadPolicy,
    state: Mutex<GateState>,
}

#[derive(Debug, Default)]
struct GateState {
    running: usize,
    waiters: VecDeque<Waiter>,
    next_ticket: u64,
}

#[derive(Debug)]
struct Waiter {
    ticket: u64,
    job: JobId,
    tx: oneshot::Sender<SlotGrant>,
}

/// Marker sent to a waiter when a slot is handed over.
#[derive(Debug)]
struct SlotGrant;

/// Result of [`ConcurrencyGate::admit`].
#[derive(Debug)]
pub enum Admission {
    /// A slot was free; the job may run now.
    Admitted(AdmittedToken),
    /// All slots are busy; wait on the ticket.
    Queued(QueuedTicket),
    /// Capacity and queue are exhausted, or the policy is `reject`.
    Rejected(Overloaded),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overloaded {
    pub running: usize,
    pub queued: usize,
}

impl From<Overloaded> for RenderError {
    fn from(o: Overloaded) -> Self {
        RenderError::Overloaded {
            running: o.running,
            queued: o.queued,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub capacity: usize,
    pub running: usize,
    pub queued: usize,
}

impl ConcurrencyGate {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize, queue_depth: usize, policy: OverloadPolicy) -> Self {
        Self {
            shared: Arc::new(GateShared {
                capacity: capacity.max(1),
                queue_depth,
                policy,
                state: Mutex::new(GateState::default()),
            }),
        }
    }

    pub fn policy(&self) -> OverloadPolicy {
        self.shared.policy
    }

    pub fn snapshot(&self) -> GateStats {
        let state = self.shared.lock();
        GateStats {
            capacity: self.shared.capacity,
            running: state.running,
            queued: state.waiters.len(),
        }
    }

    /// Ask for a renderer slot on behalf of `job`.
    pub fn admit(&self, job: JobId) -> Admission {
        let mut state = self.shared.lock();

        if state.running < self.shared.capacity {
            state.running += 1;
            debug!(job = %job, running = state.running, "renderer slot admitted");
            return Admission::Admitted(AdmittedToken {
                shared: Arc::clone(&self.shared),
                job,
            });
        }

        let overloaded = Overloaded {
            running: state.running,
            queued: state.waiters.len(),
        };
        match self.shared.policy {
            OverloadPolicy::Reject => {
                debug!(job = %job, "all renderer slots busy; rejecting (reject policy)");
                Admission::Rejected(overloaded)
            }
            OverloadPolicy::Queue if state.waiters.len() >= self.shared.queue_depth => {
                warn!(
                    job = %job,
                    queued = state.waiters.len(),
                    queue_depth = self.shared.queue_depth,
                    "render queue full; rejecting"
                );
                Admission::Rejected(overloaded)
            }
            OverloadPolicy::Queue => {
                let ticket = state.next_ticket;
                state.next_ticket += 1;
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(Waiter { ticket, job, tx });
                debug!(
                    job = %job,
                    position = state.waiters.len(),
                    "all renderer slots busy; job queued"
                );
                Admission::Queued(QueuedTicket {
                    shared: Arc::clone(&self.shared),
                    ticket,
                    job,
                    rx: Some(rx),
                })
            }
        }
    }
}

impl GateShared {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        // The state is a counter and a queue; both stay consistent even if a
        // holder panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Give a slot back: hand it to the oldest live waiter, or free it.
    fn release(&self, job: JobId) {
        let mut state = self.lock();
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.tx.send(SlotGrant).is_ok() {
                debug!(from = %job, to = %waiter.job, "renderer slot handed to queued job");
                return;
            }
            debug!(job = %waiter.job, "skipping queued job that gave up waiting");
        }
        state.running = state.running.saturating_sub(1);
        debug!(job = %job, running = state.running, "renderer slot released");
    }

    fn forget_waiter(&self, ticket: u64) {
        let mut state = self.lock();
        state.waiters.retain(|w| w.ticket != ticket);
    }
}

/// Proof that a job holds a renderer slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct AdmittedToken {
    shared: Arc<GateShared>,
    job: JobId,
}

impl AdmittedToken {
    pub fn job(&self) -> JobId {
        self.job
    }
}

impl Drop for AdmittedToken {
    fn drop(&mut self) {
        self.shared.release(self.job);
    }
}

/// A job's place in the gate's FIFO queue.
///
/// Dropping the ticket (for example because the job was cancelled while
/// waiting) removes it from the queue. If a slot had already been handed
/// over, it is released again.
#[derive(Debug)]
pub struct QueuedTicket {
    shared: Arc<GateShared>,
    ticket: u64,
    job: JobId,
    rx: Option<oneshot::Receiver<SlotGrant>>,
}

impl QueuedTicket {
    pub fn job(&self) -> JobId {
        self.job
    }

    /// Wait until a slot is handed to this job.
    pub async fn wait(mut self) -> Result<AdmittedToken, RenderError> {
        let granted = match self.rx.as_mut() {
            Some(rx) => rx.await,
            None => return Err(RenderError::Internal("queue ticket already used".into())),
        };
        self.rx = None;
        match granted {
            Ok(SlotGrant) => Ok(AdmittedToken {
                shared: Arc::clone(&self.shared),
                job: self.job,
            }),
            Err(_) => Err(RenderError::Internal(
                "concurrency gate dropped a queued job".into(),
            )),
        }
    }
}

impl Drop for QueuedTicket {
    fn drop(&mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        rx.close();
        if let Ok(SlotGrant) = rx.try_recv() {
            debug!(job = %self.job, "queued job abandoned after being granted a slot");
            self.shared.release(self.job);
        } else {
            debug!(job = %self.job, "queued job left the queue");
            self.shared.forget_waiter(self.ticket);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admitted(a: Admission) -> AdmittedToken {
        match a {
            Admission::Admitted(t) => t,
            other => panic!("expected Admitted, got {other:?}"),
        }
    }

    fn queued(a: Admission) -> QueuedTicket {
        match a {
            Admission::Queued(t) => t,
            other => panic!("expected Queued, got {other:?}"),
        }
    }

    #[test]
    fn admits_up_to_capacity_then_queues() {
        let gate = ConcurrencyGate::new(2, 4, OverloadPolicy::Queue);
        let _a = admitted(gate.admit(JobId::new()));
        let _b = admitted(gate.admit(JobId::new()));
        let _c = queued(gate.admit(JobId::new()));

        assert_eq!(
            gate.snapshot(),
            GateStats {
                capacity: 2,
                running: 2,
                queued: 1
            }
        );
    }

    #[test]
    fn reject_policy_never_queues() {
        let gate = ConcurrencyGate::new(1, 10, OverloadPolicy::Reject);
        let _a = admitted(gate.admit(JobId::new()));
        match gate.admit(JobId::new()) {
            Admission::Rejected(o) => assert_eq!(o.running, 1),
            other => panic!("expected Rejected, got {other:?}"),
        }
        assert_eq!(gate.snapshot().queued, 0);
    }

    #[test]
    fn full_queue_rejects() {
        let gate = ConcurrencyGate::new(1, 1, OverloadPolicy::Queue);
        let _a = admitted(gate.admit(JobId::new()));
        let _b = queued(gate.admit(JobId::new()));
        assert!(matches!(gate.admit(JobId::new()), Admission::Rejected(_)));
    }

    #[test]
    fn dropping_token_frees_slot() {
        let gate = ConcurrencyGate::new(1, 0, OverloadPolicy::Queue);
        let a = admitted(gate.admit(JobId::new()));
        drop(a);
        assert_eq!(gate.snapshot().running, 0);
        let _b = admitted(gate.admit(JobId::new()));
    }

    #[test]
    fn dropping_ticket_leaves_queue() {
        let gate = ConcurrencyGate::new(1, 4, OverloadPolicy::Queue);
        let a = admitted(gate.admit(JobId::new()));
        let b = queued(gate.admit(JobId::new()));
        drop(b);
        assert_eq!(gate.snapshot().queued, 0);

        drop(a);
        assert_eq!(gate.snapshot().running, 0);
    }

    #[tokio::test]
    async fn queued_jobs_are_admitted_in_fifo_order() {
        let gate = ConcurrencyGate::new(1, 4, OverloadPolicy::Queue);
        let first = admitted(gate.admit(JobId::new()));

        let second_id = JobId::new();
        let third_id = JobId::new();
        let second = queued(gate.admit(second_id));
        let third = queued(gate.admit(third_id));

        drop(first);
        let second = second.wait().await.unwrap();
        assert_eq!(second.job(), second_id);
        assert_eq!(gate.snapshot().running, 1);
        assert_eq!(gate.snapshot().queued, 1);

        drop(second);
        let third = third.wait().await.unwrap();
        assert_eq!(third.job(), third_id);
        drop(third);
        assert_eq!(gate.snapshot().running, 0);
    }

    #[test]
    fn ticket_dropped_after_grant_returns_slot() {
        let gate = ConcurrencyGate::new(1, 4, OverloadPolicy::Queue);
        let first = admitted(gate.admit(JobId::new()));
        let second = queued(gate.admit(JobId::new()));

        // Slot is handed to `second`, which then gives up without waiting.
        drop(first);
        assert_eq!(gate.snapshot().running, 1);
        drop(second);
        assert_eq!(gate.snapshot().running, 0);
    }

    #[test]
    fn release_skips_abandoned_waiters() {
        let gate = ConcurrencyGate::new(1, 4, OverloadPolicy::Queue);
        let first = admitted(gate.admit(JobId::new()));
        let second = queued(gate.admit(JobId::new()));
        let third_id = JobId::new();
        let mut third = queued(gate.admit(third_id));

        drop(second);
        drop(first);

        let rx = third.rx.as_mut().unwrap();
        assert!(rx.try_recv().is_ok());
        third.rx = None;
        // `third` now owns the slot logically; release it through a token.
        drop(AdmittedToken {
            shared: Arc::clone(&gate.shared),
            job: third_id,
        });
        assert_eq!(gate.snapshot().running, 0);
    }
}
