//! Category-scoped work queue with retry/backoff and a failure channel.
//!
//! Delivery is exclusive: a dequeued entry is held in flight under a claim
//! token until acked or nacked, so a job id reaches at most one worker at a
//! time. FIFO order is best-effort; retried entries re-enter behind their
//! backoff delay and may be overtaken by newer arrivals.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use quillerp_core::JobId;

use crate::types::JobCategory;

/// Per-category queue policy.
#[derive(Debug, Clone)]
pub struct QueuePolicy {
    /// Total delivery attempts before the entry is routed to the failure
    /// channel. An attempt consumed by a stalled worker counts.
    pub max_attempts: u32,
    /// Base backoff delay before the first retry.
    pub base_delay: StdDuration,
    /// Exponential multiplier applied per retry.
    pub multiplier: f64,
    /// Backoff cap.
    pub max_delay: StdDuration,
    /// In-flight entries older than this are presumed dead and redelivered.
    pub stall_timeout: StdDuration,
    /// Bounded trailing history of acked/exhausted entries kept for
    /// observability.
    pub history_limit: usize,
}

impl QueuePolicy {
    /// Export/print default: one retry — re-running is cheap for the caller
    /// to re-request, so the budget stays small.
    pub fn rendering() -> Self {
        Self {
            max_attempts: 2,
            base_delay: StdDuration::from_secs(2),
            multiplier: 2.0,
            max_delay: StdDuration::from_secs(60),
            stall_timeout: StdDuration::from_secs(30),
            history_limit: 100,
        }
    }

    /// Bulk-operation default: never auto-retried. Partially applied
    /// mutations must not be blindly re-driven; that takes explicit operator
    /// action.
    pub fn bulk() -> Self {
        Self {
            max_attempts: 1,
            ..Self::rendering()
        }
    }

    pub fn for_category(category: JobCategory) -> Self {
        match category {
            JobCategory::Export | JobCategory::Print => Self::rendering(),
            JobCategory::BulkOperation => Self::bulk(),
        }
    }

    /// Backoff before retry number `retry` (1-indexed): base × multiplier^(n-1),
    /// capped at `max_delay`.
    pub fn backoff_for_retry(&self, retry: u32) -> StdDuration {
        if retry == 0 {
            return StdDuration::ZERO;
        }
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let delay_ms = (base_ms * self.multiplier.powi((retry - 1) as i32)).min(max_ms);
        StdDuration::from_millis(delay_ms as u64)
    }
}

/// An exclusive delivery of one queue entry to one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub category: JobCategory,
    pub job_id: JobId,
    /// 1-indexed delivery attempt.
    pub attempt: u32,
    token: u64,
}

/// Outcome of a negative acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NackOutcome {
    /// Re-queued; redelivered after the computed backoff.
    Requeued { delay: StdDuration },
    /// Attempt budget spent; routed to the failure channel, never
    /// redelivered automatically.
    Exhausted,
}

/// Trailing history entry (completed or failed deliveries).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub job_id: JobId,
    pub attempts: u32,
    pub succeeded: bool,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Entry {
    job_id: JobId,
    /// Deliveries already consumed.
    attempts: u32,
    not_before: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct InFlight {
    job_id: JobId,
    attempt: u32,
    claimed_at: DateTime<Utc>,
    /// Set when the job was cancelled while in flight; a nack then drops the
    /// entry instead of re-queuing it.
    removed: bool,
}

#[derive(Debug)]
struct Lane {
    policy: QueuePolicy,
    ready: VecDeque<Entry>,
    delayed: Vec<Entry>,
    in_flight: HashMap<u64, InFlight>,
    /// Ids currently queued, delayed, or in flight (idempotent enqueue).
    queued: HashSet<JobId>,
    history: VecDeque<HistoryEntry>,
}

impl Lane {
    fn new(policy: QueuePolicy) -> Self {
        Self {
            policy,
            ready: VecDeque::new(),
            delayed: Vec::new(),
            in_flight: HashMap::new(),
            queued: HashSet::new(),
            history: VecDeque::new(),
        }
    }

    fn promote_due(&mut self, now: DateTime<Utc>) {
        let mut still_delayed = Vec::new();
        for entry in self.delayed.drain(..) {
            if entry.not_before.is_none_or(|t| t <= now) {
                self.ready.push_back(entry);
            } else {
                still_delayed.push(entry);
            }
        }
        self.delayed = still_delayed;
    }

    fn push_history(&mut self, entry: HistoryEntry) {
        self.history.push_back(entry);
        while self.history.len() > self.policy.history_limit {
            self.history.pop_front();
        }
    }
}

/// The in-process work queue, one lane per category.
///
/// Owned by the composition root and passed in explicitly; there is no
/// process-wide queue singleton.
#[derive(Debug)]
pub struct JobQueue {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    lanes: HashMap<JobCategory, Lane>,
    next_token: u64,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(JobCategory::ALL.map(|c| (c, QueuePolicy::for_category(c))))
    }
}

impl JobQueue {
    pub fn new(policies: impl IntoIterator<Item = (JobCategory, QueuePolicy)>) -> Self {
        let lanes = policies
            .into_iter()
            .map(|(c, p)| (c, Lane::new(p)))
            .collect();
        Self {
            inner: Mutex::new(Inner {
                lanes,
                next_token: 0,
            }),
        }
    }

    fn with_lane<R>(&self, category: JobCategory, f: impl FnOnce(&mut Lane, &mut u64) -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let inner = &mut *inner;
        let lane = inner
            .lanes
            .entry(category)
            .or_insert_with(|| Lane::new(QueuePolicy::for_category(category)));
        f(lane, &mut inner.next_token)
    }

    /// Enqueue a job id. Idempotent: re-enqueueing an id that is already
    /// queued, delayed, or in flight is a no-op (returns `false`).
    pub fn enqueue(&self, category: JobCategory, job_id: JobId) -> bool {
        self.with_lane(category, |lane, _| {
            if !lane.queued.insert(job_id) {
                debug!(%job_id, %category, "enqueue ignored, already queued");
                return false;
            }
            lane.ready.push_back(Entry {
                job_id,
                attempts: 0,
                not_before: None,
            });
            debug!(%job_id, %category, "job enqueued");
            true
        })
    }

    /// Claim the next due entry, if any. The entry moves in flight until
    /// acked or nacked.
    pub fn dequeue(&self, category: JobCategory, now: DateTime<Utc>) -> Option<Delivery> {
        self.with_lane(category, |lane, next_token| {
            lane.promote_due(now);
            let entry = lane.ready.pop_front()?;
            let attempt = entry.attempts + 1;
            let token = *next_token;
            *next_token += 1;
            lane.in_flight.insert(
                token,
                InFlight {
                    job_id: entry.job_id,
                    attempt,
                    claimed_at: now,
                    removed: false,
                },
            );
            Some(Delivery {
                category,
                job_id: entry.job_id,
                attempt,
                token,
            })
        })
    }

    /// Positive acknowledgement: the delivery is done, drop the entry.
    pub fn ack(&self, delivery: &Delivery, now: DateTime<Utc>) {
        self.with_lane(delivery.category, |lane, _| {
            if lane.in_flight.remove(&delivery.token).is_some() {
                lane.queued.remove(&delivery.job_id);
                lane.push_history(HistoryEntry {
                    job_id: delivery.job_id,
                    attempts: delivery.attempt,
                    succeeded: true,
                    error: None,
                    finished_at: now,
                });
            }
        })
    }

    /// Drop an in-flight delivery without recording history. For entries
    /// settled elsewhere (cancelled or raced to completion); they are neither
    /// queue successes nor queue failures.
    pub fn discard(&self, delivery: &Delivery) {
        self.with_lane(delivery.category, |lane, _| {
            if lane.in_flight.remove(&delivery.token).is_some() {
                lane.queued.remove(&delivery.job_id);
            }
        })
    }

    /// Negative acknowledgement for a transient failure.
    pub fn nack(&self, delivery: &Delivery, error: &str, now: DateTime<Utc>) -> NackOutcome {
        self.with_lane(delivery.category, |lane, _| {
            let Some(inflight) = lane.in_flight.remove(&delivery.token) else {
                // Stale token (entry already reaped); nothing to do.
                return NackOutcome::Exhausted;
            };

            if inflight.removed {
                lane.queued.remove(&delivery.job_id);
                return NackOutcome::Exhausted;
            }

            if inflight.attempt >= lane.policy.max_attempts {
                lane.queued.remove(&delivery.job_id);
                lane.push_history(HistoryEntry {
                    job_id: delivery.job_id,
                    attempts: inflight.attempt,
                    succeeded: false,
                    error: Some(error.to_string()),
                    finished_at: now,
                });
                warn!(job_id = %delivery.job_id, attempts = inflight.attempt, error, "delivery attempts exhausted");
                return NackOutcome::Exhausted;
            }

            let delay = lane.policy.backoff_for_retry(inflight.attempt);
            lane.delayed.push(Entry {
                job_id: delivery.job_id,
                attempts: inflight.attempt,
                not_before: Some(now + Duration::from_std(delay).unwrap_or_default()),
            });
            debug!(job_id = %delivery.job_id, attempt = inflight.attempt, ?delay, "delivery re-queued with backoff");
            NackOutcome::Requeued { delay }
        })
    }

    /// Terminal failure without retry (unrecoverable errors). Records the
    /// entry on the failure channel.
    pub fn fail(&self, delivery: &Delivery, error: &str, now: DateTime<Utc>) {
        self.with_lane(delivery.category, |lane, _| {
            if let Some(inflight) = lane.in_flight.remove(&delivery.token) {
                lane.queued.remove(&delivery.job_id);
                lane.push_history(HistoryEntry {
                    job_id: delivery.job_id,
                    attempts: inflight.attempt,
                    succeeded: false,
                    error: Some(error.to_string()),
                    finished_at: now,
                });
            }
        })
    }

    /// Drop a job from the queue (cancellation). Entries already in flight
    /// are flagged so a later nack discards them instead of re-queuing.
    pub fn remove(&self, category: JobCategory, job_id: JobId) -> bool {
        self.with_lane(category, |lane, _| {
            let before = lane.ready.len() + lane.delayed.len();
            lane.ready.retain(|e| e.job_id != job_id);
            lane.delayed.retain(|e| e.job_id != job_id);
            let dropped = before != lane.ready.len() + lane.delayed.len();
            if dropped {
                lane.queued.remove(&job_id);
            }
            for inflight in lane.in_flight.values_mut() {
                if inflight.job_id == job_id {
                    inflight.removed = true;
                }
            }
            dropped
        })
    }

    /// Return stalled in-flight entries to their lanes, consuming an attempt.
    ///
    /// Entries whose budget is spent are routed to the failure channel and
    /// reported so the caller can fail the job record.
    pub fn reap_stalled(&self, now: DateTime<Utc>) -> Vec<(JobCategory, JobId, NackOutcome)> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut reaped = Vec::new();

        for (category, lane) in inner.lanes.iter_mut() {
            let stall = Duration::from_std(lane.policy.stall_timeout).unwrap_or_default();
            let stalled: Vec<u64> = lane
                .in_flight
                .iter()
                .filter(|(_, f)| f.claimed_at + stall <= now)
                .map(|(t, _)| *t)
                .collect();

            for token in stalled {
                let inflight = match lane.in_flight.remove(&token) {
                    Some(f) => f,
                    None => continue,
                };

                if inflight.removed {
                    lane.queued.remove(&inflight.job_id);
                    continue;
                }

                if inflight.attempt >= lane.policy.max_attempts {
                    lane.queued.remove(&inflight.job_id);
                    lane.push_history(HistoryEntry {
                        job_id: inflight.job_id,
                        attempts: inflight.attempt,
                        succeeded: false,
                        error: Some("worker stalled".to_string()),
                        finished_at: now,
                    });
                    warn!(job_id = %inflight.job_id, "stalled worker exhausted delivery attempts");
                    reaped.push((*category, inflight.job_id, NackOutcome::Exhausted));
                } else {
                    let delay = lane.policy.backoff_for_retry(inflight.attempt);
                    lane.delayed.push(Entry {
                        job_id: inflight.job_id,
                        attempts: inflight.attempt,
                        not_before: Some(now + Duration::from_std(delay).unwrap_or_default()),
                    });
                    warn!(job_id = %inflight.job_id, "stalled delivery returned to queue");
                    reaped.push((*category, inflight.job_id, NackOutcome::Requeued { delay }));
                }
            }
        }

        reaped
    }

    /// Number of entries waiting (ready + delayed) in a lane.
    pub fn depth(&self, category: JobCategory) -> usize {
        self.with_lane(category, |lane, _| lane.ready.len() + lane.delayed.len())
    }

    /// Trailing delivery history for a lane, oldest first.
    pub fn history(&self, category: JobCategory) -> Vec<HistoryEntry> {
        self.with_lane(category, |lane, _| lane.history.iter().cloned().collect())
    }

    /// Failure channel: failed entries from the trailing history.
    pub fn failures(&self, category: JobCategory) -> Vec<HistoryEntry> {
        self.with_lane(category, |lane, _| {
            lane.history.iter().filter(|h| !h.succeeded).cloned().collect()
        })
    }
}
