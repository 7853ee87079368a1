//! Token-bucket admission control with a concurrency gate.
//!
//! One [`AdmissionController`] guards one resource (typically one connector).
//! A caller is admitted when a whole token is available *and* an in-flight
//! slot is free; otherwise it joins a FIFO queue and is woken either by a
//! [`AdmissionPermit`] being dropped or by the periodic refill tick.
//!
//! # Refill
//!
//! Tokens accrue continuously at `requests_per_minute / 60` per second, capped
//! at `requests_per_minute`. Accrual is computed on every acquire and on a
//! fixed tick (1 s by default) driven by a spawned Tokio task. The tick is the
//! only thing that wakes queued callers when no release happens.
//!
//! The bucket starts empty, so the first acquire on a fresh controller always
//! waits for the first tick.
//!
//! # Release
//!
//! Releasing a permit frees its slot and wakes exactly one waiter, but only if
//! a whole token is already in the bucket. Release does not refill; a waiter
//! blocked on concurrency alone may therefore wait until the next tick.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use relay_types::AdmissionConfig;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};

/// Refill tick used by [`AdmissionController::new`].
pub const DEFAULT_REFILL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("admission not granted within {waited:?}")]
    Timeout { waited: Duration },
}

/// Point-in-time view of the bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionSnapshot {
    pub tokens: f64,
    pub in_flight: u32,
    pub queued: usize,
}

#[derive(Debug)]
struct Waiter {
    id: u64,
    wake: oneshot::Sender<()>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    in_flight: u32,
    last_refill: Instant,
    waiters: VecDeque<Waiter>,
    next_waiter_id: u64,
}

impl Bucket {
    fn refill(&mut self, config: &AdmissionConfig, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let capacity = f64::from(config.requests_per_minute);
        self.tokens =
            (self.tokens + elapsed.as_secs_f64() * config.tokens_per_second()).min(capacity);
        self.last_refill = now;
    }

    fn has_capacity(&self, config: &AdmissionConfig) -> bool {
        self.tokens >= 1.0 && self.in_flight < config.concurrent
    }

    fn grant(&mut self) {
        self.tokens -= 1.0;
        self.in_flight += 1;
    }

    fn ungrant(&mut self) {
        self.tokens += 1.0;
        self.in_flight -= 1;
    }

    /// Grant the oldest live waiter. Returns false when the queue is empty.
    fn wake_next(&mut self) -> bool {
        while let Some(waiter) = self.waiters.pop_front() {
            self.grant();
            if waiter.wake.send(()).is_ok() {
                tracing::trace!(waiter = waiter.id, "Admission granted to queued caller");
                return true;
            }
            // Receiver vanished without deregistering; hand the grant back.
            self.ungrant();
        }
        false
    }

    /// Wake waiters in arrival order while capacity lasts.
    fn wake_ready(&mut self, config: &AdmissionConfig) {
        while !self.waiters.is_empty() && self.has_capacity(config) {
            if !self.wake_next() {
                break;
            }
        }
    }

    fn release(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if !self.waiters.is_empty() && self.tokens >= 1.0 {
            self.wake_next();
        }
    }

    fn remove_waiter(&mut self, id: u64) -> bool {
        match self.waiters.iter().position(|w| w.id == id) {
            Some(index) => {
                self.waiters.remove(index);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug)]
struct Shared {
    config: AdmissionConfig,
    bucket: Mutex<Bucket>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tick(&self) {
        let mut bucket = self.lock();
        bucket.refill(&self.config, Instant::now());
        bucket.wake_ready(&self.config);
    }

    fn release(&self) {
        self.lock().release();
    }
}

/// Proof of admission. Dropping it releases the slot.
#[derive(Debug)]
#[must_use = "admission is released as soon as the permit is dropped"]
pub struct AdmissionPermit {
    shared: Arc<Shared>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.shared.release();
    }
}

/// Deregisters a queued caller whose acquire future is dropped.
///
/// Owns the grant receiver so that the receiver outlives this guard's
/// `drop`; a waker can then never see a closed channel for a waiter that
/// is still in the queue.
struct QueuedAcquire<'a> {
    shared: &'a Shared,
    id: u64,
    granted: oneshot::Receiver<()>,
    settled: bool,
}

impl Drop for QueuedAcquire<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut bucket = self.shared.lock();
        if bucket.remove_waiter(self.id) {
            return;
        }
        // Popped by a waker. Give the slot back only if the grant landed.
        if self.granted.try_recv().is_ok() {
            bucket.release();
        }
    }
}

/// Rate and concurrency gate for one guarded resource.
///
/// Must be created inside a Tokio runtime: construction spawns the refill
/// ticker. The ticker stops on [`dispose`](Self::dispose) or drop.
#[derive(Debug)]
pub struct AdmissionController {
    shared: Arc<Shared>,
    refill_interval: Duration,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl AdmissionController {
    #[must_use]
    pub fn new(config: AdmissionConfig) -> Self {
        Self::with_refill_interval(config, DEFAULT_REFILL_INTERVAL)
    }

    #[must_use]
    pub fn with_refill_interval(config: AdmissionConfig, refill_interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            config,
            bucket: Mutex::new(Bucket {
                tokens: 0.0,
                in_flight: 0,
                last_refill: Instant::now(),
                waiters: VecDeque::new(),
                next_waiter_id: 0,
            }),
        });
        let ticker = spawn_refill_ticker(Arc::downgrade(&shared), refill_interval);
        tracing::debug!(
            requests_per_minute = config.requests_per_minute,
            concurrent = config.concurrent,
            refill_ms = refill_interval.as_millis() as u64,
            "Admission refill ticker started"
        );
        Self {
            shared,
            refill_interval,
            ticker: Mutex::new(Some(ticker)),
        }
    }

    #[must_use]
    pub fn config(&self) -> AdmissionConfig {
        self.shared.config
    }

    #[must_use]
    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// Wait for admission. Never fails; it only delays.
    ///
    /// Cancel-safe: dropping the future while queued removes the waiter.
    pub async fn acquire(&self) -> AdmissionPermit {
        loop {
            let (id, granted) = {
                let mut bucket = self.shared.lock();
                bucket.refill(&self.shared.config, Instant::now());
                bucket.wake_ready(&self.shared.config);
                if bucket.has_capacity(&self.shared.config) {
                    bucket.grant();
                    tracing::trace!(in_flight = bucket.in_flight, "Admission granted");
                    return AdmissionPermit {
                        shared: Arc::clone(&self.shared),
                    };
                }
                let id = bucket.next_waiter_id;
                bucket.next_waiter_id += 1;
                let (wake, granted) = oneshot::channel();
                bucket.waiters.push_back(Waiter { id, wake });
                tracing::trace!(
                    waiter = id,
                    queued = bucket.waiters.len(),
                    "Admission queued"
                );
                (id, granted)
            };

            let mut queued = QueuedAcquire {
                shared: &self.shared,
                id,
                granted,
                settled: false,
            };
            let outcome = (&mut queued.granted).await;
            queued.settled = true;
            if outcome.is_ok() {
                return AdmissionPermit {
                    shared: Arc::clone(&self.shared),
                };
            }
        }
    }

    /// [`acquire`](Self::acquire) bounded by `limit`.
    pub async fn acquire_timeout(
        &self,
        limit: Duration,
    ) -> Result<AdmissionPermit, AdmissionError> {
        timeout(limit, self.acquire())
            .await
            .map_err(|_| AdmissionError::Timeout { waited: limit })
    }

    /// Run `operation` under a permit; the permit is released on every exit path.
    pub async fn run<F, Fut, T>(&self, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.acquire().await;
        operation().await
    }

    #[must_use]
    pub fn snapshot(&self) -> AdmissionSnapshot {
        let bucket = self.shared.lock();
        AdmissionSnapshot {
            tokens: bucket.tokens,
            in_flight: bucket.in_flight,
            queued: bucket.waiters.len(),
        }
    }

    /// Stop the refill ticker. Queued callers are then only woken by releases.
    pub fn dispose(&self) {
        let handle = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            tracing::debug!("Admission refill ticker stopped");
        }
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Drop for AdmissionController {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn spawn_refill_ticker(shared: Weak<Shared>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            let Some(shared) = shared.upgrade() else {
                break;
            };
            shared.tick();
        }
    })
}
