//! Request scheduler for the API client
//!
//! Every outbound request acquires a slot from this scheduler before it is
//! dispatched. The scheduler enforces three limits:
//!
//! - a bounded concurrency window (semaphore, released when the request
//!   finishes),
//! - minimum spacing between consecutive dispatches,
//! - a replenishing reservoir of requests per rolling window; requests
//!   beyond the budget queue until the window refills, they never fail.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{Instant, sleep_until};

use super::config::SchedulerConfig;

// Tokio Semaphore permits max out at 2^61-1; use a large finite pool when
// limiting is disabled.
const UNLIMITED_PERMITS: usize = 1_000_000;

/// Shared request scheduler. Cheap to clone; all clones throttle against
/// the same counters.
#[derive(Debug, Clone)]
pub struct Scheduler {
    config: SchedulerConfig,
    semaphore: Arc<Semaphore>,
    state: Arc<Mutex<DispatchState>>,
    dispatched: Arc<AtomicU64>,
    throttled: Arc<AtomicU64>,
}

#[derive(Debug)]
struct DispatchState {
    /// When the current reservoir window opened
    window_start: Instant,
    /// Requests left in the current window
    remaining: u32,
    /// Earliest instant the next request may be dispatched (spacing)
    next_dispatch: Instant,
}

/// A dispatch slot. Holds a concurrency permit for the lifetime of the
/// request; dropping it frees the slot.
#[derive(Debug)]
pub struct DispatchSlot {
    _permit: OwnedSemaphorePermit,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let permits = if config.enabled {
            config.max_concurrent.min(UNLIMITED_PERMITS)
        } else {
            UNLIMITED_PERMITS
        };

        let now = Instant::now();
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            state: Arc::new(Mutex::new(DispatchState {
                window_start: now,
                remaining: config.reservoir,
                next_dispatch: now,
            })),
            config,
            dispatched: Arc::new(AtomicU64::new(0)),
            throttled: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Wait until a request may be dispatched. The returned slot must be
    /// held until the request completes.
    pub async fn acquire(&self) -> DispatchSlot {
        // The semaphore is never closed, so acquire cannot fail.
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("scheduler semaphore closed");

        if !self.config.enabled {
            return DispatchSlot { _permit: permit };
        }

        loop {
            let wait_until = {
                let mut state = self.state.lock().await;
                let now = Instant::now();

                // Refill the reservoir for every fully elapsed window.
                while now.duration_since(state.window_start) >= self.config.refill_interval {
                    state.window_start += self.config.refill_interval;
                    state.remaining = self.config.reservoir;
                }

                if state.remaining > 0 && now >= state.next_dispatch {
                    state.remaining -= 1;
                    state.next_dispatch = now + self.config.min_spacing;
                    self.dispatched.fetch_add(1, Ordering::Relaxed);
                    None
                } else if state.remaining == 0 {
                    // Budget exhausted: queue until the window refills.
                    Some(state.window_start + self.config.refill_interval)
                } else {
                    Some(state.next_dispatch)
                }
            };

            match wait_until {
                None => return DispatchSlot { _permit: permit },
                Some(deadline) => {
                    self.throttled.fetch_add(1, Ordering::Relaxed);
                    debug!("scheduler: request throttled, waiting for slot");
                    sleep_until(deadline).await;
                }
            }
        }
    }

    /// Total requests dispatched since creation
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Number of times a request had to wait for spacing or budget
    pub fn throttled(&self) -> u64 {
        self.throttled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(
        min_spacing: Duration,
        max_concurrent: usize,
        reservoir: u32,
        refill_interval: Duration,
    ) -> SchedulerConfig {
        SchedulerConfig {
            min_spacing,
            max_concurrent,
            reservoir,
            refill_interval,
            enabled: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reservoir_delays_but_never_rejects() {
        let scheduler = Scheduler::new(config(
            Duration::ZERO,
            100,
            60,
            Duration::from_secs(60),
        ));

        let start = Instant::now();
        for _ in 0..60 {
            let _slot = scheduler.acquire().await;
        }
        // Budget not yet exhausted: no waiting so far.
        assert_eq!(start.elapsed(), Duration::ZERO);

        // The 61st request queues until the window refills.
        let _slot = scheduler.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert_eq!(scheduler.dispatched(), 61);
        assert!(scheduler.throttled() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_minimum_spacing_between_dispatches() {
        let scheduler = Scheduler::new(config(
            Duration::from_millis(100),
            100,
            1000,
            Duration::from_secs(60),
        ));

        let start = Instant::now();
        for _ in 0..3 {
            let _slot = scheduler.acquire().await;
        }
        // Second and third dispatches each wait out the spacing.
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reservoir_refills_every_window() {
        let scheduler = Scheduler::new(config(
            Duration::ZERO,
            100,
            2,
            Duration::from_secs(10),
        ));

        let start = Instant::now();
        for _ in 0..6 {
            let _slot = scheduler.acquire().await;
        }
        // Two requests per 10s window: 6 requests span two refills.
        assert!(start.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_concurrency_window_bounds_in_flight_requests() {
        let scheduler = Scheduler::new(config(
            Duration::ZERO,
            1,
            1000,
            Duration::from_secs(60),
        ));

        let slot = scheduler.acquire().await;

        let contender = scheduler.clone();
        let handle = tokio::spawn(async move {
            let _slot = contender.acquire().await;
            true
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());

        drop(slot);
        let result = tokio::time::timeout(Duration::from_millis(100), handle).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_scheduler_never_waits() {
        let scheduler = Scheduler::new(SchedulerConfig {
            min_spacing: Duration::from_secs(5),
            max_concurrent: 1,
            reservoir: 1,
            refill_interval: Duration::from_secs(60),
            enabled: false,
        });

        let start = Instant::now();
        for _ in 0..10 {
            let _slot = scheduler.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
