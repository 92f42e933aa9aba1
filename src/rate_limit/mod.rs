//! In-flight request throttling for a single source.
//!
//! Every request registers itself before going out and waits
//! `wait_time * in_flight` where `in_flight` includes itself. Bursts against
//! one source therefore spread out, and the spacing falls back to the base
//! interval once they drain. Nothing is serialized.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

/// Per-source in-flight counter with proportional delay.
#[derive(Debug, Clone)]
pub struct InFlightLimiter {
    source: Arc<str>,
    wait_time: Duration,
    in_flight: Arc<AtomicUsize>,
}

impl InFlightLimiter {
    /// Create a limiter with the source's base wait time. The counter starts at zero.
    pub fn new(source: &str, wait_time: Duration) -> Self {
        Self {
            source: Arc::from(source),
            wait_time,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Base wait time between requests.
    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }

    /// Number of requests currently registered.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Delay applied for a given in-flight count.
    pub fn delay_for(&self, in_flight: usize) -> Duration {
        self.wait_time.saturating_mul(in_flight as u32)
    }

    /// Register a request without waiting.
    ///
    /// The returned guard releases the slot when dropped, so every exit path
    /// of the caller decrements exactly once.
    pub fn register(&self) -> InFlightGuard {
        let count = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        InFlightGuard {
            limiter: self.clone(),
            count,
        }
    }

    /// Register a request and wait `wait_time * in_flight` before returning.
    pub async fn acquire(&self) -> InFlightGuard {
        let guard = self.register();
        self.throttle(&guard).await;
        guard
    }

    /// Wait the delay owed by an already registered request.
    ///
    /// Lets a caller register first and only pay the delay once it knows the
    /// request really goes to the network.
    pub async fn throttle(&self, guard: &InFlightGuard) {
        let delay = self.delay_for(guard.count);
        if delay > Duration::ZERO {
            debug!(
                "Rate limiting {}: {} in flight, waiting {:?}",
                self.source, guard.count, delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn release(&self) {
        // Clamp at zero: completions may arrive out of order.
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(1))
            });
    }
}

/// A registered in-flight request. Dropping it releases the slot.
#[derive(Debug)]
pub struct InFlightGuard {
    limiter: InFlightLimiter,
    count: usize,
}

impl InFlightGuard {
    /// In-flight count observed when this request registered (itself included).
    pub fn position(&self) -> usize {
        self.count
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.limiter.release();
    }
}
