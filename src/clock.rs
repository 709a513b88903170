//! Time source abstraction
//!
//! The rate-limited capture client and the orchestrator's settle delays both
//! wait on wall-clock time. Routing every read and sleep through a trait
//! keeps the throttle window testable with a manual clock instead of real
//! sleeping, and keeps the "last capture" timestamp an owned field rather
//! than a process global.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source with a blocking sleep
///
/// Implementations must be `Send + Sync` so a single clock can be shared
/// between the capture client and the orchestrator.
pub trait Clock: Send + Sync {
  fn now(&self) -> Instant;

  fn sleep(&self, duration: Duration);
}

// Allow Arc<dyn Clock> wherever a Clock is expected
impl<T: Clock + ?Sized> Clock for Arc<T> {
  fn now(&self) -> Instant {
    (**self).now()
  }

  fn sleep(&self, duration: Duration) {
    (**self).sleep(duration);
  }
}

/// Real wall-clock implementation backed by `Instant` and `thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> Instant {
    Instant::now()
  }

  fn sleep(&self, duration: Duration) {
    if !duration.is_zero() {
      std::thread::sleep(duration);
    }
  }
}
