//! Per-request limiter for image and meme calls.
//!
//! Two limits are enforced together:
//! - a semaphore bounding how many image calls are in flight at once;
//! - a budget of successful images per request, guarded by a mutex.
//!
//! Only successes use up the budget. A caller is turned away once `max_images`
//! calls have succeeded, never because of calls that are still running. When
//! the running calls could already fill the budget, the caller waits for one of
//! them to settle and checks again, so failed calls leave room for the next
//! caller and the request never ends with more than `max_images` successes.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

#[derive(Debug, Default)]
struct Budget {
  succeeded: usize,
  in_flight: usize,
}

#[derive(Debug, Clone)]
pub struct ImageCallLimiter {
  semaphore: Arc<Semaphore>,
  budget: Arc<Mutex<Budget>>,
  settled: Arc<Notify>,
  max_images: usize,
}

fn lock_budget(budget: &Mutex<Budget>) -> MutexGuard<'_, Budget> {
  // Counters stay consistent even if a holder panicked.
  budget.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ImageCallLimiter {
  pub fn new(max_concurrent: usize, max_images: usize) -> Self {
    Self {
      semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
      budget: Arc::new(Mutex::new(Budget::default())),
      settled: Arc::new(Notify::new()),
      max_images,
    }
  }

  /// Cheap pre-check: false once the request's image budget is used up.
  pub fn has_budget(&self) -> bool {
    lock_budget(&self.budget).succeeded < self.max_images
  }

  pub fn images_generated(&self) -> usize {
    lock_budget(&self.budget).succeeded
  }

  /// Wait for a concurrency slot, then for room in the budget.
  /// Returns None once `max_images` calls have succeeded.
  pub async fn acquire(&self) -> Option<ImageCallSlot> {
    let permit = self.semaphore.clone().acquire_owned().await.ok()?;
    loop {
      // Created before the check so a settle in between still wakes us.
      let settled = self.settled.notified();
      {
        let mut budget = lock_budget(&self.budget);
        if budget.succeeded >= self.max_images {
          debug!(target: "media", succeeded = budget.succeeded, "Image budget exhausted");
          return None;
        }
        if budget.succeeded + budget.in_flight < self.max_images {
          budget.in_flight += 1;
          return Some(ImageCallSlot {
            _permit: permit,
            budget: self.budget.clone(),
            settled: self.settled.clone(),
            done: false,
          });
        }
        debug!(target: "media", succeeded = budget.succeeded, in_flight = budget.in_flight, "Waiting for running image calls to settle");
      }
      settled.await;
    }
  }
}

/// Held for the duration of one image call.
#[derive(Debug)]
pub struct ImageCallSlot {
  _permit: OwnedSemaphorePermit,
  budget: Arc<Mutex<Budget>>,
  settled: Arc<Notify>,
  done: bool,
}

impl ImageCallSlot {
  /// Count the call against the budget and release the concurrency slot.
  pub fn succeeded(mut self) {
    self.settle(true);
  }

  fn settle(&mut self, success: bool) {
    if self.done {
      return;
    }
    self.done = true;
    {
      let mut budget = lock_budget(&self.budget);
      budget.in_flight = budget.in_flight.saturating_sub(1);
      if success {
        budget.succeeded += 1;
      }
    }
    self.settled.notify_waiters();
  }
}

impl Drop for ImageCallSlot {
  fn drop(&mut self) {
    // Failed, or aborted mid-call.
    self.settle(false);
  }
}
