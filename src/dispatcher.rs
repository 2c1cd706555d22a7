//! Single-consumer action queue bridging I/O tasks to the control loop

use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{error, warn};

pub type ActionResult = Result<(), Box<dyn Error + Send + Sync>>;

type PendingAction<T> = Box<dyn FnOnce(&mut T) -> ActionResult + Send>;

struct Shared<T> {
    queue: Mutex<Vec<PendingAction<T>>>,
    /// Held for the whole of a drain so two drains never interleave
    drain_guard: Mutex<()>,
}

/// Queue of deferred actions run against a `T` owned by the consumer loop.
///
/// Cloning yields another producer handle onto the same queue.
pub struct Dispatcher<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for Dispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.len())
            .finish()
    }
}

impl<T> Dispatcher<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Vec::new()),
                drain_guard: Mutex::new(()),
            }),
        }
    }

    /// Append an action. Never blocks on a running drain and never runs the action.
    pub fn enqueue<F>(&self, action: F)
    where
        F: FnOnce(&mut T) -> ActionResult + Send + 'static,
    {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(action));
    }

    /// Run every action queued so far, in enqueue order, against `target`.
    ///
    /// Actions enqueued while draining wait for the next call. Returns the
    /// number of actions executed.
    pub fn drain_once(&self, target: &mut T) -> usize {
        let Ok(_guard) = self.shared.drain_guard.try_lock() else {
            warn!("drain_once called while another drain is running, skipping");
            return 0;
        };

        let batch = std::mem::take(
            &mut *self
                .shared
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        let count = batch.len();
        for action in batch {
            match panic::catch_unwind(AssertUnwindSafe(|| action(target))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Dispatched action failed: {}", e),
                Err(_) => error!("Dispatched action panicked"),
            }
        }
        count
    }

    pub fn len(&self) -> usize {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
