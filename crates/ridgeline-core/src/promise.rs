//! Blocking single-assignment delivery cell.
//!
//! A [`Promise`] hands a value computed on one thread to any number of
//! waiting threads. The producer settles the promise exactly once, either
//! with [`Promise::deliver`] or [`Promise::fail`]; consumers block in
//! [`Promise::wait`] (or its bounded variants) until the settlement lands.
//! Clones of a promise share the same slot, so the producer and every
//! consumer each hold their own handle.
//!
//! # Example
//!
//! ```
//! use ridgeline_core::Promise;
//!
//! let promise = Promise::new();
//! let producer = promise.clone();
//!
//! std::thread::spawn(move || {
//!     producer.deliver("ready".to_string());
//! });
//!
//! assert_eq!(promise.wait().unwrap(), "ready");
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{CoreError, Result};

/// The settled outcome of a promise.
#[derive(Debug, Clone)]
enum Settled<T> {
    /// A value was delivered.
    Value(T),
    /// The producer reported failure instead of delivering.
    Failed(String),
}

/// State shared by every clone of a promise.
struct PromiseState<T> {
    /// The write-once slot; `None` until settled.
    slot: Mutex<Option<Settled<T>>>,
    /// Wakes all blocked waiters on settlement.
    settled: Condvar,
}

/// A single-assignment container handing a value from one producer to any
/// number of consumers.
///
/// The first settlement wins: once delivered or failed, the slot never
/// changes, and later settlement calls are silently ignored. Waiters that
/// start before or after the settlement all observe it; there are no
/// missed wake-ups.
///
/// # Thread Safety
///
/// `Promise<T>` is `Send + Sync` for `T: Send`. Cloning is cheap and every
/// clone refers to the same slot.
pub struct Promise<T> {
    state: Arc<PromiseState<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

// Methods that don't require Clone on T
impl<T> Promise<T> {
    /// Create a new, unsettled promise.
    pub fn new() -> Self {
        Self {
            state: Arc::new(PromiseState {
                slot: Mutex::new(None),
                settled: Condvar::new(),
            }),
        }
    }

    /// Deliver `value`, waking all blocked waiters.
    ///
    /// The first settlement wins: delivering to an already-settled promise
    /// is a no-op.
    pub fn deliver(&self, value: T) {
        self.settle(Settled::Value(value));
    }

    /// Settle with a failure instead of a value, waking all blocked waiters.
    ///
    /// Every current and future waiter observes
    /// [`CoreError::ResolutionFailure`] carrying `reason`. The first
    /// settlement wins: failing an already-settled promise is a no-op.
    pub fn fail(&self, reason: impl Into<String>) {
        self.settle(Settled::Failed(reason.into()));
    }

    /// Whether the promise has been settled (delivered or failed).
    ///
    /// This method never blocks.
    pub fn is_settled(&self) -> bool {
        self.state.slot.lock().is_some()
    }

    fn settle(&self, outcome: Settled<T>) {
        let mut slot = self.state.slot.lock();
        if slot.is_some() {
            // First settlement wins.
            tracing::trace!(
                target: "ridgeline_core::promise",
                "ignoring settlement of an already-settled promise"
            );
            return;
        }
        *slot = Some(outcome);
        self.state.settled.notify_all();
    }
}

// Methods that require Clone on T (waiters each receive their own copy)
impl<T: Clone> Promise<T> {
    /// Block until the promise is settled, then return the value.
    ///
    /// Returns [`CoreError::ResolutionFailure`] if the producer settled
    /// with [`Promise::fail`]. Returns immediately if already settled.
    pub fn wait(&self) -> Result<T> {
        let mut slot = self.state.slot.lock();
        loop {
            if let Some(settled) = slot.as_ref() {
                return Self::settled_result(settled);
            }
            self.state.settled.wait(&mut slot);
        }
    }

    /// Block up to `timeout` for the settlement.
    ///
    /// Returns the value if delivery wins the race,
    /// [`CoreError::Timeout`] if the window elapses first, and
    /// [`CoreError::ResolutionFailure`] if the producer settled with
    /// [`Promise::fail`].
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.state.slot.lock();
        loop {
            if let Some(settled) = slot.as_ref() {
                return Self::settled_result(settled);
            }
            if self.state.settled.wait_until(&mut slot, deadline).timed_out() {
                return match slot.as_ref() {
                    Some(settled) => Self::settled_result(settled),
                    None => Err(CoreError::Timeout),
                };
            }
        }
    }

    /// Block up to `timeout`, returning `timeout_value` instead of an
    /// error when the window elapses.
    ///
    /// A producer-signalled failure still surfaces as
    /// [`CoreError::ResolutionFailure`]; only the timeout case is
    /// converted into `timeout_value`.
    pub fn wait_timeout_or(&self, timeout: Duration, timeout_value: T) -> Result<T> {
        match self.wait_timeout(timeout) {
            Err(CoreError::Timeout) => Ok(timeout_value),
            other => other,
        }
    }

    /// Non-blocking poll: `None` until settled, then the same result
    /// [`Promise::wait`] would return.
    pub fn try_wait(&self) -> Option<Result<T>> {
        self.state.slot.lock().as_ref().map(Self::settled_result)
    }

    fn settled_result(settled: &Settled<T>) -> Result<T> {
        match settled {
            Settled::Value(value) => Ok(value.clone()),
            Settled::Failed(reason) => Err(CoreError::ResolutionFailure(reason.clone())),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(Promise<String>: Send, Sync);
