//! Core primitives for Ridgeline.
//!
//! This crate provides the concurrency building blocks of the Ridgeline
//! client libraries:
//!
//! - **Promise**: a blocking, single-assignment delivery cell handing a
//!   value from one producer to any number of waiting consumers
//! - **Scheduler**: a capability for one-shot and recurring background
//!   work with cancellable handles
//! - **TimerScheduler**: the thread-backed scheduler implementation
//!
//! # Promise Example
//!
//! ```
//! use std::time::Duration;
//! use ridgeline_core::{CoreError, Promise};
//!
//! let promise = Promise::new();
//! let producer = promise.clone();
//!
//! std::thread::spawn(move || {
//!     producer.deliver(42);
//! });
//!
//! // Block until the value lands, bounded by a timeout.
//! match promise.wait_timeout(Duration::from_secs(1)) {
//!     Ok(value) => assert_eq!(value, 42),
//!     Err(CoreError::Timeout) => panic!("producer never delivered"),
//!     Err(err) => panic!("producer failed: {err}"),
//! }
//! ```
//!
//! # Scheduler Example
//!
//! ```
//! use std::time::Duration;
//! use ridgeline_core::{Scheduler, TimerScheduler};
//!
//! let scheduler = TimerScheduler::new();
//!
//! // The handle cancels the task on drop; keep it alive for as long as
//! // the work should recur.
//! let handle = scheduler.schedule(
//!     Duration::ZERO,
//!     Duration::from_secs(30),
//!     Box::new(|| println!("periodic maintenance")),
//! );
//!
//! handle.cancel();
//! scheduler.shutdown_and_join();
//! ```

mod error;
pub mod promise;
pub mod scheduler;

pub use error::{CoreError, Result};
pub use promise::Promise;
pub use scheduler::{ScheduledTaskId, Scheduler, TaskHandle, TimerScheduler};
