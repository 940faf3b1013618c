//! Background scheduling for one-shot and recurring work.
//!
//! [`Scheduler`] is the capability consumed by services that need periodic
//! or deferred work without owning a thread: schedule a callback, get back
//! a cancellable [`TaskHandle`]. [`TimerScheduler`] is the provided
//! implementation, driving all scheduled tasks from one dedicated timer
//! thread.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use ridgeline_core::{Scheduler, TimerScheduler};
//!
//! let scheduler = TimerScheduler::new();
//!
//! // Run once after 10ms; detach so the handle going out of scope
//! // does not cancel the task.
//! scheduler
//!     .schedule_once(Duration::from_millis(10), Box::new(|| println!("fired")))
//!     .detach();
//!
//! // Run every 250ms until the handle is dropped or cancelled.
//! let handle = scheduler.schedule(
//!     Duration::ZERO,
//!     Duration::from_millis(250),
//!     Box::new(|| println!("tick")),
//! );
//!
//! handle.cancel();
//! scheduler.shutdown_and_join();
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::atomic::{self, AtomicBool};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// A unique identifier for a scheduled task.
    pub struct ScheduledTaskId;
}

/// A capability that can run callbacks in the background.
///
/// Both methods return a [`TaskHandle`] that cancels the task when dropped
/// or explicitly cancelled; a callback already in progress is never
/// interrupted.
pub trait Scheduler: Send + Sync {
    /// Schedule `task` to run every `period`, first after `initial_delay`.
    ///
    /// Recurring runs are delay-based, not fixed-rate: the next run is
    /// measured from the completion of the previous one, so a slow task
    /// stretches the effective period instead of overlapping itself.
    fn schedule(
        &self,
        initial_delay: Duration,
        period: Duration,
        task: Box<dyn FnMut() + Send + 'static>,
    ) -> TaskHandle;

    /// Schedule `task` to run once after `delay`.
    fn schedule_once(&self, delay: Duration, task: Box<dyn FnOnce() + Send + 'static>)
    -> TaskHandle;
}

/// An owned handle to a scheduled task.
///
/// Dropping the handle cancels the task, so a reconfigured schedule cannot
/// leak its predecessor. Call [`TaskHandle::detach`] to consume the handle
/// and leave the task armed.
pub struct TaskHandle {
    /// Runs at most once, on the first cancellation.
    action: Box<dyn Fn() + Send + Sync>,
    cancelled: AtomicBool,
    detached: bool,
}

impl TaskHandle {
    /// Create a handle whose first cancellation runs `action`.
    ///
    /// Scheduler implementations build their handles through this; the
    /// action typically removes the task from the implementation's queue.
    pub fn new(action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            action: Box::new(action),
            cancelled: AtomicBool::new(false),
            detached: false,
        }
    }

    /// Stop future runs of the task.
    ///
    /// Idempotent. A run already in progress is not interrupted.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, atomic::Ordering::AcqRel) {
            (self.action)();
        }
    }

    /// Whether this handle has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(atomic::Ordering::Acquire)
    }

    /// Consume the handle, leaving the task armed.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if !self.detached {
            self.cancel();
        }
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Name of the timer thread.
const DRIVER_THREAD_NAME: &str = "ridgeline-scheduler";

/// Whether a scheduled task recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskKind {
    /// Runs once at its due time.
    OneShot,
    /// Runs repeatedly, re-armed after each completion.
    Recurring,
}

/// A boxed task closure.
type BoxedTask = Box<dyn FnMut() + Send + 'static>;

/// Internal record for a scheduled task.
struct TaskRecord {
    /// When this task should next run.
    next_run: Instant,
    /// The period for recurring tasks.
    period: Duration,
    /// Whether the task recurs.
    kind: TaskKind,
    /// The closure; taken out of the record while it runs so the lock is
    /// not held across user code.
    task: Option<BoxedTask>,
}

/// An entry in the due queue (min-heap by run time).
#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    id: ScheduledTaskId,
    run_time: Instant,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.run_time == other.run_time
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other.run_time.cmp(&self.run_time)
    }
}

/// Mutable scheduler state, guarded by one mutex.
struct TimerCore {
    /// All armed tasks. Presence in the map means the task is armed.
    tasks: SlotMap<ScheduledTaskId, TaskRecord>,
    /// Pending runs (min-heap by run time). May hold stale entries for
    /// tasks that were cancelled or re-armed; the driver skips those.
    queue: BinaryHeap<QueueEntry>,
    /// Cleared by `shutdown` to stop the driver thread.
    running: bool,
}

/// State shared between the scheduler, its handles, and the driver thread.
struct TimerShared {
    core: Mutex<TimerCore>,
    /// Wakes the driver when the queue changes or shutdown is requested.
    wakeup: Condvar,
}

impl TimerShared {
    fn remove_task(&self, id: ScheduledTaskId) {
        let mut core = self.core.lock();
        if core.tasks.remove(id).is_some() {
            tracing::trace!(target: "ridgeline_core::scheduler", ?id, "cancelled scheduled task");
        }
        drop(core);
        self.wakeup.notify_all();
    }
}

/// A thread-backed [`Scheduler`].
///
/// All tasks run sequentially on one dedicated timer thread, so a slow
/// task delays its neighbors; keep scheduled work short or hand long work
/// off elsewhere. Recurring tasks are re-armed from their completion
/// instant, never from a fixed rate.
///
/// Dropping the scheduler requests shutdown without blocking; call
/// [`TimerScheduler::shutdown_and_join`] for a deterministic stop.
pub struct TimerScheduler {
    shared: Arc<TimerShared>,
    /// Driver thread handle for joining.
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl TimerScheduler {
    /// Create a scheduler and start its timer thread.
    pub fn new() -> Self {
        let shared = Arc::new(TimerShared {
            core: Mutex::new(TimerCore {
                tasks: SlotMap::with_key(),
                queue: BinaryHeap::new(),
                running: true,
            }),
            wakeup: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let driver = thread::Builder::new()
            .name(DRIVER_THREAD_NAME.to_string())
            .spawn(move || driver_loop(&thread_shared))
            .expect("Failed to spawn scheduler thread");

        Self {
            shared,
            driver: Mutex::new(Some(driver)),
        }
    }

    /// The number of currently armed tasks.
    pub fn active_count(&self) -> usize {
        self.shared.core.lock().tasks.len()
    }

    /// Whether the timer thread is accepting tasks.
    pub fn is_running(&self) -> bool {
        self.shared.core.lock().running
    }

    /// Stop the timer thread after any in-flight task completes.
    ///
    /// Armed tasks are dropped; this is a non-blocking call. Use
    /// [`TimerScheduler::join`] to wait for the thread to exit.
    pub fn shutdown(&self) {
        let mut core = self.shared.core.lock();
        core.running = false;
        drop(core);
        self.shared.wakeup.notify_all();
    }

    /// Wait for the timer thread to finish.
    ///
    /// Returns `true` if the thread was joined successfully, `false` if
    /// already joined or the thread panicked. Call
    /// [`TimerScheduler::shutdown`] first to initiate the stop.
    pub fn join(&self) -> bool {
        let mut driver = self.driver.lock();
        if let Some(handle) = driver.take() {
            handle.join().is_ok()
        } else {
            false
        }
    }

    /// Stop the timer thread and wait for it to finish.
    pub fn shutdown_and_join(&self) -> bool {
        self.shutdown();
        self.join()
    }

    fn arm(&self, delay: Duration, period: Duration, kind: TaskKind, task: BoxedTask) -> TaskHandle {
        let mut core = self.shared.core.lock();
        if !core.running {
            tracing::debug!(
                target: "ridgeline_core::scheduler",
                "scheduler already shut down; task will never run"
            );
            drop(core);
            let handle = TaskHandle::new(|| {});
            handle.cancel();
            return handle;
        }

        let next_run = Instant::now() + delay;
        let id = core.tasks.insert(TaskRecord {
            next_run,
            period,
            kind,
            task: Some(task),
        });
        core.queue.push(QueueEntry { id, run_time: next_run });
        drop(core);
        self.shared.wakeup.notify_all();

        // Handles hold a weak reference so they don't keep the timer
        // thread's state alive after the scheduler is gone.
        let shared = Arc::downgrade(&self.shared);
        TaskHandle::new(move || {
            if let Some(shared) = Weak::upgrade(&shared) {
                shared.remove_task(id);
            }
        })
    }
}

impl Scheduler for TimerScheduler {
    fn schedule(
        &self,
        initial_delay: Duration,
        period: Duration,
        task: Box<dyn FnMut() + Send + 'static>,
    ) -> TaskHandle {
        self.arm(initial_delay, period, TaskKind::Recurring, task)
    }

    fn schedule_once(
        &self,
        delay: Duration,
        task: Box<dyn FnOnce() + Send + 'static>,
    ) -> TaskHandle {
        let mut task = Some(task);
        self.arm(
            delay,
            Duration::ZERO,
            TaskKind::OneShot,
            Box::new(move || {
                if let Some(task) = task.take() {
                    task();
                }
            }),
        )
    }
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        self.shutdown();
        // Don't block in drop - just request shutdown
    }
}

static_assertions::assert_impl_all!(TimerScheduler: Send, Sync);

/// The timer thread: sleep until the next due time, run due tasks, re-arm
/// recurring ones.
fn driver_loop(shared: &TimerShared) {
    let mut core = shared.core.lock();
    loop {
        if !core.running {
            break;
        }

        // Drop queue entries whose task is gone (cancelled).
        while core
            .queue
            .peek()
            .is_some_and(|entry| !core.tasks.contains_key(entry.id))
        {
            core.queue.pop();
        }

        let Some(entry) = core.queue.peek().copied() else {
            shared.wakeup.wait(&mut core);
            continue;
        };

        if entry.run_time > Instant::now() {
            shared.wakeup.wait_until(&mut core, entry.run_time);
            continue;
        }

        core.queue.pop();
        let id = entry.id;
        let Some(record) = core.tasks.get_mut(id) else {
            continue;
        };
        // A mismatched run time marks a stale entry left behind by a
        // re-arm; the fresh entry is still in the queue.
        if entry.run_time != record.next_run {
            continue;
        }
        let Some(mut task) = record.task.take() else {
            continue;
        };
        let kind = record.kind;
        let period = record.period;

        tracing::trace!(target: "ridgeline_core::scheduler", ?id, "running scheduled task");

        // Run the closure without the lock so schedule and cancel callers
        // are not blocked behind a slow task.
        drop(core);
        task();
        core = shared.core.lock();

        match kind {
            TaskKind::OneShot => {
                core.tasks.remove(id);
            }
            TaskKind::Recurring => {
                // Cancelled while running: the record is gone and the
                // task is dropped here.
                if let Some(record) = core.tasks.get_mut(id) {
                    // Delay-based re-arm: measure from completion so a
                    // slow task stretches the effective period.
                    let next_run = Instant::now() + period;
                    record.next_run = next_run;
                    record.task = Some(task);
                    core.queue.push(QueueEntry { id, run_time: next_run });
                }
            }
        }
    }
}
