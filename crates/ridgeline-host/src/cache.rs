//! Self-refreshing cache for the local machine's host name.
//!
//! Resolving the local host name can trigger a DNS lookup with
//! unpredictable latency, so the resolved value is cached process-wide
//! and refreshed on a schedule instead of being recomputed on every read.
//! Resolution is two-tier: an environment variable injected by deployment
//! tooling wins outright and needs no refreshing; only when it is absent
//! does the cache fall back to active lookups kept fresh by a recurring
//! task on an injected [`Scheduler`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ridgeline_core::TimerScheduler;
//! use ridgeline_host::HostnameCache;
//!
//! let cache = HostnameCache::system();
//! let scheduler = Arc::new(TimerScheduler::new());
//! cache.start(Duration::from_secs(60), scheduler);
//!
//! // Non-blocking read; `None` until the first resolution lands.
//! let _name = cache.resolved_hostname();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use ridgeline_core::{Promise, Scheduler, TaskHandle};

use crate::clock::{Clock, SystemClock};
use crate::env::{COMPUTERNAME, HOSTNAME, HostEnv, OsFamily, SystemEnv};
use crate::lookup::{HostLookup, SystemLookup};

/// Substitute when a lookup succeeds without producing a usable name.
const FALLBACK_HOSTNAME: &str = "localhost";

/// Default period between refresh attempts.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// The recurring refresh armed by [`HostnameCache::start`].
struct ActiveSchedule {
    /// Kept so out-of-band refreshes can piggyback on the same scheduler.
    scheduler: Arc<dyn Scheduler>,
    /// Cancels on drop; replacing the schedule tears the old loop down.
    #[allow(dead_code)]
    handle: TaskHandle,
}

/// State shared by every clone of the cache.
///
/// Each field group has a single designated writer: `hostname` and
/// `last_update` are written by the resolution paths, `refresh_interval`
/// and `schedule` by `start`. Readers see each field atomically but no
/// cross-field snapshot is guaranteed.
struct CacheState {
    env: Box<dyn HostEnv>,
    lookup: Box<dyn HostLookup>,
    clock: Box<dyn Clock>,
    /// Last known-good resolved host name.
    hostname: Mutex<Option<String>>,
    /// Epoch milliseconds of the last successful lookup; 0 before any.
    last_update: AtomicU64,
    /// Period between refresh attempts.
    refresh_interval: Mutex<Duration>,
    /// The armed refresh loop, if any.
    schedule: Mutex<Option<ActiveSchedule>>,
}

/// A process-wide cached host name.
///
/// Create one per process (collaborators injected, or
/// [`HostnameCache::system`] for the real ones), arm it with
/// [`HostnameCache::start`], and hand clones to anything that needs the
/// name. Clones are cheap and share the same state.
///
/// A failed refresh never clears the cache: the previous value keeps
/// serving reads until a later attempt succeeds, and the recurring
/// schedule itself is the retry mechanism.
pub struct HostnameCache {
    state: Arc<CacheState>,
}

impl Clone for HostnameCache {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl HostnameCache {
    /// Create a cache over the real environment, lookup, and clock.
    pub fn system() -> Self {
        Self::new(SystemEnv, SystemLookup, SystemClock)
    }

    /// Create a cache with injected collaborators.
    pub fn new(
        env: impl HostEnv + 'static,
        lookup: impl HostLookup + 'static,
        clock: impl Clock + 'static,
    ) -> Self {
        Self {
            state: Arc::new(CacheState {
                env: Box::new(env),
                lookup: Box::new(lookup),
                clock: Box::new(clock),
                hostname: Mutex::new(None),
                last_update: AtomicU64::new(0),
                refresh_interval: Mutex::new(DEFAULT_REFRESH_INTERVAL),
                schedule: Mutex::new(None),
            }),
        }
    }

    /// Try to resolve the host name from the environment.
    ///
    /// Windows-family systems read `COMPUTERNAME` and fall back to
    /// `"localhost"` when it is unset, so they always resolve. Elsewhere
    /// `HOSTNAME` is read and an unset variable leaves the cache
    /// unresolved. Returns whether a value was stored; an
    /// environment-supplied value is assumed stable for the process
    /// lifetime and needs no refresh schedule.
    pub fn resolve_by_env(&self) -> bool {
        let resolved = match self.state.env.os_family() {
            OsFamily::Windows => Some(
                self.state
                    .env
                    .var(COMPUTERNAME)
                    .unwrap_or_else(|| FALLBACK_HOSTNAME.to_string()),
            ),
            OsFamily::Unix => self.state.env.var(HOSTNAME),
        };

        match resolved {
            Some(name) => {
                tracing::debug!(
                    target: "ridgeline_host::cache",
                    hostname = %name,
                    "resolved host name from environment"
                );
                *self.state.hostname.lock() = Some(name);
                true
            }
            None => false,
        }
    }

    /// Arm (or re-arm) the refresh loop.
    ///
    /// Stores `interval`, cancels any previously armed schedule, and
    /// retries the environment first. Only when the environment does not
    /// name the host is a recurring task armed on `scheduler` (first run
    /// immediate, then every `interval`). Safe to call again to change
    /// the interval or swap the scheduler; at most one refresh loop is
    /// armed at a time.
    pub fn start(&self, interval: Duration, scheduler: Arc<dyn Scheduler>) {
        *self.state.refresh_interval.lock() = interval;

        // Tear down the previous loop before arming the next one.
        let previous = self.state.schedule.lock().take();
        drop(previous);

        if self.resolve_by_env() {
            return;
        }

        tracing::debug!(
            target: "ridgeline_host::cache",
            interval_ms = interval.as_millis() as u64,
            "arming host name refresh schedule"
        );
        let cache = self.clone();
        let handle = scheduler.schedule(
            Duration::ZERO,
            interval,
            Box::new(move || cache.refresh_resolve()),
        );
        *self.state.schedule.lock() = Some(ActiveSchedule { scheduler, handle });
    }

    /// Run one lookup and store the result.
    ///
    /// On success the cached name and timestamp are replaced; an empty
    /// name is substituted with `"localhost"`. On failure both are left
    /// untouched so the stale value keeps serving reads.
    pub fn refresh_resolve(&self) {
        match self.state.lookup.local_host_name() {
            Ok(name) => {
                let name = if name.is_empty() {
                    FALLBACK_HOSTNAME.to_string()
                } else {
                    name
                };
                tracing::trace!(
                    target: "ridgeline_host::cache",
                    hostname = %name,
                    "refreshed host name"
                );
                *self.state.hostname.lock() = Some(name);
                self.state
                    .last_update
                    .store(self.state.clock.now_millis(), Ordering::Release);
            }
            Err(err) => {
                tracing::debug!(
                    target: "ridgeline_host::cache",
                    error = %err,
                    "host name lookup failed; keeping previous value"
                );
            }
        }
    }

    /// Request one out-of-band refresh as soon as possible.
    ///
    /// The recurring schedule is left untouched. Does nothing when no
    /// scheduler has ever been armed.
    pub fn resolve_now(&self) {
        let schedule = self.state.schedule.lock();
        let Some(active) = schedule.as_ref() else {
            return;
        };
        let cache = self.clone();
        active
            .scheduler
            .schedule_once(Duration::ZERO, Box::new(move || cache.refresh_resolve()))
            .detach();
    }

    /// Resolve off-thread and deliver the result through a [`Promise`].
    ///
    /// Schedules one refresh on `scheduler`, then delivers the cached
    /// name to the returned promise. The promise fails when no name has
    /// ever been resolved.
    pub fn resolve_async(&self, scheduler: &dyn Scheduler) -> Promise<String> {
        let promise = Promise::new();
        let delivery = promise.clone();
        let cache = self.clone();
        scheduler
            .schedule_once(
                Duration::ZERO,
                Box::new(move || {
                    cache.refresh_resolve();
                    match cache.resolved_hostname() {
                        Some(name) => delivery.deliver(name),
                        None => delivery.fail("no host name could be resolved"),
                    }
                }),
            )
            .detach();
        promise
    }

    /// The last resolved host name, or `None` before any resolution.
    ///
    /// This method never blocks on a lookup.
    pub fn resolved_hostname(&self) -> Option<String> {
        self.state.hostname.lock().clone()
    }

    /// Epoch milliseconds of the last successful lookup; 0 before any.
    pub fn last_update_time(&self) -> u64 {
        self.state.last_update.load(Ordering::Acquire)
    }

    /// Overwrite the last-update stamp. Testing/monitoring hook.
    pub fn set_last_update_time(&self, millis: u64) {
        self.state.last_update.store(millis, Ordering::Release);
    }

    /// The configured refresh period.
    pub fn refresh_interval(&self) -> Duration {
        *self.state.refresh_interval.lock()
    }

    /// Whether a recurring refresh is currently armed.
    pub fn is_scheduled(&self) -> bool {
        self.state.schedule.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    use crate::error::HostError;

    use super::*;

    #[derive(Clone)]
    struct FakeEnv {
        vars: HashMap<String, String>,
        family: OsFamily,
    }

    impl FakeEnv {
        fn unix() -> Self {
            Self {
                vars: HashMap::new(),
                family: OsFamily::Unix,
            }
        }

        fn windows() -> Self {
            Self {
                vars: HashMap::new(),
                family: OsFamily::Windows,
            }
        }

        fn with_var(mut self, name: &str, value: &str) -> Self {
            self.vars.insert(name.to_string(), value.to_string());
            self
        }
    }

    impl HostEnv for FakeEnv {
        fn var(&self, name: &str) -> Option<String> {
            self.vars.get(name).cloned()
        }

        fn os_family(&self) -> OsFamily {
            self.family
        }
    }

    #[derive(Default)]
    struct FakeLookupInner {
        script: Mutex<VecDeque<crate::error::Result<String>>>,
        calls: AtomicUsize,
    }

    /// Replays a scripted sequence of lookup outcomes.
    #[derive(Clone, Default)]
    struct FakeLookup {
        inner: Arc<FakeLookupInner>,
    }

    impl FakeLookup {
        fn push_ok(&self, name: &str) {
            self.inner.script.lock().push_back(Ok(name.to_string()));
        }

        fn push_err(&self, msg: &str) {
            self.inner
                .script
                .lock()
                .push_back(Err(HostError::Unknown(msg.to_string())));
        }

        fn calls(&self) -> usize {
            self.inner.calls.load(Ordering::SeqCst)
        }
    }

    impl HostLookup for FakeLookup {
        fn local_host_name(&self) -> crate::error::Result<String> {
            self.inner.calls.fetch_add(1, Ordering::SeqCst);
            self.inner
                .script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(HostError::Unknown("script exhausted".to_string())))
        }
    }

    /// Hands out strictly increasing timestamps.
    #[derive(Clone, Default)]
    struct FakeClock {
        now: Arc<AtomicU64>,
    }

    impl Clock for FakeClock {
        fn now_millis(&self) -> u64 {
            self.now.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    struct RecordedTask {
        period: Duration,
        task: Box<dyn FnMut() + Send + 'static>,
        cancelled: Arc<std::sync::atomic::AtomicBool>,
    }

    /// Records armed tasks and runs them only when the test says so.
    #[derive(Default)]
    struct FakeScheduler {
        recurring: Mutex<Vec<RecordedTask>>,
        one_shots: Mutex<Vec<Box<dyn FnOnce() + Send + 'static>>>,
    }

    impl FakeScheduler {
        /// Run every armed recurring task once.
        fn tick(&self) {
            for task in self.recurring.lock().iter_mut() {
                if !task.cancelled.load(Ordering::SeqCst) {
                    (task.task)();
                }
            }
        }

        /// Run and drain all pending one-shot tasks.
        fn run_one_shots(&self) -> usize {
            let pending: Vec<_> = self.one_shots.lock().drain(..).collect();
            let count = pending.len();
            for task in pending {
                task();
            }
            count
        }

        fn recurring_count(&self) -> usize {
            self.recurring.lock().len()
        }

        fn active_recurring(&self) -> usize {
            self.recurring
                .lock()
                .iter()
                .filter(|task| !task.cancelled.load(Ordering::SeqCst))
                .count()
        }

        fn recurring_periods(&self) -> Vec<Duration> {
            self.recurring.lock().iter().map(|task| task.period).collect()
        }
    }

    impl Scheduler for FakeScheduler {
        fn schedule(
            &self,
            _initial_delay: Duration,
            period: Duration,
            task: Box<dyn FnMut() + Send + 'static>,
        ) -> TaskHandle {
            let cancelled = Arc::new(std::sync::atomic::AtomicBool::new(false));
            self.recurring.lock().push(RecordedTask {
                period,
                task,
                cancelled: cancelled.clone(),
            });
            TaskHandle::new(move || cancelled.store(true, Ordering::SeqCst))
        }

        fn schedule_once(
            &self,
            _delay: Duration,
            task: Box<dyn FnOnce() + Send + 'static>,
        ) -> TaskHandle {
            self.one_shots.lock().push(task);
            TaskHandle::new(|| {})
        }
    }

    fn unresolved_cache(lookup: &FakeLookup) -> (HostnameCache, Arc<FakeScheduler>) {
        let cache = HostnameCache::new(FakeEnv::unix(), lookup.clone(), FakeClock::default());
        (cache, Arc::new(FakeScheduler::default()))
    }

    #[test]
    fn test_env_value_skips_lookup_and_schedule() {
        let lookup = FakeLookup::default();
        let env = FakeEnv::unix().with_var(HOSTNAME, "env-host");
        let cache = HostnameCache::new(env, lookup.clone(), FakeClock::default());
        let scheduler = Arc::new(FakeScheduler::default());

        cache.start(Duration::from_millis(100), scheduler.clone());

        assert_eq!(cache.resolved_hostname(), Some("env-host".to_string()));
        assert_eq!(lookup.calls(), 0);
        assert_eq!(scheduler.recurring_count(), 0);
        assert!(!cache.is_scheduled());
        // The environment path never stamps a lookup time.
        assert_eq!(cache.last_update_time(), 0);
    }

    #[test]
    fn test_windows_without_variable_falls_back_to_localhost() {
        let lookup = FakeLookup::default();
        let cache = HostnameCache::new(FakeEnv::windows(), lookup.clone(), FakeClock::default());
        let scheduler = Arc::new(FakeScheduler::default());

        cache.start(Duration::from_millis(100), scheduler.clone());

        assert_eq!(cache.resolved_hostname(), Some("localhost".to_string()));
        assert_eq!(lookup.calls(), 0);
        assert_eq!(scheduler.recurring_count(), 0);
    }

    #[test]
    fn test_start_arms_exactly_one_recurring_task() {
        let lookup = FakeLookup::default();
        let (cache, scheduler) = unresolved_cache(&lookup);

        cache.start(Duration::from_millis(100), scheduler.clone());

        assert_eq!(scheduler.recurring_count(), 1);
        assert_eq!(scheduler.active_recurring(), 1);
        assert!(cache.is_scheduled());
        assert_eq!(cache.refresh_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_restart_cancels_previous_schedule() {
        let lookup = FakeLookup::default();
        let (cache, scheduler) = unresolved_cache(&lookup);

        cache.start(Duration::from_millis(100), scheduler.clone());
        cache.start(Duration::from_millis(250), scheduler.clone());

        // Two were armed over time but never two alive at once.
        assert_eq!(scheduler.recurring_count(), 2);
        assert_eq!(scheduler.active_recurring(), 1);
        assert_eq!(
            scheduler.recurring_periods(),
            vec![Duration::from_millis(100), Duration::from_millis(250)]
        );
        assert_eq!(cache.refresh_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_refresh_success_updates_value_and_timestamp() {
        let lookup = FakeLookup::default();
        lookup.push_ok("node-7");
        lookup.push_ok("node-7b");
        let (cache, scheduler) = unresolved_cache(&lookup);

        cache.start(Duration::from_millis(100), scheduler.clone());
        assert_eq!(cache.resolved_hostname(), None);

        scheduler.tick();
        assert_eq!(cache.resolved_hostname(), Some("node-7".to_string()));
        let first_update = cache.last_update_time();
        assert!(first_update > 0);

        scheduler.tick();
        assert_eq!(cache.resolved_hostname(), Some("node-7b".to_string()));
        assert!(cache.last_update_time() > first_update);
    }

    #[test]
    fn test_refresh_failure_keeps_previous_value() {
        let lookup = FakeLookup::default();
        lookup.push_ok("node-7");
        lookup.push_err("no dns");
        let (cache, scheduler) = unresolved_cache(&lookup);

        cache.start(Duration::from_millis(100), scheduler.clone());
        scheduler.tick();
        let stamped = cache.last_update_time();

        scheduler.tick();
        assert_eq!(cache.resolved_hostname(), Some("node-7".to_string()));
        assert_eq!(cache.last_update_time(), stamped);
    }

    #[test]
    fn test_empty_lookup_result_substitutes_localhost() {
        let lookup = FakeLookup::default();
        lookup.push_ok("");
        let (cache, scheduler) = unresolved_cache(&lookup);

        cache.start(Duration::from_millis(100), scheduler.clone());
        scheduler.tick();

        assert_eq!(cache.resolved_hostname(), Some("localhost".to_string()));
    }

    #[test]
    fn test_resolve_now_without_scheduler_is_noop() {
        let lookup = FakeLookup::default();
        let (cache, _) = unresolved_cache(&lookup);
        assert_eq!(cache.refresh_interval(), DEFAULT_REFRESH_INTERVAL);

        cache.resolve_now();
        assert_eq!(lookup.calls(), 0);
    }

    #[test]
    fn test_resolve_now_uses_one_shot_and_keeps_schedule() {
        let lookup = FakeLookup::default();
        lookup.push_ok("node-7");
        let (cache, scheduler) = unresolved_cache(&lookup);

        cache.start(Duration::from_millis(100), scheduler.clone());
        cache.resolve_now();

        assert_eq!(scheduler.run_one_shots(), 1);
        assert_eq!(cache.resolved_hostname(), Some("node-7".to_string()));
        assert_eq!(scheduler.active_recurring(), 1);
    }

    #[test]
    fn test_resolve_async_delivers_through_promise() {
        let lookup = FakeLookup::default();
        lookup.push_ok("node-7");
        let (cache, scheduler) = unresolved_cache(&lookup);

        let promise = cache.resolve_async(scheduler.as_ref());
        assert!(promise.try_wait().is_none());

        scheduler.run_one_shots();
        assert_eq!(promise.try_wait(), Some(Ok("node-7".to_string())));
    }

    #[test]
    fn test_resolve_async_fails_when_nothing_resolves() {
        let lookup = FakeLookup::default();
        lookup.push_err("no dns");
        let (cache, scheduler) = unresolved_cache(&lookup);

        let promise = cache.resolve_async(scheduler.as_ref());
        scheduler.run_one_shots();

        assert!(matches!(
            promise.try_wait(),
            Some(Err(ridgeline_core::CoreError::ResolutionFailure(_)))
        ));
    }

    #[test]
    fn test_set_last_update_time_hook() {
        let lookup = FakeLookup::default();
        let (cache, _) = unresolved_cache(&lookup);

        cache.set_last_update_time(12345);
        assert_eq!(cache.last_update_time(), 12345);
    }

    #[test]
    fn test_concurrent_readers_during_refresh() {
        let lookup = FakeLookup::default();
        for i in 0..100 {
            lookup.push_ok(&format!("node-{i}"));
        }
        let (cache, scheduler) = unresolved_cache(&lookup);
        cache.start(Duration::from_millis(100), scheduler.clone());

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        // Every observed value is fully formed.
                        if let Some(name) = cache.resolved_hostname() {
                            assert!(name.starts_with("node-"));
                        }
                    }
                })
            })
            .collect();

        for _ in 0..100 {
            scheduler.tick();
        }
        for reader in readers {
            reader.join().unwrap();
        }

        assert_eq!(cache.resolved_hostname(), Some("node-99".to_string()));
    }
}
