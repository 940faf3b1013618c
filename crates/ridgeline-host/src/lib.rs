//! Host identity for Ridgeline.
//!
//! This crate resolves and caches the local machine's host name for the
//! Ridgeline client libraries:
//!
//! - **HostnameCache**: a process-wide, self-refreshing cached host name
//! - **Collaborator traits**: environment access, host lookup, and clock
//!   seams with system-backed implementations
//!
//! Resolution is two-tier. An environment variable injected by deployment
//! tooling (`COMPUTERNAME` on Windows-family systems, `HOSTNAME`
//! elsewhere) wins outright and is assumed stable for the process
//! lifetime. Only when it is absent does the cache run the expensive
//! local-host lookup, kept fresh by a recurring task on a
//! [`Scheduler`](ridgeline_core::Scheduler). A failed refresh keeps the
//! previous value; stale beats absent.
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
//! // Readers never block on a lookup.
//! if let Some(name) = cache.resolved_hostname() {
//!     println!("running on {name}");
//! }
//! ```

mod cache;
mod clock;
mod env;
mod error;
mod lookup;

pub use cache::{DEFAULT_REFRESH_INTERVAL, HostnameCache};
pub use clock::{Clock, SystemClock};
pub use env::{COMPUTERNAME, HOSTNAME, HostEnv, OsFamily, SystemEnv};
pub use error::{HostError, Result};
pub use lookup::{HostLookup, SystemLookup};
