//! Local host name lookup.

use crate::error::{HostError, Result};

/// Resolves the local machine's host name.
///
/// This is the expensive path: depending on system configuration the
/// lookup can trigger a DNS query with unpredictable latency, which is
/// why results are cached rather than recomputed per read.
pub trait HostLookup: Send + Sync {
    /// Resolve the local host name.
    fn local_host_name(&self) -> Result<String>;
}

/// Lookup backed by the operating system's `gethostname`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLookup;

impl HostLookup for SystemLookup {
    fn local_host_name(&self) -> Result<String> {
        let name = hostname::get().map_err(|err| HostError::Unknown(err.to_string()))?;
        Ok(name.to_string_lossy().into_owned())
    }
}
