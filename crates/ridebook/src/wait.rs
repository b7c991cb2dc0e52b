//! Wait mechanisms.
//!
//! Every suspension point takes an explicit timeout. A timed-out wait is an
//! ordinary outcome (`None` / `false`), never a hang and never an error.

use std::future::Future;
use std::time::{Duration, Instant};

// =============================================================================
// CONSTANTS
// =============================================================================

/// How long a required element may take to appear
pub const DEFAULT_ELEMENT_TIMEOUT_MS: u64 = 10_000;

/// How long a navigation or load-state wait may take
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;

/// Pause between probes
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Quiet period that counts as network idle
pub const NETWORK_IDLE_THRESHOLD_MS: u64 = 500;

// =============================================================================
// LOAD STATE
// =============================================================================

/// Page load milestones a flow can wait for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadState {
    /// `load` fired
    #[default]
    Load,
    /// `DOMContentLoaded` fired
    DomContentLoaded,
    /// `load` fired and no new resource for the idle threshold
    NetworkIdle,
}

impl LoadState {
    /// Event name, as logged
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::DomContentLoaded => "DOMContentLoaded",
            Self::NetworkIdle => "networkidle",
        }
    }

    /// `document.readyState` values that satisfy this state
    #[must_use]
    pub const fn ready_states(&self) -> &'static [&'static str] {
        match self {
            Self::DomContentLoaded => &["interactive", "complete"],
            Self::Load | Self::NetworkIdle => &["complete"],
        }
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.event_name())
    }
}

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Timeout and probe interval of one wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Milliseconds before giving up
    pub timeout_ms: u64,
    /// Milliseconds between probes
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_ELEMENT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Element-wait defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Override the probe interval
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Timeout as a `Duration`
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Probe interval as a `Duration`
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// POLLING
// =============================================================================

/// Poll `probe` until it yields `Some`, an error, or the timeout elapses.
///
/// The probe runs at least once, so a zero timeout still checks the
/// current state.
pub async fn poll_until<T, E, F, Fut>(options: WaitOptions, mut probe: F) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let start = Instant::now();
    loop {
        if let Some(value) = probe().await? {
            return Ok(Some(value));
        }
        if start.elapsed() >= options.timeout() {
            return Ok(None);
        }
        tokio::time::sleep(options.poll_interval()).await;
    }
}

/// Sleep for a settle delay; zero is a no-op.
pub async fn settle(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
