//! Workflow configuration

use crate::ledger::Commitment;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable read for the ledger endpoint
pub const ENDPOINT_ENV: &str = "SQUADS_ENDPOINT";

/// Where the ledger lives
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Endpoint {
    /// Simulated ledger inside this process
    #[default]
    Local,
    /// Ledger server at `host:port`
    Remote(String),
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("local") {
            return Ok(Endpoint::Local);
        }
        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(Endpoint::Remote(s.to_string()))
            }
            _ => Err(format!("expected 'local' or host:port, got '{}'", s)),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Local => f.write_str("local"),
            Endpoint::Remote(addr) => f.write_str(addr),
        }
    }
}

/// Backoff schedule for calls that failed on the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), doubling each time
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Workflow configuration
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub endpoint: Endpoint,
    /// Commitment a transaction must reach before the next step runs
    pub commitment: Commitment,
    /// How long to wait for a transaction to reach `commitment`
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    /// Submit transactions without preflight simulation
    pub skip_preflight: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Local,
            commitment: Commitment::Confirmed,
            confirm_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
            retry: RetryPolicy::default(),
            skip_preflight: false,
        }
    }
}
