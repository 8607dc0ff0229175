use std::env;
use std::time::Duration;

pub const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 300;
const DEFAULT_RESOLVED_LOG: usize = 128;

#[derive(Clone, Debug)]
pub struct ApprovalConfig {
    /// Used when a request does not carry its own timeout
    pub default_timeout: Duration,
    /// How many resolved approvals stay queryable after leaving the pending map
    pub resolved_log_capacity: usize,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_APPROVAL_TIMEOUT_SECS),
            resolved_log_capacity: DEFAULT_RESOLVED_LOG,
        }
    }
}

impl ApprovalConfig {
    pub fn from_env() -> Self {
        Self {
            default_timeout: resolve_timeout(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

fn resolve_timeout() -> Duration {
    match env::var("HEALRUN_APPROVAL_TIMEOUT_SECS") {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(DEFAULT_APPROVAL_TIMEOUT_SECS)),
        Err(_) => Duration::from_secs(DEFAULT_APPROVAL_TIMEOUT_SECS),
    }
}
