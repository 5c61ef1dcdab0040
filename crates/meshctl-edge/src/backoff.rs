use std::time::Duration;

/// Reconnect backoff policy: start at 1s, double each attempt, stop after 5
/// attempts total, per spec.md §4.6. This replaces the teacher's
/// `websocket_client.rs` policy (100 attempts, capped at 30s, exponent
/// clamped to `2^min(retry,4)`) — the looser teacher policy suits a
/// long-lived local port-forward tunnel where the user expects it to keep
/// trying; an edge agent reporting to a control plane should instead fail
/// fast and let its supervisor (systemd, a Kubernetes restart policy)
/// recreate the process, so the attempt count and cap are tightened here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub const DEFAULT: BackoffPolicy = BackoffPolicy {
        initial: Duration::from_secs(1),
        max_attempts: 5,
    };

    /// Delay before attempt `attempt` (1-indexed). Returns `None` once
    /// `max_attempts` is exceeded, signaling the caller should give up.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let exponent = attempt - 1;
        Some(self.initial * 2u32.saturating_pow(exponent))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}
