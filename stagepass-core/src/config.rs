use chrono::Duration;

/// Tunables for the access gateway. The defaults are what a typical
/// deployment wants, and tests shrink them as needed.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// How long a session admitted before a code's hard expiration may
    /// keep viewing after it. Not a security boundary, since expired
    /// codes never admit new sessions.
    pub grace_period: Duration,
    /// A session that has not been seen for this long is reaped.
    pub session_timeout: Duration,
    /// How often the session sweeper runs.
    pub sweep_interval: std::time::Duration,
    /// Interval between keepalive comments on a push connection, and
    /// between access re-checks for that connection.
    pub keepalive_interval: std::time::Duration,
    /// Retry bound for code generation.
    pub generation_attempts: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::minutes(2),
            session_timeout: Duration::minutes(10),
            sweep_interval: std::time::Duration::from_secs(30),
            keepalive_interval: std::time::Duration::from_secs(30),
            generation_attempts: 10,
        }
    }
}
