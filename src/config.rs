//! Environment-driven configuration, following the teacher's
//! `Default`-plus-env-override convention: every field falls back to a
//! documented default and may be overridden by a same-named environment
//! variable.

use std::time::Duration;

/// Process-wide configuration for the collaboration engine.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Port the HTTP/websocket listener binds to.
    pub port: u16,
    /// Maximum number of operation-log entries retained per document before
    /// the oldest is evicted; bounds how stale a client's `base_version` may
    /// be before a resync is required.
    pub retention_window: usize,
    /// How long a hub with zero subscribers stays `Draining` before it is
    /// reclaimed.
    pub hub_idle_grace: Duration,
    /// Bound on each subscriber's outbound queue; exceeding it marks the
    /// subscriber a slow consumer and closes its transport.
    pub outbound_queue_bound: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            retention_window: 10_000,
            hub_idle_grace: Duration::from_secs(30),
            outbound_queue_bound: 256,
        }
    }
}

impl ServerConfig {
    /// Reads overrides from the environment, falling back to [`Default`]
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.port),
            retention_window: std::env::var("RETENTION_WINDOW")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.retention_window),
            hub_idle_grace: std::env::var("HUB_IDLE_GRACE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.hub_idle_grace),
            outbound_queue_bound: std::env::var("OUTBOUND_QUEUE_BOUND")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.outbound_queue_bound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env_overrides() {
        std::env::remove_var("PORT");
        std::env::remove_var("RETENTION_WINDOW");
        std::env::remove_var("HUB_IDLE_GRACE_SECS");
        std::env::remove_var("OUTBOUND_QUEUE_BOUND");
        let config = ServerConfig::from_env();
        assert_eq!(config.port, 8080);
        assert_eq!(config.retention_window, 10_000);
        assert_eq!(config.hub_idle_grace, Duration::from_secs(30));
        assert_eq!(config.outbound_queue_bound, 256);
    }

    #[test]
    fn env_overrides_take_precedence() {
        std::env::set_var("PORT", "9999");
        std::env::set_var("RETENTION_WINDOW", "50");
        let config = ServerConfig::from_env();
        assert_eq!(config.port, 9999);
        assert_eq!(config.retention_window, 50);
        std::env::remove_var("PORT");
        std::env::remove_var("RETENTION_WINDOW");
    }
}
