//! Configurable timeout defaults.
//!
//! The exchange core sets no timers of its own; these durations are consumed
//! by the transport layer and the pending queues around it. Every value can
//! be overridden through a key-value configuration source using the
//! `Halibut:` key prefix shared with the wider deployment's settings store.

use std::time::Duration;

/// Key prefix for the configuration source.
pub const CONFIG_KEY_PREFIX: &str = "Halibut:";

/// Duration settings for the roles around one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeTimeouts {
    /// How long a polling request waits on the queue before giving up.
    pub polling_request_queue_timeout: Duration,
    /// Upper bound on processing a single polled request.
    pub polling_request_maximum_message_processing_timeout: Duration,
    /// Sleep between listen retries.
    pub retry_listening_sleep_interval: Duration,
    /// How long connection errors keep being retried.
    pub connection_error_retry_timeout: Duration,
    pub tcp_client_send_timeout: Duration,
    pub tcp_client_receive_timeout: Duration,
    pub tcp_client_pooled_connection_timeout: Duration,
    pub tcp_client_heartbeat_send_timeout: Duration,
    pub tcp_client_heartbeat_receive_timeout: Duration,
    pub tcp_client_connect_timeout: Duration,
    /// How long a subscriber-serving loop blocks on an empty queue before
    /// sending the null sentinel.
    pub polling_queue_wait_timeout: Duration,
}

impl Default for ExchangeTimeouts {
    fn default() -> Self {
        ExchangeTimeouts {
            polling_request_queue_timeout: Duration::from_secs(2 * 60),
            polling_request_maximum_message_processing_timeout: Duration::from_secs(10 * 60),
            retry_listening_sleep_interval: Duration::from_secs(1),
            connection_error_retry_timeout: Duration::from_secs(5 * 60),
            tcp_client_send_timeout: Duration::from_secs(10 * 60),
            tcp_client_receive_timeout: Duration::from_secs(10 * 60),
            tcp_client_pooled_connection_timeout: Duration::from_secs(9 * 60),
            tcp_client_heartbeat_send_timeout: Duration::from_secs(60),
            tcp_client_heartbeat_receive_timeout: Duration::from_secs(60),
            tcp_client_connect_timeout: Duration::from_secs(60),
            polling_queue_wait_timeout: Duration::from_secs(30),
        }
    }
}

impl ExchangeTimeouts {
    /// Build settings from a key-value source. Missing or unparseable values
    /// keep their defaults.
    pub fn from_source<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut timeouts = Self::default();
        let fields: [(&str, &mut Duration); 11] = [
            (
                "PollingRequestQueueTimeout",
                &mut timeouts.polling_request_queue_timeout,
            ),
            (
                "PollingRequestMaximumMessageProcessingTimeout",
                &mut timeouts.polling_request_maximum_message_processing_timeout,
            ),
            (
                "RetryListeningSleepInterval",
                &mut timeouts.retry_listening_sleep_interval,
            ),
            (
                "ConnectionErrorRetryTimeout",
                &mut timeouts.connection_error_retry_timeout,
            ),
            ("TcpClientSendTimeout", &mut timeouts.tcp_client_send_timeout),
            (
                "TcpClientReceiveTimeout",
                &mut timeouts.tcp_client_receive_timeout,
            ),
            (
                "TcpClientPooledConnectionTimeout",
                &mut timeouts.tcp_client_pooled_connection_timeout,
            ),
            (
                "TcpClientHeartbeatSendTimeout",
                &mut timeouts.tcp_client_heartbeat_send_timeout,
            ),
            (
                "TcpClientHeartbeatReceiveTimeout",
                &mut timeouts.tcp_client_heartbeat_receive_timeout,
            ),
            (
                "TcpClientConnectTimeout",
                &mut timeouts.tcp_client_connect_timeout,
            ),
            (
                "PollingQueueWaitTimeout",
                &mut timeouts.polling_queue_wait_timeout,
            ),
        ];

        for (key, field) in fields {
            if let Some(raw) = lookup(&format!("{CONFIG_KEY_PREFIX}{key}")) {
                if let Some(parsed) = parse_duration(&raw) {
                    *field = parsed;
                }
            }
        }
        timeouts
    }
}

/// Parse `"90"` (seconds) or `"90s"` / `"10m"` / `"2h"`.
fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    for (suffix, scale) in [("s", 1u64), ("m", 60), ("h", 3600)] {
        if let Some(value) = raw.strip_suffix(suffix) {
            return value
                .trim()
                .parse::<u64>()
                .ok()
                .map(|n| Duration::from_secs(n * scale));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_the_documented_table() {
        let t = ExchangeTimeouts::default();
        assert_eq!(t.polling_request_queue_timeout, Duration::from_secs(120));
        assert_eq!(
            t.polling_request_maximum_message_processing_timeout,
            Duration::from_secs(600)
        );
        assert_eq!(t.retry_listening_sleep_interval, Duration::from_secs(1));
        assert_eq!(t.connection_error_retry_timeout, Duration::from_secs(300));
        assert_eq!(t.tcp_client_send_timeout, Duration::from_secs(600));
        assert_eq!(t.tcp_client_receive_timeout, Duration::from_secs(600));
        assert_eq!(t.tcp_client_pooled_connection_timeout, Duration::from_secs(540));
        assert_eq!(t.tcp_client_heartbeat_send_timeout, Duration::from_secs(60));
        assert_eq!(t.tcp_client_heartbeat_receive_timeout, Duration::from_secs(60));
        assert_eq!(t.tcp_client_connect_timeout, Duration::from_secs(60));
        assert_eq!(t.polling_queue_wait_timeout, Duration::from_secs(30));
    }

    #[test]
    fn source_overrides_individual_keys() {
        let mut source = HashMap::new();
        source.insert("Halibut:PollingQueueWaitTimeout".to_string(), "5s".to_string());
        source.insert("Halibut:TcpClientConnectTimeout".to_string(), "2m".to_string());

        let t = ExchangeTimeouts::from_source(|key| source.get(key).cloned());
        assert_eq!(t.polling_queue_wait_timeout, Duration::from_secs(5));
        assert_eq!(t.tcp_client_connect_timeout, Duration::from_secs(120));
        // Untouched keys keep their defaults.
        assert_eq!(t.tcp_client_send_timeout, Duration::from_secs(600));
    }

    #[test]
    fn unparseable_values_fall_back_to_defaults() {
        let t = ExchangeTimeouts::from_source(|key| {
            (key == "Halibut:TcpClientSendTimeout").then(|| "soon".to_string())
        });
        assert_eq!(t, ExchangeTimeouts::default());
    }

    #[test]
    fn duration_grammar() {
        assert_eq!(parse_duration("90"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("90s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("10m"), Some(Duration::from_secs(600)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("fast"), None);
    }
}
