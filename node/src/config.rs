use anyhow::{Context, Result};
use std::time::Duration;

/// Default advertised address for local development
const FALLBACK_IP: &str = "127.0.0.1";

/// Node tuning, read from the environment with defaults
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Address other peers use to reach this node
    pub advertise_ip: String,
    /// Port of the peer RPC server (0 picks a free port)
    pub peer_port: u16,
    /// Period of the primary <-> backup liveness ping
    pub heartbeat_interval: Duration,
    /// Wait between init_player attempts against the same primary
    pub join_retry: Duration,
    /// Wait before re-querying the tracker after the primary was unreachable
    pub reconnect_retry: Duration,
    /// Timeout applied to every outgoing call
    pub rpc_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            advertise_ip: FALLBACK_IP.to_string(),
            peer_port: 0,
            heartbeat_interval: Duration::from_millis(1000),
            join_retry: Duration::from_millis(400),
            reconnect_retry: Duration::from_millis(1000),
            rpc_timeout: Duration::from_millis(2000),
        }
    }
}

impl NodeConfig {
    /// Read NODE_IP, PEER_PORT, HEARTBEAT_INTERVAL_MS, JOIN_RETRY_MS,
    /// RECONNECT_RETRY_MS and RPC_TIMEOUT_MS
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        let defaults = Self::default();

        let millis = |key: &str, default: Duration| -> Result<Duration> {
            match lookup(key) {
                Some(raw) => raw
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .with_context(|| format!("Invalid {}: {:?}", key, raw)),
                None => Ok(default),
            }
        };

        let peer_port = match lookup("PEER_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("Invalid PEER_PORT: {:?}", raw))?,
            None => defaults.peer_port,
        };

        Ok(Self {
            advertise_ip: lookup("NODE_IP").unwrap_or(defaults.advertise_ip),
            peer_port,
            heartbeat_interval: millis("HEARTBEAT_INTERVAL_MS", defaults.heartbeat_interval)?,
            join_retry: millis("JOIN_RETRY_MS", defaults.join_retry)?,
            reconnect_retry: millis("RECONNECT_RETRY_MS", defaults.reconnect_retry)?,
            rpc_timeout: millis("RPC_TIMEOUT_MS", defaults.rpc_timeout)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<NodeConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NodeConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.advertise_ip, "127.0.0.1");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(config.join_retry, Duration::from_millis(400));
        assert_eq!(config.reconnect_retry, Duration::from_millis(1000));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("NODE_IP", "10.0.1.5"),
            ("PEER_PORT", "7100"),
            ("HEARTBEAT_INTERVAL_MS", "250"),
        ])
        .unwrap();
        assert_eq!(config.advertise_ip, "10.0.1.5");
        assert_eq!(config.peer_port, 7100);
        assert_eq!(config.heartbeat_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_value() {
        let err = config_from(&[("RPC_TIMEOUT_MS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("RPC_TIMEOUT_MS"));
    }
}
