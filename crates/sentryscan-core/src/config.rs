//! Configuration, loaded once at startup into a typed struct rather than
//! scattered `env::var(...)` calls at arbitrary call sites.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub coordinator: CoordinatorConfig,
    pub cache: CacheConfig,
    pub probe: ProbeConfig,
    pub adaptive: AdaptiveConfig,
    pub cve: CveConfig,
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            cache: CacheConfig::default(),
            probe: ProbeConfig::default(),
            adaptive: AdaptiveConfig::default(),
            cve: CveConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Overlay recognized environment variables on top of defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("WS_RATE_LIMIT") {
            if let Ok(n) = v.parse() {
                cfg.coordinator.rate_limit_per_minute = n;
            }
        }
        if let Ok(v) = std::env::var("WS_CONCURRENT_LIMIT") {
            if let Ok(n) = v.parse() {
                cfg.coordinator.per_client_concurrency_limit = n;
            }
        }
        if let Ok(v) = std::env::var("GLOBAL_CONCURRENT_LIMIT") {
            if let Ok(n) = v.parse() {
                cfg.coordinator.global_concurrency_limit = n;
            }
        }
        if let Ok(v) = std::env::var("PORT_LIMIT_PER_SCAN") {
            if let Ok(n) = v.parse() {
                cfg.probe.port_limit_per_scan = n;
            }
        }
        if let Ok(v) = std::env::var("PORT_WARN_THRESHOLD") {
            if let Ok(n) = v.parse() {
                cfg.probe.port_warn_threshold = n;
            }
        }
        if let Ok(v) = std::env::var("CACHE_MAX_ENTRIES") {
            if let Ok(n) = v.parse() {
                cfg.cache.max_entries = n;
            }
        }
        if let Ok(v) = std::env::var("CACHE_MAX_VALUE") {
            if let Ok(n) = v.parse() {
                cfg.cache.max_value_bytes = n;
            }
        }
        if let Ok(v) = std::env::var("API_KEY_TTL") {
            if let Ok(n) = v.parse() {
                cfg.server.api_key_ttl_secs = n;
            }
        }
        cfg.server.websocket_api_key = std::env::var("WEBSOCKET_API_KEY").ok();
        if let Ok(v) = std::env::var("PRIVATE_IP_WHITELIST") {
            cfg.probe.private_ip_whitelist =
                v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect();
        }
        cfg
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub rate_limit_per_minute: u32,
    pub per_client_concurrency_limit: u32,
    pub global_concurrency_limit: u32,
    pub window: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 5,
            per_client_concurrency_limit: 2,
            global_concurrency_limit: 1000,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_value_bytes: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_value_bytes: 1_048_576,
            ttl: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub port_limit_per_scan: usize,
    pub port_warn_threshold: usize,
    pub probe_timeout: Duration,
    pub banner_timeout: Duration,
    pub banner_read_cap_bytes: usize,
    pub private_ip_whitelist: Vec<String>,
    pub scan_hard_ceiling: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            port_limit_per_scan: 65536,
            port_warn_threshold: 100,
            probe_timeout: Duration::from_secs(1),
            banner_timeout: Duration::from_secs(1),
            banner_read_cap_bytes: 1024,
            private_ip_whitelist: Vec::new(),
            scan_hard_ceiling: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    pub window_size: usize,
    pub min_adjust_interval: Duration,
    pub min_concurrency: usize,
    pub max_concurrency: usize,
    pub min_timeout: Duration,
    pub max_timeout: Duration,
    pub initial_concurrency: usize,
    pub initial_timeout: Duration,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            window_size: 50,
            min_adjust_interval: Duration::from_millis(500),
            min_concurrency: 1,
            max_concurrency: 500,
            min_timeout: Duration::from_millis(100),
            max_timeout: Duration::from_secs(5),
            initial_concurrency: 50,
            initial_timeout: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CveConfig {
    pub feed_url: String,
    pub fetch_timeout: Duration,
    pub cache_ttl: Duration,
    pub min_confidence_no_version_no_banner: f32,
}

impl Default for CveConfig {
    fn default() -> Self {
        Self {
            feed_url: "https://services.nvd.nist.gov/rest/json/cves/2.0".to_string(),
            fetch_timeout: Duration::from_secs(15),
            cache_ttl: Duration::from_secs(86400),
            min_confidence_no_version_no_banner: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub api_key_ttl_secs: u64,
    pub websocket_api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_key_ttl_secs: 3600,
            websocket_api_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = Config::default();
        assert_eq!(cfg.coordinator.rate_limit_per_minute, 5);
        assert_eq!(cfg.coordinator.per_client_concurrency_limit, 2);
        assert_eq!(cfg.coordinator.global_concurrency_limit, 1000);
        assert_eq!(cfg.probe.port_limit_per_scan, 65536);
        assert_eq!(cfg.probe.port_warn_threshold, 100);
    }

    #[test]
    fn env_overlay_parses_whitelist() {
        std::env::set_var("PRIVATE_IP_WHITELIST", "10.0.0.5, 10.0.0.6");
        let cfg = Config::from_env();
        assert_eq!(
            cfg.probe.private_ip_whitelist,
            vec!["10.0.0.5".to_string(), "10.0.0.6".to_string()]
        );
        std::env::remove_var("PRIVATE_IP_WHITELIST");
    }
}
