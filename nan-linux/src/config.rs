//! Load config from file and environment.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use nan_core::config::DEFAULT_PEER_CACHE_CAPACITY;
use nan_core::{ConfigError, ConfigRequest, CoreSettings, CLUSTER_ID_MAX};
use serde::Deserialize;

/// Daemon configuration. File: ~/.config/nan/config.toml or /etc/nan/config.toml.
/// Env overrides: NAN_MASTER_PREFERENCE, NAN_SUPPORT_5G, NAN_PEER_CACHE, NAN_LOG.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Device configuration requested by the daemon's client.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Peers remembered per session (default 64).
    #[serde(default = "default_peer_cache_capacity")]
    pub peer_cache_capacity: usize,
    /// tracing filter directive (default "info"). RUST_LOG wins when set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Sessions started at boot.
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    #[serde(default)]
    pub support_5g: bool,
    #[serde(default)]
    pub master_preference: u8,
    #[serde(default)]
    pub cluster_low: u16,
    #[serde(default = "default_cluster_high")]
    pub cluster_high: u16,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Publish,
    Subscribe,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub name: String,
    pub role: Role,
    /// Service-specific info, sent as UTF-8 bytes.
    #[serde(default)]
    pub service_info: String,
}

fn default_peer_cache_capacity() -> usize {
    DEFAULT_PEER_CACHE_CAPACITY
}
fn default_log_filter() -> String {
    "info".into()
}
fn default_cluster_high() -> u16 {
    CLUSTER_ID_MAX
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            support_5g: false,
            master_preference: 0,
            cluster_low: 0,
            cluster_high: default_cluster_high(),
        }
    }
}

impl DeviceConfig {
    pub fn to_request(&self) -> Result<ConfigRequest, ConfigError> {
        ConfigRequest::builder()
            .support_5g(self.support_5g)
            .master_preference(self.master_preference)
            .cluster_low(self.cluster_low)
            .cluster_high(self.cluster_high)
            .build()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            peer_cache_capacity: default_peer_cache_capacity(),
            log_filter: default_log_filter(),
            services: Vec::new(),
        }
    }
}

impl Config {
    /// A zero capacity falls back to the default.
    pub fn core_settings(&self) -> CoreSettings {
        match NonZeroUsize::new(self.peer_cache_capacity) {
            Some(peer_cache_capacity) => CoreSettings {
                peer_cache_capacity,
            },
            None => CoreSettings::default(),
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    apply_env(&mut c, |k| std::env::var(k).ok());
    c
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("NAN_MASTER_PREFERENCE") {
        if let Ok(v) = s.parse::<u8>() {
            c.device.master_preference = v;
        }
    }
    if let Some(s) = var("NAN_SUPPORT_5G") {
        match s.as_str() {
            "1" | "true" => c.device.support_5g = true,
            "0" | "false" => c.device.support_5g = false,
            _ => {}
        }
    }
    if let Some(s) = var("NAN_PEER_CACHE") {
        if let Ok(v) = s.parse::<usize>() {
            c.peer_cache_capacity = v;
        }
    }
    if let Some(s) = var("NAN_LOG") {
        c.log_filter = s;
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/nan/config.toml"));
    }
    out.push(PathBuf::from("/etc/nan/config.toml"));
    out
}

pub fn parse(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(s)
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            if let Ok(s) = std::fs::read_to_string(&p) {
                match parse(&s) {
                    Ok(c) => return Some(c),
                    Err(e) => eprintln!("nan-linux: ignoring {}: {}", p.display(), e),
                }
            }
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        let c = parse("").unwrap();
        assert_eq!(c.peer_cache_capacity, DEFAULT_PEER_CACHE_CAPACITY);
        assert_eq!(c.log_filter, "info");
        assert!(c.services.is_empty());
        assert_eq!(c.device.to_request().unwrap(), ConfigRequest::default());
    }

    #[test]
    fn full_file_parses() {
        let c = parse(
            r#"
            peer_cache_capacity = 8
            log_filter = "nan_core=debug"

            [device]
            support_5g = true
            master_preference = 20
            cluster_low = 10
            cluster_high = 20

            [[services]]
            name = "printer"
            role = "publish"
            service_info = "color"

            [[services]]
            name = "printer"
            role = "subscribe"
            "#,
        )
        .unwrap();
        assert_eq!(c.core_settings().peer_cache_capacity.get(), 8);
        let req = c.device.to_request().unwrap();
        assert!(req.support_5g);
        assert_eq!((req.cluster_low, req.cluster_high), (10, 20));
        assert_eq!(c.services.len(), 2);
        assert_eq!(c.services[0].role, Role::Publish);
        assert_eq!(c.services[0].service_info, "color");
        assert_eq!(c.services[1].role, Role::Subscribe);
    }

    #[test]
    fn unknown_fields_rejected() {
        assert!(parse("proxy_port = 3128").is_err());
        assert!(parse("[[services]]\nname = \"x\"\nrole = \"advertise\"").is_err());
    }

    #[test]
    fn reserved_master_preference_rejected_at_conversion() {
        let c = parse("[device]\nmaster_preference = 255").unwrap();
        assert!(c.device.to_request().is_err());
    }

    #[test]
    fn env_overrides_file() {
        let mut c = Config::default();
        apply_env(&mut c, |k| match k {
            "NAN_MASTER_PREFERENCE" => Some("30".into()),
            "NAN_SUPPORT_5G" => Some("true".into()),
            "NAN_PEER_CACHE" => Some("not-a-number".into()),
            "NAN_LOG" => Some("debug".into()),
            _ => None,
        });
        assert_eq!(c.device.master_preference, 30);
        assert!(c.device.support_5g);
        assert_eq!(c.peer_cache_capacity, DEFAULT_PEER_CACHE_CAPACITY);
        assert_eq!(c.log_filter, "debug");
    }

    #[test]
    fn zero_peer_cache_falls_back_to_default() {
        let c = Config {
            peer_cache_capacity: 0,
            ..Config::default()
        };
        assert_eq!(c.core_settings(), CoreSettings::default());
    }
}
