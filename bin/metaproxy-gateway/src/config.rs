//! Gateway configuration: optional YAML file, then environment overrides

use anyhow::{anyhow, Context, Result};
use metaproxy_kube::AllowListSource;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Path of the YAML configuration file
pub const CONFIG_ENV: &str = "METAPROXY_CONFIG";

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow!("Unknown log format: {}", other)),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct KubernetesConfig {
    pub enabled: bool,
    /// Namespace for credential ids without a `namespace:` part
    pub credential_namespace: String,
    /// ConfigMap watched for host patterns
    pub allow_list: Option<AllowListSource>,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            credential_namespace: "cattle-global-data".to_string(),
            allow_list: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub listen: SocketAddr,
    pub tls_listen: Option<SocketAddr>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    /// Path prefix marking where the embedded destination begins
    pub prefix: String,
    /// Initial host patterns; replaced by the ConfigMap when one is watched
    pub allowed_hosts: Vec<String>,
    pub request_timeout_secs: u64,
    pub kubernetes: KubernetesConfig,
    pub log_format: LogFormat,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: ([0, 0, 0, 0], 8080).into(),
            tls_listen: None,
            tls_cert: None,
            tls_key: None,
            prefix: "/meta/proxy/".to_string(),
            allowed_hosts: Vec::new(),
            request_timeout_secs: 30,
            kubernetes: KubernetesConfig::default(),
            log_format: LogFormat::Text,
        }
    }
}

impl GatewayConfig {
    /// Load from `METAPROXY_CONFIG` (if set) and the process environment
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path))?;
                Self::from_yaml(&raw).with_context(|| format!("Invalid config file {}", path))?
            }
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Override fields from `METAPROXY_*` variables found through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("METAPROXY_LISTEN") {
            self.listen = v
                .parse()
                .with_context(|| format!("Invalid METAPROXY_LISTEN: {}", v))?;
        }
        if let Some(v) = lookup("METAPROXY_TLS_LISTEN") {
            self.tls_listen = Some(
                v.parse()
                    .with_context(|| format!("Invalid METAPROXY_TLS_LISTEN: {}", v))?,
            );
        }
        if let Some(v) = lookup("METAPROXY_TLS_CERT") {
            self.tls_cert = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("METAPROXY_TLS_KEY") {
            self.tls_key = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("METAPROXY_PREFIX") {
            self.prefix = v;
        }
        if let Some(v) = lookup("METAPROXY_ALLOWED_HOSTS") {
            self.allowed_hosts = v
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = lookup("METAPROXY_KUBERNETES") {
            self.kubernetes.enabled = parse_bool(&v)
                .ok_or_else(|| anyhow!("Invalid METAPROXY_KUBERNETES: {}", v))?;
        }
        if let Some(v) = lookup("METAPROXY_LOG_FORMAT") {
            self.log_format = v.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(anyhow!("prefix must not be empty"));
        }
        if self.tls_listen.is_some() && (self.tls_cert.is_none() || self.tls_key.is_none()) {
            return Err(anyhow!("tls_listen requires both tls_cert and tls_key"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be positive"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
