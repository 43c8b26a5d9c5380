use super::errors::ConfigError;
use crate::upstream::UpstreamEndpoint;
use crate::zone::ZoneName;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on the `to` list of a single rule.
pub const MAX_UPSTREAMS: usize = 15;

/// PEM files for TLS upstreams: optional client certificate/key pair and an extra CA bundle.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct TlsFiles {
    #[serde(default)]
    pub cert: Option<String>,

    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub ca: Option<String>,
}

/// One `[[forward]]` block: queries under `from` are sent to the `to` upstreams.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForwardRule {
    #[serde(default = "default_from")]
    pub from: String,

    pub to: Vec<String>,

    #[serde(default)]
    pub except: Vec<String>,

    /// Consecutive failed health checks before an upstream counts as down; 0 disables.
    #[serde(default = "default_max_fails")]
    pub max_fails: u32,

    #[serde(default = "default_health_check_ms")]
    pub health_check_ms: u64,

    /// Idle lifetime of a pooled upstream connection.
    #[serde(default = "default_expire_ms")]
    pub expire_ms: u64,

    #[serde(default)]
    pub force_tcp: bool,

    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default)]
    pub tls_servername: Option<String>,

    #[serde(default)]
    pub tls: Option<TlsFiles>,
}

impl ForwardRule {
    pub fn new(from: impl Into<String>, to: Vec<String>) -> Self {
        Self {
            from: from.into(),
            to,
            except: Vec::new(),
            max_fails: default_max_fails(),
            health_check_ms: default_health_check_ms(),
            expire_ms: default_expire_ms(),
            force_tcp: false,
            dial_timeout_ms: default_dial_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            tls_servername: None,
            tls: None,
        }
    }

    pub fn from_zone(&self) -> ZoneName {
        ZoneName::new(&self.from)
    }

    pub fn ignored_zones(&self) -> Vec<ZoneName> {
        self.except.iter().map(|e| ZoneName::new(e)).collect()
    }

    pub fn endpoints(&self) -> Result<Vec<UpstreamEndpoint>, ConfigError> {
        self.to
            .iter()
            .map(|s| {
                s.parse::<UpstreamEndpoint>().map_err(|e| {
                    ConfigError::Validation(format!(
                        "Forward rule '{}': invalid upstream '{}': {}",
                        self.from, s, e
                    ))
                })
            })
            .collect()
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_ms)
    }

    pub fn expire(&self) -> Duration {
        Duration::from_millis(self.expire_ms)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.to.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Forward rule '{}' has no upstreams",
                self.from
            )));
        }
        if self.to.len() > MAX_UPSTREAMS {
            return Err(ConfigError::Validation(format!(
                "Forward rule '{}' has {} upstreams (max {})",
                self.from,
                self.to.len(),
                MAX_UPSTREAMS
            )));
        }
        self.endpoints()?;

        let from = self.from_zone();
        for ignored in self.ignored_zones() {
            if !from.contains(&ignored) {
                return Err(ConfigError::Validation(format!(
                    "Forward rule '{}': except entry '{}' is not under the forwarded zone",
                    self.from, ignored
                )));
            }
        }

        if self.health_check_ms == 0 {
            return Err(ConfigError::Validation(format!(
                "Forward rule '{}': health_check_ms must be positive",
                self.from
            )));
        }
        for (field, value) in [
            ("expire_ms", self.expire_ms),
            ("dial_timeout_ms", self.dial_timeout_ms),
            ("read_timeout_ms", self.read_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!(
                    "Forward rule '{}': {} must be positive",
                    self.from, field
                )));
            }
        }

        if let Some(tls) = &self.tls {
            if tls.cert.is_some() != tls.key.is_some() {
                return Err(ConfigError::Validation(format!(
                    "Forward rule '{}': tls cert and key must be given together",
                    self.from
                )));
            }
        }
        Ok(())
    }
}

fn default_from() -> String {
    ".".to_string()
}

fn default_max_fails() -> u32 {
    2
}

fn default_health_check_ms() -> u64 {
    500
}

fn default_expire_ms() -> u64 {
    10_000
}

fn default_dial_timeout_ms() -> u64 {
    4_000
}

fn default_read_timeout_ms() -> u64 {
    2_000
}
