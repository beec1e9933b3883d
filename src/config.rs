//! Rule-set configuration
//!
//! One TOML file describes one watched rule-set: where to search, how to
//! group and display events, the rules, and where to send notifications.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use crate::alerts::NotifyTarget;
use crate::rules::{validate_rules, Rule};
use crate::search::{RetrievalConfig, Term};

/// Polling faster than this is not allowed
pub const MIN_CHECK_INTERVAL_SECS: u64 = 10;

/// Upper bound for every configured span (window, heartbeat, rule duration)
pub const MAX_SPAN_SECS: u64 = 100 * 365 * 24 * 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Job name used in logs (default: config file stem)
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_check_interval", rename = "check_interval_s")]
    pub check_interval_secs: u64,
    /// Length of the sliding query window
    #[serde(default = "default_duration", rename = "duration_s")]
    pub duration_secs: u64,
    /// Quiet period after which a heartbeat is sent
    #[serde(default = "default_heartbeat", rename = "heartbeat_s")]
    pub heartbeat_secs: u64,
    /// Grouping dimensions, each an ordered list of candidate fields
    #[serde(default)]
    pub group_keys: Vec<Vec<String>>,
    /// Fields of a group's latest event shown in alerts
    #[serde(default)]
    pub show_keys: Vec<String>,
    /// Candidate fields for the event time
    #[serde(default = "default_time_key")]
    pub time_key: Vec<String>,
    /// Send a greeting when the job starts
    #[serde(default)]
    pub hi: bool,
    #[serde(default)]
    pub custom: Messages,
    #[serde(default)]
    pub es: EsConfig,
    #[serde(default)]
    pub ding: DingConfig,
    #[serde(default)]
    pub lark: LarkConfig,
    #[serde(default)]
    pub webhook: Vec<WebhookConfig>,
    #[serde(default)]
    pub rules: BTreeMap<String, Rule>,
}

/// Titles, colors and bodies of the non-alert notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    pub hi_title: String,
    pub hi_color: String,
    pub hi_content: String,
    pub heartbeat_title: String,
    pub heartbeat_color: String,
    pub heartbeat_content: String,
    pub alert_color: String,
    pub recover_title: String,
    pub recover_color: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            hi_title: "logwarden started".to_string(),
            hi_color: "blue".to_string(),
            hi_content: "Watching logs.".to_string(),
            heartbeat_title: "No errors in the last 24 hours".to_string(),
            heartbeat_color: "green".to_string(),
            heartbeat_content: "All quiet.".to_string(),
            alert_color: "red".to_string(),
            recover_title: "Errors cleared".to_string(),
            recover_color: "green".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsConfig {
    #[serde(default)]
    pub address: Vec<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub index: String,
    /// Page size of a single search
    #[serde(default = "default_page_size")]
    pub size: usize,
    /// Ceiling when a dense millisecond needs a bigger page
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    #[serde(default = "default_range_time_name")]
    pub range_time_name: String,
    #[serde(default = "default_timeout", rename = "timeout_s")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub term: Vec<TermConfig>,
}

impl Default for EsConfig {
    fn default() -> Self {
        Self {
            address: Vec::new(),
            username: String::new(),
            password: String::new(),
            index: String::new(),
            size: default_page_size(),
            max_page_size: default_max_page_size(),
            range_time_name: default_range_time_name(),
            timeout_secs: default_timeout(),
            term: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermConfig {
    pub key: String,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DingConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub secret: String,
    /// Phone numbers mentioned on alerts
    #[serde(default)]
    pub mobiles: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LarkConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_check_interval() -> u64 {
    60
}

fn default_duration() -> u64 {
    600
}

fn default_heartbeat() -> u64 {
    24 * 3600
}

fn default_time_key() -> Vec<String> {
    vec![default_range_time_name()]
}

fn default_page_size() -> usize {
    500
}

fn default_max_page_size() -> usize {
    10_000
}

fn default_range_time_name() -> String {
    "@timestamp".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl AppConfig {
    /// Read, normalise and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "default".to_string());
        Self::from_toml_str(&content, &stem)
    }

    /// Parse, normalise and validate; `default_name` is used when the file
    /// does not set `name`.
    pub fn from_toml_str(content: &str, default_name: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.normalize(default_name);
        config.validate()?;
        Ok(config)
    }

    fn normalize(&mut self, default_name: &str) {
        if self.name.is_empty() {
            self.name = default_name.to_string();
        }

        if self.check_interval_secs < MIN_CHECK_INTERVAL_SECS {
            tracing::warn!(
                job = %self.name,
                configured = self.check_interval_secs,
                minimum = MIN_CHECK_INTERVAL_SECS,
                "Check interval below minimum, raising it"
            );
            self.check_interval_secs = MIN_CHECK_INTERVAL_SECS;
        }

        for (id, rule) in self.rules.iter_mut() {
            rule.id = id.clone();
            if rule.name.is_empty() {
                rule.name = id.clone();
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.es.address.is_empty() {
            return invalid("es.address must list at least one node".to_string());
        }
        if self.es.index.is_empty() {
            return invalid("es.index must not be empty".to_string());
        }
        if self.es.size == 0 {
            return invalid("es.size must be at least 1".to_string());
        }
        if self.es.max_page_size < self.es.size {
            return invalid(format!(
                "es.max_page_size ({}) is smaller than es.size ({})",
                self.es.max_page_size, self.es.size
            ));
        }
        if self.duration_secs == 0 {
            return invalid("duration_s must be at least 1".to_string());
        }
        for (key, secs) in [
            ("check_interval_s", self.check_interval_secs),
            ("duration_s", self.duration_secs),
            ("heartbeat_s", self.heartbeat_secs),
        ] {
            if secs > MAX_SPAN_SECS {
                return invalid(format!("{} ({}) exceeds {} seconds", key, secs, MAX_SPAN_SECS));
            }
        }
        if let Some(rule) = self
            .rules
            .values()
            .find(|rule| rule.duration < 0 || rule.duration as u64 > MAX_SPAN_SECS)
        {
            return invalid(format!(
                "rule '{}' duration ({}) must be between 0 and {} seconds",
                rule.id, rule.duration, MAX_SPAN_SECS
            ));
        }
        if let Some(idx) = self.group_keys.iter().position(|dim| dim.is_empty()) {
            return invalid(format!("group_keys[{}] has no candidate fields", idx));
        }
        if self.time_key.is_empty() {
            return invalid("time_key must list at least one field".to_string());
        }

        let rules = self.rules();
        validate_rules(&rules).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn duration_ms(&self) -> i64 {
        secs_to_millis(self.duration_secs)
    }

    pub fn heartbeat_period_ms(&self) -> i64 {
        secs_to_millis(self.heartbeat_secs)
    }

    pub fn retrieval(&self) -> RetrievalConfig {
        RetrievalConfig {
            index: self.es.index.clone(),
            page_size: self.es.size,
            max_page_size: self.es.max_page_size,
            range_field: self.es.range_time_name.clone(),
            terms: self
                .es
                .term
                .iter()
                .map(|t| Term {
                    key: t.key.clone(),
                    values: t.values.clone(),
                })
                .collect(),
        }
    }

    /// Rules ordered by ID
    pub fn rules(&self) -> Vec<Rule> {
        self.rules.values().cloned().collect()
    }

    /// Enabled notification targets; falls back to logging when none are
    /// configured.
    pub fn targets(&self) -> Vec<NotifyTarget> {
        let mut targets = Vec::new();
        if self.lark.enable {
            targets.push(NotifyTarget::Lark {
                url: self.lark.url.clone(),
                secret: self.lark.secret.clone(),
            });
        }
        if self.ding.enable {
            targets.push(NotifyTarget::DingTalk {
                url: self.ding.url.clone(),
                secret: self.ding.secret.clone(),
                mobiles: self.ding.mobiles.clone(),
            });
        }
        for hook in &self.webhook {
            targets.push(NotifyTarget::Webhook {
                url: hook.url.clone(),
                headers: hook.headers.clone(),
            });
        }
        if targets.is_empty() {
            targets.push(NotifyTarget::Log);
        }
        targets
    }

    /// Summary of the query cadence, used in recovery notices
    pub fn query_time_info(&self) -> String {
        format!(
            "query window: {}\npolling interval: {}\n",
            format_duration(self.duration()),
            format_duration(self.check_interval())
        )
    }
}

fn secs_to_millis(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX).saturating_mul(1000)
}

/// Compact `1h2m3s` rendering, zero components omitted
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, total % 3600 / 60, total % 60);

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if seconds > 0 || out.is_empty() {
        out.push_str(&format!("{}s", seconds));
    }
    out
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
