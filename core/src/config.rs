//! Job and global configuration types
//!
//! A run is described by one [`RunConfig`] file (YAML or JSON):
//!
//! ```yaml
//! global:
//!   backoff: { min_delay: 100ms, max_delay: 30s, multiplier: 2.0 }
//!   flush_interval: 1s
//! job:
//!   name: health-check
//!   type: http
//!   count: 0
//!   interval: 0ms
//!   rate_limit: 50
//!   client: { timeout: 5s }
//!   request:
//!     method: GET
//!     url: "http://localhost:8080/health?n={{iteration}}"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backoff::{BackoffConfig, BackoffConfigError};
use crate::job::GateConfig;
use crate::template::RequestTemplateConfig;

/// Whether target details may appear in logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Failures are logged with method and host
    #[default]
    Standard,
    /// Configuration came through a protected channel; no target details in logs
    Confidential,
}

impl ExecutionMode {
    /// Whether target details must be withheld
    pub fn is_confidential(self) -> bool {
        matches!(self, ExecutionMode::Confidential)
    }
}

/// Settings shared by every job in a process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Backoff used by jobs that do not set their own
    pub backoff: BackoffConfig,

    /// How often traffic writers flush to the metrics sink
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Log redaction mode
    pub mode: ExecutionMode,

    /// Comma-separated proxy URLs applied to every job's client
    ///
    /// A template, rendered once when a job is built. Overrides the
    /// job's own `client.proxy_urls`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_urls: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            flush_interval: Duration::from_secs(1),
            mode: ExecutionMode::Standard,
            proxy_urls: None,
        }
    }
}

impl GlobalConfig {
    /// Set the default backoff
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the execution mode
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Route every job through the given proxies
    pub fn with_proxy_urls(mut self, proxy_urls: impl Into<String>) -> Self {
        self.proxy_urls = Some(proxy_urls.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backoff.validate().map_err(ConfigError::Backoff)?;
        if self.flush_interval.is_zero() {
            return Err(ConfigError::InvalidFlushInterval);
        }
        Ok(())
    }
}

/// Kind of job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Continuous request loop
    #[default]
    Http,
    /// One request, response returned to the caller
    HttpRequest,
}

/// One job's immutable settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Name used in logs and template context
    #[serde(default = "default_job_name")]
    pub name: String,

    /// Job kind
    #[serde(rename = "type", default)]
    pub kind: JobKind,

    /// Iteration budget, fixed interval and rate limit
    #[serde(flatten)]
    pub gate: GateConfig,

    /// Job-level backoff override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffConfig>,

    /// Transport client settings, decoded by the transport
    #[serde(default = "empty_object")]
    pub client: serde_json::Value,

    /// Request template
    pub request: RequestTemplateConfig,
}

/// Keys a job section may carry; `count`, `interval` and `rate_limit`
/// belong to the flattened gate
const JOB_KEYS: &[&str] = &[
    "name",
    "type",
    "count",
    "interval",
    "rate_limit",
    "backoff",
    "client",
    "request",
];

fn default_job_name() -> String {
    "job".to_string()
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl JobConfig {
    /// Create a continuous HTTP job for `request`
    pub fn new(name: impl Into<String>, request: RequestTemplateConfig) -> Self {
        Self {
            name: name.into(),
            kind: JobKind::Http,
            gate: GateConfig::default(),
            backoff: None,
            client: empty_object(),
            request,
        }
    }

    /// Set the iteration gate
    pub fn with_gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self
    }

    /// Set a job-level backoff override
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Set the transport client settings
    pub fn with_client(mut self, client: serde_json::Value) -> Self {
        self.client = client;
        self
    }

    /// Backoff to use given the global defaults
    pub fn effective_backoff(&self, global: &GlobalConfig) -> BackoffConfig {
        BackoffConfig::resolve(self.backoff.as_ref(), &global.backoff)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField("name"));
        }
        if self.request.url.trim().is_empty() {
            return Err(ConfigError::MissingField("request.url"));
        }
        if let Some(backoff) = &self.backoff {
            backoff.validate().map_err(ConfigError::Backoff)?;
        }
        if let Some(rps) = self.gate.rate_limit {
            if !rps.is_finite() || rps <= 0.0 {
                return Err(ConfigError::InvalidRateLimit(rps));
            }
        }
        if !self.client.is_object() {
            return Err(ConfigError::InvalidClient(
                "client settings must be a map".into(),
            ));
        }
        Ok(())
    }
}

/// Contents of a run configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Process-wide settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// The job to run
    pub job: JobConfig,
}

impl RunConfig {
    /// Parse YAML (or JSON, which is valid YAML)
    ///
    /// Unknown keys are rejected everywhere, including the job section whose
    /// gate fields are flattened.
    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;

        if let Some(job) = value.get("job").and_then(serde_yaml::Value::as_mapping) {
            for key in job.keys() {
                let key = key.as_str().unwrap_or("<non-string key>");
                if !JOB_KEYS.contains(&key) {
                    return Err(ConfigError::UnknownField(format!("job.{key}")));
                }
            }
        }

        serde_yaml::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a configuration file, then validate it
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&source)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate both sections
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.global.validate()?;
        self.job.validate()
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// File is not valid YAML/JSON for the expected shape
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// Key not recognised in the configuration file
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// Required field is missing or empty
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Invalid backoff parameters
    #[error("invalid backoff: {0}")]
    Backoff(BackoffConfigError),

    /// Rate limit must be positive
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(f64),

    /// Flush interval must be positive
    #[error("flush_interval must be greater than zero")]
    InvalidFlushInterval,

    /// Client settings could not be decoded
    #[error("invalid client configuration: {0}")]
    InvalidClient(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
global:
  backoff:
    min_delay: 50ms
    max_delay: 2s
    multiplier: 3
  flush_interval: 500ms
  mode: confidential
job:
  name: pinger
  type: http
  count: 10
  interval: 20ms
  rate_limit: 5.5
  backoff:
    min_delay: 100ms
    max_delay: 3200ms
    multiplier: 2
  client:
    timeout: 3s
  request:
    method: POST
    path: "http://localhost/{{iteration}}"
    headers:
      X-Test: "1"
    body: hello
"#;

    #[test]
    fn test_parse_full_file() {
        let config = RunConfig::from_yaml(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.global.flush_interval, Duration::from_millis(500));
        assert!(config.global.mode.is_confidential());
        assert_eq!(config.global.backoff.multiplier, 3.0);

        let job = &config.job;
        assert_eq!(job.name, "pinger");
        assert_eq!(job.kind, JobKind::Http);
        assert_eq!(job.gate.count, 10);
        assert_eq!(job.gate.interval, Duration::from_millis(20));
        assert_eq!(job.gate.rate_limit, Some(5.5));
        assert_eq!(job.client["timeout"], "3s");
        assert_eq!(job.request.method, "POST");
        assert_eq!(job.request.url, "http://localhost/{{iteration}}");
        assert_eq!(job.request.body, "hello");
    }

    #[test]
    fn test_job_backoff_overrides_global() {
        let config = RunConfig::from_yaml(SAMPLE).unwrap();
        let backoff = config.job.effective_backoff(&config.global);
        assert_eq!(backoff.min_delay, Duration::from_millis(100));
        assert_eq!(backoff.max_delay, Duration::from_millis(3200));

        let mut job = config.job.clone();
        job.backoff = None;
        assert_eq!(job.effective_backoff(&config.global), config.global.backoff);
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        let config = RunConfig::from_yaml(
            r#"{"job": {"type": "http-request", "request": {"url": "http://localhost/"}}}"#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.global, GlobalConfig::default());
        assert_eq!(config.job.name, "job");
        assert_eq!(config.job.kind, JobKind::HttpRequest);
        assert_eq!(config.job.gate, GateConfig::default());
        assert!(config.job.client.is_object());
        assert_eq!(config.job.request.method, "GET");
    }

    #[test]
    fn test_validation_failures() {
        let base = JobConfig::new("pinger", RequestTemplateConfig::get("http://localhost/"));
        assert!(base.validate().is_ok());

        let mut empty_name = base.clone();
        empty_name.name = " ".into();
        assert!(matches!(
            empty_name.validate(),
            Err(ConfigError::MissingField("name"))
        ));

        let no_url = JobConfig::new("pinger", RequestTemplateConfig::get(""));
        assert!(matches!(
            no_url.validate(),
            Err(ConfigError::MissingField("request.url"))
        ));

        let bad_rate = base
            .clone()
            .with_gate(GateConfig::default().with_rate_limit(0.0));
        assert!(matches!(
            bad_rate.validate(),
            Err(ConfigError::InvalidRateLimit(_))
        ));

        let bad_backoff = base.clone().with_backoff(BackoffConfig::new(
            Duration::from_secs(2),
            Duration::from_secs(1),
            2.0,
        ));
        assert!(matches!(bad_backoff.validate(), Err(ConfigError::Backoff(_))));

        let bad_client = base.with_client(serde_json::json!([1, 2]));
        assert!(matches!(
            bad_client.validate(),
            Err(ConfigError::InvalidClient(_))
        ));
    }

    #[test]
    fn test_global_validation() {
        let mut global = GlobalConfig::default();
        assert!(global.validate().is_ok());
        global.flush_interval = Duration::ZERO;
        assert!(matches!(
            global.validate(),
            Err(ConfigError::InvalidFlushInterval)
        ));
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = RunConfig::from_path("/nonexistent/surge.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_misspelled_job_key_is_rejected() {
        let err = RunConfig::from_yaml(
            "job:\n  rate_limt: 5\n  request:\n    url: http://localhost/\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownField(ref key) if key == "job.rate_limt"));

        let err = RunConfig::from_yaml(
            "job:\n  cuont: 3\n  request:\n    url: http://localhost/\n",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "unknown field: job.cuont");
    }

    #[test]
    fn test_unknown_global_and_top_level_keys() {
        let global = RunConfig::from_yaml(
            "global:\n  flush_intervl: 1s\njob:\n  request:\n    url: http://localhost/\n",
        );
        assert!(matches!(global, Err(ConfigError::Parse(_))));

        let top = RunConfig::from_yaml("jobs: []\njob:\n  request:\n    url: http://localhost/\n");
        assert!(matches!(top, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_global_proxy_urls() {
        let config = RunConfig::from_yaml(
            "global:\n  proxy_urls: \"http://a:3128,http://b:3128\"\njob:\n  request:\n    url: http://localhost/\n",
        )
        .unwrap();
        assert_eq!(
            config.global.proxy_urls.as_deref(),
            Some("http://a:3128,http://b:3128")
        );
        assert_eq!(GlobalConfig::default().proxy_urls, None);
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            RunConfig::from_yaml("job: [unterminated"),
            Err(ConfigError::Parse(_))
        ));
    }
}
