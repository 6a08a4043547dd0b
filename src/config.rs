//! Configuration management for couchdb-check
//!
//! Handles loading and validating the check configuration from YAML files.
//! The layout follows the agent convention of a shared `init_config` block
//! plus a list of `instances`, one per monitored CouchDB target.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Request timeout applied when an instance does not configure one (seconds)
pub const DEFAULT_TIMEOUT_SECS: f64 = 5.0;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Error reading the configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Error parsing the configuration file
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation error
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Settings shared by every instance
    #[serde(default)]
    pub init_config: InitConfig,

    /// Monitored CouchDB targets
    #[serde(default)]
    pub instances: Vec<Instance>,
}

/// Shared check settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitConfig {
    /// Expected server version. Informational only; the check always probes.
    pub version: Option<String>,
}

/// One monitored CouchDB target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Base server URL, e.g. `http://localhost:5984`
    pub server: Option<String>,

    /// Optional username for basic auth
    pub user: Option<String>,

    /// Optional password for basic auth
    pub password: Option<String>,

    /// Request timeout in seconds
    pub timeout: Option<f64>,

    /// Node name (`node1@127.0.0.1`), required for CouchDB 2.x
    pub name: Option<String>,

    /// Only these databases are polled when set
    pub db_whitelist: Option<Vec<String>>,

    /// Databases never polled (CouchDB 1.x)
    #[serde(default)]
    pub db_blacklist: Vec<String>,
}

impl Instance {
    /// Create an instance pointing at `server`
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: Some(server.into()),
            ..Self::default()
        }
    }

    /// Set basic auth credentials
    pub fn with_auth(mut self, user: &str, password: &str) -> Self {
        self.user = Some(user.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// Set the node name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Set the request timeout in seconds
    pub fn with_timeout(mut self, secs: f64) -> Self {
        self.timeout = Some(secs);
        self
    }

    /// Restrict polling to the given databases
    pub fn with_whitelist(mut self, dbs: &[&str]) -> Self {
        self.db_whitelist = Some(dbs.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Exclude the given databases from polling
    pub fn with_blacklist(mut self, dbs: &[&str]) -> Self {
        self.db_blacklist = dbs.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Credentials, only when both user and password are present
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.user, &self.password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }

    /// Effective request timeout
    ///
    /// Values `Duration` cannot represent (negative, NaN, overflowing) fall
    /// back to the default.
    pub fn timeout(&self) -> Duration {
        self.timeout
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or_else(|| Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS))
    }

    /// Short label used in logs
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.server.as_deref())
            .unwrap_or("<unnamed>")
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or fails validation
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Missing `server`/`name` fields are left to the check itself, which
    /// reports them per run.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.instances.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one instance must be configured".to_string(),
            ));
        }

        for (index, instance) in self.instances.iter().enumerate() {
            if let Some(timeout) = instance.timeout {
                if timeout <= 0.0 || Duration::try_from_secs_f64(timeout).is_err() {
                    return Err(ConfigError::ValidationError(format!(
                        "Instance {} ({}): timeout must be a positive number of seconds",
                        index,
                        instance.label()
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_instance() {
        let yaml = r#"
init_config:
  version: "2.0.0"
instances:
  - server: http://127.0.0.1:5984
    user: dduser
    password: pawprint
    name: node1@127.0.0.1
    timeout: 2
    db_whitelist: [kennel]
    db_blacklist: [_replicator]
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.init_config.version.as_deref(), Some("2.0.0"));
        let instance = &config.instances[0];
        assert_eq!(instance.server.as_deref(), Some("http://127.0.0.1:5984"));
        assert_eq!(instance.credentials(), Some(("dduser", "pawprint")));
        assert_eq!(instance.timeout(), Duration::from_secs(2));
        assert_eq!(instance.db_whitelist, Some(vec!["kennel".to_string()]));
        assert_eq!(instance.db_blacklist, vec!["_replicator".to_string()]);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml("instances:\n  - server: http://localhost:5984\n").unwrap();
        let instance = &config.instances[0];
        assert_eq!(instance.timeout(), Duration::from_secs(5));
        assert!(instance.credentials().is_none());
        assert!(instance.db_whitelist.is_none());
        assert!(instance.db_blacklist.is_empty());
        assert!(config.init_config.version.is_none());
    }

    #[test]
    fn test_credentials_need_both_fields() {
        let mut instance = Instance::new("http://localhost:5984");
        instance.user = Some("admin".to_string());
        assert!(instance.credentials().is_none());
    }

    #[test]
    fn test_missing_server_is_not_a_validation_error() {
        let config = Config::from_yaml("instances:\n  - name: node1@127.0.0.1\n").unwrap();
        assert!(config.instances[0].server.is_none());
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::from_yaml("instances: []\n").is_err());
        assert!(Config::from_yaml(
            "instances:\n  - server: http://localhost:5984\n    timeout: 0\n"
        )
        .is_err());
    }

    #[test]
    fn test_unrepresentable_timeout_is_rejected() {
        for timeout in ["1.0e30", "-3", ".nan", ".inf"] {
            let yaml = format!(
                "instances:\n  - server: http://localhost:5984\n    timeout: {}\n",
                timeout
            );
            assert!(
                matches!(Config::from_yaml(&yaml), Err(ConfigError::ValidationError(_))),
                "timeout {} accepted",
                timeout
            );
        }
    }

    #[test]
    fn test_unrepresentable_timeout_falls_back_to_default() {
        let default = Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS);
        for secs in [1.0e30, -1.0, f64::NAN, f64::INFINITY] {
            let instance = Instance::new("http://localhost:5984").with_timeout(secs);
            assert_eq!(instance.timeout(), default, "timeout {}", secs);
        }
        let instance = Instance::new("http://localhost:5984").with_timeout(0.25);
        assert_eq!(instance.timeout(), Duration::from_millis(250));
    }
}
