use std::collections::HashSet;
use std::time::Duration;
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitoring::validation;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    ReadFailed { path: path::PathBuf, source: std::io::Error },

    #[error("failed to write config {}: {source}", path.display())]
    WriteFailed { path: path::PathBuf, source: std::io::Error },

    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("no config path available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// One endpoint to monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
}

fn default_method() -> String {
    "GET".into()
}

fn default_expected_status() -> u16 {
    200
}

impl ServiceConfig {
    /// A `GET` service expecting `200`
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            method: default_method(),
            expected_status: default_expected_status(),
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_expected_status(mut self, expected_status: u16) -> Self {
        self.expected_status = expected_status;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Supervisor {
    /// Consecutive failed cycles before the scheduler restarts itself
    pub max_consecutive_failures: u32,
    pub cooldown_secs: u64,
    /// Give up after this many self-restarts; unbounded when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<u32>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self { max_consecutive_failures: 5, cooldown_secs: 10, max_restarts: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub bind: String,
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), port: 3000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub check_interval_secs: u64,
    pub retention_days: u32,
    pub compaction_interval_secs: u64,
    pub probe_timeout_secs: u64,
    pub warmup_secs: u64,
    pub database_path: path::PathBuf,
    pub supervisor: Supervisor,
    pub server: Server,
    pub services: Vec<ServiceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            retention_days: 7,
            compaction_interval_secs: 24 * 3600,
            probe_timeout_secs: 15,
            warmup_secs: 5,
            database_path: path::PathBuf::from("data/status.jsonl"),
            supervisor: Supervisor::default(),
            server: Server::default(),
            services: vec![ServiceConfig::new("Example", "https://example.com")],
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/vigil/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("vigil/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Monitoring")?;
        write_1(f, "Check Interval (s)", &self.check_interval_secs)?;
        write_1(f, "Probe Timeout (s)", &self.probe_timeout_secs)?;
        write_1(f, "Warm-up (s)", &self.warmup_secs)?;
        write_title_1(f, "Storage")?;
        write_1(f, "Database Path", &self.database_path.display())?;
        write_1(f, "Retention (days)", &self.retention_days)?;
        write_1(f, "Compaction Interval (s)", &self.compaction_interval_secs)?;
        write_title_1(f, "Supervisor")?;
        write_1(f, "Max Consecutive Failures", &self.supervisor.max_consecutive_failures)?;
        write_1(f, "Cool-down (s)", &self.supervisor.cooldown_secs)?;
        match self.supervisor.max_restarts {
            Some(max) => write_1(f, "Max Restarts", &max)?,
            None => write_1(f, "Max Restarts", &"unbounded")?,
        }
        write_title_1(f, "Server")?;
        write_1(f, "Bind Address", &self.server.bind)?;
        write_1(f, "Port", &self.server.port)?;
        write_title_1(f, "Services")?;
        for service in &self.services {
            write_1(f, &service.name, &service.url)?;
            write_2(f, "Method", &service.method)?;
            write_2(f, "Expected Status", &service.expected_status)?;
        }

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/vigil/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| env::var(name).ok());
    }

    /// Apply overrides from `lookup`; unparsable values are ignored.
    ///
    /// `CHECK_INTERVAL_MS` is rounded up to whole seconds.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ms) = lookup("CHECK_INTERVAL_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.check_interval_secs = ms.div_ceil(1000);
        }
        if let Some(days) = lookup("DATA_RETENTION_DAYS").and_then(|v| v.parse().ok()) {
            self.retention_days = days;
        }
        if let Some(port) = lookup("PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(path) = lookup("VIGIL_DATABASE_PATH").filter(|v| !v.trim().is_empty()) {
            self.database_path = path::PathBuf::from(path);
        }
    }

    /// Reject configurations with nothing useful to monitor
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.services.is_empty() {
            return Err(ConfigError::Invalid("no services configured".into()));
        }

        let mut names = HashSet::new();
        for service in &self.services {
            validation::validate_service(service)
                .map_err(|e| ConfigError::Invalid(format!("service '{}': {e}", service.name)))?;
            if !names.insert(service.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate service name '{}'", service.name)));
            }
        }

        let invalid = |e: anyhow::Error| ConfigError::Invalid(e.to_string());
        validation::validate_check_interval(self.check_interval_secs).map_err(invalid)?;
        validation::validate_timeout(self.probe_timeout_secs).map_err(invalid)?;

        if self.retention_days == 0 {
            return Err(ConfigError::Invalid("retention_days must be at least 1".into()));
        }
        if self.compaction_interval_secs == 0 {
            return Err(ConfigError::Invalid("compaction_interval_secs must be at least 1".into()));
        }
        if self.supervisor.max_consecutive_failures == 0 {
            return Err(ConfigError::Invalid(
                "supervisor.max_consecutive_failures must be at least 1".into(),
            ));
        }

        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.warmup_secs)
    }

    pub fn compaction_interval(&self) -> Duration {
        Duration::from_secs(self.compaction_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_service_defaults() {
        let service: ServiceConfig = toml::from_str(
            r#"
            name = "api"
            url = "https://api.example.com"
            "#,
        )
        .unwrap();

        assert_eq!(service.method, "GET");
        assert_eq!(service.expected_status, 200);
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            check_interval_secs = 120
            retention_days = 14
            database_path = "/var/lib/vigil/status.jsonl"

            [supervisor]
            max_consecutive_failures = 3

            [[services]]
            name = "relay"
            url = "https://relay.example.com"
            method = "HEAD"
            expectedStatus = 204
            "#,
        )
        .unwrap();

        assert_eq!(config.check_interval_secs, 120);
        assert_eq!(config.retention_days, 14);
        assert_eq!(config.probe_timeout_secs, 15);
        assert_eq!(config.supervisor.max_consecutive_failures, 3);
        assert_eq!(config.supervisor.cooldown_secs, 10);
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].expected_status, 204);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_writes_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config");

        let config = Config::from_config(Some(&path)).unwrap();

        assert!(dir.path().join("nested/config.toml").exists());
        assert_eq!(config.check_interval_secs, 60);
        assert!(config.validate().is_ok());

        let reloaded = Config::from_config(Some(&path)).unwrap();
        assert_eq!(reloaded.services, config.services);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CHECK_INTERVAL_MS", "300000"),
            ("DATA_RETENTION_DAYS", "10"),
            ("PORT", "not-a-port"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.check_interval_secs, 300);
        assert_eq!(config.retention_days, 10);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_sub_second_interval_rounds_up() {
        let mut config = Config::default();
        config.apply_overrides(|name| (name == "CHECK_INTERVAL_MS").then(|| "250".to_string()));

        assert_eq!(config.check_interval_secs, 1);
        assert!(config.validate().is_ok());

        config.apply_overrides(|name| (name == "CHECK_INTERVAL_MS").then(|| "1500".to_string()));
        assert_eq!(config.check_interval_secs, 2);
    }

    #[test]
    fn test_validate_rejects_empty_and_duplicates() {
        let mut config = Config { services: Vec::new(), ..Config::default() };
        assert!(config.validate().is_err());

        config.services = vec![
            ServiceConfig::new("api", "https://a.example.com"),
            ServiceConfig::new("api", "https://b.example.com"),
        ];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(msg)) if msg.contains("duplicate")));
    }

    #[test]
    fn test_validate_rejects_missing_url() {
        let config = Config { services: vec![ServiceConfig::new("api", "")], ..Config::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut config = Config::default();
        config.supervisor.max_consecutive_failures = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_display_lists_services() {
        let rendered = Config::default().to_string();
        assert!(rendered.contains("Example: https://example.com"));
        assert!(rendered.contains("Max Restarts: unbounded"));
    }
}
