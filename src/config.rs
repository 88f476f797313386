//! Configuration for the KML service.
use crate::error::ConfigError;
use serde;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "src/config.json";

/// Environment variable that points at an alternative config file.
pub const CONFIG_PATH_ENV: &str = "REPEATER_KML_CONFIG";

#[derive(Debug, serde::Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// The node status API that is polled every refresh
    pub source_url: String,

    /// Interface the HTTP server binds to
    pub http_host: String,

    /// The port on which the HTTP server will listen
    /// Overridden by the `PORT` environment variable when present
    pub http_port: u16,

    /// The interval in seconds between the end of one refresh and the start of the next
    pub refresh_interval_sec: u64,

    /// Upper bound on a single fetch of the node list, in milliseconds
    pub fetch_timeout_ms: u64,

    /// TCP keep alive time in seconds
    pub tcp_keepalive_time_sec: u64,

    /// `<name>` of the generated KML document
    pub document_name: String,

    /// When set, every generated document is also written to this path
    pub output_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source_url: "https://stats.nggmrs.net/api/nodes".into(),
            http_host: "0.0.0.0".into(),
            http_port: 8080,
            refresh_interval_sec: 300,
            fetch_timeout_ms: 30_000,
            tcp_keepalive_time_sec: 5,
            document_name: "NGGMRS Repeater Status".into(),
            output_path: None,
        }
    }
}

impl Config {
    /// Load the configuration from `REPEATER_KML_CONFIG`, falling back to
    /// `src/config.json`. A missing file means all defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());

        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            log::warn!("Config file {} not found, using defaults", path);
            Config::default()
        };

        if let Ok(port) = std::env::var("PORT") {
            config.apply_port_override(&port);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_data = fs::read_to_string(path)?;
        Self::from_json(&config_data)
    }

    pub fn from_json(config_data: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(config_data)?)
    }

    /// Applies a `PORT`-style override. Unparseable values are ignored.
    pub fn apply_port_override(&mut self, port: &str) {
        match port.trim().parse::<u16>() {
            Ok(port) => self.http_port = port,
            Err(_) => log::warn!("Ignoring invalid PORT value {:?}", port),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = url::Url::parse(&self.source_url).map_err(|e| {
            ConfigError::Invalid(format!("source_url {:?}: {}", self.source_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "source_url must be http or https, got {}",
                parsed.scheme()
            )));
        }
        if self.refresh_interval_sec == 0 {
            return Err(ConfigError::Invalid(
                "refresh_interval_sec must be greater than zero".into(),
            ));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "fetch_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_sec)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}
