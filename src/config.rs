use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PolyscanConfig {
    pub stream: StreamConfig,
    pub analysis: AnalysisConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StreamConfig {
    /// Stream locator used until the user overrides the endpoint
    #[serde(default = "default_stream_url")]
    pub default_url: String,

    /// Port appended to manual addresses that do not carry one
    #[serde(default = "default_service_port")]
    pub service_port: u16,

    /// Fixed delay between reconnection attempts in milliseconds
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Time allowed to establish the HTTP connection in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Maximum gap between two frames before the stream counts as stalled
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,

    /// Upper bound for a single JPEG frame pulled off the stream
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Base URL of the classification backend
    #[serde(default = "default_analysis_base_url")]
    pub base_url: String,

    /// Path accepting the multipart image upload
    #[serde(default = "default_upload_path")]
    pub upload_path: String,

    /// Path returning previous detection records
    #[serde(default = "default_history_path")]
    pub history_path: String,

    /// Transport timeout for a single request in seconds
    #[serde(default = "default_analysis_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl StreamConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }
}

impl AnalysisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl PolyscanConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("stream.default_url", default_stream_url())?
            .set_default("stream.service_port", default_service_port() as i64)?
            .set_default("stream.retry_interval_ms", default_retry_interval_ms() as i64)?
            .set_default("stream.connect_timeout_ms", default_connect_timeout_ms() as i64)?
            .set_default("stream.stall_timeout_ms", default_stall_timeout_ms() as i64)?
            .set_default("stream.max_frame_bytes", default_max_frame_bytes() as i64)?
            .set_default("analysis.base_url", default_analysis_base_url())?
            .set_default("analysis.upload_path", default_upload_path())?
            .set_default("analysis.history_path", default_history_path())?
            .set_default("analysis.timeout_seconds", default_analysis_timeout() as i64)?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // Nested keys use a double underscore, e.g. POLYSCAN_STREAM__DEFAULT_URL
            .add_source(
                Environment::with_prefix("POLYSCAN")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: PolyscanConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.default_url.trim().is_empty() {
            return Err(ConfigError::Message(
                "Stream default_url must not be empty".to_string(),
            ));
        }

        if self.stream.service_port == 0 {
            return Err(ConfigError::Message(
                "Stream service_port must be greater than 0".to_string(),
            ));
        }

        if self.stream.retry_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Stream retry_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.stream.stall_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Stream stall_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.stream.max_frame_bytes < 4 {
            return Err(ConfigError::Message(
                "Stream max_frame_bytes is too small to hold a JPEG frame".to_string(),
            ));
        }

        if reqwest::Url::parse(&self.analysis.base_url).is_err() {
            return Err(ConfigError::Message(format!(
                "Analysis base_url '{}' is not a valid URL",
                self.analysis.base_url
            )));
        }

        let paths = [&self.analysis.upload_path, &self.analysis.history_path];
        if paths.iter().any(|path| !path.starts_with('/')) {
            return Err(ConfigError::Message(
                "Analysis paths must start with '/'".to_string(),
            ));
        }

        if self.analysis.timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Analysis timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for PolyscanConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig {
                default_url: default_stream_url(),
                service_port: default_service_port(),
                retry_interval_ms: default_retry_interval_ms(),
                connect_timeout_ms: default_connect_timeout_ms(),
                stall_timeout_ms: default_stall_timeout_ms(),
                max_frame_bytes: default_max_frame_bytes(),
            },
            analysis: AnalysisConfig {
                base_url: default_analysis_base_url(),
                upload_path: default_upload_path(),
                history_path: default_history_path(),
                timeout_seconds: default_analysis_timeout(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_stream_url() -> String {
    "http://esp32cam.local:81/stream".to_string()
}
fn default_service_port() -> u16 {
    81
}
fn default_retry_interval_ms() -> u64 {
    3000
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_stall_timeout_ms() -> u64 {
    5000
}
fn default_max_frame_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_analysis_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}
fn default_upload_path() -> String {
    "/upload".to_string()
}
fn default_history_path() -> String {
    "/api/history".to_string()
}
fn default_analysis_timeout() -> u64 {
    60
}

fn default_event_bus_capacity() -> usize {
    100
}
