use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::SnapSchedError;

pub static CONFIG: OnceCell<Config> = OnceCell::new();

const ENV_PREFIX: &str = "SNAPSCHED_";
const DATA_DIR_ENV: &str = "SNAPSCHED_DATA_DIR";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub snapsched: String,
    pub http: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const SNAPSCHED_LEVEL: &str = "info";
    const HTTP_LEVEL: &str = "warn";

    fn default() -> Self {
        LoggingConfig {
            snapsched: Self::SNAPSCHED_LEVEL.to_string(),
            http: Self::HTTP_LEVEL.to_string(),
        }
    }

    /// Build the flexi_logger spec string. The http level applies to the
    /// client stack underneath the cluster connection.
    pub fn log_spec(&self) -> String {
        format!(
            "snapsched={}, reqwest={}, hyper={}, hyper_util={}",
            self.snapsched, self.http, self.http, self.http
        )
    }

    fn ensure_valid(&mut self) {
        self.snapsched = Self::valid_level("snapsched", &self.snapsched, Self::SNAPSCHED_LEVEL);
        self.http = Self::valid_level("http", &self.http, Self::HTTP_LEVEL);
    }

    fn valid_level(label: &str, original: &str, default: &str) -> String {
        let level = original.trim().to_ascii_lowercase();
        if Self::LOG_LEVELS.contains(&level.as_str()) {
            level
        } else {
            eprintln!(
                "Config error: {} log level of '{}' is invalid - using default of '{}'",
                label, original, default
            );
            default.to_owned()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    const HOST: &str = "127.0.0.1";
    const PORT: u16 = 8087;

    fn default() -> Self {
        ServerConfig {
            host: Self::HOST.to_owned(),
            port: Self::PORT,
        }
    }

    fn ensure_valid(&mut self) {
        if self.host.trim().is_empty() {
            eprintln!(
                "Config error: server host is empty - using default of '{}'",
                Self::HOST
            );
            self.host = Self::HOST.to_owned();
        }
        if self.port == 0 {
            eprintln!(
                "Config error: server port of 0 is invalid - using default of '{}'",
                Self::PORT
            );
            self.port = Self::PORT;
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub timeout_secs: u64,
    pub accept_invalid_certs: bool,
}

impl ClusterConfig {
    const URL: &str = "http://localhost:9200";
    const TIMEOUT_SECS: u64 = 60;

    fn default() -> Self {
        ClusterConfig {
            url: Self::URL.to_owned(),
            username: String::new(),
            password: String::new(),
            timeout_secs: Self::TIMEOUT_SECS,
            accept_invalid_certs: false,
        }
    }

    /// Credentials are only sent when a username is configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() {
            None
        } else {
            Some((self.username.as_str(), self.password.as_str()))
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn ensure_valid(&mut self) {
        let trimmed = self.url.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            eprintln!(
                "Config error: cluster url of '{}' is invalid - using default of '{}'",
                self.url,
                Self::URL
            );
            self.url = Self::URL.to_owned();
        } else {
            self.url = trimmed.to_owned();
        }

        if self.timeout_secs == 0 {
            eprintln!(
                "Config error: cluster timeout of 0 is invalid - using default of '{}'",
                Self::TIMEOUT_SECS
            );
            self.timeout_secs = Self::TIMEOUT_SECS;
        }
    }
}

/// Flags sent with every snapshot-create request. `include_global_state`
/// is not here because it is a per-schedule setting.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SnapshotOptions {
    pub ignore_unavailable: bool,
    pub partial: bool,
    pub wait_for_completion: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        SnapshotOptions {
            ignore_unavailable: true,
            partial: false,
            wait_for_completion: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub sweep_interval_secs: u64,
    // 0 disables the per-schedule timeout
    pub execution_timeout_secs: u64,
}

impl SchedulerConfig {
    const SWEEP_INTERVAL_SECS: u64 = 3600;

    fn default() -> Self {
        SchedulerConfig {
            enabled: true,
            sweep_interval_secs: Self::SWEEP_INTERVAL_SECS,
            execution_timeout_secs: 0,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn execution_timeout(&self) -> Option<Duration> {
        match self.execution_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    fn ensure_valid(&mut self) {
        if self.sweep_interval_secs == 0 {
            eprintln!(
                "Config error: sweep interval of 0 is invalid - using default of '{}'",
                Self::SWEEP_INTERVAL_SECS
            );
            self.sweep_interval_secs = Self::SWEEP_INTERVAL_SECS;
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub cluster: ClusterConfig,
    pub snapshots: SnapshotOptions,
    pub scheduler: SchedulerConfig,
}

impl Config {
    pub fn default_config() -> Self {
        Config {
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
            cluster: ClusterConfig::default(),
            snapshots: SnapshotOptions::default(),
            scheduler: SchedulerConfig::default(),
        }
    }

    /// Resolve the directory holding config.toml, the database and logs.
    /// `SNAPSCHED_DATA_DIR` takes precedence over the platform default.
    pub fn data_dir() -> Result<PathBuf, SnapSchedError> {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                return Ok(PathBuf::from(dir));
            }
        }

        ProjectDirs::from("", "", "snapsched")
            .map(|dirs| dirs.data_local_dir().to_path_buf())
            .ok_or_else(|| SnapSchedError::Error("Unable to determine data directory".into()))
    }

    /// Loads the configuration from config.toml in the data directory, with
    /// `SNAPSCHED_` environment variables layered on top.
    /// If the file is missing or fails to parse, defaults are used.
    /// Additionally, writes the default config to disk if no file exists.
    pub fn load_config(data_dir: &Path) -> Self {
        let config_path = data_dir.join("config.toml");

        let default_config = Self::default_config();

        // If the config file doesn't exist, write the default configuration to disk.
        if !config_path.exists() {
            if let Err(e) = fs::create_dir_all(data_dir) {
                eprintln!(
                    "Failed to create configuration directory {}: {}",
                    data_dir.display(),
                    e
                );
            }
            if let Ok(toml_string) = toml::to_string_pretty(&default_config) {
                if let Err(e) = fs::write(&config_path, toml_string) {
                    eprintln!(
                        "Failed to write default config to {}: {}",
                        config_path.display(),
                        e
                    );
                }
            } else {
                eprintln!("Failed to serialize default config.");
            }
        }

        let figment = Figment::from(Serialized::defaults(default_config.clone()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config: Config = figment.extract().unwrap_or_else(|err| {
            eprintln!(
                "Could not load config file {}: {}. Using default configuration.",
                config_path.display(),
                err
            );
            default_config
        });

        config.ensure_valid();

        config
    }

    /// Install the loaded configuration. Only the first call has any effect.
    pub fn init(config: Config) {
        if CONFIG.set(config).is_err() {
            log::warn!("Configuration already initialized - ignoring reload");
        }
    }

    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Self::default_config)
    }

    pub fn get_server_host() -> String {
        Self::get().server.host.clone()
    }

    pub fn get_server_port() -> u16 {
        Self::get().server.port
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
        self.server.ensure_valid();
        self.cluster.ensure_valid();
        self.scheduler.ensure_valid();
    }
}
