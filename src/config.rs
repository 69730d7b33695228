use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File names searched in the current directory, in order.
const CANDIDATES: [&str; 4] = [
    "jenkins-dash.toml",
    "jenkins-dash.json",
    "jenkins-dash.yaml",
    "jenkins-dash.yml",
];

/// Configuration file structure for jenkins-dash.
///
/// Every field has a default, so an empty or missing file is valid. Command
/// line flags and environment variables override what is loaded here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Jenkins connection
    #[serde(default)]
    pub jenkins: JenkinsConfig,

    /// Refresh cache behaviour
    #[serde(default)]
    pub dashboard: DashboardConfig,

    /// Web UI
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JenkinsConfig {
    /// Jenkins base URL, may embed `user:token@`
    pub url: Option<String>,

    pub username: Option<String>,

    pub api_token: Option<String>,

    /// Verify TLS certificates
    #[serde(default)]
    pub verify_ssl: bool,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DashboardConfig {
    /// Seconds between background refreshes
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Maximum number of jobs in the latest builds section
    #[serde(default = "default_latest_limit")]
    pub latest_limit: usize,

    /// How long an on-demand refresh may keep a request waiting
    #[serde(default = "default_on_demand_timeout_secs")]
    pub on_demand_timeout_secs: u64,

    /// How long shutdown waits for an in-flight refresh
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WebConfig {
    /// Listen address of the web UI
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for JenkinsConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            api_token: None,
            verify_ssl: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            latest_limit: default_latest_limit(),
            on_demand_timeout_secs: default_on_demand_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_refresh_interval_secs() -> u64 {
    30
}

fn default_latest_limit() -> usize {
    20
}

fn default_on_demand_timeout_secs() -> u64 {
    5
}

fn default_shutdown_grace_secs() -> u64 {
    2
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./jenkins-dash.toml, .json, .yaml, .yml
    /// 3. `<config dir>/jenkins-dash/config.toml`
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let found = CANDIDATES
            .iter()
            .map(PathBuf::from)
            .chain(user_config_path())
            .find(|path| path.exists());

        match found {
            Some(path) => {
                log::debug!("Loading configuration from {}", path.display());
                Self::load_from_path(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => {
                // Try TOML first, then JSON, then YAML
                toml::from_str(&contents)
                    .or_else(|_| serde_json::from_str(&contents))
                    .or_else(|_| serde_yaml::from_str(&contents))
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))
            }
        }
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("jenkins-dash").join("config.toml"))
}
