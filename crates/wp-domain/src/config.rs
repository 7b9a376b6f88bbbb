//! Layered configuration: built-in defaults, an optional TOML overlay, then
//! environment variable overrides for the settings operators touch most.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub runs: RunsConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunsConfig {
    #[serde(default = "d_runs_root")]
    pub root: String,
    #[serde(default)]
    pub strict_repo_root: bool,
    /// Safety fuse for a single step's microloop: the number of retries a
    /// step gets before `max_iterations_reached` forces an exit, independent
    /// of how many steps the flow itself has.
    #[serde(default = "d_max_microloop_iterations")]
    pub max_microloop_iterations: u32,
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self { root: d_runs_root(), strict_repo_root: false, max_microloop_iterations: d_max_microloop_iterations() }
    }
}

fn d_runs_root() -> String {
    ".wp-runs".into()
}

fn d_max_microloop_iterations() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "d_default_budget_tokens")]
    pub default_budget_tokens: u64,
    #[serde(default = "d_stall_threshold")]
    pub stall_threshold: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_budget_tokens: d_default_budget_tokens(),
            stall_threshold: d_stall_threshold(),
        }
    }
}

fn d_default_budget_tokens() -> u64 {
    100_000
}

fn d_stall_threshold() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: d_bind_addr(), api_token: None, cors: CorsConfig::default() }
    }
}

fn d_bind_addr() -> String {
    "127.0.0.1:8080".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "d_git_timeout_secs")]
    pub git_timeout_secs: u64,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self { git_timeout_secs: d_git_timeout_secs() }
    }
}

fn d_git_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Load defaults, overlay an optional TOML file at `$WP_CONFIG`, then
    /// apply environment variable overrides for hot settings. Never panics
    /// on a missing config file — a missing `$WP_CONFIG` is not an error.
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(path) = std::env::var("WP_CONFIG") {
            config = Self::load_from_file(&path)?;
        }

        if let Ok(addr) = std::env::var("WP_BIND_ADDR") {
            config.server.bind_addr = addr;
        }
        if let Ok(token) = std::env::var("WP_API_TOKEN") {
            config.server.api_token = Some(token);
        }

        Ok(config)
    }

    fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|err| Error::Config(format!("reading {}: {err}", path.as_ref().display())))?;
        toml::from_str(&text).map_err(|err| Error::Config(format!("parsing {}: {err}", path.as_ref().display())))
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.server.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "server.bind_addr".into(),
                message: format!("\"{}\" is not a valid socket address", self.server.bind_addr),
            });
        }

        if self.server.api_token.is_none() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "server.api_token".into(),
                message: "no bearer token configured; control plane runs in dev mode".into(),
            });
        }

        if self.budget.default_budget_tokens == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "budget.default_budget_tokens".into(),
                message: "must be greater than 0".into(),
            });
        }

        issues
    }
}
