//! Configuration for helpdesk, read from `.helpdesk/helpdesk.toml`.
//!
//! Settings are layered: file, then environment, then CLI flags. Each layer
//! only overrides what it sets.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! port = 3000
//! db_path = ".helpdesk/helpdesk.db"
//! dev_mode = false
//!
//! [client]
//! server_url = "http://127.0.0.1:3000"
//!
//! [logging]
//! json = false
//! filter = "helpdesk=info,tower_http=info"
//! ```
//!
//! # Environment
//!
//! | Variable              | Overrides            |
//! |-----------------------|----------------------|
//! | `HELPDESK_PORT`       | `server.port`        |
//! | `HELPDESK_DB_PATH`    | `server.db_path`     |
//! | `HELPDESK_SERVER_URL` | `client.server_url`  |
//! | `HELPDESK_LOG_JSON`   | `logging.json`       |
//!
//! A `.env` file in the working directory is loaded at startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::crm::server::ServerConfig;

pub const CONFIG_DIR: &str = ".helpdesk";
pub const CONFIG_FILE: &str = "helpdesk.toml";

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_FILE: &str = "helpdesk.db";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Relative paths resolve against the project directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub dev_mode: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub json: bool,
    /// `EnvFilter` directives; `RUST_LOG` still wins when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// Contents of `helpdesk.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelpdeskToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl HelpdeskToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse helpdesk.toml")
    }

    /// Load `helpdesk.toml` from `config_dir`, or defaults when absent.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize helpdesk.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Server port (env → file → default).
    pub fn port(&self) -> Result<u16> {
        match std::env::var("HELPDESK_PORT") {
            Ok(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid HELPDESK_PORT '{}'", raw)),
            Err(_) => Ok(self.server.port.unwrap_or(DEFAULT_PORT)),
        }
    }

    /// Database path as configured (env → file), before resolution.
    pub fn db_path(&self) -> Option<PathBuf> {
        std::env::var("HELPDESK_DB_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| self.server.db_path.clone())
    }

    /// Base URL of the server the board client talks to (env → file → default).
    pub fn server_url(&self) -> String {
        std::env::var("HELPDESK_SERVER_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| self.client.server_url.clone())
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", self.server.port.unwrap_or(DEFAULT_PORT)))
    }

    /// JSON log output (env can override file).
    pub fn log_json(&self) -> bool {
        if let Ok(env_val) = std::env::var("HELPDESK_LOG_JSON") {
            return matches!(env_val.trim(), "1" | "true" | "yes");
        }
        self.logging.json
    }
}

/// Resolved configuration for one invocation: `helpdesk.toml` plus
/// environment, with CLI overrides applied by the command that needs them.
#[derive(Debug, Clone)]
pub struct HelpdeskConfig {
    pub project_dir: PathBuf,
    pub config_dir: PathBuf,
    pub toml: HelpdeskToml,
}

impl HelpdeskConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let config_dir = project_dir.join(CONFIG_DIR);
        let toml = HelpdeskToml::load_or_default(&config_dir)?;
        Ok(Self {
            project_dir,
            config_dir,
            toml,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Database path (CLI → env → file → `.helpdesk/helpdesk.db`).
    pub fn db_path(&self, cli: Option<PathBuf>) -> PathBuf {
        let path = cli
            .or_else(|| self.toml.db_path())
            .unwrap_or_else(|| self.config_dir.join(DEFAULT_DB_FILE));
        if path.is_absolute() {
            path
        } else {
            self.project_dir.join(path)
        }
    }

    /// Server settings with CLI overrides applied.
    pub fn server_config(
        &self,
        port: Option<u16>,
        db_path: Option<PathBuf>,
        dev: bool,
    ) -> Result<ServerConfig> {
        let port = match port {
            Some(p) => p,
            None => self.toml.port()?,
        };
        Ok(ServerConfig {
            port,
            db_path: self.db_path(db_path),
            dev_mode: dev || self.toml.server.dev_mode,
        })
    }

    /// Board client target (CLI → env → file → default).
    pub fn server_url(&self, cli: Option<String>) -> String {
        cli.unwrap_or_else(|| self.toml.server_url())
    }
}
