use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::connection::ConnectOptions;
use crate::container::{DEFAULT_FILAMENT_MM, DEFAULT_PRINT_SECONDS};
use crate::protocol::DEFAULT_PORT;

pub const DEFAULT_CONFIG_FILE: &str = "gxlink.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: Option<String>,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub print_seconds: u32,
    pub filament_mm: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            connect_timeout_ms: 1000,
            idle_timeout_ms: 5000,
            max_attempts: 5,
            retry_delay_ms: 2000,
            print_seconds: DEFAULT_PRINT_SECONDS,
            filament_mm: DEFAULT_FILAMENT_MM,
        }
    }
}

impl ClientConfig {
    /// Reads `path` (or `gxlink.toml`) if present, defaults otherwise.
    /// Nothing is ever written back.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let config_file = config_path.unwrap_or(DEFAULT_CONFIG_FILE);

        if Path::new(config_file).exists() {
            let content = std::fs::read_to_string(config_file)
                .with_context(|| format!("reading {}", config_file))?;
            let config: ClientConfig = toml::from_str(&content)
                .with_context(|| format!("parsing {}", config_file))?;
            tracing::debug!("Loaded config from {}", config_file);
            Ok(config)
        } else if config_path.is_some() {
            anyhow::bail!("config file not found: {}", config_file)
        } else {
            Ok(Self::default())
        }
    }

    pub fn address(&self) -> Result<String> {
        let host = self
            .host
            .as_deref()
            .context("no printer host given (use --host or set `host` in the config)")?;
        Ok(format!("{}:{}", host, self.port))
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            max_attempts: self.max_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}
