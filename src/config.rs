//! Top-level configuration file for the `stagectl` server.
//!
//! ```toml
//! log_level = "info"
//!
//! [stage]
//! axis = 1
//! completion = "status_polling"
//!
//! [stage.serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 57600
//!
//! [server]
//! socket_path = "/tmp/stagectl.sock"
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::socket_server::config::SocketServerConfig;
use crate::stage::config::StageConfig;
use crate::stage_manager::config::ManagerConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// trace, debug, info, warn or error
    pub log_level: Option<String>,
    pub stage: StageConfig,
    pub manager: ManagerConfig,
    pub server: SocketServerConfig,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: AppConfig = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(level) = &self.log_level {
            if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
                bail!("Invalid log_level '{}'", level);
            }
        }
        if self.stage.serial.baud_rate == 0 {
            bail!("stage.serial.baud_rate must be non-zero");
        }
        let timing = &self.stage.timing;
        if timing.poll_interval_ms == 0 || timing.tolerance_poll_interval_ms == 0 {
            bail!("Poll intervals must be non-zero");
        }
        if timing.tolerance_mm <= 0.0 {
            bail!("stage.timing.tolerance_mm must be positive");
        }
        if self.manager.queue_capacity == 0 {
            bail!("manager.queue_capacity must be non-zero");
        }
        Ok(())
    }

    pub fn log_level(&self) -> tracing::Level {
        match self.log_level.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("trace") => tracing::Level::TRACE,
            Some("debug") => tracing::Level::DEBUG,
            Some("warn") => tracing::Level::WARN,
            Some("error") => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }

    pub fn example_toml() -> String {
        toml::to_string_pretty(&AppConfig::default()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::completion::CompletionStrategy;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.stage.serial.baud_rate, 57600);
        assert_eq!(config.stage.axis.0, 1);
        assert_eq!(config.stage.timing.poll_interval_ms, 100);
        assert_eq!(config.stage.completion, CompletionStrategy::StatusPolling);
        assert_eq!(config.log_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
            log_level = "debug"

            [stage]
            completion = "position_tolerance"

            [stage.serial]
            port = "COM3"

            [stage.timing]
            tolerance_mm = 0.01
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.stage.serial.port, "COM3");
        assert_eq!(config.stage.serial.baud_rate, 57600);
        assert_eq!(config.stage.completion, CompletionStrategy::PositionTolerance);
        assert_eq!(config.stage.timing.tolerance_mm, 0.01);
        assert_eq!(config.stage.timing.move_timeout_ms, 30_000);
        assert_eq!(config.log_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_example_round_trips() {
        let example = AppConfig::example_toml();
        let parsed: AppConfig = toml::from_str(&example).unwrap();
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_load_rejects_bad_level() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level = \"loud\"").unwrap();
        assert!(AppConfig::load_from_file(file.path()).is_err());
    }
}
