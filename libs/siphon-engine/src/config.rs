use std::time::Duration;

use serde::Deserialize;

use siphon_api::column::DEFAULT_DECIMAL_SCALE;

use crate::error::EngineError;
use crate::replicator::ReplicationSettings;

/// Root configuration — parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct SiphonConfig {
    pub destination: DestinationConfig,

    pub source: SourceConfig,

    #[serde(default)]
    pub writer: WriterConfig,

    /// Replication unit definitions.
    #[serde(default)]
    pub units: Vec<UnitConfig>,
}

/// Destination store connection.
#[derive(Debug, Clone, Deserialize)]
pub struct DestinationConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Database used by units that don't name their own.
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_port() -> u16 {
    8123
}
fn default_user() -> String {
    "default".into()
}
fn default_database() -> String {
    "default".into()
}

/// Source of replicated records.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Directory holding `<stream>.schema.json` + `<stream>.tape` pairs.
    pub tape_dir: String,
}

/// Batched-writer flush policy, shared by every unit.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Flush when this many rows are buffered.
    pub flush_count: usize,
    /// Flush when this much time passed since the last flush.
    pub flush_interval_ms: u64,
    /// Scale of the destination decimal columns.
    pub decimal_scale: u8,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            flush_count: 10_000,
            flush_interval_ms: 5_000,
            decimal_scale: DEFAULT_DECIMAL_SCALE,
        }
    }
}

impl WriterConfig {
    pub fn settings(&self) -> ReplicationSettings {
        ReplicationSettings {
            flush_count: self.flush_count,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            decimal_scale: self.decimal_scale,
        }
    }
}

/// One replication unit: one source stream into one destination table.
#[derive(Debug, Clone, Deserialize)]
pub struct UnitConfig {
    pub name: String,
    pub stream: String,
    pub table: String,
    /// Overrides `destination.database` for this unit.
    #[serde(default)]
    pub database: Option<String>,
    /// Live tail (default) or bounded replication of existing data.
    #[serde(default = "default_live")]
    pub live: bool,
}

fn default_live() -> bool {
    true
}

impl SiphonConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config = SiphonConfig::parse(
            r#"
            [destination]
            host = "localhost"

            [source]
            tape_dir = "/var/lib/siphon/tapes"

            [[units]]
            name = "trades"
            stream = "trades"
            table = "trades"
            "#,
        )
        .unwrap();

        assert_eq!(config.destination.port, 8123);
        assert_eq!(config.writer.flush_count, 10_000);
        assert_eq!(config.units.len(), 1);
        assert!(config.units[0].live);
        assert!(config.units[0].database.is_none());
    }

    #[test]
    fn writer_overrides_apply() {
        let config = SiphonConfig::parse(
            r#"
            [destination]
            host = "ch"

            [source]
            tape_dir = "tapes"

            [writer]
            flush_count = 100
            flush_interval_ms = 250
            "#,
        )
        .unwrap();
        let settings = config.writer.settings();
        assert_eq!(settings.flush_count, 100);
        assert_eq!(settings.flush_interval, Duration::from_millis(250));
    }
}
