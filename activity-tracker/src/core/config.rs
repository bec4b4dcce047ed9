/*!
Configuration management for the activity tracker
*/

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConfig {
    /// Platform paths and locale
    pub platform: PlatformConfig,
    /// Event log monitoring settings
    pub events: EventLogConfig,
    /// State persistence settings
    pub state: StateConfig,
    /// Output configuration
    pub outputs: Vec<OutputConfig>,
    /// Notification delivery settings
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformConfig {
    /// Path to the platform configuration file mutated by update steps
    pub config_file: PathBuf,
    /// Path to the platform entity store (sites, containers, entities)
    pub entity_db_path: PathBuf,
    /// Locale for the translation catalog
    pub locale: String,
    /// Directory holding per-locale translation catalogs
    pub translations_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventLogConfig {
    /// Path to the API event log the platform appends to
    pub event_log_path: PathBuf,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Maximum number of events to process per batch
    pub max_batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateConfig {
    /// Path to persistent state database
    pub state_db_path: PathBuf,
    /// How long to retain activity records (in days)
    pub retention_days: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Recipient for security notification emails
    pub security_email: Option<String>,
    /// Mail gateway endpoint; when unset, emails are written to a file
    pub mail_gateway_url: Option<String>,
    /// Fallback path for file-based mail delivery
    pub mail_spool_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Output plugin type
    pub plugin: OutputPlugin,
    /// Whether this output is enabled
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum OutputPlugin {
    Json { path: PathBuf, pretty: bool },
    Webhook { url: String, auth_token: Option<String> },
    Terminal { format: TerminalFormat },
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub enum TerminalFormat {
    Plain,
    Colored,
    Json,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("activity-tracker");

        Self {
            platform: PlatformConfig {
                config_file: PathBuf::from("./config/platform.toml"),
                entity_db_path: PathBuf::from("./data/platform.db"),
                locale: "en".to_string(),
                translations_dir: PathBuf::from("./translations"),
            },
            events: EventLogConfig {
                event_log_path: PathBuf::from("./data/api_events.log"),
                poll_interval_ms: 1000,
                max_batch_size: 100,
            },
            state: StateConfig {
                state_db_path: data_dir.join("tracker_state.db"),
                retention_days: 180,
            },
            outputs: vec![
                OutputConfig {
                    plugin: OutputPlugin::Terminal {
                        format: TerminalFormat::Colored,
                    },
                    enabled: true,
                },
                OutputConfig {
                    plugin: OutputPlugin::Json {
                        path: PathBuf::from("./activities.json"),
                        pretty: false,
                    },
                    enabled: true,
                },
            ],
            notifications: NotificationConfig {
                security_email: None,
                mail_gateway_url: None,
                mail_spool_path: data_dir.join("outbox.json"),
            },
        }
    }
}
