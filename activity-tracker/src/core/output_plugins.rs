/*!
Modular output system for recorded activities
*/

use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::Write;
use tracing::{error, info};

use crate::core::{
    config::{OutputConfig, OutputPlugin, TerminalFormat},
    state_manager::ActivityRecord,
};

/// Trait for output plugins
#[async_trait]
pub trait OutputHandler: Send {
    /// Name of the output handler
    fn name(&self) -> &'static str;

    /// Initialize the output handler (create files, connections, etc.)
    async fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error>>;

    /// Handle a recorded activity
    async fn handle_activity(
        &mut self,
        activity: &ActivityRecord,
    ) -> Result<(), Box<dyn std::error::Error>>;

    /// Cleanup/finalize the output handler
    async fn finalize(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}

/// Manages multiple output handlers
pub struct OutputManager {
    handlers: Vec<Box<dyn OutputHandler>>,
}

impl OutputManager {
    pub fn new(configs: &[OutputConfig]) -> Result<Self, Box<dyn std::error::Error>> {
        let mut handlers: Vec<Box<dyn OutputHandler>> = Vec::new();

        for config in configs {
            if !config.enabled {
                continue;
            }

            let handler: Box<dyn OutputHandler> = match &config.plugin {
                OutputPlugin::Json { path, pretty } => {
                    Box::new(JsonOutputHandler::new(path.clone(), *pretty))
                }
                OutputPlugin::Webhook { url, auth_token } => {
                    Box::new(WebhookOutputHandler::new(url.clone(), auth_token.clone()))
                }
                OutputPlugin::Terminal { format } => Box::new(TerminalOutputHandler::new(*format)),
            };

            handlers.push(handler);
        }

        info!("Initialized output manager with {} handlers", handlers.len());
        Ok(Self { handlers })
    }

    /// Initialize all handlers
    pub async fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        for handler in &mut self.handlers {
            handler.initialize().await?;
            info!("Initialized output handler: {}", handler.name());
        }
        Ok(())
    }

    /// Send an activity to all enabled handlers
    pub async fn handle_activity(
        &mut self,
        activity: &ActivityRecord,
    ) -> Result<(), Box<dyn std::error::Error>> {
        for handler in &mut self.handlers {
            if let Err(e) = handler.handle_activity(activity).await {
                error!(
                    "Handler {} failed to process activity {}: {}",
                    handler.name(),
                    activity.id,
                    e
                );
            }
        }
        Ok(())
    }

    /// Finalize all handlers
    pub async fn finalize(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        for handler in &mut self.handlers {
            handler.finalize().await?;
        }
        Ok(())
    }
}

/// JSON file output handler, one activity per line
pub struct JsonOutputHandler {
    file_path: std::path::PathBuf,
    pretty: bool,
    file: Option<std::fs::File>,
}

impl JsonOutputHandler {
    pub fn new(file_path: std::path::PathBuf, pretty: bool) -> Self {
        Self {
            file_path,
            pretty,
            file: None,
        }
    }
}

#[async_trait]
impl OutputHandler for JsonOutputHandler {
    fn name(&self) -> &'static str {
        "JSON"
    }

    async fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.file = Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.file_path)?,
        );
        Ok(())
    }

    async fn handle_activity(
        &mut self,
        activity: &ActivityRecord,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(ref mut file) = self.file {
            let json_str = if self.pretty {
                serde_json::to_string_pretty(activity)?
            } else {
                serde_json::to_string(activity)?
            };

            writeln!(file, "{}", json_str)?;
            file.flush()?;
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(ref mut file) = self.file {
            file.flush()?;
        }
        Ok(())
    }
}

/// Webhook output handler
pub struct WebhookOutputHandler {
    url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl WebhookOutputHandler {
    pub fn new(url: String, auth_token: Option<String>) -> Self {
        Self {
            url,
            auth_token,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self) -> reqwest::RequestBuilder {
        let mut request = self.client.post(&self.url);
        if let Some(ref token) = self.auth_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        request
    }
}

#[async_trait]
impl OutputHandler for WebhookOutputHandler {
    fn name(&self) -> &'static str {
        "Webhook"
    }

    async fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Test the webhook endpoint
        let test_payload = serde_json::json!({
            "test": true,
            "timestamp": chrono::Utc::now().timestamp()
        });

        let response = self.request().json(&test_payload).send().await?;

        if !response.status().is_success() {
            return Err(format!("Webhook test failed: {}", response.status()).into());
        }

        Ok(())
    }

    async fn handle_activity(
        &mut self,
        activity: &ActivityRecord,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let response = self.request().json(activity).send().await?;

        if !response.status().is_success() {
            return Err(format!("Webhook delivery failed: {}", response.status()).into());
        }

        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        Ok(())
    }
}

/// Terminal output handler
pub struct TerminalOutputHandler {
    format: TerminalFormat,
}

impl TerminalOutputHandler {
    pub fn new(format: TerminalFormat) -> Self {
        Self { format }
    }

    fn format_activity(&self, activity: &ActivityRecord) -> String {
        let when = chrono::DateTime::from_timestamp(activity.timestamp, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "Unknown".to_string());

        match self.format {
            TerminalFormat::Plain => {
                format!(
                    "ACTIVITY: {} {} at {} (site {}, container {})",
                    activity.performing_user,
                    activity.description,
                    when,
                    activity.data.site_id,
                    activity.data.container_id
                )
            }
            TerminalFormat::Colored => {
                format!(
                    "\x1b[32m📝 ACTIVITY RECORDED\x1b[0m\n\
                     \x1b[36m👤 User:\x1b[0m {}\n\
                     \x1b[36m⏰ Timestamp:\x1b[0m {}\n\
                     \x1b[36m🏷️ Kind:\x1b[0m {}\n\
                     \x1b[36m📄 Description:\x1b[0m {}",
                    activity.performing_user, when, activity.activity_kind, activity.description
                )
            }
            TerminalFormat::Json => serde_json::to_string_pretty(activity)
                .unwrap_or_else(|_| "JSON serialization failed".to_string()),
        }
    }
}

#[async_trait]
impl OutputHandler for TerminalOutputHandler {
    fn name(&self) -> &'static str {
        "Terminal"
    }

    async fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        match self.format {
            TerminalFormat::Colored => {
                println!("\x1b[32m🚀 Activity Tracker Started\x1b[0m");
            }
            _ => {
                println!("🚀 Activity Tracker Started");
            }
        }
        Ok(())
    }

    async fn handle_activity(
        &mut self,
        activity: &ActivityRecord,
    ) -> Result<(), Box<dyn std::error::Error>> {
        println!("{}", self.format_activity(activity));
        println!(); // Add spacing between activities
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        match self.format {
            TerminalFormat::Colored => {
                println!("\x1b[33m🏁 Activity Tracker Stopped\x1b[0m");
            }
            _ => {
                println!("🏁 Activity Tracker Stopped");
            }
        }
        Ok(())
    }
}
