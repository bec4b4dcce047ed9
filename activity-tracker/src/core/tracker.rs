/*!
Main async coordinator that orchestrates the event-driven activity tracking
system
*/

use analytics_database::AnalyticsDatabase;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::RwLock;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use crate::core::{
    activity_log::ActivityEngine,
    config::TrackerConfig,
    config_store::ConfigStore,
    event_system::{ApiEvent, EventLogMonitor, EventProcessor, PlatformEvent},
    i18n::Translator,
    notifications::{self, SecurityNotification},
    output_plugins::OutputManager,
    state_manager::StateManager,
    updates::Updater,
};

/// Main tracker that coordinates all components
pub struct ActivityTracker {
    config: TrackerConfig,
    state_manager: Arc<RwLock<StateManager>>,
    activity_engine: ActivityEngine,
    entity_db: AnalyticsDatabase,
    output_manager: Arc<RwLock<OutputManager>>,
    translator: Translator,
    started_at: Instant,
    events_processed: AtomicU64,
    activities_recorded: AtomicU64,
    last_event_ts: AtomicI64,
}

impl ActivityTracker {
    /// Create a new activity tracker
    pub async fn new(config: TrackerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Initializing event-driven activity tracker...");

        // Initialize components
        let state_manager = Arc::new(RwLock::new(StateManager::new(config.state.clone()).await?));
        let activity_engine = ActivityEngine::new();
        let entity_db = AnalyticsDatabase::new(&config.platform.entity_db_path)?;
        let output_manager = Arc::new(RwLock::new(OutputManager::new(&config.outputs)?));

        let translator = match Translator::load(
            &config.platform.translations_dir,
            &config.platform.locale,
        ) {
            Ok(t) => t,
            Err(e) => {
                warn!("Could not load translation catalog: {}", e);
                Translator::with_catalog(&config.platform.locale, Default::default())
            }
        };

        // Initialize output handlers
        output_manager.write().await.initialize().await?;

        Ok(Self {
            config,
            state_manager,
            activity_engine,
            entity_db,
            output_manager,
            translator,
            started_at: Instant::now(),
            events_processed: AtomicU64::new(0),
            activities_recorded: AtomicU64::new(0),
            last_event_ts: AtomicI64::new(0),
        })
    }

    /// Apply any pending platform config migrations.
    pub async fn run_pending_updates(&self) -> Result<usize, Box<dyn std::error::Error>> {
        let config_file = &self.config.platform.config_file;
        if !config_file.exists() {
            warn!("Platform config {:?} not found, skipping updates", config_file);
            return Ok(0);
        }

        let mut store = ConfigStore::load(config_file)?;
        let state = self.state_manager.read().await;
        let applied = Updater::with_default_steps().run(&mut store, &state).await?;
        drop(state);

        if applied > 0 {
            store.save()?;
            info!("Applied {} pending config update(s)", applied);
        }

        Ok(applied)
    }

    /// Start the async activity tracking loop
    pub async fn start(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🚀 Starting activity tracker...");
        info!("📊 Event log: {:?}", self.config.events.event_log_path);
        info!("💾 State DB: {:?}", self.config.state.state_db_path);
        info!(
            "🌐 Entity store: {:?} ({} sites)",
            self.config.platform.entity_db_path,
            self.entity_db.site_count()
        );
        info!("🌍 Locale: {}", self.translator.locale());

        self.run_pending_updates().await?;

        // Start the event stream; the stream borrows the processor for the
        // whole loop.
        let mut event_processor = EventProcessor::new(self.config.events.clone());
        let mut event_stream = Box::pin(event_processor.start().await);
        // Process events as they arrive
        while let Some(event) = event_stream.next().await {
            if let Err(e) = self.handle_event(event).await {
                error!("Error handling event: {}", e);
            }
        }

        // Cleanup
        self.output_manager.write().await.finalize().await?;
        info!("🏁 Activity tracker stopped gracefully");

        Ok(())
    }

    /// Handle a single platform event
    async fn handle_event(&self, event: PlatformEvent) -> Result<(), Box<dyn std::error::Error>> {
        match event {
            PlatformEvent::ApiCallsCompleted(batch) => {
                for api_event in batch {
                    self.handle_api_event(api_event).await?;
                }
            }
            PlatformEvent::LogRotated { new_size } => {
                info!("🔄 Event log rotated, new size {} bytes", new_size);
            }
            PlatformEvent::MonitoringError(e) => {
                error!("⚠️ Monitoring error: {}", e);
            }
        }

        Ok(())
    }

    /// Handle one completed API call
    async fn handle_api_event(&self, event: ApiEvent) -> Result<(), Box<dyn std::error::Error>> {
        let state = self.state_manager.write().await;
        if state.is_event_processed(&event.fingerprint).await? {
            return Ok(());
        }

        self.events_processed.fetch_add(1, Ordering::Relaxed);
        self.last_event_ts.store(event.timestamp, Ordering::Relaxed);

        let records = self.activity_engine.process_event(&event, &self.entity_db);

        for mut record in records {
            // Store activity record
            let activity_id = state.store_activity(&record).await?;
            record.id = activity_id;

            info!("📝 Recorded activity {}: {}", activity_id, record.description);
            self.activities_recorded.fetch_add(1, Ordering::Relaxed);

            // Send to output handlers
            self.output_manager
                .write()
                .await
                .handle_activity(&record)
                .await?;
        }

        if let Some(kind) = SecurityNotification::for_api_method(&event.method) {
            if let Err(e) =
                notifications::notify(kind, &self.config.notifications, &self.translator).await
            {
                error!("Failed to deliver {:?} notification: {}", kind, e);
            }
        }

        state.mark_event_processed(&event.fingerprint).await?;

        Ok(())
    }

    /// Process the whole event log from the start, showing progress. Already
    /// recorded events are skipped via their fingerprints.
    pub async fn replay(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Replaying event log from the beginning...");

        let mut monitor = EventLogMonitor::with_offset(self.config.events.clone(), 0);
        let events = monitor.check_for_events().await?;

        let api_events: Vec<ApiEvent> = events
            .into_iter()
            .filter_map(|e| match e {
                PlatformEvent::ApiCallsCompleted(batch) => Some(batch),
                _ => None,
            })
            .flatten()
            .collect();

        let progress = indicatif::ProgressBar::new(api_events.len() as u64);
        for api_event in api_events {
            self.handle_api_event(api_event).await?;
            progress.inc(1);
        }
        progress.finish_with_message("replay complete");

        Ok(())
    }

    /// Get current tracker statistics
    pub fn stats(&self) -> TrackerStats {
        let last_ts = self.last_event_ts.load(Ordering::Relaxed);

        TrackerStats {
            events_processed: self.events_processed.load(Ordering::Relaxed),
            activities_recorded: self.activities_recorded.load(Ordering::Relaxed),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            last_event_time: (last_ts > 0)
                .then(|| chrono::DateTime::from_timestamp(last_ts, 0))
                .flatten(),
        }
    }
}

/// Statistics about the tracker's operation
#[derive(Debug, Clone)]
pub struct TrackerStats {
    pub events_processed: u64,
    pub activities_recorded: u64,
    pub uptime_seconds: u64,
    pub last_event_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// Graceful shutdown handler
pub struct ShutdownHandler {
    tracker: Option<ActivityTracker>,
}

impl ShutdownHandler {
    pub fn new(tracker: ActivityTracker) -> Self {
        Self {
            tracker: Some(tracker),
        }
    }

    /// Handle graceful shutdown
    pub async fn shutdown(mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(tracker) = self.tracker.take() {
            info!("🛑 Initiating graceful shutdown...");

            // Finalize output handlers
            tracker.output_manager.write().await.finalize().await?;

            info!("✅ Shutdown completed successfully");
        }
        Ok(())
    }
}

/// Helper function to create a tracker from a config file
pub async fn create_tracker_from_config_file<P: AsRef<std::path::Path>>(
    config_path: P,
) -> Result<ActivityTracker, Box<dyn std::error::Error>> {
    let config_content = tokio::fs::read_to_string(config_path).await?;
    let config: TrackerConfig = toml::from_str(&config_content)?;
    ActivityTracker::new(config).await
}

/// Helper function to create a tracker with default config
pub async fn create_default_tracker() -> Result<ActivityTracker, Box<dyn std::error::Error>> {
    let config = TrackerConfig::default();
    ActivityTracker::new(config).await
}
