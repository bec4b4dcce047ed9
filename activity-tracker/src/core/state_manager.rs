/*!
Persistent state for recorded activities, processed-event fingerprints and
applied component versions
*/

use rusqlite::{Connection, Result as SqliteResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::config::StateConfig;

/// The canonical activity payload: which entity changed, and where.
/// Field order mirrors the normalization helper: site, container, container
/// version, entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityData {
    pub site_id: i64,
    pub container_id: i64,
    pub container_version_id: i64,
    pub entity_id: i64,
}

impl ActivityData {
    pub fn new(site_id: i64, container_id: i64, container_version_id: i64, entity_id: i64) -> Self {
        Self {
            site_id,
            container_id,
            container_version_id,
            entity_id,
        }
    }
}

/// A recorded, described user activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: i64,
    pub activity_kind: String,
    pub data: ActivityData,
    pub performing_user: String,
    pub timestamp: i64,
    pub description: String,
}

/// Manages persistent state for the activity tracker
pub struct StateManager {
    config: StateConfig,
    conn: Connection,
}

impl StateManager {
    /// Create a new state manager and initialize the database
    pub async fn new(config: StateConfig) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(parent) = config.state_db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&config.state_db_path)?;

        let manager = Self { config, conn };
        manager.initialize_schema().await?;
        manager.cleanup_old_records().await?;

        info!(
            "State manager initialized with database: {:?}",
            manager.config.state_db_path
        );
        Ok(manager)
    }

    /// Initialize the database schema
    async fn initialize_schema(&self) -> SqliteResult<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS activities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                activity_kind TEXT NOT NULL,
                site_id INTEGER NOT NULL,
                container_id INTEGER NOT NULL,
                container_version_id INTEGER NOT NULL,
                entity_id INTEGER NOT NULL,
                performing_user TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                description TEXT NOT NULL,
                created_at INTEGER DEFAULT (strftime('%s', 'now'))
            );

            CREATE TABLE IF NOT EXISTS event_fingerprints (
                fingerprint TEXT PRIMARY KEY,
                processed_at INTEGER DEFAULT (strftime('%s', 'now'))
            );

            CREATE TABLE IF NOT EXISTS component_versions (
                component TEXT PRIMARY KEY,
                version TEXT NOT NULL,
                updated_at INTEGER DEFAULT (strftime('%s', 'now'))
            );

            CREATE INDEX IF NOT EXISTS idx_activities_timestamp ON activities(timestamp);
            CREATE INDEX IF NOT EXISTS idx_activities_site ON activities(site_id);
        "#,
        )?;

        Ok(())
    }

    /// Store an activity record, returning its row id
    pub async fn store_activity(
        &self,
        record: &ActivityRecord,
    ) -> Result<i64, Box<dyn std::error::Error>> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO activities
             (activity_kind, site_id, container_id, container_version_id, entity_id,
              performing_user, timestamp, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;

        let activity_id = stmt.insert((
            &record.activity_kind,
            record.data.site_id,
            record.data.container_id,
            record.data.container_version_id,
            record.data.entity_id,
            &record.performing_user,
            record.timestamp,
            &record.description,
        ))?;

        debug!(
            "Stored activity record {} ({})",
            activity_id, record.activity_kind
        );
        Ok(activity_id)
    }

    /// Get all activity records within a time range
    pub async fn activities_in_range(
        &self,
        start_time: i64,
        end_time: i64,
    ) -> Result<Vec<ActivityRecord>, Box<dyn std::error::Error>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, activity_kind, site_id, container_id, container_version_id, entity_id,
                    performing_user, timestamp, description
             FROM activities
             WHERE timestamp BETWEEN ?1 AND ?2
             ORDER BY timestamp DESC",
        )?;

        let rows = stmt.query_map([start_time, end_time], |row| {
            Ok(ActivityRecord {
                id: row.get(0)?,
                activity_kind: row.get(1)?,
                data: ActivityData {
                    site_id: row.get(2)?,
                    container_id: row.get(3)?,
                    container_version_id: row.get(4)?,
                    entity_id: row.get(5)?,
                },
                performing_user: row.get(6)?,
                timestamp: row.get(7)?,
                description: row.get(8)?,
            })
        })?;

        let mut activities = Vec::new();
        for row in rows {
            activities.push(row?);
        }

        Ok(activities)
    }

    /// Whether an event log line was already processed
    pub async fn is_event_processed(
        &self,
        fingerprint: &str,
    ) -> Result<bool, Box<dyn std::error::Error>> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM event_fingerprints WHERE fingerprint = ?1")?;
        Ok(stmt.exists([fingerprint])?)
    }

    /// Remember an event log line as processed
    pub async fn mark_event_processed(
        &self,
        fingerprint: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.conn.execute(
            "INSERT OR IGNORE INTO event_fingerprints (fingerprint) VALUES (?1)",
            [fingerprint],
        )?;
        Ok(())
    }

    /// The recorded version of a platform component, if any
    pub async fn component_version(
        &self,
        component: &str,
    ) -> Result<Option<String>, Box<dyn std::error::Error>> {
        let mut stmt = self
            .conn
            .prepare("SELECT version FROM component_versions WHERE component = ?1")?;

        let version = stmt.query_row([component], |row| row.get::<_, String>(0));

        match version {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Record the version a component has been migrated to
    pub async fn record_component_version(
        &self,
        component: &str,
        version: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.conn.execute(
            "INSERT INTO component_versions (component, version)
             VALUES (?1, ?2)
             ON CONFLICT(component) DO UPDATE SET
                version = excluded.version,
                updated_at = strftime('%s', 'now')",
            [component, version],
        )?;

        info!("Recorded component {} at version {}", component, version);
        Ok(())
    }

    /// Clean up old records based on retention policy
    async fn cleanup_old_records(&self) -> SqliteResult<()> {
        let cutoff_timestamp =
            chrono::Utc::now().timestamp() - (self.config.retention_days as i64 * 24 * 60 * 60);

        let deleted_activities = self.conn.execute(
            "DELETE FROM activities WHERE timestamp < ?1",
            [cutoff_timestamp],
        )?;

        let deleted_fingerprints = self.conn.execute(
            "DELETE FROM event_fingerprints WHERE processed_at < ?1",
            [cutoff_timestamp],
        )?;

        if deleted_activities > 0 || deleted_fingerprints > 0 {
            info!(
                "Cleaned up {} old activities and {} old fingerprints",
                deleted_activities, deleted_fingerprints
            );
        }

        Ok(())
    }

    /// Hash an event log line for deduplication
    pub fn hash_event(line: &str) -> String {
        blake3::hash(line.trim().as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_STATE: AtomicUsize = AtomicUsize::new(0);

    fn temp_state_config() -> StateConfig {
        let n = NEXT_STATE.fetch_add(1, Ordering::SeqCst);
        StateConfig {
            state_db_path: std::env::temp_dir().join(format!(
                "activity-tracker-state-{}-{}.db",
                std::process::id(),
                n
            )),
            retention_days: 30,
        }
    }

    fn sample_record() -> ActivityRecord {
        ActivityRecord {
            id: 0,
            activity_kind: "variable_updated".to_string(),
            data: ActivityData::new(3, 12, 2, 7),
            performing_user: "admin".to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            description: "updated the variable \"utm_source\" in container \"Main Container\" for site \"Demo\"".to_string(),
        }
    }

    #[tokio::test]
    async fn store_and_fetch_activity() {
        let config = temp_state_config();
        let path = config.state_db_path.clone();
        let manager = StateManager::new(config).await.unwrap();

        let record = sample_record();
        let id = manager.store_activity(&record).await.unwrap();
        assert!(id > 0);

        let now = chrono::Utc::now().timestamp();
        let fetched = manager
            .activities_in_range(now - 60, now + 60)
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].data, ActivityData::new(3, 12, 2, 7));
        assert_eq!(fetched[0].activity_kind, "variable_updated");

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn fingerprints_deduplicate_events() {
        let config = temp_state_config();
        let path = config.state_db_path.clone();
        let manager = StateManager::new(config).await.unwrap();

        let fp = StateManager::hash_event(r#"{"method":"x"}"#);
        assert!(!manager.is_event_processed(&fp).await.unwrap());

        manager.mark_event_processed(&fp).await.unwrap();
        assert!(manager.is_event_processed(&fp).await.unwrap());

        // Marking twice is fine.
        manager.mark_event_processed(&fp).await.unwrap();

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn component_versions_are_upserted() {
        let config = temp_state_config();
        let path = config.state_db_path.clone();
        let manager = StateManager::new(config).await.unwrap();

        assert_eq!(manager.component_version("core").await.unwrap(), None);

        manager
            .record_component_version("core", "2.0.0-b9")
            .await
            .unwrap();
        assert_eq!(
            manager.component_version("core").await.unwrap().as_deref(),
            Some("2.0.0-b9")
        );

        manager
            .record_component_version("core", "2.0.0-b10")
            .await
            .unwrap();
        assert_eq!(
            manager.component_version("core").await.unwrap().as_deref(),
            Some("2.0.0-b10")
        );

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn hash_event_ignores_surrounding_whitespace() {
        let a = StateManager::hash_event(r#"{"method":"x"}"#);
        let b = StateManager::hash_event("  {\"method\":\"x\"}\n");
        assert_eq!(a, b);
    }
}
