/*!
Event-driven monitoring of the platform API event log.

The platform appends one JSON line per completed API call. The monitor polls
the log's size and turns newly appended lines into a stream of events for the
tracker to consume.
*/

use serde::{Deserialize, Serialize};
use std::io::SeekFrom;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_stream::{StreamExt, wrappers::IntervalStream};
use tracing::{debug, error, info};

use crate::core::config::EventLogConfig;
use crate::core::state_manager::StateManager;

/// One completed API call as recorded by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEvent {
    /// Short API method name, e.g. `updateContainerVariable`
    pub method: String,
    /// Return value of the call
    #[serde(rename = "return", default)]
    pub return_value: serde_json::Value,
    /// Final call parameters, keys unique within one call
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    /// Login of the user who performed the call
    #[serde(rename = "user", default)]
    pub performing_user: String,
    /// Unix timestamp of completion
    #[serde(rename = "ts", default)]
    pub timestamp: i64,
    /// Hash of the raw log line, used for replay deduplication
    #[serde(skip)]
    pub fingerprint: String,
}

impl ApiEvent {
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        let mut event: ApiEvent = serde_json::from_str(line)?;
        event.fingerprint = StateManager::hash_event(line);
        Ok(event)
    }

    /// Integer parameter by key, accepting both numbers and numeric strings.
    pub fn int_param(&self, key: &str) -> Option<i64> {
        match self.parameters.get(key)? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Events emitted by the log monitoring system
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    /// New API calls appended to the event log
    ApiCallsCompleted(Vec<ApiEvent>),
    /// The event log shrank, most likely rotated
    LogRotated { new_size: u64 },
    /// Error occurred during monitoring
    MonitoringError(String),
}

/// Polls the API event log for appended lines
pub struct EventLogMonitor {
    config: EventLogConfig,
    offset: u64,
}

impl EventLogMonitor {
    pub fn new(config: EventLogConfig) -> Self {
        Self { config, offset: 0 }
    }

    /// Replay support: continue from a stored offset instead of the start.
    pub fn with_offset(config: EventLogConfig, offset: u64) -> Self {
        Self { config, offset }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Start monitoring the event log for appended lines
    pub async fn start_monitoring(&mut self) -> impl StreamExt<Item = PlatformEvent> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut interval_stream = IntervalStream::new(tokio::time::interval(interval));

        async_stream::stream! {
            while let Some(_) = interval_stream.next().await {
                match self.check_for_events().await {
                    Ok(events) => {
                        for event in events {
                            yield event;
                        }
                    }
                    Err(e) => {
                        error!("Event log monitoring error: {}", e);
                        yield PlatformEvent::MonitoringError(e.to_string());
                    }
                }
            }
        }
    }

    /// Read every complete line appended since the last check.
    pub async fn check_for_events(
        &mut self,
    ) -> Result<Vec<PlatformEvent>, Box<dyn std::error::Error>> {
        let log_path = &self.config.event_log_path;

        if !log_path.exists() {
            return Ok(vec![]);
        }

        let current_size = tokio::fs::metadata(log_path).await?.len();
        let mut events = Vec::new();

        if current_size < self.offset {
            debug!(
                "Event log shrank: {} -> {}, treating as rotation",
                self.offset, current_size
            );
            self.offset = 0;
            events.push(PlatformEvent::LogRotated {
                new_size: current_size,
            });
        }

        if current_size > self.offset {
            let (api_events, consumed) = self.read_appended_lines().await?;

            for chunk in api_events.chunks(self.config.max_batch_size.max(1)) {
                events.push(PlatformEvent::ApiCallsCompleted(chunk.to_vec()));
            }

            self.offset += consumed;
        }

        Ok(events)
    }

    /// Returns parsed events plus the number of bytes consumed. Only bytes up
    /// to the last newline count as consumed; a trailing partial line stays in
    /// the file for the next poll.
    async fn read_appended_lines(
        &self,
    ) -> Result<(Vec<ApiEvent>, u64), Box<dyn std::error::Error>> {
        let mut file = tokio::fs::File::open(&self.config.event_log_path).await?;
        file.seek(SeekFrom::Start(self.offset)).await?;

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer).await?;

        let Some(last_newline) = buffer.iter().rposition(|&b| b == b'\n') else {
            return Ok((vec![], 0));
        };
        let complete = &buffer[..=last_newline];
        let text = std::str::from_utf8(complete)?;

        let mut api_events = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match ApiEvent::parse_line(line) {
                Ok(event) => api_events.push(event),
                Err(e) => {
                    error!("Skipping malformed event log line: {}", e);
                }
            }
        }

        Ok((api_events, (last_newline + 1) as u64))
    }
}

/// Higher-level event processor that owns the monitoring strategy
pub struct EventProcessor {
    monitor: EventLogMonitor,
}

impl EventProcessor {
    pub fn new(config: EventLogConfig) -> Self {
        Self {
            monitor: EventLogMonitor::new(config),
        }
    }

    /// Start the event processing system
    pub async fn start(&mut self) -> impl StreamExt<Item = PlatformEvent> {
        info!("Starting event-driven API log monitoring...");
        self.monitor.start_monitoring().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_LOG: AtomicUsize = AtomicUsize::new(0);

    fn temp_log_path() -> PathBuf {
        let n = NEXT_LOG.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "activity-tracker-events-{}-{}.log",
            std::process::id(),
            n
        ))
    }

    fn test_config(path: PathBuf) -> EventLogConfig {
        EventLogConfig {
            event_log_path: path,
            poll_interval_ms: 10,
            max_batch_size: 100,
        }
    }

    #[test]
    fn parse_line_extracts_fields() {
        let line = r#"{"method":"updateContainerVariable","user":"admin","ts":1710000000,"return":true,"parameters":{"idVariable":7,"idSite":3,"idContainer":12,"idContainerVersion":2}}"#;
        let event = ApiEvent::parse_line(line).unwrap();

        assert_eq!(event.method, "updateContainerVariable");
        assert_eq!(event.performing_user, "admin");
        assert_eq!(event.int_param("idVariable"), Some(7));
        assert_eq!(event.int_param("missing"), None);
        assert!(!event.fingerprint.is_empty());
    }

    #[test]
    fn int_param_accepts_numeric_strings() {
        let line = r#"{"method":"m","parameters":{"idSite":"3"}}"#;
        let event = ApiEvent::parse_line(line).unwrap();
        assert_eq!(event.int_param("idSite"), Some(3));
    }

    #[tokio::test]
    async fn monitor_picks_up_appended_lines() {
        let path = temp_log_path();
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, r#"{{"method":"addContainerTag","user":"a","ts":1}}"#).unwrap();
        file.flush().unwrap();

        let mut monitor = EventLogMonitor::new(test_config(path.clone()));
        let events = monitor.check_for_events().await.unwrap();

        assert_eq!(events.len(), 1);
        match &events[0] {
            PlatformEvent::ApiCallsCompleted(batch) => {
                assert_eq!(batch.len(), 1);
                assert_eq!(batch[0].method, "addContainerTag");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // Nothing new on a second poll.
        assert!(monitor.check_for_events().await.unwrap().is_empty());

        // Appending produces only the new event.
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, r#"{{"method":"deleteContainerTag","user":"b","ts":2}}"#).unwrap();
        file.flush().unwrap();

        let events = monitor.check_for_events().await.unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            PlatformEvent::ApiCallsCompleted(batch) => {
                assert_eq!(batch[0].method, "deleteContainerTag");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn monitor_detects_rotation() {
        let path = temp_log_path();
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, r#"{{"method":"addContainerTag","user":"a","ts":1}}"#).unwrap();
        file.flush().unwrap();

        let mut monitor = EventLogMonitor::new(test_config(path.clone()));
        monitor.check_for_events().await.unwrap();

        // Truncate the log as a rotation would.
        std::fs::File::create(&path).unwrap();

        let events = monitor.check_for_events().await.unwrap();
        assert!(matches!(events[0], PlatformEvent::LogRotated { new_size: 0 }));
        assert_eq!(monitor.offset(), 0);

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn partial_trailing_line_is_left_for_next_poll() {
        let path = temp_log_path();
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, r#"{{"method":"complete","user":"a","ts":1}}"#).unwrap();
        write!(file, r#"{{"method":"truncat"#).unwrap();
        file.flush().unwrap();

        let mut monitor = EventLogMonitor::new(test_config(path.clone()));
        let events = monitor.check_for_events().await.unwrap();

        match &events[0] {
            PlatformEvent::ApiCallsCompleted(batch) => {
                assert_eq!(batch.len(), 1);
                assert_eq!(batch[0].method, "complete");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // Finish the partial line; it is consumed on the next poll.
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, r#"ed","user":"b","ts":2}}"#).unwrap();
        file.flush().unwrap();

        let events = monitor.check_for_events().await.unwrap();
        match &events[0] {
            PlatformEvent::ApiCallsCompleted(batch) => {
                assert_eq!(batch[0].method, "truncated");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        std::fs::remove_file(path).ok();
    }
}
