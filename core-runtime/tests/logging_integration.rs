//! Global subscriber installation with a host sink.
//!
//! Kept to a single test: the subscriber is process-wide.

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for RecordingSink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

#[test]
fn test_global_logging_forwards_workspace_events_to_sink() {
    let sink = Arc::new(RecordingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_logger_sink(sink.clone());

    init_logging(config.clone()).unwrap();

    tracing::info!(
        target: "core_sync::coordinator",
        tracks = 150,
        added = 3,
        "Library sync completed"
    );
    tracing::info!(
        target: "core_auth::manager",
        refresh_token = "rt-secret",
        email = "listener@example.com",
        "Spotify account connected"
    );
    // below the sink threshold
    tracing::debug!(target: "core_sync::fetcher", offset = 50, "Fetched page");
    // filtered out by the default dependency directive
    tracing::info!(target: "sqlx::query", "SELECT 1");

    let entries = sink.entries.lock().unwrap();
    assert_eq!(entries.len(), 2);

    assert_eq!(entries[0].target, "core_sync::coordinator");
    assert_eq!(entries[0].message, "Library sync completed");
    assert_eq!(entries[0].fields.get("tracks").map(String::as_str), Some("150"));

    let auth = &entries[1];
    assert_eq!(
        auth.fields.get("refresh_token").map(String::as_str),
        Some("[REDACTED]")
    );
    let email = auth.fields.get("email").unwrap();
    assert!(email.starts_with('l'));
    assert!(!email.contains("example.com"));
    drop(entries);

    assert!(init_logging(config).is_err());
}
