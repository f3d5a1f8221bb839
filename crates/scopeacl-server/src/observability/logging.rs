//! Structured logging configuration.
//!
//! Log entries come from `tracing` macros throughout the engine: context
//! creation and cache-tier hits at `debug`, invalidations and warm summaries
//! at `info`, per-user warm failures at `warn`.
//!
//! # Usage
//!
//! ```ignore
//! use scopeacl_server::observability::{init_logging, LoggingConfig};
//!
//! init_logging(LoggingConfig::from_settings(&config.logging)?);
//! ```

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::config::{ConfigLoadError, LoggingSettings};

/// Configuration for structured logging.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Whether to use JSON format (true) or text format (false)
    pub json_format: bool,
    /// The default log level if RUST_LOG is not set
    pub default_level: Level,
    /// Whether to include span events (enter/exit)
    pub include_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json_format: false,
            default_level: Level::INFO,
            include_spans: false,
        }
    }
}

impl LoggingConfig {
    pub fn json() -> Self {
        Self {
            json_format: true,
            ..Default::default()
        }
    }

    pub fn text() -> Self {
        Self {
            json_format: false,
            ..Default::default()
        }
    }

    /// Builds the logging configuration from the `logging` config section.
    pub fn from_settings(settings: &LoggingSettings) -> Result<Self, ConfigLoadError> {
        let level = Level::from_str(&settings.level).map_err(|_| ConfigLoadError::Invalid {
            message: format!("logging.level is not a log level: {}", settings.level),
        })?;
        let base = if settings.json {
            Self::json()
        } else {
            Self::text()
        };
        let config = base.with_level(level);
        Ok(if settings.spans {
            config.with_spans()
        } else {
            config
        })
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Include span events in the output.
    pub fn with_spans(mut self) -> Self {
        self.include_spans = true;
        self
    }
}

/// Initialize the logging subsystem with the given configuration.
///
/// Call once at startup. Later calls have no effect (the subscriber is
/// global).
pub fn init_logging(config: LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_level.to_string()));

    let span_events = if config.include_spans {
        FmtSpan::ENTER | FmtSpan::EXIT
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .json()
                .with_span_events(span_events)
                .with_current_span(true)
                .with_target(true)
                .with_file(false)
                .with_line_number(false),
        );

        let _ = tracing::subscriber::set_global_default(subscriber);
    } else {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .compact()
                .with_span_events(span_events)
                .with_target(true),
        );

        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

/// Creates a JSON subscriber writing to `writer`, for capturing log output.
pub fn create_json_layer<W>(writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(EnvFilter::new("trace"))
        .with(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_current_span(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// A writer that captures output to a shared buffer.
    #[derive(Clone)]
    struct CaptureWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl CaptureWriter {
        fn new() -> Self {
            Self {
                buffer: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn output(&self) -> String {
            let buffer = self.buffer.lock().unwrap();
            String::from_utf8_lossy(&buffer).to_string()
        }
    }

    impl std::io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.buffer.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CaptureWriter {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_from_settings_maps_level_and_format() {
        let settings = LoggingSettings {
            level: "debug".to_string(),
            json: true,
            spans: false,
        };

        let config = LoggingConfig::from_settings(&settings).unwrap();

        assert!(config.json_format);
        assert_eq!(config.default_level, Level::DEBUG);
        assert!(!config.include_spans);
    }

    #[test]
    fn test_from_settings_rejects_unknown_level() {
        let settings = LoggingSettings {
            level: "loud".to_string(),
            json: false,
            spans: false,
        };

        assert!(LoggingConfig::from_settings(&settings).is_err());
    }

    #[test]
    fn test_from_settings_enables_span_events() {
        let settings = LoggingSettings {
            spans: true,
            ..Default::default()
        };

        let config = LoggingConfig::from_settings(&settings).unwrap();

        assert!(config.include_spans);
        assert!(!config.json_format);
        assert_eq!(config.default_level, Level::INFO);
    }

    #[tokio::test]
    async fn test_invalidation_log_is_json_with_user_field() {
        let writer = CaptureWriter::new();
        let _guard = tracing::subscriber::set_default(create_json_layer(writer.clone()));

        let service = scopeacl_domain::AccessControlService::new(
            scopeacl_storage::MemoryContextStore::new_shared(),
            scopeacl_storage::MemoryAssignmentStore::new_shared(),
            scopeacl_storage::MemoryKeyValueStore::new_shared(),
        );
        let ops = crate::cache_ops::CacheOps::new(Arc::new(service), Default::default());
        ops.invalidate_all_levels(42).await.unwrap();

        let output = writer.output();
        let line = output
            .lines()
            .find(|l| l.contains("invalidated permission snapshot"))
            .expect("invalidation log line");
        let json: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(json["level"], "INFO");
        assert_eq!(json["fields"]["user_id"], 42);
        assert_eq!(json["fields"]["message"], "invalidated permission snapshot");
    }
}
