//! `tracing` subscriber setup for applications embedding adminkit.
//!
//! Library code only emits events. Levels used across the crates:
//!
//! - `warn`: backend failures reported in resolved choices or validators
//! - `debug`: params commits, batch flushes, cache misses, dropped resolves
//! - `trace`: record payloads, rendered through [`redact_payload`]
//!
//! Records routinely carry personal data, so payloads stay redacted unless
//! [`LogConfig::log_payloads`] is set.
//!
//! ```ignore
//! use adminkit_common::logging::{init_logging, LogConfig, LogFormat};
//!
//! init_logging(&LogConfig::new(tracing::Level::DEBUG).with_format(LogFormat::Json))?;
//! ```

use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::Level;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Crates whose events follow the configured level; everything else stays at `warn`.
const ADMINKIT_TARGETS: [&str; 5] = [
    "adminkit_common",
    "adminkit_model",
    "adminkit_data",
    "adminkit_controller",
    "adminkit_form",
];

static PAYLOADS: AtomicBool = AtomicBool::new(false);

/// Stands in for a payload when payload logging is off.
pub const REDACTED_PAYLOAD: &str = "[REDACTED]";

/// Render `payload` as JSON for a log field, or [`REDACTED_PAYLOAD`] unless
/// payload logging is on.
pub fn redact_payload<T: Serialize + ?Sized>(payload: &T) -> String {
    if !PAYLOADS.load(Ordering::Relaxed) {
        return REDACTED_PAYLOAD.to_string();
    }
    serde_json::to_string(payload).unwrap_or_else(|error| format!("<unserializable: {error}>"))
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-field human readable lines.
    #[default]
    Text,
    /// One short line per event.
    Compact,
    /// Newline-delimited JSON.
    Json,
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level for the adminkit crates.
    pub level: Level,
    /// Output format.
    pub format: LogFormat,
    /// Prefix events with a timestamp (JSON always carries one).
    pub timestamps: bool,
    /// Colour output; ignored for files and JSON.
    pub ansi: bool,
    /// Append to this file instead of stderr.
    pub log_file: Option<PathBuf>,
    /// Write record payloads in clear.
    pub log_payloads: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl LogConfig {
    /// Text output to stderr at `level`, payloads redacted.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            format: LogFormat::Text,
            timestamps: false,
            ansi: true,
            log_file: None,
            log_payloads: false,
        }
    }

    /// Set the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable timestamps.
    #[must_use]
    pub fn with_timestamps(mut self, enable: bool) -> Self {
        self.timestamps = enable;
        self
    }

    /// Enable or disable colours.
    #[must_use]
    pub fn with_ansi(mut self, enable: bool) -> Self {
        self.ansi = enable;
        self
    }

    /// Log to `path` instead of stderr.
    #[must_use]
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Allow record payloads in the log.
    #[must_use]
    pub fn with_log_payloads(mut self, enable: bool) -> Self {
        self.log_payloads = enable;
        self
    }

    /// Filter directives used when `RUST_LOG` is unset.
    pub fn directives(&self) -> String {
        let level = self.level.as_str().to_lowercase();
        let mut directives = String::from("warn");
        for target in ADMINKIT_TARGETS {
            directives.push_str(&format!(",{target}={level}"));
        }
        directives
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if the log file cannot be opened or a subscriber is already set.
pub fn init_logging(config: &LogConfig) -> io::Result<()> {
    let layer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let config = config.clone().with_ansi(false);
            format_layer(&config, Mutex::<File>::new(file))
        }
        None => format_layer(config, io::stderr),
    };
    PAYLOADS.store(config.log_payloads, Ordering::Relaxed);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.directives()));
    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(io::Error::other)
}

/// The fmt layer for `config`, writing to `writer`.
pub fn format_layer<W>(config: &LogConfig, writer: W) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(config.ansi)
        .with_target(false);
    match (config.format, config.timestamps) {
        (LogFormat::Json, _) => layer.json().boxed(),
        (LogFormat::Compact, true) => layer.compact().boxed(),
        (LogFormat::Compact, false) => layer.compact().without_time().boxed(),
        (LogFormat::Text, true) => layer.boxed(),
        (LogFormat::Text, false) => layer.without_time().boxed(),
    }
}
