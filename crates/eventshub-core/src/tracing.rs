//! Log subscriber setup shared by the server and the importer.
//!
//! The server logs JSON lines by default; `--pretty` switches to the
//! human-readable formatter and `--debug` lowers the level. `RUST_LOG`
//! always wins over the computed filter.
//!
//! ```ignore
//! use eventshub_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::server(false, false))?;
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Target prefix shared by every crate in the workspace.
pub const TARGET_PREFIX: &str = "eventshub";

/// Errors that can occur during tracing initialization
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line human-readable output
    #[default]
    Pretty,
    /// Single-line output without timestamps
    Compact,
    /// One JSON object per line
    Json,
}

/// Configuration for tracing initialization
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level applied to `eventshub*` targets when `RUST_LOG` is unset
    pub default_level: Level,
    pub output_format: TracingOutputFormat,
    /// Include file and line of the call site
    pub include_location: bool,
    /// Emit span open/close events (request spans from the HTTP layer)
    pub include_span_events: bool,
    /// Extra directives appended to the computed filter, e.g. `tower_http=debug`
    pub extra_directives: Vec<String>,
    /// Full filter override; ignores `default_level` and `extra_directives`
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Pretty,
            include_location: false,
            include_span_events: false,
            extra_directives: Vec::new(),
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// Preset for the long-running server.
    ///
    /// JSON with span events unless `pretty` is set. `debug` lowers the level
    /// and also enables request traces from `tower_http`.
    #[must_use]
    pub fn server(debug: bool, pretty: bool) -> Self {
        let mut config = Self {
            default_level: if debug { Level::DEBUG } else { Level::INFO },
            output_format: if pretty {
                TracingOutputFormat::Pretty
            } else {
                TracingOutputFormat::Json
            },
            include_location: debug,
            include_span_events: !pretty,
            extra_directives: Vec::new(),
            env_filter: None,
        };
        if debug {
            config
                .extra_directives
                .push("tower_http=debug".to_string());
        }
        config
    }

    /// Preset for the one-shot importer: compact lines on stderr.
    #[must_use]
    pub fn importer(debug: bool) -> Self {
        Self {
            default_level: if debug { Level::DEBUG } else { Level::INFO },
            output_format: TracingOutputFormat::Compact,
            include_location: debug,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.extra_directives.push(directive.into());
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Filter directive used when `RUST_LOG` is unset.
    pub fn default_filter(&self) -> String {
        if let Some(filter) = &self.env_filter {
            return filter.clone();
        }
        let mut directives = vec![format!("{TARGET_PREFIX}={}", self.default_level)];
        directives.extend(self.extra_directives.iter().cloned());
        directives.join(",")
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed or the
/// computed filter does not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let env_filter = match (&config.env_filter, EnvFilter::try_from_default_env()) {
        (None, Ok(from_env)) => from_env,
        _ => EnvFilter::try_new(config.default_filter())?,
    };

    let span_events = if config.include_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = match config.output_format {
        TracingOutputFormat::Pretty => fmt::layer()
            .pretty()
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events)
            .boxed(),
        TracingOutputFormat::Compact => fmt::layer()
            .compact()
            .without_time()
            .with_writer(std::io::stderr)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events)
            .boxed(),
        TracingOutputFormat::Json => fmt::layer()
            .json()
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(env_filter).with(layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
