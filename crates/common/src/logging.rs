//! Tracing subscriber setup for the committee binaries.
//!
//! Logs go to stdout and, when a directory is configured, to daily rolling files. The default
//! level is INFO and `RUST_LOG` overrides it for every output.

use std::path::PathBuf;

use tracing::{info, Subscriber};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Where rolling log files are written.
#[derive(Debug, Clone)]
pub struct FileLogging {
    pub directory: PathBuf,
    /// Files are named `<prefix>.<date>`.
    pub file_name_prefix: String,
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub service_name: String,
    /// JSON lines instead of the compact human format, for every output.
    pub json_format: bool,
    pub span_events: FmtSpan,
    pub file: Option<FileLogging>,
}

impl LoggerConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            json_format: false,
            // span durations show up on close
            span_events: FmtSpan::CLOSE,
            file: None,
        }
    }

    pub fn with_json_format(mut self, json_format: bool) -> Self {
        self.json_format = json_format;
        self
    }

    /// Enables file output in `directory`. Files are prefixed with the service name unless
    /// `prefix` is given.
    pub fn with_log_dir(mut self, directory: PathBuf, prefix: Option<&str>) -> Self {
        let file_name_prefix = prefix.unwrap_or(&self.service_name).to_string();
        self.file = Some(FileLogging {
            directory,
            file_name_prefix,
        });
        self
    }
}

fn fmt_layer<S, W>(
    writer: W,
    ansi: bool,
    json: bool,
    span_events: FmtSpan,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_span_events(span_events);

    if json {
        layer.json().with_filter(filter).boxed()
    } else {
        layer.compact().with_filter(filter).boxed()
    }
}

/// Installs the global subscriber. Must be called once, before any other logging.
pub fn init(config: LoggerConfig) {
    let stdout = fmt_layer(
        std::io::stdout,
        true,
        config.json_format,
        config.span_events.clone(),
    );
    let file = config.file.as_ref().map(|file| {
        let appender =
            RollingFileAppender::new(Rotation::DAILY, &file.directory, &file.file_name_prefix);
        fmt_layer(appender, false, config.json_format, config.span_events.clone())
    });

    tracing_subscriber::registry().with(stdout).with(file).init();

    info!(service = %config.service_name, "logging initialized");
    if let Some(file) = &config.file {
        info!(
            log_dir = %file.directory.display(),
            prefix = %file.file_name_prefix,
            "file logging enabled"
        );
    }
}
