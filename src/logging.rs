//! Tracing subscriber setup.
//!
//! Logs always go to stdout. With `--log-file`, they are also written to a
//! file that is rotated on every start (`proxy.log` → `proxy.log.1` → … → `.3`)
//! and flushed after each line so nothing is lost on a crash.

use std::path::Path;

use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LogFormat;

/// Filter used when `LOG_LEVEL` is unset.
pub const DEFAULT_FILTER: &str = "mcp_proxy=info,tower_http=info,warn";

/// Rotated log files kept next to the current one.
const KEEP_ROTATED_LOGS: u32 = 3;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize the global tracing subscriber.
pub fn init_tracing(format: LogFormat, log_file: Option<&Path>) -> std::io::Result<()> {
    let (filter, filter_warning) = env_filter(std::env::var("LOG_LEVEL").ok().as_deref());

    let mut layers: Vec<BoxedLayer> = vec![fmt_layer(format, std::io::stdout, true)];
    if let Some(path) = log_file {
        rotate_log_file(path, KEEP_ROTATED_LOGS);
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        layers.push(fmt_layer(format, FlushingWriter::new(file), false));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(std::io::Error::other)?;

    if let Some(warning) = filter_warning {
        tracing::warn!("{warning}");
    }

    // Startup banner
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = log_file.map(|p| p.display().to_string()),
        pid = std::process::id(),
        "=== mcp-proxy starting ==="
    );
    Ok(())
}

/// Build the filter from a `LOG_LEVEL` value: a bare level (`DEBUG`) or a
/// full directive string. Falls back to [`DEFAULT_FILTER`] with a warning.
fn env_filter(log_level: Option<&str>) -> (EnvFilter, Option<String>) {
    let Some(level) = log_level.map(str::trim).filter(|l| !l.is_empty()) else {
        return (EnvFilter::new(DEFAULT_FILTER), None);
    };
    match EnvFilter::try_new(level.to_ascii_lowercase()) {
        Ok(filter) => (filter, None),
        Err(e) => (
            EnvFilter::new(DEFAULT_FILTER),
            Some(format!("ignoring invalid LOG_LEVEL '{level}': {e}")),
        ),
    }
}

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true)
        .with_thread_ids(false);
    match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Rotate log files: `proxy.log` → `proxy.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
