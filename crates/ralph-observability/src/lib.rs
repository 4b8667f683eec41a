use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Renders each event as a single human-readable line: `[ISO timestamp]
/// [LEVEL] message` (spec.md §6 "Engine log file"). Adapted from the
/// teacher's `tandem-observability` JSON-lines file layer, which this crate
/// is otherwise grounded on — this engine's log file is meant to be read
/// directly, not machine-parsed, so plain text replaces the teacher's JSON
/// event envelope.
struct PlainLineFormat;

impl<S, N> FormatEvent<S, N> for PlainLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let timestamp = Utc::now().to_rfc3339();
        let level = *event.metadata().level();
        write!(writer, "[{timestamp}] [{level}] ")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Initializes the process-wide `tracing` subscriber: a compact, ANSI
/// console layer (matching the engine binary's own `tracing_subscriber::fmt()`
/// convention) plus a non-blocking file layer appending plain-text lines to
/// `<logs_dir>/ralph-ultra.log` (spec.md §6). Returns the
/// [`WorkerGuard`] the caller must keep alive for the process lifetime so
/// buffered lines are flushed on shutdown.
pub fn init_process_logging(logs_dir: &Path) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)?;

    let file_appender = tracing_appender::rolling::never(logs_dir, "ralph-ultra.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .event_format(PlainLineFormat)
        .with_writer(non_blocking)
        .with_ansi(false);

    let console_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_ansi(true);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .ok();

    Ok(guard)
}

pub fn engine_log_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join("ralph-ultra.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_log_path_joins_logs_dir() {
        let dir = PathBuf::from("/tmp/demo-project/logs");
        assert_eq!(engine_log_path(&dir), dir.join("ralph-ultra.log"));
    }
}
