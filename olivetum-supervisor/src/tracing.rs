//! Tracing setup for the supervisor and its frontends.
//!
//! Binaries call one of the `init_*` functions once at startup to install a
//! subscriber. Library code uses `use crate::tracing::prelude::*` for the
//! `trace!()`, `debug!()`, `info!()`, `warn!()`, and `error!()` macros.
//!
//! Output of the supervised miner is not routed through here; it lands in the
//! ring log (see [`crate::logs`]). Frontends that want to echo it emit events
//! with target [`MINER_TARGET`], which the stdout formatter prints as a plain
//! passthrough line instead of a regular log record.

use std::env;
use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

/// Target used when echoing miner output lines.
pub const MINER_TARGET: &str = "miner";

/// Initialize logging.
///
/// If running under systemd, use journald; otherwise fall back to stdout.
pub fn init_journald_or_stdout() {
    if env::var("JOURNAL_STREAM").is_ok() {
        if let Ok(layer) = tracing_journald::layer() {
            tracing_subscriber::registry().with(layer).init();
        } else {
            install_stdout(LevelFilter::INFO);
            error!("Failed to initialize journald logging, using stdout.");
        }
    } else {
        install_stdout(LevelFilter::INFO);
    }
}

/// Initialize stdout logging with `level` as the default instead of INFO.
///
/// `RUST_LOG` still takes precedence.
pub fn init_stdout_with_default(level: LevelFilter) {
    install_stdout(level);
}

fn install_stdout(default_level: LevelFilter) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTimer)
                .with_target(true)
                .fmt_fields(tracing_subscriber::fmt::format::DefaultFields::new())
                .event_format(SupervisorFormatter),
        )
        .init();
}

/// Event formatter: local timestamp, coloured level, target without the crate
/// prefix, and structured fields on a second dimmed line.
struct SupervisorFormatter;

/// Visitor that splits an event into its message and its other fields.
#[derive(Default)]
struct FieldCollector {
    fields: Vec<(String, String)>,
    message: Option<String>,
}

impl tracing::field::Visit for FieldCollector {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let formatted = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(formatted);
            return;
        }
        // Some("foo") -> foo
        let cleaned = match formatted.strip_prefix("Some(") {
            Some(inner) => inner.strip_suffix(')').unwrap_or(inner).to_string(),
            None => formatted,
        };
        self.fields.push((field.name().to_string(), cleaned));
    }
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for SupervisorFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);

        LocalTimer.format_time(&mut writer)?;
        write!(writer, " ")?;

        let target = event.metadata().target();
        let message = visitor
            .message
            .as_deref()
            .map(|m| m.trim_matches('"'))
            .unwrap_or_default();

        // Echoed miner output: keep it as close to the raw line as possible.
        if target == MINER_TARGET {
            return writeln!(writer, "\x1b[36mminer\x1b[0m| {}", message);
        }

        let (level_color, level_text) = match *event.metadata().level() {
            tracing::Level::ERROR => ("\x1b[31m", "ERROR"),
            tracing::Level::WARN => ("\x1b[33m", "WARN "),
            tracing::Level::INFO => ("\x1b[32m", "INFO "),
            tracing::Level::DEBUG => ("\x1b[34m", "DEBUG"),
            tracing::Level::TRACE => ("\x1b[35m", "TRACE"),
        };
        write!(writer, "{}{}\x1b[0m ", level_color, level_text)?;

        let short_target = if let Some(stripped) = target.strip_prefix("olivetum_supervisor::") {
            stripped.to_string()
        } else if target == "log" {
            // log compatibility layer carries the real target in a field
            visitor
                .fields
                .iter()
                .find(|(k, _)| k == "log.target")
                .map(|(_, v)| v.trim_matches('"').to_string())
                .unwrap_or_else(|| target.to_string())
        } else {
            target.to_string()
        };
        write!(writer, "{}: {}", short_target, message)?;

        let display_fields: Vec<_> = visitor
            .fields
            .iter()
            .filter(|(k, _)| !k.starts_with("log."))
            .collect();

        if !display_fields.is_empty() {
            writeln!(writer)?;
            // Align with the target column: "HH:MM:SS LEVEL " is 15 chars.
            write!(writer, "\x1b[90m               ")?;
            for (i, (key, value)) in display_fields.iter().enumerate() {
                if i > 0 {
                    write!(writer, ", ")?;
                }
                write!(writer, "{}={}", key, value.trim_matches('"'))?;
            }
            write!(writer, "\x1b[0m")?;
        }

        writeln!(writer)
    }
}

// Local time to the nearest second; the default timer is UTC with a long
// RFC 3339 stamp.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or(OffsetDateTime::now_utc());
        let stamp = now
            .format(time::macros::format_description!(
                "[hour]:[minute]:[second]"
            ))
            .map_err(|_| std::fmt::Error)?;
        write!(w, "{}", stamp)
    }
}
