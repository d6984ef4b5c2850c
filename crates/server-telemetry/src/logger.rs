// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log output for hosts that do not install their own subscriber.
//!
//! ```text
//! SERVER_TELEMETRY | LEVEL | [span_name{span_fields}:] message {event_fields}
//! ```

use std::fmt;

use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Formats every line as `SERVER_TELEMETRY | LEVEL | ...`.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(&mut writer, "SERVER_TELEMETRY | {} | ", event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn env_filter(log_level: &str) -> Result<EnvFilter, ConfigError> {
    let level = log_level.trim().to_lowercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(ConfigError::InvalidLogLevel(log_level.to_string()));
    }
    // HTTP client internals are too chatty at debug.
    EnvFilter::try_new(format!("h2=off,hyper=off,rustls=off,{level}"))
        .map_err(|e| ConfigError::Logger(e.to_string()))
}

/// Installs a global subscriber writing to stderr at `log_level`.
pub fn init(log_level: &str) -> Result<(), ConfigError> {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(log_level)?)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .event_format(Formatter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| ConfigError::Logger(e.to_string()))?;
    tracing::debug!("TELEMETRY | Logging subsystem enabled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_core::dispatcher::{self, Dispatch};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(level: &str, emit: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt::Subscriber::builder()
            .with_env_filter(env_filter(level).unwrap())
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .event_format(Formatter)
            .finish();

        dispatcher::with_default(&Dispatch::new(subscriber), emit);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_format_with_prefix_and_level() {
        let output = capture("info", || {
            tracing::info!("TELEMETRY | Shutdown complete");
        });
        assert_eq!(output, "SERVER_TELEMETRY | INFO | TELEMETRY | Shutdown complete\n");
    }

    #[test]
    fn test_format_includes_spans_and_fields() {
        let output = capture("debug", || {
            tracing::debug_span!("flush", batch = 3).in_scope(|| {
                tracing::debug!(events = 3, "sent");
            });
        });
        assert_eq!(output, "SERVER_TELEMETRY | DEBUG | flush{batch=3}: sent events=3\n");
    }

    #[test]
    fn test_level_filter_applies() {
        let output = capture("warn", || {
            tracing::info!("hidden");
            tracing::warn!("shown");
        });
        assert_eq!(output, "SERVER_TELEMETRY | WARN | shown\n");
    }

    #[test]
    fn test_invalid_log_level_is_rejected() {
        assert!(matches!(
            env_filter("verbose"),
            Err(ConfigError::InvalidLogLevel(level)) if level == "verbose"
        ));
        assert!(env_filter(" DEBUG ").is_ok());
        assert!(matches!(init("verbose"), Err(ConfigError::InvalidLogLevel(_))));
    }

    #[test]
    fn test_fields_are_plain_text() {
        let output = capture("info", || {
            tracing::info_span!("deliver", dataset = "servers").in_scope(|| {
                tracing::info!(attempt = 2, status = 503, "retrying");
            });
        });
        assert!(!output.contains('\u{1b}'), "unexpected escape codes: {output:?}");
        assert_eq!(
            output,
            "SERVER_TELEMETRY | INFO | deliver{dataset=\"servers\"}: retrying attempt=2 status=503\n"
        );
    }
}
