//! Logging and observability setup for dzx
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to binaries and tests through [`init_tracing`].

use tracing::{Level, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Verbosity level at which internal diagnostics are enabled.
pub const DIAGNOSTICS_LEVEL: u8 = 3;

/// Filter directive used when `RUST_LOG` is not set.
#[must_use]
pub fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        level if level >= DIAGNOSTICS_LEVEL => "dzx=debug,info",
        _ => "dzx=info,warn",
    }
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise the filter comes from
/// [`default_filter`]. Output always goes to stderr so it never interleaves
/// with a command's captured stdout.
///
/// # Arguments
/// * `verbose` - Configured verbosity (0..=3); level 3 switches to the
///   diagnostic format with targets and span close events.
///
/// # Errors
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(verbose: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(verbose)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if verbose >= DIAGNOSTICS_LEVEL {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Span wrapping one process run loop, retries included.
#[must_use]
pub fn process_span(handle: u64, command: &str) -> tracing::Span {
    span!(
        Level::INFO,
        "process",
        handle = handle,
        command = %command,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_by_verbosity() {
        assert_eq!(default_filter(0), "warn");
        assert_eq!(default_filter(1), "dzx=info,warn");
        assert_eq!(default_filter(2), "dzx=info,warn");
        assert_eq!(default_filter(3), "dzx=debug,info");
    }

    #[test]
    fn test_default_filters_parse() {
        for verbose in 0..=DIAGNOSTICS_LEVEL {
            assert!(EnvFilter::try_new(default_filter(verbose)).is_ok());
        }
    }

    #[test]
    fn test_process_span_without_subscriber() {
        // No subscriber installed: the span is disabled but must still be usable.
        let span = process_span(7, "echo hi");
        let _guard = span.enter();
    }
}
