//! Tracing subscriber initialization.
//!
//! # Usage
//!
//! ```no_run
//! use dagflow_types::config::LogFormat;
//!
//! dagflow_observe::tracing_setup::init_tracing(LogFormat::Pretty, "warn").unwrap();
//! ```

use dagflow_types::config::LogFormat;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` (e.g. `"info"` or
/// `"dagflow_core=debug"`) is used.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(
    format: LogFormat,
    default_directive: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = build_filter(default_directive);

    match format {
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    Ok(())
}

fn build_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Default directive for a CLI verbosity count (`-v`, `-vv`, ...).
pub fn directive_for_verbosity(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_for_verbosity() {
        assert_eq!(directive_for_verbosity(0, false), "warn");
        assert_eq!(directive_for_verbosity(1, false), "info");
        assert_eq!(directive_for_verbosity(2, false), "debug");
        assert_eq!(directive_for_verbosity(9, false), "trace");
        assert_eq!(directive_for_verbosity(3, true), "error");
    }

    #[test]
    fn test_second_init_is_an_error() {
        // The first call may lose to another test in this binary; either way
        // a global subscriber is installed afterwards.
        let _ = init_tracing(LogFormat::Pretty, "warn");
        assert!(init_tracing(LogFormat::Json, "warn").is_err());
    }
}
