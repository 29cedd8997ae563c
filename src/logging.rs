//! Diagnostic logging through `tracing`.
//!
//! Level priority: the `--log-level` flag, then the `DOCWATCH_LOG`
//! environment variable (any `EnvFilter` directive), then `warn`.
//! Logs go to stderr; stdout carries the command report.

use tracing_subscriber::EnvFilter;

/// Environment variable consulted when no `--log-level` flag is given.
pub const LOG_ENV: &str = "DOCWATCH_LOG";

/// Verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Everything, including per-line detail.
    Debug,
    /// Failures only.
    Error,
    /// Progress messages.
    Info,
    /// Very chatty.
    Trace,
    /// Skipped expressions and recoverable failures.
    Warn,
}

impl LogLevel {
    /// Directive string understood by `EnvFilter`.
    const fn directive(self) -> &'static str {
        return match self {
            Self::Debug => "debug",
            Self::Error => "error",
            Self::Info => "info",
            Self::Trace => "trace",
            Self::Warn => "warn",
        };
    }
}

/// Build the filter from the flag or the environment.
fn filter_for(cli_level: Option<LogLevel>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level.directive());
    }
    return EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| return EnvFilter::new("warn"));
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(cli_level: Option<LogLevel>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_for(cli_level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
    return;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_wins_over_environment() {
        let filter = filter_for(Some(LogLevel::Debug));
        assert_eq!(filter.max_level_hint(), Some(tracing::level_filters::LevelFilter::DEBUG));
    }

    #[test]
    fn directives_match_level_names() {
        assert_eq!(LogLevel::Warn.directive(), "warn");
        assert_eq!(LogLevel::Trace.directive(), "trace");
    }
}
