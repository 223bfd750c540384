//! Tracing initialization.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the log filter, e.g. `DOCHEAL_LOG=docheal::apply=debug`.
pub const LOG_ENV: &str = "DOCHEAL_LOG";

static INIT: Once = Once::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    pub fn from_flags(quiet: bool, verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else if quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        }
    }

    /// Filter used when `DOCHEAL_LOG` is unset or invalid.
    pub fn default_filter(self) -> &'static str {
        match self {
            Verbosity::Quiet => "docheal=warn",
            Verbosity::Normal => "docheal=info",
            Verbosity::Verbose => "docheal=debug",
        }
    }
}

/// Install the global subscriber, logging to stderr. Later calls do nothing.
pub fn init_tracing(verbosity: Verbosity) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(verbosity.default_filter()));

        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(verbosity == Verbosity::Verbose)
            .with_line_number(verbosity == Verbosity::Verbose);

        // Another subscriber may already be installed (tests, embedding)
        let _ = tracing_subscriber::registry().with(layer).with(filter).try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(true, false), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Verbose);
        assert_eq!(Verbosity::Quiet.default_filter(), "docheal=warn");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_tracing(Verbosity::Normal);
        init_tracing(Verbosity::Verbose);
    }
}
