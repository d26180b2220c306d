use anyhow::{Result, anyhow};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const TARGET: &str = "vault_organizer";

fn default_directive(verbose: bool, log_level: Option<&str>) -> String {
    match (verbose, log_level) {
        (_, Some(level)) if level.contains('=') => level.to_string(),
        (_, Some(level)) => format!("{TARGET}={level}"),
        (true, None) => format!("{TARGET}=debug"),
        (false, None) => format!("{TARGET}=warn"),
    }
}

/// Logs go to stderr so `--json` output on stdout stays machine-readable.
/// `ORGANIZER_LOG` (or `RUST_LOG`) replaces the flag-derived filter.
pub fn init_tracing(verbose: bool, log_level: Option<&str>, log_json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_env("ORGANIZER_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    if log_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .map_err(|err| anyhow!("failed to initialize logging: {err}"))
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .compact(),
            )
            .try_init()
            .map_err(|err| anyhow!("failed to initialize logging: {err}"))
    }
}
