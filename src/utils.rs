use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Installs a global `tracing` subscriber printing to stderr.
///
/// The filter is read from `RUST_LOG` and defaults to `info`. Container
/// internals log at `debug` (registration, plan compilation) and `trace`
/// (provider calls, cache hits), e.g. `RUST_LOG=tsunagi=trace`.
pub fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_once() {
        // the global subscriber can only be installed once per process
        let _ = init_logging();
        assert!(init_logging().is_err());
    }
}
