use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `level` wins over `RUST_LOG`; `default` applies when
/// neither is usable. Logs go to stderr so stdout stays reserved for output lines.
pub(crate) fn init(level: Option<&str>, default: &str) {
    let filter = level
        .map(EnvFilter::try_new)
        .and_then(Result::ok)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
