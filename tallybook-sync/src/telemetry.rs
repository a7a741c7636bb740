//! Log output setup for hosts embedding the engine.

/// Installs a stderr `tracing` subscriber filtered by `RUST_LOG`
/// (default `info`). Calling it again, or after the host installed its own
/// subscriber, is a no-op.
pub fn init_tracing() {
    init_tracing_with_default("info");
}

/// Same as [`init_tracing`] with a caller-chosen default filter.
pub fn init_tracing_with_default(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
