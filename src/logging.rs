use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber writing to stderr, honoring `RUST_LOG`
/// with a default level of `info`.
///
/// Logging must already be installed by the time `clone3` runs: the child
/// writes events of its own (mount failures, execve failures) before the
/// subscriber could otherwise be re-installed post-fork, and `tracing`'s
/// global dispatcher is not something a forked child can safely reinitialize
/// mid-flight.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
