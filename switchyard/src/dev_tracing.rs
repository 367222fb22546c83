/// Development helper: initialize tracing subscriber when `RUST_LOG` is set.
///
/// Benches and tests can call `switchyard::dev_tracing::init_tracing()` to
/// enable structured logging while debugging. This is a no-op when `RUST_LOG`
/// is not set or when a global subscriber is already installed.
///
/// Events come from the `switchyard_core` and `switchyard_runtime` targets and
/// carry a bracketed tag naming the component: `[CONTEXT]`, `[REACTOR]`,
/// `[SESSION]`, `[SOCKET]`, `[INPROC]`, `[POLL]`, `[PROXY]`, and the pattern
/// tags `[REQ]`, `[REP]` and `[PUB]`. For example
/// `RUST_LOG=switchyard_runtime=debug` shows socket lifecycles and proxy
/// steering, and `RUST_LOG=switchyard_runtime=trace` adds per-session detail.
pub fn init_tracing() {
    if std::env::var_os("RUST_LOG").is_some() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_thread_names(true)
            .try_init();
    }
}
