use log::debug;

/// Initializes the logger with the `env_logger` crate.
///
/// Honors `RUST_LOG`; defaults to `info` when it is unset. Calling it more
/// than once is harmless.
pub fn init_logger() {
    let env = env_logger::Env::default().default_filter_or("info");
    if env_logger::Builder::from_env(env).try_init().is_err() {
        debug!("Logger already initialized");
    }
}

/// Same as [`init_logger`] but with an explicit default filter, e.g.
/// `"dsmr_rs=debug"`.
pub fn init_logger_with_filter(default_filter: &str) {
    let env = env_logger::Env::default().default_filter_or(default_filter);
    if env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init()
        .is_err()
    {
        debug!("Logger already initialized");
    }
}
