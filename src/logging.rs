//! Logging setup
//!
//! The library only emits through the `log` facade. Embedders that have no
//! logger of their own can call `init_logging` once at startup; `RUST_LOG`
//! still overrides the level given here.

use env_logger::{Builder, Env};

/// Install env_logger with `default_level` as the fallback filter.
///
/// Safe to call more than once; only the first call installs a logger.
pub fn init_logging(default_level: &str) {
    let env = Env::default().default_filter_or(default_level);
    if Builder::from_env(env)
        .format_timestamp_millis()
        .try_init()
        .is_err()
    {
        log::debug!("[Logging] Logger already installed, keeping existing one");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging("debug");
        init_logging("info");
        log::info!("[Logging] still alive");
    }
}
