//! Logging setup
//!
//! The crate logs through the `log` facade. Hosts that have no logger of
//! their own can call `init_logging` once at startup.

/// Install `env_logger`, defaulting to `info` when `RUST_LOG` is unset.
/// Returns false when a logger was already installed.
pub fn init_logging() -> bool {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        assert!(!init_logging());
    }
}
