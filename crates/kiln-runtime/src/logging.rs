//! Log setup for the host binary

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `KILN_LOG=kiln_engine=debug`
pub const LOG_ENV: &str = "KILN_LOG";

/// Install a stderr subscriber.
///
/// `KILN_LOG` wins over `default_level`. Returns false when a global
/// subscriber was already set.
pub fn init(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .compact()
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_refused() {
        init("warn");
        assert!(!init("debug"));
    }
}
