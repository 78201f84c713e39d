//! Logging setup.

use tracing_subscriber::EnvFilter;

/// Overrides the default log filter when neither `-v` nor `--trace` is given.
pub const LOG_ENV: &str = "WARDEN_LOG";

/// Filter directive for the given flags.
pub fn filter_directive(verbose: bool, trace: bool, env_value: Option<&str>) -> String {
    if trace {
        "trace".to_string()
    } else if verbose {
        "debug".to_string()
    } else if let Some(value) = env_value.filter(|v| !v.is_empty()) {
        value.to_string()
    } else {
        "warn".to_string()
    }
}

/// Install the global subscriber. Logs go to stderr so dry-run output on
/// stdout stays clean.
pub fn init_logging(verbose: bool, trace: bool) {
    let env_value = std::env::var(LOG_ENV).ok();
    let directive = filter_directive(verbose, trace, env_value.as_deref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_precedence() {
        assert_eq!(filter_directive(true, true, Some("info")), "trace");
        assert_eq!(filter_directive(true, false, Some("info")), "debug");
        assert_eq!(filter_directive(false, false, Some("info")), "info");
        assert_eq!(filter_directive(false, false, Some("")), "warn");
        assert_eq!(filter_directive(false, false, None), "warn");
    }
}
