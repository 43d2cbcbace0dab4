//! Log output for test binaries.
//!
//! The engine only emits `tracing` events; nothing is printed unless a
//! subscriber is installed. Call [`init`] at the top of a test to see the
//! retry loop at work:
//!
//! ```text
//! WEBPROBE_LOG=webprobe=debug cargo test -- --nocapture
//! ```

use tracing_subscriber::EnvFilter;

/// Variable holding the filter directives, checked before `RUST_LOG`
pub const LOG_ENV: &str = "WEBPROBE_LOG";

/// Level used when neither variable is set
pub const DEFAULT_DIRECTIVE: &str = "warn";

/// Filter from `WEBPROBE_LOG`, then `RUST_LOG`, then [`DEFAULT_DIRECTIVE`]
#[must_use]
pub fn env_filter() -> EnvFilter {
    filter_from(|key| std::env::var(key).ok())
}

fn filter_from(lookup: impl Fn(&str) -> Option<String>) -> EnvFilter {
    [LOG_ENV, "RUST_LOG"]
        .into_iter()
        .filter_map(|key| lookup(key))
        .find_map(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install a test-friendly `fmt` subscriber.
///
/// Output goes through the test writer, so it is captured per test unless
/// `--nocapture` is given. Safe to call from every test: returns `false`
/// when a global subscriber is already set.
pub fn init() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .with_test_writer()
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let _ = init();
        assert!(!init());
        tracing::debug!(target: "webprobe::logging", "still fine after double init");
    }

    #[test]
    fn test_filter_precedence() {
        let filter = filter_from(|key| match key {
            LOG_ENV => Some("webprobe=trace".to_string()),
            _ => Some("error".to_string()),
        });
        assert_eq!(filter.to_string(), "webprobe=trace");

        let fallback = filter_from(|key| (key == "RUST_LOG").then(|| "info".to_string()));
        assert_eq!(fallback.to_string(), "info");

        assert_eq!(filter_from(|_| None).to_string(), DEFAULT_DIRECTIVE);
    }

    #[test]
    fn test_bad_directive_falls_through() {
        let filter = filter_from(|key| match key {
            LOG_ENV => Some("webprobe=loud".to_string()),
            _ => Some("debug".to_string()),
        });
        assert_eq!(filter.to_string(), "debug");
    }
}
