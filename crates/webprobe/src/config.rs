//! Harness configuration.
//!
//! Values are layered, lowest precedence first: built-in defaults, an
//! optional YAML file, then `WEBPROBE_*` environment variables.
//!
//! ```yaml
//! base_url: http://localhost:8080
//! timeout_ms: 5000
//! poll_interval_ms: 25
//! backoff: !exponential
//!   factor: 2
//!   max_interval_ms: 400
//! window:
//!   width: 1280
//!   height: 800
//! ```

use crate::driver::Size;
use crate::result::{WebprobeError, WebprobeResult};
use crate::retry::{Backoff, RetryPolicy, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Base URL used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Environment variable overriding [`HarnessConfig::base_url`]
pub const ENV_BASE_URL: &str = "WEBPROBE_BASE_URL";
/// Environment variable overriding [`HarnessConfig::timeout_ms`]
pub const ENV_TIMEOUT_MS: &str = "WEBPROBE_TIMEOUT_MS";
/// Environment variable overriding [`HarnessConfig::poll_interval_ms`]
pub const ENV_POLL_INTERVAL_MS: &str = "WEBPROBE_POLL_INTERVAL_MS";

/// Settings for a test session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Application root that relative paths are joined onto
    pub base_url: String,
    /// Retry timeout for terminal operations
    pub timeout_ms: u64,
    /// Pause between retry attempts
    pub poll_interval_ms: u64,
    /// Growth of the pause between attempts
    pub backoff: Backoff,
    /// Window size applied when a page is created
    pub window: Option<Size>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            backoff: Backoff::Fixed,
            window: None,
        }
    }
}

impl HarnessConfig {
    /// Create a new builder
    #[must_use]
    pub fn builder() -> HarnessConfigBuilder {
        HarnessConfigBuilder::default()
    }

    /// Defaults overridden by the process environment
    ///
    /// # Errors
    ///
    /// Returns [`WebprobeError::Config`] if a variable does not parse.
    pub fn from_env() -> WebprobeResult<Self> {
        let mut config = Self::default();
        config.apply_vars(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a YAML document; missing keys keep their defaults
    ///
    /// # Errors
    ///
    /// Returns [`WebprobeError::Yaml`] on malformed input.
    pub fn from_yaml(yaml: &str) -> WebprobeResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Read a YAML file
    ///
    /// # Errors
    ///
    /// Returns an I/O or YAML error.
    pub fn from_file(path: impl AsRef<Path>) -> WebprobeResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Full layering: defaults, then `path` if given, then the environment,
    /// then validation
    ///
    /// # Errors
    ///
    /// Returns the first loading, parsing or validation error.
    pub fn load(path: Option<&Path>) -> WebprobeResult<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_vars(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from a variable lookup (`WEBPROBE_*` keys)
    ///
    /// # Errors
    ///
    /// Returns [`WebprobeError::Config`] if a numeric variable does not
    /// parse.
    pub fn apply_vars<F>(&mut self, lookup: F) -> WebprobeResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            self.timeout_ms = parse_ms(ENV_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = parse_ms(ENV_POLL_INTERVAL_MS, &raw)?;
        }
        Ok(())
    }

    /// Check invariants between fields
    ///
    /// # Errors
    ///
    /// Returns [`WebprobeError::Config`] describing the first problem found.
    pub fn validate(&self) -> WebprobeResult<()> {
        let fail = |message: String| Err(WebprobeError::Config { message });
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return fail(format!("base_url must be http(s), got {:?}", self.base_url));
        }
        if self.poll_interval_ms == 0 {
            return fail("poll_interval_ms must be positive".to_string());
        }
        if self.poll_interval_ms > self.timeout_ms {
            return fail(format!(
                "poll_interval_ms ({}) exceeds timeout_ms ({})",
                self.poll_interval_ms, self.timeout_ms
            ));
        }
        if let Backoff::Exponential {
            factor,
            max_interval_ms,
        } = self.backoff
        {
            if factor < 2 {
                return fail(format!("backoff factor must be at least 2, got {factor}"));
            }
            if max_interval_ms < self.poll_interval_ms {
                return fail("backoff max_interval_ms is below poll_interval_ms".to_string());
            }
        }
        if let Some(size) = self.window {
            if size.width == 0 || size.height == 0 {
                return fail(format!("window size must be non-zero, got {size}"));
            }
        }
        Ok(())
    }

    /// Retry policy described by this configuration
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(self.timeout_ms))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_backoff(self.backoff)
    }

    /// Join `path` onto the base URL
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

/// Join a path onto a base URL with exactly one `/` between them.
/// Absolute URLs are returned unchanged.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        format!("{base}/")
    } else {
        format!("{base}/{path}")
    }
}

fn parse_ms(key: &str, raw: &str) -> WebprobeResult<u64> {
    raw.trim().parse().map_err(|e| WebprobeError::Config {
        message: format!("{key}={raw:?} is not a number of milliseconds: {e}"),
    })
}

/// Builder for [`HarnessConfig`]
#[derive(Debug, Clone, Default)]
pub struct HarnessConfigBuilder {
    config: HarnessConfig,
}

impl HarnessConfigBuilder {
    /// Set the base URL
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    /// Set the poll interval
    #[must_use]
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set the backoff
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Set the initial window size
    #[must_use]
    pub fn window(mut self, width: u32, height: u32) -> Self {
        self.config.window = Some(Size::new(width, height));
        self
    }

    /// Build, validating the result
    ///
    /// # Errors
    ///
    /// Returns [`WebprobeError::Config`] if the values are inconsistent.
    pub fn build(self) -> WebprobeResult<HarnessConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    mod defaults {
        use super::*;

        #[test]
        fn test_default_values() {
            let config = HarnessConfig::default();
            assert_eq!(config.base_url, "http://localhost:3000");
            assert_eq!(config.timeout_ms, 10_000);
            assert_eq!(config.poll_interval_ms, 50);
            assert!(config.window.is_none());
            assert!(config.validate().is_ok());
        }

        #[test]
        fn test_retry_policy() {
            let policy = HarnessConfig::builder()
                .timeout_ms(2000)
                .poll_interval_ms(20)
                .build()
                .unwrap()
                .retry_policy();
            assert_eq!(policy.timeout, Duration::from_millis(2000));
            assert_eq!(policy.poll_interval, Duration::from_millis(20));
            assert_eq!(policy.backoff, Backoff::Fixed);
        }
    }

    mod layering {
        use super::*;

        #[test]
        fn test_env_overrides() {
            let mut config = HarnessConfig::default();
            config
                .apply_vars(vars(&[
                    (ENV_BASE_URL, "http://app:8080"),
                    (ENV_TIMEOUT_MS, " 2500 "),
                ]))
                .unwrap();
            assert_eq!(config.base_url, "http://app:8080");
            assert_eq!(config.timeout_ms, 2500);
            assert_eq!(config.poll_interval_ms, 50);
        }

        #[test]
        fn test_bad_env_number() {
            let mut config = HarnessConfig::default();
            let err = config
                .apply_vars(vars(&[(ENV_POLL_INTERVAL_MS, "fast")]))
                .unwrap_err();
            assert!(matches!(err, WebprobeError::Config { .. }));
            assert!(err.to_string().contains(ENV_POLL_INTERVAL_MS));
        }

        #[test]
        fn test_partial_yaml_keeps_defaults() {
            let config = HarnessConfig::from_yaml("timeout_ms: 3000\n").unwrap();
            assert_eq!(config.timeout_ms, 3000);
            assert_eq!(config.base_url, DEFAULT_BASE_URL);
        }

        #[test]
        fn test_yaml_file_with_backoff_and_window() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(
                file,
                "base_url: http://localhost:8080\n\
                 poll_interval_ms: 25\n\
                 backoff: !exponential\n  factor: 2\n  max_interval_ms: 400\n\
                 window:\n  width: 1024\n  height: 768"
            )
            .unwrap();
            let config = HarnessConfig::load(Some(file.path())).unwrap();
            assert_eq!(config.poll_interval_ms, 25);
            assert_eq!(
                config.backoff,
                Backoff::Exponential {
                    factor: 2,
                    max_interval_ms: 400
                }
            );
            assert_eq!(config.window, Some(Size::new(1024, 768)));
        }

        #[test]
        fn test_yaml_roundtrip_through_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("webprobe.yaml");
            let original = HarnessConfig::builder()
                .base_url("https://staging.example")
                .window(800, 600)
                .build()
                .unwrap();
            std::fs::write(&path, serde_yaml_ng::to_string(&original).unwrap()).unwrap();
            assert_eq!(HarnessConfig::from_file(&path).unwrap(), original);
        }

        #[test]
        fn test_missing_file_is_io_error() {
            let dir = tempfile::tempdir().unwrap();
            let err = HarnessConfig::from_file(dir.path().join("absent.yaml")).unwrap_err();
            assert!(matches!(err, WebprobeError::Io(_)));
        }

        #[test]
        fn test_malformed_yaml() {
            let err = HarnessConfig::from_yaml("timeout_ms: [").unwrap_err();
            assert!(matches!(err, WebprobeError::Yaml(_)));
        }
    }

    mod validation {
        use super::*;

        #[test]
        fn test_rejects_inconsistent_values() {
            let bad = [
                HarnessConfig::builder().base_url("localhost:3000"),
                HarnessConfig::builder().poll_interval_ms(0),
                HarnessConfig::builder().timeout_ms(10).poll_interval_ms(50),
                HarnessConfig::builder().backoff(Backoff::Exponential {
                    factor: 1,
                    max_interval_ms: 1000,
                }),
                HarnessConfig::builder().window(0, 600),
            ];
            for builder in bad {
                assert!(builder.build().is_err());
            }
        }
    }

    mod urls {
        use super::*;

        #[test]
        fn test_join_url() {
            assert_eq!(join_url("http://h:3000", "samples"), "http://h:3000/samples");
            assert_eq!(join_url("http://h:3000/", "/samples"), "http://h:3000/samples");
            assert_eq!(join_url("http://h:3000", ""), "http://h:3000/");
            assert_eq!(join_url("http://h:3000", "https://other/x"), "https://other/x");
        }

        #[test]
        fn test_config_url() {
            let config = HarnessConfig::default();
            assert_eq!(config.url("/program"), "http://localhost:3000/program");
        }
    }
}
