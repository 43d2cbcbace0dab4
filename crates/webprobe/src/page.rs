//! Page: the entry point tests talk to.
//!
//! A [`Page`] owns the browser driver, the clock the retry loop runs on and
//! the default [`RetryPolicy`]. Locators borrow the page, so a test reads:
//!
//! ```ignore
//! let page = Page::from_config(driver, &HarnessConfig::load(None)?)?;
//! page.goto("/")?;
//! page.select("#counter-value").where_(text_equals("0")).eval()?;
//! ```

use crate::clock::{Clock, SystemClock};
use crate::config::{join_url, HarnessConfig};
use crate::driver::{BrowserDriver, Size};
use crate::locator::{Locator, Within};
use crate::result::{Observation, WebprobeError, WebprobeResult};
use crate::retry::{Attempt, RetryEngine, RetryPolicy};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// A browser tab under test
pub struct Page {
    driver: Box<dyn BrowserDriver>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    base_url: Option<String>,
}

impl Page {
    /// Page over `driver` with the wall clock and default policy
    #[must_use]
    pub fn new(driver: impl BrowserDriver + 'static) -> Self {
        Self {
            driver: Box::new(driver),
            clock: Arc::new(SystemClock::new()),
            policy: RetryPolicy::default(),
            base_url: None,
        }
    }

    /// Page configured from a [`HarnessConfig`]; applies the configured
    /// window size right away
    ///
    /// # Errors
    ///
    /// Returns a configuration error or the driver's resize error.
    pub fn from_config(
        driver: impl BrowserDriver + 'static,
        config: &HarnessConfig,
    ) -> WebprobeResult<Self> {
        config.validate()?;
        let page = Self::new(driver)
            .with_policy(config.retry_policy())
            .with_base_url(config.base_url.clone());
        if let Some(size) = config.window {
            page.set_window_size(size)?;
        }
        Ok(page)
    }

    /// Use a different clock (a [`FakeClock`](crate::FakeClock) in tests)
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the default retry policy
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Base URL for [`Page::goto`]
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// The driver
    #[must_use]
    pub fn driver(&self) -> &dyn BrowserDriver {
        &*self.driver
    }

    /// The clock
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        &*self.clock
    }

    /// Default retry policy for locators from this page
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Base URL, if configured
    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Document-scoped locator for a CSS selector
    #[must_use]
    pub fn select(&self, expr: &str) -> Locator<'_> {
        Locator::new(self, expr, None)
    }

    /// Scope subsequent selects under the elements `parent` resolves to
    #[must_use]
    pub fn within<'p>(&'p self, parent: &Locator<'p>) -> Within<'p> {
        Within::new(parent.clone())
    }

    /// Navigate to an absolute URL
    ///
    /// # Errors
    ///
    /// Returns the driver's navigation error.
    pub fn navigate(&self, url: &str) -> WebprobeResult<()> {
        info!(target: "webprobe::page", %url, "navigate");
        self.driver.navigate(url)
    }

    /// Navigate to `path` relative to the base URL
    ///
    /// # Errors
    ///
    /// [`WebprobeError::Config`] if no base URL is set, otherwise the
    /// driver's navigation error.
    pub fn goto(&self, path: &str) -> WebprobeResult<()> {
        let base = self.base_url.as_deref().ok_or_else(|| WebprobeError::Config {
            message: format!("cannot resolve {path:?}: no base URL configured"),
        })?;
        self.navigate(&join_url(base, path))
    }

    /// Current window size
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    pub fn window_size(&self) -> WebprobeResult<Size> {
        self.driver.window_size()
    }

    /// Resize the window
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    pub fn set_window_size(&self, size: Size) -> WebprobeResult<()> {
        debug!(target: "webprobe::page", %size, "resize");
        self.driver.set_window_size(size)
    }

    /// Grow or shrink the window relative to its current size
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    pub fn resize_by(&self, dw: i32, dh: i32) -> WebprobeResult<Size> {
        let current = self.window_size()?;
        let next = Size::new(
            current.width.saturating_add_signed(dw).max(1),
            current.height.saturating_add_signed(dh).max(1),
        );
        self.set_window_size(next)?;
        Ok(next)
    }

    /// Poll an arbitrary condition under the page's retry policy.
    ///
    /// For state that no locator captures, such as the window size after a
    /// resize.
    ///
    /// # Errors
    ///
    /// [`WebprobeError::Timeout`] if the condition never holds.
    pub fn wait_until<F>(&self, description: &str, mut condition: F) -> WebprobeResult<()>
    where
        F: FnMut(&dyn BrowserDriver) -> WebprobeResult<bool>,
    {
        let driver = self.driver();
        RetryEngine::new(self.policy, self.clock())
            .run(description, || {
                Ok(if condition(driver)? {
                    Attempt::Ready(())
                } else {
                    Attempt::Pending(Observation {
                        unmet: Some(description.to_string()),
                        ..Observation::empty()
                    })
                })
            })
            .map(|_| ())
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("clock", &self.clock)
            .field("policy", &self.policy)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
