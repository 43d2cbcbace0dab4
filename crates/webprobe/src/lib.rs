//! Webprobe: retrying element queries for browser-level integration tests.
//!
//! Reactive front-ends render asynchronously, so a test that reads the DOM
//! right after clicking a button sees stale state. Webprobe statements are
//! declarative instead: describe which elements should exist and what they
//! should look like, and the engine keeps re-querying until that holds or a
//! deadline passes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ Page.select  │──►│ Locator      │──►│ RetryEngine  │──►│ BrowserDriver│
//! │ / within     │   │ where_/expect│   │ (Clock)      │   │ FakeDom/CDP │
//! └──────────────┘   └──────────────┘   └──────┬───────┘   └─────────────┘
//!                                              ▼
//!                                eval │ eval_with │ click
//! ```
//!
//! # Example
//!
//! ```ignore
//! use webprobe::prelude::*;
//!
//! let page = Page::from_config(driver, &HarnessConfig::load(None)?)?;
//! page.goto("/")?;
//! page.select("#counter-value").where_(text_equals("0")).expect_one().eval()?;
//! page.select("button").where_(text_equals("+")).click()?;
//! page.select("#counter-value").where_(text_equals("1")).eval()?;
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod clock;
pub mod config;
mod driver;
mod locator;
pub mod logging;
pub mod mock;
mod page;
pub mod predicate;
mod result;
mod retry;

/// Chromium driver over CDP (requires the `browser` feature)
#[cfg(feature = "browser")]
pub mod cdp;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{HarnessConfig, HarnessConfigBuilder};
pub use driver::{BrowserDriver, Element, ElementHandle, Size};
pub use locator::{Expectation, Locator, Within};
pub use page::Page;
pub use predicate::{
    attr_equals, custom, has_attr, has_class, not, size_equals, text_contains, text_equals,
    text_matches, text_starts_with, Predicate,
};
pub use result::{Observation, WebprobeError, WebprobeResult, MAX_OBSERVED_VALUES};
pub use retry::{
    Attempt, Backoff, Resolved, RetryEngine, RetryPolicy, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_TIMEOUT_MS,
};

#[cfg(feature = "browser")]
pub use cdp::{BrowserConfig, ChromiumDriver};

/// Everything a test file usually needs
pub mod prelude {
    pub use super::clock::{Clock, FakeClock, SystemClock};
    pub use super::config::HarnessConfig;
    pub use super::driver::{BrowserDriver, Element, ElementHandle, Size};
    pub use super::locator::{Expectation, Locator};
    pub use super::mock::{FakeDom, NodeSpec};
    pub use super::page::Page;
    pub use super::predicate::{
        attr_equals, custom, has_attr, has_class, not, size_equals, text_contains, text_equals,
        text_matches, text_starts_with, Predicate,
    };
    pub use super::result::{WebprobeError, WebprobeResult};
    pub use super::retry::{Backoff, RetryPolicy};

    #[cfg(feature = "browser")]
    pub use super::cdp::{BrowserConfig, ChromiumDriver};
}
