//! Chromium driver over the Chrome `DevTools` Protocol.
//!
//! chromiumoxide is async; [`ChromiumDriver`] owns a tokio runtime and
//! blocks on each call, which is the synchronous round-trip model the
//! locator engine expects.
//!
//! Handles are only meaningful within one DOM snapshot. Every
//! document-scoped query starts a new snapshot and forgets the handles of
//! the previous one, which then read as stale.

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use crate::driver::{BrowserDriver, ElementHandle, Size};
use crate::result::{WebprobeError, WebprobeResult};
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Runtime;
use tracing::{debug, warn};

/// Fragments of CDP error text that mean the node is gone
const STALE_MARKERS: &[&str] = &[
    "Could not find node",
    "No node with given id",
    "No node found",
    "Node is detached",
    "not attached to the DOM",
];

/// Launch options for Chromium
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run without a visible window
    pub headless: bool,
    /// Chromium sandbox (disable in containers)
    pub sandbox: bool,
    /// Path to the Chromium binary; auto-detected when `None`
    pub chromium_path: Option<String>,
    /// Initial window size
    pub window: Size,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: true,
            chromium_path: None,
            window: Size::new(1280, 720),
        }
    }
}

impl BrowserConfig {
    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Disable the sandbox (containers, CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }

    /// Set the Chromium binary
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Set the initial window size
    #[must_use]
    pub const fn with_window(mut self, width: u32, height: u32) -> Self {
        self.window = Size::new(width, height);
        self
    }
}

/// Blocking [`BrowserDriver`] backed by a Chromium tab
pub struct ChromiumDriver {
    runtime: Runtime,
    browser: Mutex<Browser>,
    page: CdpPage,
    elements: Mutex<HashMap<String, Arc<Element>>>,
    next_id: AtomicU64,
}

impl ChromiumDriver {
    /// Launch Chromium and open a blank tab
    ///
    /// # Errors
    ///
    /// Returns [`WebprobeError::DriverCommunication`] if the browser cannot
    /// be started, or an I/O error if the runtime cannot be built.
    pub fn launch(config: &BrowserConfig) -> WebprobeResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;

        let mut builder = CdpConfig::builder().window_size(config.window.width, config.window.height);
        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = config.chromium_path {
            builder = builder.chrome_executable(path);
        }
        let cdp_config = builder.build().map_err(WebprobeError::driver)?;

        let (browser, page) = runtime.block_on(async {
            let (browser, mut handler) = Browser::launch(cdp_config).await.map_err(classify)?;
            let _ = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(e) = event {
                        warn!(target: "webprobe::cdp", error = %e, "handler stopped");
                        break;
                    }
                }
            });
            let page = browser.new_page("about:blank").await.map_err(classify)?;
            page.execute(device_metrics(config.window))
                .await
                .map_err(classify)?;
            Ok::<_, WebprobeError>((browser, page))
        })?;

        debug!(target: "webprobe::cdp", headless = config.headless, "browser launched");
        Ok(Self {
            runtime,
            browser: Mutex::new(browser),
            page,
            elements: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        })
    }

    /// Close the browser
    ///
    /// # Errors
    ///
    /// Returns the CDP error if the browser does not shut down cleanly.
    pub fn close(self) -> WebprobeResult<()> {
        let mut browser = self.browser.into_inner().unwrap_or_else(PoisonError::into_inner);
        let _ = self.runtime.block_on(browser.close()).map_err(classify)?;
        Ok(())
    }

    fn elements(&self) -> MutexGuard<'_, HashMap<String, Arc<Element>>> {
        self.elements.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register elements from a query and hand out handles for them
    fn register(&self, found: Vec<Element>) -> Vec<ElementHandle> {
        let mut elements = self.elements();
        found
            .into_iter()
            .map(|element| {
                let id = format!("cdp-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
                let _ = elements.insert(id.clone(), Arc::new(element));
                ElementHandle::new(id)
            })
            .collect()
    }

    /// Run `f` against the element behind `handle`
    fn with_element<T, F, Fut>(&self, handle: &ElementHandle, f: F) -> WebprobeResult<T>
    where
        F: FnOnce(Arc<Element>) -> Fut,
        Fut: std::future::Future<Output = Result<T, CdpError>>,
    {
        let element = self.elements().get(handle.id()).cloned().ok_or_else(|| {
            WebprobeError::stale(format!("element {handle} belongs to an earlier snapshot"))
        })?;
        self.runtime.block_on(f(element)).map_err(classify)
    }
}

impl std::fmt::Debug for ChromiumDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumDriver")
            .field("live_handles", &self.elements().len())
            .finish_non_exhaustive()
    }
}

fn device_metrics(size: Size) -> SetDeviceMetricsOverrideParams {
    SetDeviceMetricsOverrideParams::new(i64::from(size.width), i64::from(size.height), 1.0, false)
}

/// Map a CDP error onto the engine's taxonomy
fn classify(err: CdpError) -> WebprobeError {
    let message = err.to_string();
    if STALE_MARKERS.iter().any(|m| message.contains(m)) {
        WebprobeError::stale(message)
    } else {
        WebprobeError::driver(message)
    }
}

impl BrowserDriver for ChromiumDriver {
    fn query(
        &self,
        selector: &str,
        scope: Option<&ElementHandle>,
    ) -> WebprobeResult<Vec<ElementHandle>> {
        let found = match scope {
            None => {
                self.elements().clear();
                self.runtime
                    .block_on(self.page.find_elements(selector))
                    .map_err(classify)?
            }
            Some(handle) => self.with_element(handle, |parent| async move {
                parent.find_elements(selector).await
            })?,
        };
        Ok(self.register(found))
    }

    fn read_text(&self, handle: &ElementHandle) -> WebprobeResult<String> {
        self.with_element(handle, |el| async move { el.inner_text().await })
            .map(Option::unwrap_or_default)
    }

    fn read_attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> WebprobeResult<Option<String>> {
        self.with_element(handle, |el| async move { el.attribute(name).await })
    }

    fn read_size(&self, handle: &ElementHandle) -> WebprobeResult<Size> {
        let bounds = self.with_element(handle, |el| async move { el.bounding_box().await })?;
        Ok(Size::new(
            bounds.width.round().max(0.0) as u32,
            bounds.height.round().max(0.0) as u32,
        ))
    }

    fn perform_click(&self, handle: &ElementHandle) -> WebprobeResult<()> {
        self.with_element(handle, |el| async move { el.click().await.map(|_| ()) })
    }

    fn navigate(&self, url: &str) -> WebprobeResult<()> {
        self.elements().clear();
        self.runtime
            .block_on(self.page.goto(url))
            .map(|_| ())
            .map_err(|e| WebprobeError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    fn window_size(&self) -> WebprobeResult<Size> {
        let result = self
            .runtime
            .block_on(self.page.evaluate("[window.innerWidth, window.innerHeight]"))
            .map_err(classify)?;
        let (width, height): (u32, u32) = result.into_value().map_err(|e| {
            WebprobeError::driver(format!("unexpected window size payload: {e}"))
        })?;
        Ok(Size::new(width, height))
    }

    fn set_window_size(&self, size: Size) -> WebprobeResult<()> {
        self.runtime
            .block_on(self.page.execute(device_metrics(size)))
            .map(|_| ())
            .map_err(classify)
    }
}
