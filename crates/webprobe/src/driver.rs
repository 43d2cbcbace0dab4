//! Browser-control boundary.
//!
//! The engine talks to the browser only through [`BrowserDriver`]. Every call
//! is a blocking round-trip. Two implementations ship with the crate:
//!
//! - [`FakeDom`](crate::mock::FakeDom): in-memory DOM for unit tests
//! - `ChromiumDriver`: CDP via chromiumoxide (`browser` feature)

use crate::result::WebprobeResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque reference to a DOM node.
///
/// Only valid within the DOM snapshot it was obtained from. Reading through a
/// handle whose node has since been detached yields
/// [`WebprobeError::StaleReference`](crate::WebprobeError::StaleReference).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    id: String,
}

impl ElementHandle {
    /// Create a handle from a driver-specific id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Driver-specific id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Width and height in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl Size {
    /// Create a new size
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Blocking browser-control primitives the engine is built on.
///
/// `scope` limits a query to descendants of an element from the same
/// snapshot; `None` queries the whole document.
pub trait BrowserDriver: Send + Sync {
    /// Find all elements matching a CSS selector
    fn query(
        &self,
        selector: &str,
        scope: Option<&ElementHandle>,
    ) -> WebprobeResult<Vec<ElementHandle>>;

    /// Rendered text of an element
    fn read_text(&self, handle: &ElementHandle) -> WebprobeResult<String>;

    /// Attribute value, `None` when absent
    fn read_attribute(&self, handle: &ElementHandle, name: &str)
        -> WebprobeResult<Option<String>>;

    /// Rendered size of an element
    fn read_size(&self, handle: &ElementHandle) -> WebprobeResult<Size>;

    /// Click an element
    fn perform_click(&self, handle: &ElementHandle) -> WebprobeResult<()>;

    /// Navigate the session to a URL
    fn navigate(&self, url: &str) -> WebprobeResult<()>;

    /// Current window size
    fn window_size(&self) -> WebprobeResult<Size>;

    /// Resize the window
    fn set_window_size(&self, size: Size) -> WebprobeResult<()>;
}

impl<D: BrowserDriver + ?Sized> BrowserDriver for Arc<D> {
    fn query(
        &self,
        selector: &str,
        scope: Option<&ElementHandle>,
    ) -> WebprobeResult<Vec<ElementHandle>> {
        (**self).query(selector, scope)
    }

    fn read_text(&self, handle: &ElementHandle) -> WebprobeResult<String> {
        (**self).read_text(handle)
    }

    fn read_attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> WebprobeResult<Option<String>> {
        (**self).read_attribute(handle, name)
    }

    fn read_size(&self, handle: &ElementHandle) -> WebprobeResult<Size> {
        (**self).read_size(handle)
    }

    fn perform_click(&self, handle: &ElementHandle) -> WebprobeResult<()> {
        (**self).perform_click(handle)
    }

    fn navigate(&self, url: &str) -> WebprobeResult<()> {
        (**self).navigate(url)
    }

    fn window_size(&self) -> WebprobeResult<Size> {
        (**self).window_size()
    }

    fn set_window_size(&self, size: Size) -> WebprobeResult<()> {
        (**self).set_window_size(size)
    }
}

/// Read-only view of one resolved element.
///
/// Handed to predicates and extractors; it pairs a handle with the driver
/// that produced it.
#[derive(Clone, Copy)]
pub struct Element<'a> {
    driver: &'a dyn BrowserDriver,
    handle: &'a ElementHandle,
}

impl<'a> Element<'a> {
    /// Create a view over a handle
    #[must_use]
    pub fn new(driver: &'a dyn BrowserDriver, handle: &'a ElementHandle) -> Self {
        Self { driver, handle }
    }

    /// The underlying handle
    #[must_use]
    pub const fn handle(&self) -> &'a ElementHandle {
        self.handle
    }

    /// Rendered text, as the browser reports it
    pub fn text(&self) -> WebprobeResult<String> {
        self.driver.read_text(self.handle)
    }

    /// Attribute value
    pub fn attribute(&self, name: &str) -> WebprobeResult<Option<String>> {
        self.driver.read_attribute(self.handle, name)
    }

    /// Rendered size
    pub fn size(&self) -> WebprobeResult<Size> {
        self.driver.read_size(self.handle)
    }
}

impl fmt::Debug for Element<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("handle", self.handle)
            .finish_non_exhaustive()
    }
}
