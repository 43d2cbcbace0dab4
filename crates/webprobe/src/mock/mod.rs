//! In-memory browser for testing locators without Chromium.
//!
//! ```rust,ignore
//! use webprobe::mock::{FakeDom, NodeSpec};
//!
//! let clock = Arc::new(FakeClock::new());
//! let dom = FakeDom::new(clock.clone());
//! dom.mutate(|tree| {
//!     let root = tree.root();
//!     tree.append(root, NodeSpec::new("span").id("counter-value").text("0"));
//! });
//! let page = Page::new(dom).with_clock(clock);
//! page.select("#counter-value").where_(text_equals("0")).eval()?;
//! ```

mod dom;
mod selector;

pub use dom::{DomTree, Effects, FakeDom, NodeId, NodeSpec, DEFAULT_WINDOW};
pub use selector::SelectorList;
