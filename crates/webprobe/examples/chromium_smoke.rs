//! Chromium smoke run
//!
//! Launches a headless Chromium, loads a page and checks a heading.
//!
//! # Running
//!
//! ```bash
//! WEBPROBE_BASE_URL=http://localhost:8080 \
//!     cargo run --example chromium_smoke -p webprobe --features browser
//! ```

#![allow(clippy::uninlined_format_args)]

use webprobe::prelude::*;

fn main() -> WebprobeResult<()> {
    let _ = webprobe::logging::init();

    let config = HarnessConfig::load(None)?;
    let browser = BrowserConfig::default().with_no_sandbox();
    let driver = ChromiumDriver::launch(&browser)?;
    let page = Page::from_config(driver, &config)?;

    page.goto("/")?;
    let headings = page.select("h1").expect_at_least(1).eval()?;
    let title = page.select("h1").expect_one().eval_with(|e| e.text());
    println!("{} heading(s); first: {:?}", headings, title);

    let size = page.resize_by(-200, -100)?;
    println!("window now {}", size);
    Ok(())
}
