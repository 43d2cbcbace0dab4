//! Locator Demo - declarative, retrying element queries
//!
//! Drives a small counter app on the in-memory page and prints how the
//! retry loop converges on each statement.
//!
//! # Running
//!
//! ```bash
//! WEBPROBE_LOG=webprobe=debug cargo run --example locator_demo -p webprobe
//! ```

#![allow(clippy::uninlined_format_args, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;
use webprobe::prelude::*;

fn main() -> WebprobeResult<()> {
    let _ = webprobe::logging::init();
    println!("=== Webprobe Locator Demo ===\n");

    let clock = Arc::new(FakeClock::new());
    let dom = Arc::new(FakeDom::new(clock.clone()));
    let add = dom.mutate(|tree| {
        let root = tree.root();
        let _ = tree.append(root, NodeSpec::new("span").id("counter-value").text("0"));
        tree.append(root, NodeSpec::new("button").text("+"))
    });
    dom.on_click(add, |fx, _| {
        fx.defer(Duration::from_millis(120), |fx| {
            let _ = fx.tree().update_text("counter-value", |v| {
                (v.parse::<u32>().unwrap_or(0) + 1).to_string()
            });
        });
    });

    let page = Page::new(dom.clone())
        .with_clock(clock.clone())
        .with_policy(RetryPolicy::default().with_poll_interval(Duration::from_millis(50)));

    // 1. Statement that already holds
    println!("1. Initial state...");
    let counter = page.select("#counter-value").expect_one();
    let n = counter.where_(text_equals("0")).eval()?;
    println!("   {} matched {} element(s) at t={:?}", counter, n, clock.now());

    // 2. Click, then wait for the re-render
    println!("\n2. Click and wait...");
    page.select("button").where_(text_equals("+")).click()?;
    counter.where_(text_equals("1")).eval()?;
    println!("   counter reads 1 at t={:?}", clock.now());

    // 3. Statement that never holds
    println!("\n3. Timeout...");
    match counter
        .where_(text_equals("5"))
        .with_timeout(Duration::from_millis(200))
        .eval()
    {
        Ok(_) => println!("   Unexpectedly succeeded"),
        Err(e) => println!("   {}", e),
    }

    // 4. Reading a value out of the single match
    println!("\n4. Extract...");
    let text = counter.eval_with(|e| e.text())?;
    println!("   text = {:?}", text);

    println!("\nDriver calls: {}", dom.history().len());
    println!("\n=== Locator Demo Complete ===");
    Ok(())
}
