//! End-to-end scenarios against the in-memory page.
//!
//! Each scenario models a small reactive app whose DOM updates land some
//! time after the triggering event, the way a framework re-renders on the
//! next tick. The fake clock makes the polling timeline exact.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;
use webprobe::mock::{Effects, NodeId};
use webprobe::prelude::*;

const POLICY: RetryPolicy = RetryPolicy::new(Duration::from_millis(2000))
    .with_poll_interval(Duration::from_millis(50));

struct App {
    clock: Arc<FakeClock>,
    dom: Arc<FakeDom>,
    page: Page,
}

impl App {
    fn new() -> Self {
        let _ = webprobe::logging::init();
        let clock = Arc::new(FakeClock::new());
        let dom = Arc::new(FakeDom::new(clock.clone()));
        let page = Page::new(dom.clone())
            .with_clock(clock.clone())
            .with_policy(POLICY)
            .with_base_url("http://localhost:3000");
        Self { clock, dom, page }
    }

    fn add(&self, parent: NodeId, spec: NodeSpec) -> NodeId {
        self.dom.mutate(|tree| tree.append(parent, spec))
    }

    fn root(&self) -> NodeId {
        self.dom.mutate(|tree| tree.root())
    }
}

mod counter {
    use super::*;

    fn app() -> App {
        let app = App::new();
        let root = app.root();
        let _ = app.add(root, NodeSpec::new("span").id("counter-value").text("0"));
        let add = app.add(root, NodeSpec::new("button").class("btn add").text("+"));
        let sub = app.add(root, NodeSpec::new("button").class("btn sub").text("-"));
        app.dom.on_click(add, |fx, _| step(fx, 1));
        app.dom.on_click(sub, |fx, _| step(fx, -1));
        app
    }

    fn step(fx: &mut Effects<'_>, delta: i64) {
        fx.defer(Duration::from_millis(120), move |fx| {
            let _ = fx.tree().update_text("counter-value", |v| {
                (v.trim().parse::<i64>().unwrap_or(0) + delta).to_string()
            });
        });
    }

    fn counter_reads(page: &Page, value: &str) {
        page.select("#counter-value")
            .where_(text_equals(value))
            .expect_one()
            .eval()
            .unwrap();
    }

    #[test]
    fn test_increment_shows_up_on_the_fourth_poll() {
        let app = app();
        let page = &app.page;

        page.select("#counter-value")
            .where_(text_equals("0"))
            .expect_one()
            .eval()
            .unwrap();
        page.select("button").where_(text_equals("+")).click().unwrap();

        let start = app.clock.now();
        page.select("#counter-value")
            .where_(text_equals("1"))
            .expect_one()
            .eval()
            .unwrap();
        assert_eq!(app.clock.now() - start, Duration::from_millis(150));
        assert_eq!(app.dom.call_count("click"), 1);
    }

    #[test]
    fn test_increment_and_decrement_sequence() {
        let app = app();
        let page = &app.page;
        let plus = page.select("button.btn").where_(text_equals("+"));
        let minus = page.select("button.btn").where_(text_equals("-"));

        counter_reads(page, "0");
        plus.click().unwrap();
        counter_reads(page, "1");
        plus.click().unwrap();
        plus.click().unwrap();
        counter_reads(page, "3");
        minus.click().unwrap();
        counter_reads(page, "2");
        assert_eq!(app.dom.call_count("click"), 4);
    }

    #[test]
    fn test_repeated_clicks_accumulate() {
        let app = app();
        let plus = app.page.select("button").where_(text_equals("+"));
        for expected in 1..=3 {
            plus.click().unwrap();
            app.page
                .select("#counter-value")
                .where_(text_equals(expected.to_string()))
                .eval()
                .unwrap();
        }
    }

    #[test]
    fn test_wrong_value_times_out_with_observation() {
        let app = app();
        let err = app
            .page
            .select("#counter-value")
            .where_(text_equals("7"))
            .with_timeout(Duration::from_millis(300))
            .eval()
            .unwrap_err();

        assert!(err.is_timeout());
        let message = err.to_string();
        assert!(message.contains("#counter-value"));
        assert!(message.contains("\"0\""));
        assert!(app.clock.now() >= Duration::from_millis(300));
    }

    #[test]
    fn test_ambiguous_button_click_is_rejected() {
        let app = app();
        let err = app.page.select("button.btn").click().unwrap_err();
        assert!(err.is_mismatch());
        assert!(!app.dom.was_called("click"));
    }
}

mod click_feedback {
    use super::*;

    #[test]
    fn test_title_changes_after_click() {
        let app = App::new();
        let root = app.root();
        let target = app.add(
            root,
            NodeSpec::new("div").class("wait-for-click").size(200, 100),
        );
        let panel = app.add(root, NodeSpec::new("div").class("view-mouse-pos"));
        let _ = app.add(panel, NodeSpec::new("h3").class("vmp-title").text("Waiting"));
        app.dom.on_click(target, |fx, _| {
            fx.defer(Duration::from_millis(30), |fx| {
                let tree = fx.tree();
                let title = tree
                    .descendants(tree.root())
                    .into_iter()
                    .find(|&n| tree.attr(n, "class") == Some("vmp-title"));
                if let Some(title) = title {
                    tree.set_text(title, "Clicked");
                }
            });
        });

        app.page.select(".wait-for-click").click().unwrap();
        app.page
            .select(".view-mouse-pos .vmp-title")
            .where_(text_equals("Clicked"))
            .expect_one()
            .eval()
            .unwrap();
        assert_eq!(app.clock.now(), Duration::from_millis(50));
    }
}

mod resize {
    use super::*;

    fn bump(fx: &mut Effects<'_>, id: &str) {
        let _ = fx.tree().update_text(id, |v| {
            (v.trim().parse::<u32>().unwrap_or(0) + 1).to_string()
        });
    }

    #[test]
    fn test_both_counters_converge_after_resize() {
        let app = App::new();
        let root = app.root();
        let _ = app.add(root, NodeSpec::new("div").id("resized-left").text("0"));
        let _ = app.add(root, NodeSpec::new("div").id("resized-right").text("0"));
        app.dom.on_resize(|fx| {
            bump(fx, "resized-left");
            fx.defer(Duration::from_millis(200), |fx| bump(fx, "resized-right"));
        });

        let left = app.page.select("#resized-left").expect_one();
        let right = app.page.select("#resized-right").expect_one();
        left.where_(text_equals("0")).eval().unwrap();
        right.where_(text_equals("0")).eval().unwrap();

        let before = app.page.window_size().unwrap();
        let after = app.page.resize_by(-100, -50).unwrap();
        assert_eq!(after, Size::new(before.width - 100, before.height - 50));

        left.where_(text_equals("1")).eval().unwrap();
        assert_eq!(app.clock.now(), Duration::ZERO);
        right.where_(text_equals("1")).eval().unwrap();
        assert_eq!(app.clock.now(), Duration::from_millis(200));

        let read = |l: &Locator<'_>| l.eval_with(|e| e.text()).unwrap();
        assert_eq!(read(&left), read(&right));

        app.page
            .wait_until("window reports new size", |driver| {
                Ok(driver.window_size()? == after)
            })
            .unwrap();
    }
}

mod dimensions {
    use super::*;

    #[test]
    fn test_element_reports_its_own_size() {
        let app = App::new();
        let root = app.root();
        let _ = app.add(
            root,
            NodeSpec::new("div")
                .id("myid")
                .size(200, 30)
                .text(r#"ID = myid,has dims : {"w":200,"h":30}"#),
        );
        let _ = app.add(root, NodeSpec::new("div").id("other").size(10, 10));

        let el = app
            .page
            .select("#myid")
            .where_(text_starts_with("ID = myid"))
            .where_(size_equals(200, 30))
            .expect_one();
        assert_eq!(el.eval().unwrap(), 1);

        let (reported, actual) = el
            .eval_with(|e| {
                let text = e.text()?;
                let json = text.split_once(" : ").map(|(_, j)| j).unwrap_or_default();
                let dims: serde_json::Value = serde_json::from_str(json)
                    .map_err(|err| WebprobeError::driver(err.to_string()))?;
                Ok((dims, e.size()?))
            })
            .unwrap();
        assert_eq!(reported["w"], 200);
        assert_eq!(reported["h"], 30);
        assert_eq!(actual, Size::new(200, 30));
    }
}

mod animation_frames {
    use super::*;

    const FRAME: Duration = Duration::from_millis(16);

    fn running(fx: &mut Effects<'_>) -> bool {
        let tree = fx.tree();
        tree.attr(tree.root(), "data-raf") == Some("running")
    }

    fn frame(fx: &mut Effects<'_>) {
        if !running(fx) {
            return;
        }
        for id in ["raf-time-1", "raf-time-2"] {
            let _ = fx.tree().update_text(id, |v| {
                (v.trim().parse::<u64>().unwrap_or(0) + 1).to_string()
            });
        }
        fx.defer(FRAME, frame);
    }

    #[test]
    fn test_counters_agree_once_stopped() {
        let app = App::new();
        let root = app.root();
        let start = app.add(root, NodeSpec::new("button").id("raf-start").text("start"));
        let stop = app.add(root, NodeSpec::new("button").id("raf-stop").text("stop"));
        let _ = app.add(root, NodeSpec::new("span").id("raf-time-1").text("0"));
        let _ = app.add(root, NodeSpec::new("span").id("raf-time-2").text("0"));
        app.dom.on_click(start, |fx, _| {
            let tree = fx.tree();
            let body = tree.root();
            tree.set_attr(body, "data-raf", "running");
            fx.defer(FRAME, frame);
        });
        app.dom.on_click(stop, |fx, _| {
            let tree = fx.tree();
            let body = tree.root();
            tree.remove_attr(body, "data-raf");
        });

        app.page.select("#raf-start").click().unwrap();
        app.page
            .select("#raf-time-1")
            .where_(not(text_equals("0")))
            .eval()
            .unwrap();
        app.page.select("#raf-stop").click().unwrap();
        app.clock.advance(FRAME * 4);
        assert_eq!(app.dom.pending_changes(), 0);

        let read = |id: &str| {
            app.page
                .select(&format!("#{id}"))
                .eval_with(|e| e.text())
                .unwrap()
        };
        let first = read("raf-time-1");
        let second = read("raf-time-2");
        assert_ne!(first, "0");
        assert_eq!(first, second);
    }
}

mod navigation {
    use super::*;

    const LINKS: [&str; 3] = ["home", "samples", "docs"];

    fn render(fx: &mut Effects<'_>, page: &str) {
        let tree = fx.tree();
        let root = tree.root();
        for node in tree.descendants(root) {
            if tree.parent(node) == Some(root) {
                tree.remove(node);
            }
        }
        let nav = tree.append(root, NodeSpec::new("nav"));
        for link in LINKS {
            let _ = tree.append(
                nav,
                NodeSpec::new("a").attr("href", format!("/{link}")).text(link),
            );
        }
        let _ = tree.append(root, NodeSpec::new("h1").text(page));
    }

    fn app() -> App {
        let app = App::new();
        app.dom.on_navigate(|fx, url| {
            let page = url.rsplit('/').next().filter(|p| !p.is_empty()).unwrap_or("home");
            render(fx, page);
            Ok(())
        });
        let root = app.root();
        app.dom.on_click(root, |fx, target| {
            let href = fx.tree().attr(target, "href").map(str::to_string);
            if let Some(href) = href {
                fx.defer(Duration::from_millis(80), move |fx| {
                    render(fx, href.trim_start_matches('/'));
                });
            }
        });
        app
    }

    #[test]
    fn test_link_click_renders_target_page() {
        let app = app();
        app.page.goto("/").unwrap();
        assert_eq!(app.dom.current_url().as_deref(), Some("http://localhost:3000/"));

        let links = app.page.select("nav a").expect_count(LINKS.len());
        assert_eq!(links.eval().unwrap(), 3);

        app.page
            .within(&app.page.select("nav"))
            .select("a")
            .where_(text_equals("samples"))
            .click()
            .unwrap();
        app.page
            .select("h1")
            .where_(text_equals("samples"))
            .expect_one()
            .eval()
            .unwrap();
        assert_eq!(app.clock.now(), Duration::from_millis(100));
    }

    #[test]
    fn test_stale_links_are_requeried() {
        let app = app();
        app.page.goto("/docs").unwrap();
        app.page.select("h1").where_(text_equals("docs")).eval().unwrap();

        app.dom.inject_stale_reads(2);
        app.page
            .select("a")
            .where_(attr_equals("href", "/home"))
            .click()
            .unwrap();
        app.page.select("h1").where_(text_equals("home")).eval().unwrap();
    }

    #[test]
    fn test_rejected_navigation() {
        let app = app();
        app.dom.on_navigate(|_, url| {
            if url.ends_with("/broken") {
                Err(WebprobeError::driver("net::ERR_CONNECTION_REFUSED"))
            } else {
                Ok(())
            }
        });
        let err = app.page.goto("/broken").unwrap_err();
        assert!(matches!(err, WebprobeError::Navigation { .. }));
        assert!(err.to_string().contains("ERR_CONNECTION_REFUSED"));
    }

    #[test]
    fn test_dead_session_fails_fast() {
        let app = app();
        app.page.goto("/").unwrap();
        app.dom.disconnect();
        let err = app.page.select("a").eval().unwrap_err();
        assert!(!err.is_timeout());
        assert_eq!(app.clock.sleep_count(), 0);
    }
}
