//! Element predicates.
//!
//! A predicate is a pure check over one element's observable state. Named
//! kinds print themselves in failure diagnostics; [`Predicate::Custom`]
//! carries a description next to its closure for the same reason.
//!
//! ```ignore
//! page.select("#counter-value").where_(text_equals("1")).eval()?;
//! page.select("a").where_(attr_equals("href", "/samples")).click()?;
//! ```

use crate::driver::{BrowserDriver, Element, ElementHandle, Size};
use crate::result::{Observation, WebprobeResult, MAX_OBSERVED_VALUES};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Signature of a custom predicate
pub type CustomCheck = dyn Fn(&Element<'_>) -> WebprobeResult<bool> + Send + Sync;

/// A boolean test over one element
#[derive(Clone)]
pub enum Predicate {
    /// Trimmed rendered text equals the value
    TextEquals(String),
    /// Trimmed rendered text contains the value
    TextContains(String),
    /// Trimmed rendered text starts with the value
    TextStartsWith(String),
    /// Trimmed rendered text matches the regex
    TextMatches(Regex),
    /// Attribute is present and equals the value
    AttributeEquals {
        /// Attribute name
        name: String,
        /// Expected value
        value: String,
    },
    /// Attribute is present
    AttributePresent(String),
    /// `class` attribute lists the class
    HasClass(String),
    /// Rendered size equals
    SizeEquals(Size),
    /// Negation
    Not(Box<Predicate>),
    /// Arbitrary check
    Custom {
        /// Shown in diagnostics
        description: String,
        /// The check itself
        check: Arc<CustomCheck>,
    },
}

impl Predicate {
    /// Evaluate against one element.
    ///
    /// Errors come from the driver (a stale handle, a dead session) and are
    /// passed through untouched so the retry loop can classify them.
    pub fn test(&self, element: &Element<'_>) -> WebprobeResult<bool> {
        Ok(match self {
            Self::TextEquals(expected) => element.text()?.trim() == expected,
            Self::TextContains(needle) => element.text()?.trim().contains(needle.as_str()),
            Self::TextStartsWith(prefix) => element.text()?.trim().starts_with(prefix.as_str()),
            Self::TextMatches(re) => re.is_match(element.text()?.trim()),
            Self::AttributeEquals { name, value } => {
                element.attribute(name)?.as_deref() == Some(value.as_str())
            }
            Self::AttributePresent(name) => element.attribute(name)?.is_some(),
            Self::HasClass(class) => element
                .attribute("class")?
                .is_some_and(|classes| classes.split_whitespace().any(|c| c == class)),
            Self::SizeEquals(size) => element.size()? == *size,
            Self::Not(inner) => !inner.test(element)?,
            Self::Custom { check, .. } => (**check)(element)?,
        })
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TextEquals(v) => write!(f, "text == {v:?}"),
            Self::TextContains(v) => write!(f, "text contains {v:?}"),
            Self::TextStartsWith(v) => write!(f, "text starts with {v:?}"),
            Self::TextMatches(re) => write!(f, "text =~ /{}/", re.as_str()),
            Self::AttributeEquals { name, value } => write!(f, "@{name} == {value:?}"),
            Self::AttributePresent(name) => write!(f, "has @{name}"),
            Self::HasClass(class) => write!(f, "has class {class:?}"),
            Self::SizeEquals(size) => write!(f, "size == {size}"),
            Self::Not(inner) => write!(f, "not ({inner})"),
            Self::Custom { description, .. } => write!(f, "<{description}>"),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.to_string()).finish()
    }
}

/// Trimmed rendered text equals `value`
#[must_use]
pub fn text_equals(value: impl Into<String>) -> Predicate {
    Predicate::TextEquals(value.into())
}

/// Trimmed rendered text contains `value`
#[must_use]
pub fn text_contains(value: impl Into<String>) -> Predicate {
    Predicate::TextContains(value.into())
}

/// Trimmed rendered text starts with `prefix`
#[must_use]
pub fn text_starts_with(prefix: impl Into<String>) -> Predicate {
    Predicate::TextStartsWith(prefix.into())
}

/// Trimmed rendered text matches `re`
#[must_use]
pub fn text_matches(re: Regex) -> Predicate {
    Predicate::TextMatches(re)
}

/// Attribute `name` equals `value`
#[must_use]
pub fn attr_equals(name: impl Into<String>, value: impl Into<String>) -> Predicate {
    Predicate::AttributeEquals {
        name: name.into(),
        value: value.into(),
    }
}

/// Attribute `name` is present
#[must_use]
pub fn has_attr(name: impl Into<String>) -> Predicate {
    Predicate::AttributePresent(name.into())
}

/// Element carries CSS class `class`
#[must_use]
pub fn has_class(class: impl Into<String>) -> Predicate {
    Predicate::HasClass(class.into())
}

/// Rendered size is exactly `width` x `height`
#[must_use]
pub fn size_equals(width: u32, height: u32) -> Predicate {
    Predicate::SizeEquals(Size::new(width, height))
}

/// Negate a predicate
#[must_use]
pub fn not(predicate: Predicate) -> Predicate {
    Predicate::Not(Box::new(predicate))
}

/// Custom predicate with a description for diagnostics
#[must_use]
pub fn custom<F>(description: impl Into<String>, check: F) -> Predicate
where
    F: Fn(&Element<'_>) -> WebprobeResult<bool> + Send + Sync + 'static,
{
    Predicate::Custom {
        description: description.into(),
        check: Arc::new(check),
    }
}

/// Result of running a predicate chain over a candidate set
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    /// Number of elements the query returned
    pub candidates: usize,
    /// Survivors, in document order
    pub matched: Vec<ElementHandle>,
    /// How many candidates each predicate rejected, by chain position
    pub rejected_by: Vec<usize>,
}

impl FilterOutcome {
    /// Index of the first predicate that rejected anything
    #[must_use]
    pub fn first_unmet(&self) -> Option<usize> {
        self.rejected_by.iter().position(|&n| n > 0)
    }

    /// Build a diagnostic observation, reading the text of a few candidates.
    ///
    /// Text reads here are best-effort; a candidate that went stale in the
    /// meantime is simply skipped.
    pub fn observe(
        &self,
        driver: &dyn BrowserDriver,
        candidates: &[ElementHandle],
        predicates: &[Predicate],
    ) -> Observation {
        let values = candidates
            .iter()
            .take(MAX_OBSERVED_VALUES)
            .filter_map(|h| driver.read_text(h).ok())
            .map(|t| t.trim().to_string())
            .collect();
        Observation {
            candidates: self.candidates,
            matched: self.matched.len(),
            values,
            unmet: self
                .first_unmet()
                .and_then(|i| predicates.get(i))
                .map(ToString::to_string),
            stale: None,
        }
    }
}

/// Run an AND-chain of predicates over `candidates`.
///
/// Each element stops at its first failing predicate, so the survivors never
/// depend on chain order; only `rejected_by` does.
pub fn filter(
    driver: &dyn BrowserDriver,
    candidates: &[ElementHandle],
    predicates: &[Predicate],
) -> WebprobeResult<FilterOutcome> {
    let mut outcome = FilterOutcome {
        candidates: candidates.len(),
        matched: Vec::with_capacity(candidates.len()),
        rejected_by: vec![0; predicates.len()],
    };

    'candidates: for handle in candidates {
        let element = Element::new(driver, handle);
        for (i, predicate) in predicates.iter().enumerate() {
            if !predicate.test(&element)? {
                outcome.rejected_by[i] += 1;
                continue 'candidates;
            }
        }
        outcome.matched.push(handle.clone());
    }

    Ok(outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::mock::{FakeDom, NodeSpec};
    use crate::result::WebprobeError;

    fn dom() -> FakeDom {
        let dom = FakeDom::new(Arc::new(FakeClock::new()));
        dom.mutate(|tree| {
            let root = tree.root();
            tree.append(
                root,
                NodeSpec::new("span")
                    .id("myid")
                    .class("badge primary")
                    .attr("data-kind", "probe")
                    .text("  ID = myid  ")
                    .size(200, 30),
            );
            tree.append(root, NodeSpec::new("span").class("badge").text("other"));
        });
        dom
    }

    fn first(dom: &FakeDom) -> ElementHandle {
        dom.query("#myid", None).unwrap().remove(0)
    }

    mod named_predicates {
        use super::*;

        #[test]
        fn test_text_equals_trims() {
            let dom = dom();
            let h = first(&dom);
            let el = Element::new(&dom, &h);
            assert!(text_equals("ID = myid").test(&el).unwrap());
            assert!(!text_equals("  ID = myid  ").test(&el).unwrap());
        }

        #[test]
        fn test_text_variants() {
            let dom = dom();
            let h = first(&dom);
            let el = Element::new(&dom, &h);
            assert!(text_contains("myid").test(&el).unwrap());
            assert!(text_starts_with("ID =").test(&el).unwrap());
            assert!(text_matches(Regex::new(r"^ID = \w+$").unwrap())
                .test(&el)
                .unwrap());
            assert!(!text_matches(Regex::new(r"^\d+$").unwrap()).test(&el).unwrap());
        }

        #[test]
        fn test_attributes_and_classes() {
            let dom = dom();
            let h = first(&dom);
            let el = Element::new(&dom, &h);
            assert!(attr_equals("data-kind", "probe").test(&el).unwrap());
            assert!(!attr_equals("data-kind", "other").test(&el).unwrap());
            assert!(!attr_equals("missing", "").test(&el).unwrap());
            assert!(has_attr("data-kind").test(&el).unwrap());
            assert!(has_class("primary").test(&el).unwrap());
            assert!(!has_class("prim").test(&el).unwrap());
        }

        #[test]
        fn test_size_and_not() {
            let dom = dom();
            let h = first(&dom);
            let el = Element::new(&dom, &h);
            assert!(size_equals(200, 30).test(&el).unwrap());
            assert!(not(size_equals(10, 10)).test(&el).unwrap());
        }

        #[test]
        fn test_custom() {
            let dom = dom();
            let h = first(&dom);
            let el = Element::new(&dom, &h);
            let wide = custom("wider than 100px", |e| Ok(e.size()?.width > 100));
            assert!(wide.test(&el).unwrap());
            assert_eq!(wide.to_string(), "<wider than 100px>");
        }

        #[test]
        fn test_display() {
            assert_eq!(text_equals("1").to_string(), "text == \"1\"");
            assert_eq!(attr_equals("id", "x").to_string(), "@id == \"x\"");
            assert_eq!(not(has_class("a")).to_string(), "not (has class \"a\")");
            assert_eq!(size_equals(2, 3).to_string(), "size == 2x3");
        }
    }

    mod filtering {
        use super::*;

        #[test]
        fn test_filter_narrows_and_counts_rejections() {
            let dom = dom();
            let candidates = dom.query(".badge", None).unwrap();
            let preds = vec![has_class("badge"), text_equals("other")];
            let outcome = filter(&dom, &candidates, &preds).unwrap();
            assert_eq!(outcome.candidates, 2);
            assert_eq!(outcome.matched.len(), 1);
            assert_eq!(outcome.rejected_by, vec![0, 1]);
            assert_eq!(outcome.first_unmet(), Some(1));
        }

        #[test]
        fn test_observe_reports_unmet_predicate() {
            let dom = dom();
            let candidates = dom.query(".badge", None).unwrap();
            let preds = vec![text_equals("nope")];
            let outcome = filter(&dom, &candidates, &preds).unwrap();
            let obs = outcome.observe(&dom, &candidates, &preds);
            assert_eq!(obs.candidates, 2);
            assert_eq!(obs.matched, 0);
            assert_eq!(obs.values, vec!["ID = myid".to_string(), "other".to_string()]);
            assert_eq!(obs.unmet.as_deref(), Some("text == \"nope\""));
        }

        #[test]
        fn test_stale_handle_propagates() {
            let dom = dom();
            let h = first(&dom);
            dom.mutate(|tree| {
                let id = tree.find_by_id("myid").unwrap();
                tree.remove(id);
            });
            let err = filter(&dom, &[h], &[text_equals("x")]).unwrap_err();
            assert!(matches!(err, WebprobeError::StaleReference { .. }));
        }
    }
}
