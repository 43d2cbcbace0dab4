//! Locators: immutable, composable element queries that auto-wait.
//!
//! A locator is a selector, an AND-chain of [`Predicate`]s and an
//! [`Expectation`] on how many elements should survive the chain. Builder
//! calls return a new locator and never touch the one they were called on:
//!
//! ```ignore
//! let counter = page.select("#counter-value");
//! counter.where_(text_equals("0")).expect_one().eval()?;
//! page.select("button").where_(text_equals("+")).click()?;
//! counter.where_(text_equals("1")).eval()?;
//! ```
//!
//! Terminal operations (`eval`, `eval_with`, `click`) hand the locator to
//! the [`RetryEngine`], which re-queries fresh handles on every attempt.

use crate::driver::{Element, ElementHandle};
use crate::page::Page;
use crate::predicate::{filter, FilterOutcome, Predicate};
use crate::result::{Observation, WebprobeError, WebprobeResult};
use crate::retry::{Attempt, Resolved, RetryEngine, RetryPolicy};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// How many elements a locator must resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expectation {
    /// At least one
    #[default]
    Any,
    /// Exactly one
    ExactlyOne,
    /// Exactly `n`
    Exactly(usize),
    /// `n` or more
    AtLeast(usize),
    /// Zero
    None,
}

impl Expectation {
    /// Whether `count` matches satisfy this expectation
    #[must_use]
    pub const fn is_satisfied_by(self, count: usize) -> bool {
        match self {
            Self::Any => count >= 1,
            Self::ExactlyOne => count == 1,
            Self::Exactly(n) => count == n,
            Self::AtLeast(n) => count >= n,
            Self::None => count == 0,
        }
    }

    /// Whether a single element could ever satisfy this expectation
    #[must_use]
    pub const fn admits_single(self) -> bool {
        self.is_satisfied_by(1)
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("at least one"),
            Self::ExactlyOne => f.write_str("exactly one"),
            Self::Exactly(n) => write!(f, "exactly {n}"),
            Self::AtLeast(n) => write!(f, "at least {n}"),
            Self::None => f.write_str("none"),
        }
    }
}

/// Immutable description of an element query
#[derive(Debug, Clone)]
pub struct Locator<'p> {
    page: &'p Page,
    expr: Arc<str>,
    scope: Option<Arc<Locator<'p>>>,
    predicates: Arc<[Predicate]>,
    expectation: Expectation,
    policy: Option<RetryPolicy>,
}

impl<'p> Locator<'p> {
    pub(crate) fn new(page: &'p Page, expr: &str, scope: Option<Locator<'p>>) -> Self {
        Self {
            page,
            expr: Arc::from(expr),
            scope: scope.map(Arc::new),
            predicates: Arc::from(Vec::new()),
            expectation: Expectation::Any,
            policy: None,
        }
    }

    /// Add a predicate to the chain
    #[must_use]
    pub fn where_(&self, predicate: Predicate) -> Self {
        let mut predicates = self.predicates.to_vec();
        predicates.push(predicate);
        Self {
            predicates: predicates.into(),
            ..self.clone()
        }
    }

    /// Replace the expectation
    #[must_use]
    pub fn expect(&self, expectation: Expectation) -> Self {
        Self {
            expectation,
            ..self.clone()
        }
    }

    /// Require exactly one match
    #[must_use]
    pub fn expect_one(&self) -> Self {
        self.expect(Expectation::ExactlyOne)
    }

    /// Require `n` or more matches
    #[must_use]
    pub fn expect_at_least(&self, n: usize) -> Self {
        self.expect(Expectation::AtLeast(n))
    }

    /// Require exactly `n` matches
    #[must_use]
    pub fn expect_count(&self, n: usize) -> Self {
        self.expect(Expectation::Exactly(n))
    }

    /// Require no match
    #[must_use]
    pub fn expect_none(&self) -> Self {
        self.expect(Expectation::None)
    }

    /// Require at least one match (the default)
    #[must_use]
    pub fn expect_any(&self) -> Self {
        self.expect(Expectation::Any)
    }

    /// Override the page's retry policy
    #[must_use]
    pub fn with_policy(&self, policy: RetryPolicy) -> Self {
        Self {
            policy: Some(policy),
            ..self.clone()
        }
    }

    /// Override only the timeout
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_policy(self.policy().with_timeout(timeout))
    }

    /// The query expression
    #[must_use]
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// The predicate chain, in the order it was built
    #[must_use]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// The expectation
    #[must_use]
    pub const fn expectation(&self) -> Expectation {
        self.expectation
    }

    /// Effective retry policy
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy.unwrap_or_else(|| self.page.policy())
    }

    /// Human-readable form used in diagnostics
    #[must_use]
    pub fn describe(&self) -> String {
        self.to_string()
    }

    /// Wait until the expectation holds and return the number of matches.
    ///
    /// # Errors
    ///
    /// [`WebprobeError::Timeout`] if the expectation never holds, or a
    /// driver error.
    #[instrument(level = "debug", skip_all, fields(locator = %self))]
    pub fn eval(&self) -> WebprobeResult<usize> {
        Ok(self.resolve()?.value.len())
    }

    /// Wait until the expectation holds, then read a value off the single
    /// resolved element.
    ///
    /// The extractor runs once, on the handles from the satisfying attempt.
    /// If that element went stale in between, the error surfaces as
    /// [`WebprobeError::StaleReference`] rather than restarting the wait.
    ///
    /// # Errors
    ///
    /// [`WebprobeError::ExpectationMismatch`] if the resolved set is not a
    /// single element, plus the errors of [`Locator::eval`].
    #[instrument(level = "debug", skip_all, fields(locator = %self))]
    pub fn eval_with<T, F>(&self, extract: F) -> WebprobeResult<T>
    where
        F: FnOnce(&Element<'_>) -> WebprobeResult<T>,
    {
        let resolved = self.resolve()?;
        match resolved.value.as_slice() {
            [handle] => extract(&Element::new(self.page.driver(), handle)),
            other => Err(self.mismatch(format!("{} elements matched", other.len()))),
        }
    }

    /// Wait for exactly one element, then click it once.
    ///
    /// The click is part of the polling attempt: if the element is
    /// re-rendered between the query and the click, the stale reference is
    /// absorbed and the locator is queried again. Seeing two or more matches
    /// is an immediate [`WebprobeError::ExpectationMismatch`]. Seeing none
    /// keeps waiting, since the element may still be rendering.
    ///
    /// # Errors
    ///
    /// [`WebprobeError::ExpectationMismatch`] on ambiguity, when the
    /// expectation excludes a single element, or when no element showed up
    /// before the deadline. [`WebprobeError::Timeout`] if the element kept
    /// going stale until the deadline.
    #[instrument(level = "debug", skip_all, fields(locator = %self))]
    pub fn click(&self) -> WebprobeResult<()> {
        if !self.expectation.admits_single() {
            return Err(self.mismatch(format!(
                "the locator expects {} and can never select a single element",
                self.expectation
            )));
        }

        let driver = self.page.driver();
        let description = self.to_string();
        RetryEngine::new(self.policy(), self.page.clock())
            .run(&description, || {
                let (candidates, outcome) = match self.pass()? {
                    Pass::Blocked(observed) => return Ok(Attempt::Pending(observed)),
                    Pass::Filtered {
                        candidates,
                        outcome,
                    } => (candidates, outcome),
                };
                match outcome.matched.as_slice() {
                    [handle] => {
                        tracing::debug!(target: "webprobe::locator", %handle, "click");
                        driver.perform_click(handle)?;
                        Ok(Attempt::Ready(()))
                    }
                    [] => {
                        let mut observed = outcome.observe(driver, &candidates, &self.predicates);
                        if observed.unmet.is_none() {
                            observed.unmet = Some("an element to click".to_string());
                        }
                        Ok(Attempt::Pending(observed))
                    }
                    many => Err(self.mismatch(format!("{} elements matched", many.len()))),
                }
            })
            .map(|_| ())
            .map_err(|err| match err {
                WebprobeError::Timeout {
                    elapsed,
                    attempts,
                    observed,
                    ..
                } if observed.matched == 0 && observed.stale.is_none() => self.mismatch(format!(
                    "0 elements matched after {}ms ({attempts} attempt(s)); {observed}",
                    elapsed.as_millis()
                )),
                other => other,
            })
    }

    fn resolve(&self) -> WebprobeResult<Resolved<Vec<ElementHandle>>> {
        let description = self.to_string();
        RetryEngine::new(self.policy(), self.page.clock()).run(&description, || self.attempt())
    }

    /// One resolution attempt against the current DOM
    fn attempt(&self) -> WebprobeResult<Attempt<Vec<ElementHandle>>> {
        let (candidates, outcome) = match self.pass()? {
            Pass::Blocked(observed) => return Ok(Attempt::Pending(observed)),
            Pass::Filtered {
                candidates,
                outcome,
            } => (candidates, outcome),
        };
        if self.expectation.is_satisfied_by(outcome.matched.len()) {
            return Ok(Attempt::Ready(outcome.matched));
        }

        let driver = self.page.driver();
        let mut observed = outcome.observe(driver, &candidates, &self.predicates);
        if observed.unmet.is_none() {
            observed.unmet = Some(format!("expect {}", self.expectation));
        }
        Ok(Attempt::Pending(observed))
    }

    /// Query and filter once, without judging the expectation.
    ///
    /// A scoped locator resolves its parent first, within the same pass,
    /// and queries under every parent match.
    fn pass(&self) -> WebprobeResult<Pass> {
        let driver = self.page.driver();

        let scopes: Vec<Option<ElementHandle>> = match self.scope.as_deref() {
            None => vec![None],
            Some(parent) => match parent.attempt()? {
                Attempt::Ready(handles) => handles.into_iter().map(Some).collect(),
                Attempt::Pending(observed) => {
                    return Ok(Pass::Blocked(Observation {
                        unmet: Some(format!("scope {parent} not resolved ({observed})")),
                        stale: observed.stale,
                        ..Observation::empty()
                    }));
                }
            },
        };

        let mut candidates: Vec<ElementHandle> = Vec::new();
        for scope in &scopes {
            for handle in driver.query(&self.expr, scope.as_ref())? {
                if !candidates.contains(&handle) {
                    candidates.push(handle);
                }
            }
        }

        let outcome = filter(driver, &candidates, &self.predicates)?;
        Ok(Pass::Filtered {
            candidates,
            outcome,
        })
    }

    fn mismatch(&self, detail: String) -> WebprobeError {
        WebprobeError::ExpectationMismatch {
            locator: self.to_string(),
            expected: "exactly one element".to_string(),
            detail,
        }
    }
}

/// Outcome of one query-and-filter pass
enum Pass {
    /// The parent scope did not resolve
    Blocked(Observation),
    /// Candidates and what the predicate chain kept
    Filtered {
        candidates: Vec<ElementHandle>,
        outcome: FilterOutcome,
    },
}

impl fmt::Display for Locator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref parent) = self.scope {
            write!(f, "{parent} >> ")?;
        }
        write!(f, "$$({:?})", &*self.expr)?;
        for (i, predicate) in self.predicates.iter().enumerate() {
            let joiner = if i == 0 { "where" } else { "and" };
            write!(f, " {joiner} {predicate}")?;
        }
        if self.expectation != Expectation::Any {
            write!(f, " [expect {}]", self.expectation)?;
        }
        Ok(())
    }
}

/// Scope for queries under a parent locator's matches
#[derive(Debug, Clone)]
pub struct Within<'p> {
    parent: Locator<'p>,
}

impl<'p> Within<'p> {
    pub(crate) fn new(parent: Locator<'p>) -> Self {
        Self { parent }
    }

    /// Query `expr` under every element the parent resolves to
    #[must_use]
    pub fn select(&self, expr: &str) -> Locator<'p> {
        let mut child = Locator::new(self.parent.page, expr, Some(self.parent.clone()));
        child.policy = self.parent.policy;
        child
    }
}
