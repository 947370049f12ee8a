//! Rules: named predicates with an enable → enforce → pass/fail pipeline.
//!
//! A rule owns ordered handler lists for each [`Event`]. Enforcement runs
//! every handler registered for an event together and waits for all of them
//! before classifying the outcome. A rule may instead delegate enforcement to
//! the rules matched by an alias pattern, keeping its own identity for errors.

/// Exclusive borrow of alias targets during delegation.
mod alias;
/// Handler signatures, the handler scope and failure values.
pub mod handler;
/// Rule name validation and description cleanup.
pub mod text;

pub use handler::{Event, Failure, Scope};

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::{BoxFuture, FutureExt, join_all};
use log::{debug, info, warn};
use serde_json::Value;

use crate::config::{Action, Required, RuleConfig, RulebookConfig, SeverityMap, rule_config};
use crate::error::{ConfigError, Error, RuleError, RulebookError};
use crate::pattern::{NamePattern, Specificity, specificity};
use crate::resolve::ParsedRuleConfig;
use crate::resolve::merge::merged_over;
use crate::rulebook::{BookInner, Rulebook};

use alias::AliasBorrow;
use handler::{CheckFn, FailFn, Handlers, PassFn};

/// How one enforcement ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Omitted by configuration or not enabled for this input.
    Skipped,
    /// Upheld: pass handlers ran.
    Passed,
    /// Broken, but the configured action only logs.
    Failed,
}

struct RuleState<I> {
    description: Option<String>,
    alias: Option<String>,
    handlers: Handlers<I>,
    config: ParsedRuleConfig,
    book: Weak<BookInner<I>>,
}

struct RuleInner<I> {
    name: String,
    specificity: Specificity,
    state: Mutex<RuleState<I>>,
}

/// A handle to a rule. Clones share the same rule; use
/// [`Rule::clone_detached`] for an independent copy.
///
/// ```no_run
/// # async fn demo() -> rulebook::Result<()> {
/// use rulebook::Rulebook;
///
/// let book: Rulebook<u32> = Rulebook::new();
/// book.add("below-five")?
///     .describe("Values must stay below five")
///     .define(|n, _| async move { Ok(n < 5) });
///
/// book.enforce("below-five", 3).await?;
/// # Ok(())
/// # }
/// ```
pub struct Rule<I> {
    inner: Arc<RuleInner<I>>,
}

impl<I> Clone for Rule<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I> fmt::Debug for Rule<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Rule")
            .field("name", &self.inner.name)
            .field("specificity", &self.inner.specificity)
            .field("alias", &state.alias)
            .field("config", &state.config)
            .finish_non_exhaustive()
    }
}

impl<I> Rule<I> {
    fn from_state(name: &str, state: RuleState<I>) -> Self {
        Self {
            inner: Arc::new(RuleInner {
                name: name.to_string(),
                specificity: specificity(name),
                state: Mutex::new(state),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, RuleState<I>> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn specificity(&self) -> Specificity {
        self.inner.specificity
    }

    pub fn description(&self) -> Option<String> {
        self.state().description.clone()
    }

    /// The pattern this rule delegates to, if any.
    pub fn alias_pattern(&self) -> Option<String> {
        self.state().alias.clone()
    }

    /// The action taken when this rule fails.
    pub fn severity(&self) -> Option<Action> {
        self.state().config.throw_action
    }

    /// The effective config, without internal fields.
    pub fn config(&self) -> RuleConfig {
        self.state().config.public()
    }

    /// The effective config with everything derived from it.
    pub fn parsed_config(&self) -> ParsedRuleConfig {
        self.state().config.clone()
    }

    pub fn handler_count(&self, event: Event) -> usize {
        self.state().handlers.count(event)
    }

    /// Whether both handles point at the same rule.
    pub fn ptr_eq(&self, other: &Rule<I>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The rulebook this rule belongs to, if it is still alive.
    pub fn rulebook(&self) -> Option<Rulebook<I>> {
        self.state().book.upgrade().map(Rulebook::from_inner)
    }

    /// An independent copy with the same handlers and config, owned by no rulebook.
    pub fn clone_detached(&self) -> Self {
        let state = self.state();
        Self::from_state(
            &self.inner.name,
            RuleState {
                description: state.description.clone(),
                alias: state.alias.clone(),
                handlers: state.handlers.clone(),
                config: state.config.clone(),
                book: Weak::new(),
            },
        )
    }

    pub(crate) fn is_owned_by_other(&self, book: &Arc<BookInner<I>>) -> bool {
        self.state()
            .book
            .upgrade()
            .is_some_and(|owner| !Arc::ptr_eq(&owner, book))
    }

    pub(crate) fn attach(&self, book: Weak<BookInner<I>>, config: Option<ParsedRuleConfig>) {
        let mut state = self.state();
        state.book = book;
        if let Some(config) = config {
            state.config = config;
        }
    }

    /// Change the config in place, returning what it was before.
    pub(crate) fn update_config(&self, f: impl FnOnce(&mut ParsedRuleConfig)) -> ParsedRuleConfig {
        let mut state = self.state();
        let before = state.config.clone();
        f(&mut state.config);
        before
    }

    /// Provide a human readable description. Indentation is stripped.
    pub fn describe(self, description: &str) -> Self {
        self.state().description = Some(text::normalize_description(description));
        self
    }

    /// Enforce the rules matching `pattern` in place of this rule's own
    /// handlers. Failures are reported under this rule's name and severity.
    ///
    /// The targets are looked up at enforcement time, so they may be added
    /// after the alias is declared.
    pub fn alias(self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        debug!("[{}] Alias set to {pattern}", self.name());
        self.state().alias = Some(pattern);
        self
    }

    fn severity_map(&self) -> SeverityMap {
        match self.rulebook() {
            Some(book) => book.severity(),
            None => RulebookConfig::default_config().severity,
        }
    }

    /// Merge `values` over the current config and re-resolve the severity.
    pub fn configure(self, values: impl Into<Value>) -> Result<Self, ConfigError> {
        let values = rule_config(values, self.name())?;
        let severity = self.severity_map();
        let mut config = self.parsed_config();
        config.values = merged_over(&values, &config.values);
        config.resolve_action(self.name(), &severity)?;
        self.state().config = config;
        Ok(self)
    }

    /// Report failures under this rule's identity.
    ///
    /// A failure that already is a [`RuleError`] is reported as is. With the
    /// `error` action, or while serving as an alias target, the error is
    /// returned; `warn` and `info` only log it.
    pub fn throw(&self, failures: &[Failure]) -> Result<(), RuleError> {
        debug!("[{}] Throwing error", self.name());
        let (config, description) = {
            let state = self.state();
            (state.config.clone(), state.description.clone())
        };

        let error = match failures.iter().find_map(Failure::rule_error) {
            Some(classified) => classified.clone(),
            None => RuleError::new(
                self.name(),
                config.required(self.name()).ok().flatten().unwrap_or(Required::Omit),
                config.throw_action,
                description,
                failures.iter().map(ToString::to_string).collect(),
            ),
        };

        if error.severity == Some(Action::Error) || config.is_alias_target {
            return Err(error);
        }
        match error.severity {
            Some(Action::Warn) => warn!("[{}] {error}", self.name()),
            Some(Action::Info) => info!("[{}] {error}", self.name()),
            _ => {}
        }
        Ok(())
    }
}

impl<I> Rule<I>
where
    I: Clone + Send + Sync + 'static,
{
    /// Create a rule that belongs to no rulebook yet.
    pub fn new(name: &str) -> Result<Self, RulebookError> {
        let name = text::validate_name(name)?;
        Ok(Self::from_state(
            name,
            RuleState {
                description: None,
                alias: None,
                handlers: Handlers::default(),
                config: ParsedRuleConfig::fallback(),
                book: Weak::new(),
            },
        ))
    }

    fn push_handler(self, event: Event, push: impl FnOnce(&mut Handlers<I>)) -> Self {
        debug!("[{}] Handler added for event '{}'", self.name(), event.as_str());
        push(&mut self.state().handlers);
        self
    }

    /// Decide per input whether the rule applies. Anything but `true` skips
    /// enforcement.
    pub fn enable_when<F, Fut, R>(self, f: F) -> Self
    where
        F: Fn(I, Scope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<Value>,
    {
        let handler = handler::check_fn(f);
        self.push_handler(Event::Enable, |h| h.enable.push(handler))
    }

    /// Define the rule logic. Return `true` to pass; any other value or an
    /// error fails the rule.
    pub fn define<F, Fut, R>(self, f: F) -> Self
    where
        F: Fn(I, Scope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<Value>,
    {
        let handler = handler::check_fn(f);
        self.push_handler(Event::Enforce, |h| h.enforce.push(handler))
    }

    /// Run when the rule passes.
    pub fn reward<F, Fut>(self, f: F) -> Self
    where
        F: Fn(I, Scope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler = handler::pass_fn(f);
        self.push_handler(Event::Pass, |h| h.pass.push(handler))
    }

    /// Run when the rule fails, with the failures as the last argument.
    /// An error returned here is reported with this rule's severity.
    ///
    /// Without a punishment the failures themselves are reported.
    pub fn punishment<F, Fut>(self, f: F) -> Self
    where
        F: Fn(I, Scope, Vec<Failure>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler = handler::fail_fn(f);
        self.push_handler(Event::Fail, |h| h.fail.push(handler))
    }

    /// Enforce the rule against `input`.
    ///
    /// Errors only when the rule is broken and its action is `error` (or it
    /// is being enforced on behalf of an alias).
    pub fn enforce(&self, input: I) -> BoxFuture<'static, Result<Outcome, RuleError>> {
        self.enforce_within(input, Vec::new())
    }

    /// Enforce on behalf of the aliasing rules in `chain`, outermost first.
    pub(crate) fn enforce_within(
        &self,
        input: I,
        chain: Vec<String>,
    ) -> BoxFuture<'static, Result<Outcome, RuleError>> {
        let rule = self.clone();
        async move { rule.run(input, chain).await }.boxed()
    }

    async fn run(self, input: I, chain: Vec<String>) -> Result<Outcome, RuleError> {
        let (config, alias, handlers) = {
            let state = self.state();
            (
                state.config.clone(),
                state.alias.clone(),
                state.handlers.clone(),
            )
        };
        if config.throw_action.is_none() && !config.is_alias_target {
            return Ok(Outcome::Skipped);
        }

        let scope = Scope::new(self.name(), config.public());
        let failures = match self.enabled(&handlers.enable, &input, &scope).await {
            Ok(false) => {
                debug!("[{}] Not enabled for this input, skipping", self.name());
                return Ok(Outcome::Skipped);
            }
            Err(failure) => vec![failure],
            Ok(true) => match alias {
                Some(pattern) => match self.enforce_alias(&pattern, &input, &config, chain).await {
                    Ok(()) => {
                        // The delegate already rewarded itself
                        debug!("[{}] Alias rule upheld", self.name());
                        return Ok(Outcome::Passed);
                    }
                    Err(error) => {
                        debug!("[{}] Alias rule broken", self.name());
                        vec![reattribute(error)]
                    }
                },
                None => self.check(&handlers.enforce, &input, &scope).await,
            },
        };

        if failures.is_empty() {
            self.raise_pass(&handlers.pass, &input, &scope).await?;
            Ok(Outcome::Passed)
        } else {
            self.raise_fail(&handlers.fail, &input, &scope, failures).await?;
            Ok(Outcome::Failed)
        }
    }

    /// `Err` carries an error raised by an enable handler.
    async fn enabled(
        &self,
        handlers: &[CheckFn<I>],
        input: &I,
        scope: &Scope,
    ) -> Result<bool, Failure> {
        if handlers.is_empty() {
            return Ok(true);
        }
        debug!("[{}] Event: '{}'", self.name(), Event::Enable.as_str());
        let results = join_all(handlers.iter().map(|h| h(input.clone(), scope.clone()))).await;
        let mut enabled = true;
        for result in results {
            match result {
                Ok(Value::Bool(true)) => {}
                Ok(_) => enabled = false,
                Err(e) => return Err(Failure::raised(e)),
            }
        }
        Ok(enabled)
    }

    /// Run every enforce handler and collect what counts as a failure.
    async fn check(&self, handlers: &[CheckFn<I>], input: &I, scope: &Scope) -> Vec<Failure> {
        debug!("[{}] Event: '{}'", self.name(), Event::Enforce.as_str());
        if handlers.is_empty() {
            debug!("[{}] Rule has no definition", self.name());
        }
        let results = join_all(handlers.iter().map(|h| h(input.clone(), scope.clone()))).await;
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(Value::Bool(true)) => {}
                Ok(other) => failures.push(Failure::Returned(other)),
                // A raised error replaces every returned value
                Err(e) => return vec![Failure::raised(e)],
            }
        }
        failures
    }

    async fn enforce_alias(
        &self,
        pattern: &str,
        input: &I,
        config: &ParsedRuleConfig,
        mut chain: Vec<String>,
    ) -> Result<(), Error> {
        debug!("[{}] Enforcing via alias {pattern}", self.name());
        let book = self
            .rulebook()
            .ok_or_else(|| RulebookError::Detached(self.name().into(), pattern.into()))?;
        let targets = book.matching(&NamePattern::new(pattern)?);
        if targets.is_empty() {
            return Err(RulebookError::AliasNotFound(pattern.into()).into());
        }
        // A target already delegating higher up would recurse forever
        chain.push(self.name().to_string());
        if targets.iter().any(|t| chain.iter().any(|name| name == t.name())) {
            return Err(RulebookError::AliasCycle(self.name().into(), pattern.into()).into());
        }

        let _borrow = AliasBorrow::acquire(targets, &config.values);
        book.enforce_within(pattern, input.clone(), &chain).await
    }

    async fn raise_pass(
        &self,
        handlers: &[PassFn<I>],
        input: &I,
        scope: &Scope,
    ) -> Result<(), RuleError> {
        debug!("[{}] Event: '{}'", self.name(), Event::Pass.as_str());
        let results = join_all(handlers.iter().map(|h| h(input.clone(), scope.clone()))).await;
        self.settle(results)
    }

    async fn raise_fail(
        &self,
        handlers: &[FailFn<I>],
        input: &I,
        scope: &Scope,
        failures: Vec<Failure>,
    ) -> Result<(), RuleError> {
        debug!("[{}] Event: '{}'", self.name(), Event::Fail.as_str());
        if handlers.is_empty() {
            return self.throw(&failures);
        }
        let results = join_all(
            handlers
                .iter()
                .map(|h| h(input.clone(), scope.clone(), failures.clone())),
        )
        .await;
        self.settle(results)
    }

    /// Classify the first error returned by pass or fail handlers.
    fn settle(&self, results: Vec<anyhow::Result<()>>) -> Result<(), RuleError> {
        let Some(error) = results.into_iter().find_map(Result::err) else {
            return Ok(());
        };
        match error.downcast::<RuleError>() {
            Ok(classified) => Err(classified),
            Err(other) => self.throw(&[Failure::raised(other)]),
        }
    }
}

/// Strip the delegate's identity from an alias failure so the aliasing rule
/// reports it under its own name.
fn reattribute(error: Error) -> Failure {
    match error {
        Error::Rule(e) => Failure::raised(anyhow::anyhow!(e.message)),
        other => Failure::raised(anyhow::Error::new(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn initializes_with_fallback_config() {
        let rule: Rule<()> = Rule::new("foo").unwrap();
        assert_eq!(rule.name(), "foo");
        assert_eq!(rule.config(), rule_config(json!({ "required": "must" }), "t").unwrap());
        assert_eq!(rule.severity(), Some(Action::Error));
        assert!(rule.rulebook().is_none());
    }

    #[test]
    fn rejects_invalid_names() {
        assert!(matches!(
            Rule::<()>::new("foo*"),
            Err(RulebookError::InvalidName(_))
        ));
    }

    #[test]
    fn configure_keeps_existing_values() {
        let rule: Rule<()> = Rule::new("foo")
            .unwrap()
            .configure(json!({ "foo": "bar" }))
            .unwrap()
            .configure(json!({ "fizz": "buzz" }))
            .unwrap();
        assert_eq!(
            rule.config(),
            rule_config(json!({ "required": "must", "foo": "bar", "fizz": "buzz" }), "t").unwrap()
        );
    }

    #[test]
    fn configure_resolves_severity() {
        let rule: Rule<()> = Rule::new("foo").unwrap();
        let rule = rule.configure(json!({ "required": "should" })).unwrap();
        assert_eq!(rule.severity(), Some(Action::Warn));
        let rule = rule.configure(json!({ "required": null })).unwrap();
        assert_eq!(rule.severity(), None);
    }

    #[test]
    fn configure_rejects_unknown_required_level() {
        let err = Rule::<()>::new("foo")
            .unwrap()
            .configure(json!({ "required": "unknown level" }))
            .unwrap_err();
        let expected =
            "Found unknown required level 'unknown level' in the configuration for rule 'foo'";
        assert!(err.message().contains(expected), "{err}");
    }

    #[test]
    fn clone_detached_copies_handlers_and_config() {
        let original: Rule<()> = Rule::new("foo")
            .unwrap()
            .define(|_, _| async { Ok(true) })
            .define(|_, _| async { Ok(true) })
            .reward(|_, _| async { Ok(()) })
            .punishment(|_, _, _| async { Ok(()) })
            .configure(json!({ "lorem": "ipsum" }))
            .unwrap();
        let copy = original.clone_detached().configure(json!({ "dolor": 1 })).unwrap();

        assert!(!copy.ptr_eq(&original));
        assert_eq!(copy.handler_count(Event::Enforce), 2);
        assert_eq!(copy.handler_count(Event::Pass), 1);
        assert_eq!(copy.handler_count(Event::Fail), 1);
        assert_eq!(copy.config()["lorem"], "ipsum");
        assert!(!original.config().contains_key("dolor"));
    }

    #[test]
    fn describe_normalizes_text() {
        let rule: Rule<()> = Rule::new("foo").unwrap().describe(
            "
                FirstLine

                SecondLine
            ",
        );
        assert_eq!(rule.description().as_deref(), Some("FirstLine\n\nSecondLine"));
    }

    #[tokio::test]
    async fn passing_rule_rewards_and_never_punishes() {
        let passed = counter();
        let failed = counter();
        let (p, f) = (passed.clone(), failed.clone());
        let rule: Rule<u32> = Rule::new("small")
            .unwrap()
            .define(|n, _| async move { Ok(n < 5) })
            .reward(move |_, _| {
                p.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .punishment(move |_, _, _| {
                f.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            });

        assert_eq!(rule.enforce(1).await.unwrap(), Outcome::Passed);
        assert_eq!(passed.load(Ordering::SeqCst), 1);
        assert_eq!(failed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_rule_punishes_exactly_once() {
        let failed = counter();
        let f = failed.clone();
        let rule: Rule<u32> = Rule::new("small")
            .unwrap()
            .define(|n, _| async move { Ok(n < 5) })
            .define(|_, _| async { Ok(false) })
            .punishment(move |_, _, failures| {
                f.fetch_add(1, Ordering::SeqCst);
                assert_eq!(failures.len(), 2);
                async { Ok(()) }
            });

        assert_eq!(rule.enforce(10).await.unwrap(), Outcome::Failed);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn raised_error_is_the_sole_failure() {
        let rule: Rule<()> = Rule::new("foo")
            .unwrap()
            .define(|_, _| async { Ok("not true") })
            .define(|_, _| async { Err::<bool, _>(anyhow::anyhow!("exploded")) });

        let err = rule.enforce(()).await.unwrap_err();
        assert_eq!(err.message, "exploded");
        assert_eq!(err.inputs, vec!["exploded".to_string()]);
    }

    #[tokio::test]
    async fn all_enforce_handlers_run_despite_failures() {
        let calls = counter();
        let mut rule: Rule<()> = Rule::new("foo").unwrap();
        for _ in 0..3 {
            let c = calls.clone();
            rule = rule.define(move |_, _| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Ok(false) }
            });
        }
        assert!(rule.enforce(()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn default_punishment_reports_returned_values() {
        let rule: Rule<()> = Rule::new("foo")
            .unwrap()
            .describe("awesome description")
            .define(|_, _| async { Ok(json!({ "bad": 1 })) });

        let err = rule.enforce(()).await.unwrap_err();
        assert_eq!(err.rule, "foo");
        assert_eq!(err.required, Required::Must);
        assert_eq!(err.severity, Some(Action::Error));
        assert_eq!(err.description.as_deref(), Some("awesome description"));
        assert_eq!(err.message, r#"{"bad":1}"#);
        assert_eq!(err.to_string(), r#"MUST {"bad":1}"#);
    }

    #[tokio::test]
    async fn no_definition_passes() {
        let rule: Rule<()> = Rule::new("foo").unwrap();
        assert_eq!(rule.enforce(()).await.unwrap(), Outcome::Passed);
    }

    #[tokio::test]
    async fn warn_and_info_do_not_error() {
        for level in ["should", "may", "optional"] {
            let rule: Rule<()> = Rule::new("foo")
                .unwrap()
                .configure(json!({ "required": level }))
                .unwrap()
                .define(|_, _| async { Ok(false) });
            assert_eq!(rule.enforce(()).await.unwrap(), Outcome::Failed, "{level}");
        }
    }

    #[tokio::test]
    async fn omitted_rule_runs_nothing() {
        let calls = counter();
        let c = calls.clone();
        let rule: Rule<()> = Rule::new("foo")
            .unwrap()
            .configure(json!({ "required": "omit" }))
            .unwrap()
            .enable_when(move |_, _| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Ok(true) }
            })
            .define(|_, _| async { Ok(false) });

        assert_eq!(rule.enforce(()).await.unwrap(), Outcome::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disabled_rule_skips_enforcement() {
        let calls = counter();
        let c = calls.clone();
        let rule: Rule<i32> = Rule::new("positive")
            .unwrap()
            .enable_when(|n, _| async move { Ok(n != 0) })
            .define(move |n, _| {
                c.fetch_add(1, Ordering::SeqCst);
                async move { Ok(n > 0) }
            });

        assert_eq!(rule.enforce(0).await.unwrap(), Outcome::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(rule.enforce(-1).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn enable_error_fails_the_rule() {
        let rule: Rule<()> = Rule::new("foo")
            .unwrap()
            .enable_when(|_, _| async { Err::<bool, _>(anyhow::anyhow!("cannot tell")) });
        let err = rule.enforce(()).await.unwrap_err();
        assert_eq!(err.message, "cannot tell");
    }

    #[tokio::test]
    async fn punishment_error_is_wrapped_with_rule_severity() {
        let rule: Rule<u32> = Rule::new("foo")
            .unwrap()
            .define(|n, _| async move { Ok(n == 0) })
            .punishment(|n, _, _| async move { Err(anyhow::anyhow!("{n} is not zero")) });

        let err = rule.enforce(7).await.unwrap_err();
        assert_eq!(err.rule, "foo");
        assert_eq!(err.message, "7 is not zero");
    }

    #[tokio::test]
    async fn punishment_can_downgrade_to_warning() {
        let rule: Rule<()> = Rule::new("foo")
            .unwrap()
            .configure(json!({ "required": "should" }))
            .unwrap()
            .define(|_, _| async { Ok(false) })
            .punishment(|_, _, _| async { Err(anyhow::anyhow!("only a warning")) });
        assert_eq!(rule.enforce(()).await.unwrap(), Outcome::Failed);
    }

    #[tokio::test]
    async fn classified_errors_propagate_unchanged() {
        let foreign =
            RuleError::new("other", Required::May, Some(Action::Error), None, vec!["x".into()]);
        let rule: Rule<()> = Rule::new("foo")
            .unwrap()
            .configure(json!({ "required": "should" }))
            .unwrap()
            .reward(move |_, _| {
                let e = foreign.clone();
                async move { Err(e.into()) }
            });

        let err = rule.enforce(()).await.unwrap_err();
        assert_eq!(err.rule, "other");
        assert_eq!(err.required, Required::May);
    }

    #[tokio::test]
    async fn handlers_see_config_and_share_context() {
        let rule: Rule<String> = Rule::new("max-length")
            .unwrap()
            .configure(json!({ "max": 3 }))
            .unwrap()
            .define(|s: String, scope| async move {
                scope.set_context("length", s.len());
                Ok(s.len() <= scope.get::<usize>("max").unwrap_or(0))
            })
            .punishment(|s, scope, _| async move {
                let length = scope.context("length").unwrap_or_default();
                Err(anyhow::anyhow!("'{s}' has length {length}, above {}", scope.config()["max"]))
            });

        assert_eq!(rule.enforce("abc".into()).await.unwrap(), Outcome::Passed);
        let err = rule.enforce("abcd".into()).await.unwrap_err();
        assert_eq!(err.message, "'abcd' has length 4, above 3");
    }

    #[tokio::test]
    async fn alias_without_rulebook_fails() {
        let rule: Rule<()> = Rule::new("foo").unwrap().alias("bar");
        let err = rule.enforce(()).await.unwrap_err();
        assert!(err.message.contains("not part of a rulebook"), "{err}");
    }

    #[test]
    fn throw_with_warn_action_returns_ok() {
        let rule: Rule<()> = Rule::new("foo")
            .unwrap()
            .configure(json!({ "required": "should" }))
            .unwrap();
        assert!(rule.throw(&[Failure::message("careful")]).is_ok());
    }

    #[test]
    fn throw_joins_messages() {
        let rule: Rule<()> = Rule::new("foo").unwrap();
        let err = rule
            .throw(&[Failure::message("one"), Failure::Returned(json!(2))])
            .unwrap_err();
        assert_eq!(err.message, "one\n2");
    }
}
