//! The rule collection: rules sharing one configuration resolver.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::future::join_all;
use log::{debug, warn};
use serde_json::Value;

use crate::config::{PartialRulebookConfig, RuleConfig, RulebookConfig, SeverityMap, rule_config};
use crate::error::RulebookError;
use crate::logging;
use crate::pattern::NamePattern;
use crate::resolve::ConfigResolver;
use crate::resolve::merge::merged_over;
use crate::rule::Rule;

pub(crate) struct BookInner<I> {
    resolver: RwLock<ConfigResolver>,
    /// Ascending by specificity, registration order among ties.
    rules: RwLock<Vec<Rule<I>>>,
}

/// An ordered set of uniquely named rules.
///
/// Clones are handles to the same rulebook. Rules keep a weak link back to
/// the rulebook that owns them, which aliases use to find their targets.
pub struct Rulebook<I> {
    inner: Arc<BookInner<I>>,
}

impl<I> Clone for Rulebook<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I> fmt::Debug for Rulebook<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rulebook")
            .field("rules", &*self.read_rules())
            .finish_non_exhaustive()
    }
}

impl<I> Default for Rulebook<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Rulebook<I> {
    /// An empty rulebook with the built-in default configuration.
    pub fn new() -> Self {
        Self::from_resolver(ConfigResolver::default())
    }

    /// An empty rulebook with `overrides` applied over the defaults.
    ///
    /// An explicit `verboseness` sets the level of the installed logger;
    /// use [`logging::init`] to install one.
    pub fn with_config(overrides: PartialRulebookConfig) -> Result<Self, RulebookError> {
        let explicit = overrides.verboseness.is_some();
        let resolver = ConfigResolver::from_partial(overrides)?;
        Ok(Self::from_resolver(resolver).apply_verboseness(explicit))
    }

    /// An empty rulebook configured from a TOML file, with `overrides`
    /// taking precedence over the file. Verboseness is handled as in
    /// [`Rulebook::with_config`].
    pub fn with_config_file(
        path: impl AsRef<str>,
        overrides: PartialRulebookConfig,
    ) -> crate::Result<Self> {
        let file = PartialRulebookConfig::load(path)?;
        let explicit = file.verboseness.is_some() || overrides.verboseness.is_some();
        let resolver = ConfigResolver::new(RulebookConfig::layered(Some(file), overrides))?;
        Ok(Self::from_resolver(resolver).apply_verboseness(explicit))
    }

    fn apply_verboseness(self, explicit: bool) -> Self {
        if explicit {
            logging::set_level(self.resolver().verboseness());
        }
        self
    }

    pub fn from_resolver(resolver: ConfigResolver) -> Self {
        Self {
            inner: Arc::new(BookInner {
                resolver: RwLock::new(resolver),
                rules: RwLock::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<BookInner<I>>) -> Self {
        Self { inner }
    }

    fn resolver(&self) -> RwLockReadGuard<'_, ConfigResolver> {
        self.inner.resolver.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_rules(&self) -> RwLockReadGuard<'_, Vec<Rule<I>>> {
        self.inner.rules.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_rules(&self) -> RwLockWriteGuard<'_, Vec<Rule<I>>> {
        self.inner.rules.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// A copy of the configuration resolver.
    pub fn config(&self) -> ConfigResolver {
        self.resolver().clone()
    }

    pub fn severity(&self) -> SeverityMap {
        self.resolver().severity().clone()
    }

    pub fn enforce_parallel(&self) -> bool {
        self.resolver().enforce_parallel()
    }

    /// Merge `overrides` into the configuration.
    ///
    /// Rules already in the book keep the config they were added with.
    pub fn set_config(&self, overrides: PartialRulebookConfig) -> Result<(), RulebookError> {
        self.inner
            .resolver
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set(overrides)
    }

    pub fn len(&self) -> usize {
        self.read_rules().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_rules().is_empty()
    }

    /// All rules, ascending by specificity.
    pub fn rules(&self) -> Vec<Rule<I>> {
        self.read_rules().clone()
    }

    /// The rule with exactly this name.
    pub fn get(&self, name: &str) -> Option<Rule<I>> {
        self.read_rules().iter().find(|r| r.name() == name).cloned()
    }

    /// Whether any rule name matches `pattern`.
    pub fn has(&self, pattern: &str) -> Result<bool, RulebookError> {
        let pattern = NamePattern::new(pattern)?;
        Ok(self.read_rules().iter().any(|r| pattern.is_match(r.name())))
    }

    pub(crate) fn matching(&self, pattern: &NamePattern) -> Vec<Rule<I>> {
        self.read_rules()
            .iter()
            .filter(|r| pattern.is_match(r.name()))
            .cloned()
            .collect()
    }

    /// A new rulebook with the same configuration holding copies of the
    /// selected rules. Each copy keeps the config of its original.
    fn select(&self, pattern: &NamePattern) -> Self {
        let book = Self::from_resolver(self.config());
        let selected = self
            .matching(pattern)
            .iter()
            .map(|rule| {
                let copy = rule.clone_detached();
                copy.attach(Arc::downgrade(&book.inner), None);
                copy
            })
            .collect();
        *book.write_rules() = selected;
        book
    }

    /// The rules matching `pattern`, in a new rulebook. Opposite of [`Rulebook::omit`].
    pub fn filter(&self, pattern: &str) -> Result<Self, RulebookError> {
        Ok(self.select(&NamePattern::new(pattern)?))
    }

    /// The rules not matching `pattern`, in a new rulebook. Opposite of [`Rulebook::filter`].
    pub fn omit(&self, pattern: &str) -> Result<Self, RulebookError> {
        Ok(self.select(&NamePattern::new(pattern)?.negate()))
    }
}

impl<I> Rulebook<I>
where
    I: Clone + Send + Sync + 'static,
{
    /// Create a rule named `name` and add it.
    pub fn add(&self, name: &str) -> crate::Result<Rule<I>> {
        self.insert(Rule::new(name)?, None)
    }

    /// Create a rule with config defaults from code.
    ///
    /// A matching configuration entry wins over `defaults`; without one,
    /// `defaults` win over the built-in fallback.
    pub fn add_with_defaults(
        &self,
        name: &str,
        defaults: impl Into<Value>,
    ) -> crate::Result<Rule<I>> {
        let defaults = rule_config(defaults, name)?;
        self.insert(Rule::new(name)?, Some(defaults))
    }

    /// Add an existing rule. A rule owned by another rulebook is copied first.
    pub fn add_rule(&self, rule: Rule<I>) -> crate::Result<Rule<I>> {
        self.insert(rule, None)
    }

    pub fn add_rule_with_defaults(
        &self,
        rule: Rule<I>,
        defaults: impl Into<Value>,
    ) -> crate::Result<Rule<I>> {
        let defaults = rule_config(defaults, rule.name())?;
        self.insert(rule, Some(defaults))
    }

    fn insert(&self, rule: Rule<I>, defaults: Option<RuleConfig>) -> crate::Result<Rule<I>> {
        let rule = if rule.is_owned_by_other(&self.inner) {
            rule.clone_detached()
        } else {
            rule
        };

        let config = {
            let resolver = self.resolver();
            let mut config = resolver.get(rule.name());
            if let Some(defaults) = defaults {
                config.values = if config.is_match() {
                    merged_over(&config.values, &defaults)
                } else {
                    merged_over(&defaults, &config.values)
                };
            }
            resolver.resolve_action(rule.name(), &mut config)?;
            config
        };

        let mut rules = self.write_rules();
        if rules.iter().any(|r| r.name() == rule.name()) {
            return Err(RulebookError::Duplicate(rule.name().to_string()).into());
        }
        rule.attach(Arc::downgrade(&self.inner), Some(config));
        rules.push(rule.clone());
        rules.sort_by_key(Rule::specificity);
        debug!("[{}] Added to rulebook", rule.name());
        Ok(rule)
    }

    /// Enforce every rule matching `pattern` against `input`, least specific
    /// first.
    ///
    /// Sequential enforcement stops at the first error. With
    /// `enforce_parallel` all rules run concurrently and the first error is
    /// returned once every rule has settled.
    pub async fn enforce(&self, pattern: &str, input: I) -> crate::Result<()> {
        self.enforce_within(pattern, input, &[]).await
    }

    /// Enforce on behalf of the aliasing rules in `chain`.
    pub(crate) async fn enforce_within(
        &self,
        pattern: &str,
        input: I,
        chain: &[String],
    ) -> crate::Result<()> {
        if self.is_empty() {
            warn!("No rules to enforce. Rulebook is empty");
            return Ok(());
        }
        let subset = self.matching(&NamePattern::new(pattern)?);
        if subset.is_empty() {
            warn!("No rules to enforce for name pattern '{pattern}'");
            return Ok(());
        }

        if self.enforce_parallel() {
            debug!("Enforcing {} rules concurrently", subset.len());
            let results = join_all(
                subset
                    .iter()
                    .map(|r| r.enforce_within(input.clone(), chain.to_vec())),
            )
            .await;
            match results.into_iter().find_map(Result::err) {
                Some(e) => Err(e.into()),
                None => Ok(()),
            }
        } else {
            for rule in &subset {
                rule.enforce_within(input.clone(), chain.to_vec()).await?;
            }
            Ok(())
        }
    }
}
