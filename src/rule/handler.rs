use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::config::RuleConfig;
use crate::error::RuleError;

/// The events a rule raises during one enforcement, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Enable,
    Enforce,
    Pass,
    Fail,
}

impl Event {
    pub fn as_str(self) -> &'static str {
        match self {
            Event::Enable => "enable",
            Event::Enforce => "enforce",
            Event::Pass => "pass",
            Event::Fail => "fail",
        }
    }
}

/// What a handler sees besides the input: the rule's identity, its effective
/// config and a scratch map shared by every handler of one enforcement.
#[derive(Debug, Clone)]
pub struct Scope {
    rule: String,
    config: RuleConfig,
    context: Arc<Mutex<Map<String, Value>>>,
}

impl Scope {
    pub(crate) fn new(rule: &str, config: RuleConfig) -> Self {
        Self {
            rule: rule.to_string(),
            config,
            context: Arc::default(),
        }
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// Read one config value as `T`. `None` when missing or of another shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn context(&self, key: &str) -> Option<Value> {
        self.context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn set_context(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }
}

/// One reason a rule was broken.
#[derive(Debug, Clone)]
pub enum Failure {
    /// An enforce handler returned something other than `true`.
    Returned(Value),
    /// A handler returned an error.
    Raised(Arc<anyhow::Error>),
}

impl Failure {
    pub fn message(message: impl Into<String>) -> Self {
        Failure::Returned(Value::String(message.into()))
    }

    pub fn raised(error: anyhow::Error) -> Self {
        Failure::Raised(Arc::new(error))
    }

    /// The failure as an already classified rule error, if it is one.
    pub fn rule_error(&self) -> Option<&RuleError> {
        match self {
            Failure::Raised(e) => e.downcast_ref::<RuleError>(),
            Failure::Returned(_) => None,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Returned(Value::String(s)) => f.write_str(s),
            Failure::Returned(v) => write!(f, "{v}"),
            Failure::Raised(e) => write!(f, "{e}"),
        }
    }
}

pub(crate) type CheckFn<I> =
    Arc<dyn Fn(I, Scope) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;
pub(crate) type PassFn<I> =
    Arc<dyn Fn(I, Scope) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
pub(crate) type FailFn<I> =
    Arc<dyn Fn(I, Scope, Vec<Failure>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Registered handlers per event. An empty list means the default behaviour
/// for that event, applied where the event is raised.
pub(crate) struct Handlers<I> {
    pub enable: Vec<CheckFn<I>>,
    pub enforce: Vec<CheckFn<I>>,
    pub pass: Vec<PassFn<I>>,
    pub fail: Vec<FailFn<I>>,
}

impl<I> Default for Handlers<I> {
    fn default() -> Self {
        Self {
            enable: Vec::new(),
            enforce: Vec::new(),
            pass: Vec::new(),
            fail: Vec::new(),
        }
    }
}

impl<I> Clone for Handlers<I> {
    fn clone(&self) -> Self {
        Self {
            enable: self.enable.clone(),
            enforce: self.enforce.clone(),
            pass: self.pass.clone(),
            fail: self.fail.clone(),
        }
    }
}

impl<I> Handlers<I> {
    pub fn count(&self, event: Event) -> usize {
        match event {
            Event::Enable => self.enable.len(),
            Event::Enforce => self.enforce.len(),
            Event::Pass => self.pass.len(),
            Event::Fail => self.fail.len(),
        }
    }
}

pub(crate) fn check_fn<I, F, Fut, R>(f: F) -> CheckFn<I>
where
    F: Fn(I, Scope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    R: Into<Value>,
{
    Arc::new(move |input, scope| f(input, scope).map(|r| r.map(Into::into)).boxed())
}

pub(crate) fn pass_fn<I, F, Fut>(f: F) -> PassFn<I>
where
    F: Fn(I, Scope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |input, scope| f(input, scope).boxed())
}

pub(crate) fn fail_fn<I, F, Fut>(f: F) -> FailFn<I>
where
    F: Fn(I, Scope, Vec<Failure>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |input, scope, failures| f(input, scope, failures).boxed())
}
