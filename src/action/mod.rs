//! Actions: the side-effecting leaves of a plan
//!
//! An action receives its already-interpolated string parameters and a
//! cancellation token, and returns result data that the engine binds as
//! variables in the invoking step's scope.
//!
//! Errors built with [`Error::action_failed`] are ordinary step failures;
//! any other error aborts the run.

pub mod http;
pub mod shell;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::script::Value;

pub use http::Http;
pub use shell::Shell;

/// Data produced by a successful action
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionResult {
    pub data: BTreeMap<String, Value>,
}

impl ActionResult {
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

/// Trait for action implementations
#[async_trait]
pub trait Action: Send + Sync {
    /// Run the action
    ///
    /// Implementations should stop promptly once `cancel` fires.
    async fn run(
        &self,
        params: &HashMap<String, String>,
        cancel: CancellationToken,
    ) -> Result<ActionResult>;
}

/// Fetch a parameter that must be present and non-empty
pub fn required<'p>(
    action: &str,
    params: &'p HashMap<String, String>,
    name: &str,
) -> Result<&'p str> {
    params
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::missing_param(action, name))
}

/// Actions by type name
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in `http` and `shell` actions
    pub fn standard(config: &Config) -> Result<Self> {
        let mut reg = Self::new();
        reg.register("http", Http::new(&config.http)?);
        reg.register("shell", Shell::new(&config.shell));
        Ok(reg)
    }

    pub fn register(&mut self, kind: impl Into<String>, action: impl Action + 'static) {
        self.actions.insert(kind.into(), Arc::new(action));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.actions.contains_key(kind)
    }

    pub fn get(&self, kind: &str) -> Result<Arc<dyn Action>> {
        self.actions
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::UnknownAction(kind.to_string()))
    }
}
