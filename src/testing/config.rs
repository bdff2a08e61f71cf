//! Crashfile configuration types
//!
//! Defines the data structures for deserializing a YAML Crashfile.
//! Structure rules (exactly one of `run`/`serial`/`parallel`, timeouts,
//! script syntax) are checked by the step compiler, not here.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::common::{Error, Result};

/// A complete Crashfile
#[derive(Deserialize, Debug, Default)]
pub struct Crashfile {
    /// Initial variables
    #[serde(default)]
    pub vars: BTreeMap<String, serde_yaml::Value>,

    /// User-defined checks, usable as operators
    #[serde(default)]
    pub checks: BTreeMap<String, String>,

    /// Test plans, run in order
    pub plans: Option<Vec<PlanConfig>>,
}

/// A named test plan
#[derive(Deserialize, Debug)]
pub struct PlanConfig {
    #[serde(rename = "plan")]
    pub name: String,
    pub steps: Option<Vec<StepConfig>>,
}

/// A single step: an action, or a serial/parallel group of steps
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    pub run: Option<ActionConfig>,
    pub serial: Option<Vec<StepConfig>>,
    pub parallel: Option<Vec<StepConfig>>,

    /// Check scripts evaluated after the step body
    #[serde(default, alias = "checks")]
    pub check: Checks,

    /// Duration such as `500ms`, `2s` or `1m30s`
    pub timeout: Option<String>,

    /// Loop directive
    pub with: Option<WithConfig>,
}

/// One check script or a list of them
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Checks {
    One(String),
    Many(Vec<String>),
}

impl Default for Checks {
    fn default() -> Self {
        Checks::Many(Vec::new())
    }
}

impl Checks {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Checks::One(s) => vec![s.clone()],
            Checks::Many(v) => v.clone(),
        }
    }
}

/// An action invocation
#[derive(Deserialize, Debug)]
pub struct ActionConfig {
    /// Display name; defaults to the action type
    pub name: Option<String>,

    /// Action type, e.g. `http` or `shell`
    #[serde(rename = "type")]
    pub kind: String,

    /// Parameters; scalars are converted to strings
    #[serde(default)]
    pub params: BTreeMap<String, serde_yaml::Value>,
}

/// `with: {item: expr}` or `with: {list: [expr, ...]}`
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct WithConfig {
    /// Expression yielding a list, or an integer N for `0..N-1`
    pub item: Option<serde_yaml::Value>,

    /// Expressions, one per iteration
    pub list: Option<Vec<serde_yaml::Value>>,

    /// Variable bound to the current element (default `i`)
    #[serde(rename = "as")]
    pub bind: Option<String>,
}

impl Crashfile {
    /// Load a Crashfile from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse Crashfile YAML
    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Script source text of a YAML scalar
///
/// Lets `item: 3` or `list: [1, 2]` be written without quoting.
pub fn scalar_source(value: &serde_yaml::Value) -> Result<String> {
    match value {
        serde_yaml::Value::String(s) => Ok(s.clone()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Null => Ok(String::new()),
        other => Err(Error::Compile(format!(
            "expected a scalar, found {}",
            serde_yaml::to_string(other)?.trim()
        ))),
    }
}
