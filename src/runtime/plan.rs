//! Step compiler
//!
//! Lowers the deserialized Crashfile into an immutable tree of [`Plan`]s and
//! [`Step`]s. Every script is parsed, every timeout and action type checked
//! here, so a compiled plan can only fail at run time through evaluation
//! errors or its actions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::action::ActionRegistry;
use crate::common::{Error, Result};
use crate::script::ast::{Expression, Statement};
use crate::script::{Registry, Script, ScriptOperator};
use crate::testing::config::{
    scalar_source, ActionConfig, Crashfile, PlanConfig, StepConfig, WithConfig,
};

use super::report::EventKind;

/// Default loop variable
pub const DEFAULT_BIND: &str = "i";

/// A compiled Crashfile
pub struct TestPlan {
    pub plans: Vec<Plan>,
    /// Standard operators plus the Crashfile's user checks
    pub ops: Arc<Registry>,
}

pub struct Plan {
    pub name: String,
    /// Top-level steps as one implicit serial step
    pub body: Arc<Step>,
}

pub struct Step {
    pub body: StepBody,
    pub checks: Arc<Vec<Script<Statement>>>,
    pub timeout: Option<Duration>,
    pub with: Option<With>,
}

pub enum StepBody {
    Action(ActionStep),
    Serial(Vec<Arc<Step>>),
    Parallel(Vec<Arc<Step>>),
}

pub struct ActionStep {
    pub name: String,
    pub kind: String,
    pub params: HashMap<String, String>,
}

pub struct With {
    pub source: WithSource,
    pub bind: String,
}

pub enum WithSource {
    /// One expression yielding a list or an integer count
    Item(Script<Expression>),
    /// One expression per iteration
    List(Vec<Script<Expression>>),
}

impl Step {
    /// Serial step wrapping `steps`, without checks or timeout
    pub fn serial(steps: Vec<Arc<Step>>) -> Self {
        Self {
            body: StepBody::Serial(steps),
            checks: Arc::new(Vec::new()),
            timeout: None,
            with: None,
        }
    }

    /// Event kind and display name
    pub fn describe(&self) -> (EventKind, &str) {
        match &self.body {
            StepBody::Action(a) => (EventKind::Action, a.name.as_str()),
            StepBody::Serial(_) => (EventKind::Serial, "serial"),
            StepBody::Parallel(_) => (EventKind::Parallel, "parallel"),
        }
    }
}

/// Compile a Crashfile
///
/// `base` supplies the built-in operators; user checks are added on top and
/// may call each other. Action types are validated against `actions`.
pub fn compile(file: &Crashfile, base: Registry, actions: &ActionRegistry) -> Result<TestPlan> {
    let ops = compile_checks(file, base)?;

    let configs = file
        .plans
        .as_ref()
        .ok_or_else(|| Error::Compile("Missing required property: plans".to_string()))?;

    let compiler = Compiler { actions };
    let plans = configs
        .iter()
        .map(|p| compiler.plan(p))
        .collect::<Result<Vec<_>>>()?;

    Ok(TestPlan { plans, ops })
}

fn compile_checks(file: &Crashfile, base: Registry) -> Result<Arc<Registry>> {
    let mut checks = BTreeMap::new();
    for (name, source) in &file.checks {
        if base.contains(name) {
            return Err(Error::Compile(format!(
                "check '{}' conflicts with a built-in operator",
                name
            )));
        }
        let script = Script::statement(source).map_err(|e| in_check(name, e))?;
        checks.insert(name.as_str(), script.tree().clone());
    }
    check_calls(&checks, &base)?;

    // Each user check resolves operators through the registry it is part of.
    Ok(Arc::new_cyclic(|this| {
        let mut ops = base;
        for (name, statement) in checks {
            ops.register(name, ScriptOperator::new(statement, this.clone()));
        }
        ops
    }))
}

/// Reject user checks that call unknown operators or recurse
fn check_calls(checks: &BTreeMap<&str, Statement>, base: &Registry) -> Result<()> {
    for &start in checks.keys() {
        let mut chain = vec![start];
        let mut current = start;
        while let Some(statement) = checks.get(current) {
            let next = statement.operation.operator.as_str();
            if chain.contains(&next) {
                chain.push(next);
                return Err(Error::Compile(format!(
                    "recursive checks: {}",
                    chain.join(" -> ")
                )));
            }
            if !checks.contains_key(next) && !base.contains(next) {
                return Err(in_check(current, Error::UnknownOperator(next.to_string())));
            }
            chain.push(next);
            current = next;
        }
    }
    Ok(())
}

fn in_check(name: &str, e: Error) -> Error {
    Error::Compile(format!("check '{}': {}", name, e))
}

struct Compiler<'a> {
    actions: &'a ActionRegistry,
}

impl Compiler<'_> {
    fn plan(&self, config: &PlanConfig) -> Result<Plan> {
        let steps = config
            .steps
            .as_ref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Compile(format!("Plan has no steps: {}", config.name)))?;

        let body = Step::serial(self.steps(steps)?);
        Ok(Plan {
            name: config.name.clone(),
            body: Arc::new(body),
        })
    }

    fn steps(&self, configs: &[StepConfig]) -> Result<Vec<Arc<Step>>> {
        configs.iter().map(|c| self.step(c).map(Arc::new)).collect()
    }

    fn step(&self, config: &StepConfig) -> Result<Step> {
        let body = match (&config.run, &config.serial, &config.parallel) {
            (Some(run), None, None) => StepBody::Action(self.action(run)?),
            (None, Some(serial), None) => StepBody::Serial(self.steps(serial)?),
            (None, None, Some(parallel)) => StepBody::Parallel(self.steps(parallel)?),
            (None, None, None) => {
                return Err(Error::Compile(
                    "require action, serial, or parallel step".to_string(),
                ))
            }
            _ => {
                return Err(Error::Compile(
                    "step may only have one of run, serial, or parallel".to_string(),
                ))
            }
        };

        let checks = config
            .check
            .to_vec()
            .iter()
            .map(|src| Script::statement(src))
            .collect::<Result<Vec<_>>>()?;

        let timeout = match &config.timeout {
            Some(t) => parse_timeout(t)?,
            None => None,
        };

        let with = config.with.as_ref().map(with_directive).transpose()?;

        Ok(Step {
            body,
            checks: Arc::new(checks),
            timeout,
            with,
        })
    }

    fn action(&self, config: &ActionConfig) -> Result<ActionStep> {
        if !self.actions.contains(&config.kind) {
            return Err(Error::UnknownAction(config.kind.clone()));
        }
        let params = config
            .params
            .iter()
            .map(|(k, v)| Ok((k.clone(), scalar_source(v)?)))
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(ActionStep {
            name: config.name.clone().unwrap_or_else(|| config.kind.clone()),
            kind: config.kind.clone(),
            params,
        })
    }
}

fn with_directive(config: &WithConfig) -> Result<With> {
    let source = match (&config.item, &config.list) {
        (Some(item), None) => WithSource::Item(Script::expression(&scalar_source(item)?)?),
        (None, Some(list)) => WithSource::List(
            list.iter()
                .map(|v| Script::expression(&scalar_source(v)?))
                .collect::<Result<Vec<_>>>()?,
        ),
        _ => {
            return Err(Error::Compile(
                "with requires exactly one of item or list".to_string(),
            ))
        }
    };

    let bind = config
        .bind
        .clone()
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| DEFAULT_BIND.to_string());

    Ok(With { source, bind })
}

/// Parse a timeout such as `500ms`, `2s`, `1m30s` or `1.5h`
///
/// Empty means no timeout. Zero or negative durations are rejected.
pub fn parse_timeout(text: &str) -> Result<Option<Duration>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let invalid = |reason: &str| Error::InvalidTimeout {
        value: text.to_string(),
        reason: reason.to_string(),
    };

    let (negative, mut rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if rest == "0" {
        return Err(invalid("timeout must be greater than zero"));
    }

    let mut nanos = 0f64;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return Err(invalid("expected a number"));
        }
        let number: f64 = rest[..num_end]
            .parse()
            .map_err(|_| invalid("malformed number"))?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(invalid("missing unit")),
            _ => return Err(invalid("unknown unit")),
        };
        nanos += number * scale;
        rest = &rest[unit_end..];
    }

    if negative || nanos < 1.0 {
        return Err(invalid("timeout must be greater than zero"));
    }
    Ok(Some(Duration::from_nanos(nanos as u64)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::Config;
    use crate::script::Value;

    fn compile_yaml(yaml: &str) -> Result<TestPlan> {
        let file = Crashfile::parse(yaml)?;
        let actions = ActionRegistry::standard(&Config::default())?;
        compile(&file, Registry::standard(), &actions)
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("").unwrap(), None);
        assert_eq!(parse_timeout("500ms").unwrap(), Some(Duration::from_millis(500)));
        assert_eq!(parse_timeout("2s").unwrap(), Some(Duration::from_secs(2)));
        assert_eq!(parse_timeout("1m30s").unwrap(), Some(Duration::from_secs(90)));
        assert_eq!(parse_timeout("1.5h").unwrap(), Some(Duration::from_secs(5400)));
        assert_eq!(parse_timeout("250us").unwrap(), Some(Duration::from_micros(250)));

        for bad in ["0", "0s", "-1s", "10", "5 parsecs", "s", "1x"] {
            assert!(
                matches!(parse_timeout(bad), Err(Error::InvalidTimeout { .. })),
                "timeout {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_compile_tree() {
        let plan = compile_yaml(
            r#"
plans:
  - plan: p
    steps:
      - run: {type: shell, params: {command: "echo $x", n: 3}}
        check: out eq 'a'
        timeout: 1s
      - parallel:
          - run: {name: one, type: shell, params: {command: "true"}}
          - serial:
              - run: {type: shell, params: {command: "true"}}
        with: {list: [1, 2, "'three'"], as: v}
"#,
        )
        .unwrap();

        assert_eq!(plan.plans.len(), 1);
        let StepBody::Serial(steps) = &plan.plans[0].body.body else {
            panic!("plan body is not serial");
        };
        assert_eq!(steps.len(), 2);

        let StepBody::Action(action) = &steps[0].body else {
            panic!("expected action");
        };
        assert_eq!(action.name, "shell");
        assert_eq!(action.params["n"], "3");
        assert_eq!(steps[0].checks.len(), 1);
        assert_eq!(steps[0].timeout, Some(Duration::from_secs(1)));

        let StepBody::Parallel(branches) = &steps[1].body else {
            panic!("expected parallel");
        };
        assert_eq!(branches[0].describe(), (EventKind::Action, "one"));
        let with = steps[1].with.as_ref().unwrap();
        assert_eq!(with.bind, "v");
        assert!(matches!(&with.source, WithSource::List(l) if l.len() == 3));
    }

    #[test]
    fn test_compile_errors() {
        let err = compile_yaml("vars: {}").err().unwrap();
        assert_eq!(err.to_string(), "Missing required property: plans");

        let err = compile_yaml("plans: [{plan: empty}]").err().unwrap();
        assert_eq!(err.to_string(), "Plan has no steps: empty");

        let err = compile_yaml("plans: [{plan: p, steps: [{check: a eq 1}]}]").err().unwrap();
        assert!(matches!(err, Error::Compile(_)));

        let both = "plans: [{plan: p, steps: [{run: {type: shell}, serial: []}]}]";
        assert!(matches!(compile_yaml(both).err().unwrap(), Error::Compile(_)));

        let unknown = "plans: [{plan: p, steps: [{run: {type: ftp}}]}]";
        assert!(matches!(compile_yaml(unknown).err().unwrap(), Error::UnknownAction(_)));

        let bad_check = "plans: [{plan: p, steps: [{run: {type: shell}, check: 'a eq'}]}]";
        assert!(compile_yaml(bad_check).is_err());

        let bad_timeout = "plans: [{plan: p, steps: [{run: {type: shell}, timeout: 0s}]}]";
        assert!(matches!(
            compile_yaml(bad_timeout).err().unwrap(),
            Error::InvalidTimeout { .. }
        ));

        let bad_with = "plans: [{plan: p, steps: [{run: {type: shell}, with: {}}]}]";
        assert!(matches!(compile_yaml(bad_with).err().unwrap(), Error::Compile(_)));
    }

    #[test]
    fn test_user_checks() {
        let plan = compile_yaml(
            "checks: {ok-status: '$1 in 200, 299'}\nplans: [{plan: p, steps: [{run: {type: shell}}]}]",
        )
        .unwrap();
        assert!(plan.ops.contains("ok-status"));
        assert!(plan.ops.contains("eq"));

        let shadow = "checks: {eq: '$1 gt 0'}\nplans: [{plan: p, steps: [{run: {type: shell}}]}]";
        assert!(matches!(compile_yaml(shadow).err().unwrap(), Error::Compile(_)));
    }

    #[test]
    fn test_user_checks_call_each_other() {
        let plan = compile_yaml(
            r#"
checks:
  ok-status: $1 in 200, 299
  created: $1 ok-status
plans: [{plan: p, steps: [{run: {type: shell}}]}]
"#,
        )
        .unwrap();
        let created = plan.ops.get("created").unwrap();
        assert!(created.call(&[Value::Int(201)], &[]).unwrap().ok);
        assert!(!created.call(&[Value::Int(404)], &[]).unwrap().ok);
    }

    #[test]
    fn test_recursive_user_checks_rejected() {
        let plans = "plans: [{plan: p, steps: [{run: {type: shell}}]}]";

        let direct = format!("checks: {{loop: '$1 loop'}}\n{}", plans);
        let err = compile_yaml(&direct).err().unwrap();
        assert_eq!(err.to_string(), "recursive checks: loop -> loop");

        let mutual = format!("checks: {{a: '$1 b', b: '$1 a'}}\n{}", plans);
        let err = compile_yaml(&mutual).err().unwrap();
        assert_eq!(err.to_string(), "recursive checks: a -> b -> a");

        let unknown = format!("checks: {{a: '$1 nope 3'}}\n{}", plans);
        let err = compile_yaml(&unknown).err().unwrap();
        assert_eq!(err.to_string(), "check 'a': operation not found: nope");
    }
}
