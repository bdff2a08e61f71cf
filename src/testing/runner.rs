//! Crashfile runner
//!
//! Loads a Crashfile, compiles it, seeds the root scope and hands the plans
//! to the engine with the requested reporter.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::action::ActionRegistry;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::runtime::{compile, Engine, HumanReporter, JsonReporter, Level, Reporter, Scope, TestPlan};
use crate::script::ops::Sh;
use crate::script::{Registry, Value};

use super::config::Crashfile;

/// Options for `crash test`
#[derive(Debug, Clone)]
pub struct TestOptions {
    pub file: PathBuf,
    /// `KEY=VALUE` pairs or YAML files of variables
    pub vars: Vec<String>,
    pub json: bool,
    pub color: bool,
    pub level: Level,
}

/// A compiled Crashfile ready to run
pub struct Loaded {
    pub file: Crashfile,
    pub plan: TestPlan,
    pub actions: ActionRegistry,
}

/// Built-in operators, with `sh` using the configured shell
pub fn operators(config: &Config) -> Registry {
    let mut ops = Registry::standard();
    ops.register("sh", Sh::new(&config.shell.program, &config.shell.arg));
    ops
}

/// Read and compile a Crashfile
pub fn load(path: &Path, config: &Config) -> Result<Loaded> {
    let file = Crashfile::load(path)?;
    let actions = ActionRegistry::standard(config)?;
    let plan = compile(&file, operators(config), &actions)?;
    Ok(Loaded { file, plan, actions })
}

/// Compile without running; returns the number of plans
pub fn validate(path: &Path, config: &Config) -> Result<usize> {
    let loaded = load(path, config)?;
    tracing::debug!(plans = loaded.plan.plans.len(), "validated {}", path.display());
    Ok(loaded.plan.plans.len())
}

/// Run every plan; `Ok(false)` means some check or step failed
pub async fn run(opts: &TestOptions, config: &Config) -> Result<bool> {
    let Loaded { file, plan, actions } = load(&opts.file, config)?;
    let overrides = parse_var_args(&opts.vars)?;
    let vars = root_scope(&file, overrides);

    let reporter: Arc<dyn Reporter> = if opts.json {
        Arc::new(JsonReporter::stdout(opts.level))
    } else {
        Arc::new(HumanReporter::stdout(opts.level, opts.color))
    };

    let engine = Engine::new(plan.ops.clone(), Arc::new(actions), reporter);
    engine.run(&plan.plans, vars).await
}

/// Root scope: Crashfile `vars`, then command-line overrides
pub fn root_scope(file: &Crashfile, overrides: BTreeMap<String, Value>) -> Arc<Scope> {
    let scope = Scope::root();
    scope.set_all(file.vars.iter().map(|(k, v)| (k.clone(), Value::from(v.clone()))));
    scope.set_all(overrides);
    scope
}

/// Parse `-s` arguments
///
/// `KEY=VALUE` sets one string variable; anything else is a YAML file whose
/// top-level mapping is merged in. Later arguments win.
pub fn parse_var_args(args: &[String]) -> Result<BTreeMap<String, Value>> {
    let mut vars = BTreeMap::new();
    for arg in args {
        match arg.split_once('=') {
            Some((key, value)) => {
                let key = key.trim();
                if key.is_empty() {
                    return Err(Error::Config(format!("missing variable name in '{}'", arg)));
                }
                vars.insert(key.to_string(), Value::from(value));
            }
            None => vars.extend(load_var_file(Path::new(arg))?),
        }
    }
    Ok(vars)
}

fn load_var_file(path: &Path) -> Result<BTreeMap<String, Value>> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    let map: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(&content)?;
    Ok(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_args() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("vars.yml");
        std::fs::write(&file, "host: example.com\nport: 8080\n").unwrap();

        let args = vec![
            "port=9090".to_string(),
            file.display().to_string(),
            "empty=".to_string(),
            "eq=a=b".to_string(),
        ];
        let vars = parse_var_args(&args).unwrap();
        assert_eq!(vars["host"], Value::from("example.com"));
        assert_eq!(vars["port"], Value::Int(8080));
        assert_eq!(vars["empty"], Value::from(""));
        assert_eq!(vars["eq"], Value::from("a=b"));
    }

    #[test]
    fn test_parse_var_args_errors() {
        assert!(matches!(
            parse_var_args(&["=value".to_string()]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            parse_var_args(&["/no/such/vars.yml".to_string()]),
            Err(Error::FileRead { .. })
        ));
    }

    #[test]
    fn test_root_scope_overrides() {
        let file = Crashfile::parse("vars: {host: localhost, port: 80}\nplans: []").unwrap();
        let mut overrides = BTreeMap::new();
        overrides.insert("port".to_string(), Value::from("8080"));

        let scope = root_scope(&file, overrides);
        assert_eq!(scope.get("host"), Some(Value::from("localhost")));
        assert_eq!(scope.get("port"), Some(Value::from("8080")));
    }

    #[test]
    fn test_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Crashfile");
        std::fs::write(
            &path,
            "plans:\n  - plan: a\n    steps:\n      - run: {type: shell, params: {command: 'true'}}\n",
        )
        .unwrap();
        assert_eq!(validate(&path, &Config::default()).unwrap(), 1);

        std::fs::write(&path, "plans:\n  - plan: a\n    steps:\n      - run: {type: ftp}\n").unwrap();
        assert!(matches!(
            validate(&path, &Config::default()),
            Err(Error::UnknownAction(_))
        ));
    }
}
