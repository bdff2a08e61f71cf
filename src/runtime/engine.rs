//! Step execution engine
//!
//! Each step instance runs in its own child scope. When the body completes
//! its variables are committed into the enclosing scope and the step's checks
//! are evaluated against its own results layered over that scope. A
//! timed-out body is cancelled and nothing is committed.
//!
//! Ordinary failures (false checks, failed actions, timeouts) only turn the
//! result false. Any other error aborts the run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::action::ActionRegistry;
use crate::common::{Error, Result};
use crate::script::ast::Statement;
use crate::script::{interpolate_params, Context, Registry, Script, Value};

use super::plan::{ActionStep, Plan, Step, StepBody, With, WithSource};
use super::report::{EventKind, Reporter, Vars};
use super::variables::Scope;

/// Outcome of a step body
struct BodyResult {
    ok: bool,
    /// Action result data, for reporting
    data: Option<Vars>,
}

impl BodyResult {
    fn new(ok: bool) -> Self {
        Self { ok, data: None }
    }
}

enum Race {
    Completed(Result<BodyResult>),
    TimedOut(Duration),
}

#[derive(Clone)]
pub struct Engine {
    ops: Arc<Registry>,
    actions: Arc<ActionRegistry>,
    reporter: Arc<dyn Reporter>,
}

impl Engine {
    pub fn new(ops: Arc<Registry>, actions: Arc<ActionRegistry>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            ops,
            actions,
            reporter,
        }
    }

    /// Run every plan in order against `vars`
    ///
    /// Returns whether all plans passed. The first fatal error stops the run.
    pub async fn run(&self, plans: &[Plan], vars: Arc<Scope>) -> Result<bool> {
        let mut ok = true;
        for plan in plans {
            ok &= self.run_plan(plan, vars.clone()).await?;
        }
        Ok(ok)
    }

    /// Run one plan; its steps commit straight into `vars`
    pub async fn run_plan(&self, plan: &Plan, vars: Arc<Scope>) -> Result<bool> {
        tracing::debug!(plan = %plan.name, "run plan");
        self.reporter.start(EventKind::Plan, &plan.name);
        let started = Instant::now();

        match self.run_body(plan.body.clone(), vars, CancellationToken::new()).await {
            Ok(result) => {
                self.reporter
                    .finish(EventKind::Plan, &plan.name, result.ok, started.elapsed(), None);
                Ok(result.ok)
            }
            Err(e) => {
                self.reporter.error(EventKind::Plan, &plan.name, &e.to_string());
                Err(e)
            }
        }
    }

    /// Run a step, expanding its `with` loop if it has one
    pub fn run_step(
        &self,
        step: Arc<Step>,
        vars: Arc<Scope>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<bool>> {
        let engine = self.clone();
        async move {
            match &step.with {
                Some(with) => engine.run_loop(&step, with, vars, cancel).await,
                None => engine.run_instance(step.clone(), vars, cancel).await,
            }
        }
        .boxed()
    }

    async fn run_loop(
        &self,
        step: &Arc<Step>,
        with: &With,
        vars: Arc<Scope>,
        cancel: CancellationToken,
    ) -> Result<bool> {
        let items = self.iterations(with, &vars)?;
        tracing::debug!(count = items.len(), bind = %with.bind, "expand loop");

        let mut ok = true;
        for item in items {
            // Iteration scopes are dropped, not committed.
            let scope = vars.new_child();
            scope.set(with.bind.as_str(), item);
            ok &= self.run_instance(step.clone(), scope, cancel.clone()).await?;
        }
        Ok(ok)
    }

    fn iterations(&self, with: &With, vars: &Scope) -> Result<Vec<Value>> {
        let ctx = Context::new(vars, &self.ops);
        match &with.source {
            WithSource::List(exprs) => exprs.iter().map(|e| e.eval(&ctx)).collect(),
            WithSource::Item(expr) => match expr.eval(&ctx)? {
                Value::List(items) => Ok(items),
                other => Ok((0..other.coerce_int()?).map(Value::Int).collect()),
            },
        }
    }

    /// One pass of a step: body, timeout race, commit, checks
    async fn run_instance(
        &self,
        step: Arc<Step>,
        parent: Arc<Scope>,
        cancel: CancellationToken,
    ) -> Result<bool> {
        let (kind, name) = step.describe();
        self.reporter.start(kind, name);
        let started = Instant::now();

        let local = parent.new_child();
        let token = cancel.child_token();
        let body = self.run_body(step.clone(), local.clone(), token.clone());

        let race = match step.timeout {
            Some(limit) => {
                tokio::select! {
                    result = body => Race::Completed(result),
                    _ = tokio::time::sleep(limit) => {
                        token.cancel();
                        Race::TimedOut(limit)
                    }
                }
            }
            None => Race::Completed(body.await),
        };

        let (body_ok, data, own) = match race {
            Race::Completed(Ok(result)) => {
                // Parallel siblings may commit the same names into `parent`.
                let own = parent.new_child();
                own.set_all(local.locals());
                local.commit();
                (result.ok, result.data, own)
            }
            Race::Completed(Err(e)) => return Err(e),
            Race::TimedOut(limit) => {
                tracing::debug!(step = %name, ?limit, "timed out");
                self.reporter
                    .error(kind, name, &format!("timed out after {:?}", limit));
                (false, None, local)
            }
        };

        let checks_ok = if step.checks.is_empty() {
            true
        } else {
            self.run_checks(step.checks.clone(), own).await?
        };

        let ok = body_ok && checks_ok;
        self.reporter
            .finish(kind, name, ok, started.elapsed(), data.as_ref());
        Ok(ok)
    }

    fn run_body(
        &self,
        step: Arc<Step>,
        vars: Arc<Scope>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<BodyResult>> {
        let engine = self.clone();
        async move {
            match &step.body {
                StepBody::Action(action) => engine.run_action(action, &vars, cancel).await,
                StepBody::Serial(children) => {
                    let mut ok = true;
                    for child in children {
                        ok &= engine
                            .run_step(child.clone(), vars.clone(), cancel.clone())
                            .await?;
                    }
                    Ok(BodyResult::new(ok))
                }
                StepBody::Parallel(children) => {
                    let mut set = JoinSet::new();
                    for child in children {
                        set.spawn(engine.run_step(child.clone(), vars.clone(), cancel.clone()));
                    }
                    let mut ok = true;
                    // An early return drops the set, aborting the other branches.
                    while let Some(joined) = set.join_next().await {
                        ok &= joined
                            .map_err(|e| Error::Internal(format!("parallel step failed: {}", e)))??;
                    }
                    Ok(BodyResult::new(ok))
                }
            }
        }
        .boxed()
    }

    async fn run_action(
        &self,
        step: &ActionStep,
        vars: &Arc<Scope>,
        cancel: CancellationToken,
    ) -> Result<BodyResult> {
        let action = self.actions.get(&step.kind)?;
        let params = interpolate_params(&step.params, vars)?;
        tracing::debug!(action = %step.name, kind = %step.kind, "run action");

        match action.run(&params, cancel).await {
            Ok(result) => {
                vars.set_all(result.data.clone());
                Ok(BodyResult {
                    ok: true,
                    data: Some(result.data),
                })
            }
            Err(e) if e.is_action_failure() => {
                self.reporter
                    .error(EventKind::Action, &step.name, &e.to_string());
                Ok(BodyResult::new(false))
            }
            Err(e) => Err(e),
        }
    }

    /// Evaluate checks on the blocking pool; `sh` spawns processes
    async fn run_checks(
        &self,
        checks: Arc<Vec<Script<Statement>>>,
        vars: Arc<Scope>,
    ) -> Result<bool> {
        let ops = self.ops.clone();
        let reporter = self.reporter.clone();
        tokio::task::spawn_blocking(move || {
            evaluate_checks(&checks, &vars, &ops, reporter.as_ref())
        })
        .await
        .map_err(|e| Error::Internal(format!("check evaluation failed: {}", e)))?
    }
}

/// Evaluate every check in order, reporting each one
///
/// A false check does not stop the others; an evaluation error does.
fn evaluate_checks(
    checks: &[Script<Statement>],
    vars: &Scope,
    ops: &Registry,
    reporter: &dyn Reporter,
) -> Result<bool> {
    let ctx = Context::new(vars, ops);
    let mut ok = true;
    for check in checks {
        let snapshot = vars.as_map();
        match check.check(&ctx) {
            Ok(outcome) => {
                reporter.check(outcome.ok, &outcome.message, &snapshot);
                ok &= outcome.ok;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::action::{Action, ActionResult};
    use crate::runtime::plan::compile;
    use crate::runtime::report::RecordingReporter;
    use crate::testing::config::Crashfile;

    /// Echoes its params back as result data; `fail`, `fatal` and `sleep`
    /// params change its behaviour
    #[derive(Clone, Default)]
    struct Fake {
        calls: Arc<Mutex<Vec<HashMap<String, String>>>>,
    }

    impl Fake {
        fn calls(&self) -> Vec<HashMap<String, String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Action for Fake {
        async fn run(
            &self,
            params: &HashMap<String, String>,
            cancel: CancellationToken,
        ) -> Result<ActionResult> {
            self.calls.lock().unwrap().push(params.clone());
            if let Some(ms) = params.get("sleep") {
                let ms: u64 = ms.parse().unwrap();
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
                    _ = cancel.cancelled() => return Err(Error::action_failed("fake", "cancelled")),
                }
            }
            if params.get("fail").map(String::as_str) == Some("true") {
                return Err(Error::action_failed("fake", "told to fail"));
            }
            if params.contains_key("fatal") {
                return Err(Error::Internal("boom".to_string()));
            }
            Ok(params
                .iter()
                .fold(ActionResult::default(), |r, (k, v)| r.with(k, v.as_str())))
        }
    }

    struct Harness {
        fake: Fake,
        reporter: Arc<RecordingReporter>,
        vars: Arc<Scope>,
    }

    async fn run_yaml(yaml: &str) -> (Result<bool>, Harness) {
        let fake = Fake::default();
        let mut actions = ActionRegistry::new();
        actions.register("fake", fake.clone());

        let file = Crashfile::parse(yaml).unwrap();
        let plan = compile(&file, Registry::standard(), &actions).unwrap();
        let reporter = Arc::new(RecordingReporter::new());
        let engine = Engine::new(plan.ops, Arc::new(actions), reporter.clone());

        let vars = Scope::root();
        let result = engine.run(&plan.plans, vars.clone()).await;
        (result, Harness { fake, reporter, vars })
    }

    #[tokio::test]
    async fn test_serial_runs_every_step() {
        let (result, h) = run_yaml(
            r#"
plans:
  - plan: serial
    steps:
      - run: {type: fake, params: {out: a}}
      - run: {type: fake, params: {fail: true}}
      - run: {type: fake, params: {third: "$out"}}
"#,
        )
        .await;

        assert!(!result.unwrap());
        let calls = h.fake.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2]["third"], "a");
        assert_eq!(h.vars.get("third"), Some(Value::from("a")));
        assert_eq!(h.reporter.errors(), vec!["fake failed: told to fail".to_string()]);
    }

    #[tokio::test]
    async fn test_parallel_ands_branches() {
        let (result, h) = run_yaml(
            r#"
plans:
  - plan: parallel
    steps:
      - parallel:
          - run: {type: fake, params: {sleep: 20, left: x}}
          - run: {type: fake, params: {fail: true}}
"#,
        )
        .await;

        assert!(!result.unwrap());
        assert_eq!(h.fake.calls().len(), 2);
        assert_eq!(h.vars.get("left"), Some(Value::from("x")));
    }

    #[tokio::test]
    async fn test_with_loop_binds_each_item() {
        let (result, h) = run_yaml(
            r#"
plans:
  - plan: loop
    steps:
      - run: {type: fake, params: {seen: "$i"}}
        with: {list: [1, 2, 3]}
        check: i gt 0
      - run: {type: fake, params: {n: "$n"}}
        with: {item: 2, as: n}
"#,
        )
        .await;

        assert!(result.unwrap());
        let seen: Vec<String> = h
            .fake
            .calls()
            .iter()
            .filter_map(|c| c.get("seen").cloned())
            .collect();
        assert_eq!(seen, vec!["1", "2", "3"]);
        let counted: Vec<String> = h
            .fake
            .calls()
            .iter()
            .filter_map(|c| c.get("n").cloned())
            .collect();
        assert_eq!(counted, vec!["0", "1"]);
        assert_eq!(h.reporter.checks().len(), 3);
        assert_eq!(h.vars.get("i"), None);
    }

    #[tokio::test]
    async fn test_timeout_cancels_body() {
        let started = Instant::now();
        let (result, h) = run_yaml(
            r#"
plans:
  - plan: slow
    steps:
      - run: {type: fake, params: {sleep: 10000, late: yes}}
        timeout: 50ms
"#,
        )
        .await;

        assert!(!result.unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(h.reporter.errors().iter().any(|e| e.starts_with("timed out")));
        assert_eq!(h.vars.get("late"), None);
    }

    #[tokio::test]
    async fn test_checks_all_evaluated() {
        let (result, h) = run_yaml(
            r#"
plans:
  - plan: checks
    steps:
      - run: {type: fake, params: {out: x}}
        check:
          - out eq 'y'
          - out eq 'x' // out is $out
"#,
        )
        .await;

        assert!(!result.unwrap());
        assert_eq!(
            h.reporter.checks(),
            vec![(false, "out eq 'y'".to_string()), (true, "out is x".to_string())]
        );
    }

    #[tokio::test]
    async fn test_check_error_is_fatal() {
        let (result, h) = run_yaml(
            r#"
plans:
  - plan: fatal
    steps:
      - run: {type: fake, params: {out: x}}
        check: missing eq 1
      - run: {type: fake, params: {never: ran}}
"#,
        )
        .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(h.fake.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_check_error_after_failure_aborts() {
        let (result, h) = run_yaml(
            r#"
plans:
  - plan: strict
    steps:
      - run: {type: fake, params: {fail: true}}
        check: out eq 'x'
      - run: {type: fake, params: {never: ran}}
"#,
        )
        .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(h.reporter.checks().is_empty());
        assert_eq!(h.fake.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_checks_see_own_results_over_parallel_siblings() {
        let (result, h) = run_yaml(
            r#"
plans:
  - plan: same-key
    steps:
      - parallel:
          - run: {type: fake, params: {out: a}}
            check:
              - sh 'sleep 0.3'
              - out eq 'a'
          - run: {type: fake, params: {sleep: 50, out: b}}
            check: out eq 'b'
"#,
        )
        .await;

        assert!(result.unwrap());
        let checks = h.reporter.checks();
        assert_eq!(checks.len(), 3);
        assert!(checks.iter().all(|(ok, _)| *ok), "{:?}", checks);
        // Both branches still commit; the later one wins.
        assert_eq!(h.vars.get("out"), Some(Value::from("b")));
    }

    #[tokio::test]
    async fn test_serial_timeout_drops_completed_children() {
        let started = Instant::now();
        let (result, h) = run_yaml(
            r#"
plans:
  - plan: slow
    steps:
      - serial:
          - run: {type: fake, params: {first: done}}
          - run: {type: fake, params: {sleep: 10000, late: yes}}
          - run: {type: fake, params: {never: ran}}
        timeout: 100ms
      - run: {type: fake, params: {after: "$first"}}
"#,
        )
        .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(h.reporter.errors().iter().any(|e| e.starts_with("timed out")));
        assert_eq!(h.vars.get("first"), None);
        assert_eq!(h.vars.get("late"), None);
        assert!(h.fake.calls().iter().all(|c| !c.contains_key("never")));
    }

    #[tokio::test]
    async fn test_parallel_timeout_cancels_branches() {
        let started = Instant::now();
        let (result, h) = run_yaml(
            r#"
plans:
  - plan: slow
    steps:
      - parallel:
          - run: {type: fake, params: {quick: x}}
          - run: {type: fake, params: {sleep: 10000, late: yes}}
        timeout: 100ms
      - run: {type: fake, params: {after: ok}}
"#,
        )
        .await;

        assert!(!result.unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(h.vars.get("quick"), None);
        assert_eq!(h.vars.get("late"), None);
        assert_eq!(h.vars.get("after"), Some(Value::from("ok")));
    }

    #[tokio::test]
    async fn test_timed_out_branch_leaves_sibling_alone() {
        let started = Instant::now();
        let (result, h) = run_yaml(
            r#"
plans:
  - plan: mixed
    steps:
      - parallel:
          - run: {type: fake, params: {sleep: 10000, late: yes}}
            timeout: 50ms
          - run: {type: fake, params: {sleep: 200, sibling: done}}
            check: sibling eq 'done'
"#,
        )
        .await;

        assert!(!result.unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(h.reporter.errors().len(), 1);
        assert!(h.reporter.errors()[0].starts_with("timed out"));
        assert_eq!(h.reporter.checks(), vec![(true, "sibling eq 'done'".to_string())]);
        assert_eq!(h.vars.get("sibling"), Some(Value::from("done")));
        assert_eq!(h.vars.get("late"), None);
    }

    #[tokio::test]
    async fn test_fatal_action_error_aborts() {
        let (result, h) = run_yaml(
            r#"
plans:
  - plan: first
    steps:
      - run: {type: fake, params: {fatal: yes}}
  - plan: second
    steps:
      - run: {type: fake, params: {never: ran}}
"#,
        )
        .await;

        assert!(matches!(result, Err(Error::Internal(_))));
        assert_eq!(h.fake.calls().len(), 1);
    }
}
