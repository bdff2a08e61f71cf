//! `shell` action
//!
//! Params: `command` (required). Result data: `out`, `err` (trimmed) and
//! `exit-code`. A non-zero exit status fails the step.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{required, Action, ActionResult};
use crate::common::config::ShellConfig;
use crate::common::{Error, Result};

const NAME: &str = "shell";

pub struct Shell {
    program: String,
    arg: String,
}

impl Shell {
    pub fn new(config: &ShellConfig) -> Self {
        Self {
            program: config.program.clone(),
            arg: config.arg.clone(),
        }
    }
}

#[async_trait]
impl Action for Shell {
    async fn run(
        &self,
        params: &HashMap<String, String>,
        cancel: CancellationToken,
    ) -> Result<ActionResult> {
        let command = required(NAME, params, "command")?;
        tracing::debug!(command = %command, "shell");

        let child = Command::new(&self.program)
            .arg(&self.arg)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::action_failed(NAME, format!("failed to start {}: {}", self.program, e)))?;

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            output = child.wait_with_output() => {
                output.map_err(|e| Error::action_failed(NAME, e.to_string()))?
            }
            _ = cancel.cancelled() => return Err(Error::action_failed(NAME, "cancelled")),
        };

        let out = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let err = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            let detail = if err.is_empty() { String::new() } else { format!(": {}", err) };
            return Err(Error::action_failed(NAME, format!("exit status {}{}", code, detail)));
        }

        Ok(ActionResult::default()
            .with("out", out)
            .with("err", err)
            .with("exit-code", i64::from(code)))
    }
}
