//! Test helpers: scripted command runners and scratch workspaces.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::io::{Error as IoError, ErrorKind};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::run::{RunRequest, RunResult, tail_chars};
use crate::io::process::{CommandRunner, SpawnError};
use crate::settings::{ReviewSettings, SettingsOverrides};

/// Canned result of one command run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedRun {
    /// Bytes written to the request's output file.
    pub output: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub elapsed_seconds: u64,
}

impl ScriptedRun {
    /// A run that exited with `exit_code` after printing `output`.
    pub fn exit(exit_code: i32, output: &str) -> Self {
        Self {
            output: output.to_string(),
            exit_code,
            timed_out: false,
            elapsed_seconds: 1,
        }
    }

    /// A run killed by the timeout after printing `output`.
    pub fn timeout(output: &str) -> Self {
        Self {
            output: output.to_string(),
            exit_code: -1,
            timed_out: true,
            elapsed_seconds: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedStep {
    Run(ScriptedRun),
    /// The executable cannot be found.
    SpawnFailure,
}

impl From<ScriptedRun> for ScriptedStep {
    fn from(run: ScriptedRun) -> Self {
        ScriptedStep::Run(run)
    }
}

/// Runner that replays scripted steps in order and records every request.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    steps: RefCell<VecDeque<ScriptedStep>>,
    requests: RefCell<Vec<RunRequest>>,
}

impl ScriptedRunner {
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        Self {
            steps: RefCell::new(steps.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<RunRequest> {
        self.requests.borrow().clone()
    }

    /// Steps not consumed yet.
    pub fn remaining(&self) -> usize {
        self.steps.borrow().len()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, request: &RunRequest) -> Result<RunResult> {
        self.requests.borrow_mut().push(request.clone());
        let step = self
            .steps
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted run left for `{}`", request.command))?;
        let run = match step {
            ScriptedStep::Run(run) => run,
            ScriptedStep::SpawnFailure => {
                return Err(SpawnError {
                    command: request.command.clone(),
                    source: IoError::from(ErrorKind::NotFound),
                }
                .into());
            }
        };

        if let Some(parent) = request.output_file.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }
        fs::write(&request.output_file, &run.output)
            .with_context(|| format!("write {}", request.output_file.display()))?;

        Ok(RunResult {
            exit_code: run.exit_code,
            signal: if run.timed_out {
                "SIGTERM".to_string()
            } else {
                String::new()
            },
            timed_out: run.timed_out,
            elapsed_seconds: run.elapsed_seconds,
            output_bytes: run.output.len() as u64,
            preview: tail_chars(&run.output, request.preview_limit).to_string(),
        })
    }
}

/// Scratch working directory holding a plan file.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("create tempdir")?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a plan file relative to the workspace.
    pub fn write_plan(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Overrides for `plan_file` with preflight skipped.
    pub fn overrides(&self, plan_file: &str) -> SettingsOverrides {
        SettingsOverrides {
            plan_file: PathBuf::from(plan_file),
            skip_preflight: true,
            ..SettingsOverrides::default()
        }
    }

    pub fn settings(&self, overrides: SettingsOverrides) -> Result<ReviewSettings> {
        Ok(ReviewSettings::resolve(overrides, self.path())?)
    }

    /// Full text of the audit log (empty when absent).
    pub fn audit_log(&self, settings: &ReviewSettings) -> String {
        fs::read_to_string(&settings.audit_log).unwrap_or_default()
    }
}

/// A stream-json transcript ending in a successful result event.
pub fn stream_result(subtype: &str, is_error: bool, result: &str) -> String {
    let event = serde_json::json!({
        "type": "result",
        "subtype": subtype,
        "is_error": is_error,
        "result": result,
    });
    format!(
        "{}\n{}\n",
        serde_json::json!({"type": "system", "subtype": "init"}),
        event
    )
}
