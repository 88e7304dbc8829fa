//! Resolution of command-line flags and config file into review settings.
//!
//! Precedence: flag > config file > built-in default. Relative paths resolve
//! against the working directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::debug;

use crate::io::agents::{AgentSettings, OutputMode};
use crate::io::config::{DEFAULT_CONFIG_FILE, load_config};
use crate::io::plan::default_plan_id;

/// The invocation itself is unusable; nothing was run or logged.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("plan file not found: {}", .0.display())]
    PlanNotFound(PathBuf),
    #[error("invalid configuration: {0:#}")]
    Config(anyhow::Error),
    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

/// Raw values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub plan_file: PathBuf,
    pub plan_id: Option<String>,
    pub workdir: Option<PathBuf>,
    pub home: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub primary_timeout_secs: Option<u64>,
    pub fallback_timeout_secs: Option<u64>,
    pub max_turns: Option<u32>,
    pub output_mode: Option<OutputMode>,
    pub output_dir: Option<PathBuf>,
    pub audit_log: Option<PathBuf>,
    pub preflight_log: Option<PathBuf>,
    pub no_fallback: bool,
    pub skip_preflight: bool,
    pub iteration: Option<u64>,
    pub dry_run: bool,
}

/// Fully resolved settings for one review invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSettings {
    pub plan_file: PathBuf,
    pub plan_id: String,
    /// Working directory of the reviewer processes.
    pub workdir: PathBuf,
    /// `HOME` exported to the reviewer processes.
    pub home: PathBuf,
    pub primary_timeout_secs: u64,
    pub fallback_timeout_secs: u64,
    pub agents: AgentSettings,
    pub output_dir: PathBuf,
    pub audit_log: PathBuf,
    pub preflight_log: PathBuf,
    pub preview_limit: usize,
    pub fallback_enabled: bool,
    pub skip_preflight: bool,
    /// Forces the iteration number instead of deriving it from the audit log.
    pub iteration_override: Option<u64>,
    pub dry_run: bool,
}

impl ReviewSettings {
    /// Resolve `overrides` relative to `cwd`.
    pub fn resolve(overrides: SettingsOverrides, cwd: &Path) -> Result<Self, InvocationError> {
        let workdir = match overrides.workdir {
            Some(dir) => absolutize(cwd, &dir),
            None => cwd.to_path_buf(),
        };
        let config_path = overrides
            .config
            .map(|path| absolutize(&workdir, &path))
            .unwrap_or_else(|| workdir.join(DEFAULT_CONFIG_FILE));
        let cfg = load_config(&config_path).map_err(InvocationError::Config)?;

        let plan_file = absolutize(&workdir, &overrides.plan_file);
        if !plan_file.is_file() {
            return Err(InvocationError::PlanNotFound(plan_file));
        }
        let plan_id = match overrides.plan_id {
            Some(id) if id.trim().is_empty() => {
                return Err(InvocationError::InvalidSetting(
                    "plan id must be non-empty".to_string(),
                ));
            }
            Some(id) => id,
            None => default_plan_id(&plan_file),
        };
        if plan_id.is_empty() {
            return Err(InvocationError::InvalidSetting(format!(
                "cannot derive a plan id from {}",
                plan_file.display()
            )));
        }

        let primary_timeout_secs = overrides
            .primary_timeout_secs
            .unwrap_or(cfg.primary_timeout_secs);
        let fallback_timeout_secs = overrides
            .fallback_timeout_secs
            .unwrap_or(cfg.fallback_timeout_secs);
        let max_turns = overrides.max_turns.unwrap_or(cfg.max_turns);
        require_positive("timeout seconds", primary_timeout_secs)?;
        require_positive("fallback timeout seconds", fallback_timeout_secs)?;
        require_positive("max turns", u64::from(max_turns))?;
        match overrides.iteration {
            Some(0) => {
                return Err(InvocationError::InvalidSetting(
                    "iteration must be >= 1".to_string(),
                ));
            }
            // The fallback attempt is recorded at iteration + 1.
            Some(u64::MAX) => {
                return Err(InvocationError::InvalidSetting(format!(
                    "iteration must be < {}",
                    u64::MAX
                )));
            }
            _ => {}
        }

        let output_dir = absolutize(
            &workdir,
            overrides.output_dir.as_deref().unwrap_or(cfg.output_dir.as_path()),
        );
        let audit_log = absolutize(
            &workdir,
            overrides.audit_log.as_deref().unwrap_or(cfg.audit_log.as_path()),
        );
        let preflight_log = match overrides.preflight_log {
            Some(path) => absolutize(&workdir, &path),
            None => output_dir.join(format!(
                "preflight_validation_{}.log",
                Utc::now().format("%Y%m%d")
            )),
        };
        let home = match overrides.home {
            Some(home) => absolutize(&workdir, &home),
            None => workdir.clone(),
        };

        let settings = Self {
            plan_file,
            plan_id,
            workdir,
            home,
            primary_timeout_secs,
            fallback_timeout_secs,
            agents: AgentSettings {
                primary_program: cfg.primary.program,
                fallback_program: cfg.fallback.program,
                max_turns,
                output_mode: overrides.output_mode.unwrap_or(cfg.output_mode),
            },
            output_dir,
            audit_log,
            preflight_log,
            preview_limit: cfg.preview_limit_chars,
            fallback_enabled: !overrides.no_fallback,
            skip_preflight: overrides.skip_preflight,
            iteration_override: overrides.iteration,
            dry_run: overrides.dry_run,
        };
        debug!(plan_id = %settings.plan_id, workdir = %settings.workdir.display(), "settings resolved");
        Ok(settings)
    }

    /// Environment overrides for reviewer processes.
    pub fn agent_env(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(
            "HOME".to_string(),
            self.home.to_string_lossy().into_owned(),
        )])
    }

    /// Captured-output path for a reviewer attempt.
    pub fn output_path(&self, iteration: u64, suffix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_round{}_{}", self.plan_id, iteration, suffix))
    }

    /// `path` relative to the working directory when possible.
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.workdir)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn require_positive(name: &str, value: u64) -> Result<(), InvocationError> {
    if value == 0 {
        return Err(InvocationError::InvalidSetting(format!("{name} must be > 0")));
    }
    Ok(())
}
