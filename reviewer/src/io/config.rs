//! Review settings stored in an optional `.plan-review.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::run::DEFAULT_PREVIEW_LIMIT;
use crate::io::agents::OutputMode;

pub const DEFAULT_CONFIG_FILE: &str = ".plan-review.toml";

/// Review configuration (TOML).
///
/// Missing fields take the defaults below; command-line flags override them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReviewConfig {
    /// Wall-clock limit for the primary reviewer.
    pub primary_timeout_secs: u64,

    /// Wall-clock limit for the fallback reviewer.
    pub fallback_timeout_secs: u64,

    /// Conversation turn limit passed to the primary reviewer.
    pub max_turns: u32,

    pub output_mode: OutputMode,

    /// Directory for captured reviewer output and the preflight report.
    pub output_dir: PathBuf,

    pub audit_log: PathBuf,

    /// Characters of trailing output kept in memory per run.
    pub preview_limit_chars: usize,

    pub primary: ProgramConfig,
    pub fallback: ProgramConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgramConfig {
    /// Executable name or path.
    pub program: String,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            primary_timeout_secs: 600,
            fallback_timeout_secs: 60,
            max_turns: 10,
            output_mode: OutputMode::StreamJson,
            output_dir: PathBuf::from("audit/plan_review_outputs"),
            audit_log: PathBuf::from("audit/plan_reviews.log"),
            preview_limit_chars: DEFAULT_PREVIEW_LIMIT,
            primary: ProgramConfig {
                program: "claude".to_string(),
            },
            fallback: ProgramConfig {
                program: "gemini".to_string(),
            },
        }
    }
}

impl ReviewConfig {
    pub fn validate(&self) -> Result<()> {
        if self.primary_timeout_secs == 0 {
            return Err(anyhow!("primary_timeout_secs must be > 0"));
        }
        if self.fallback_timeout_secs == 0 {
            return Err(anyhow!("fallback_timeout_secs must be > 0"));
        }
        if self.max_turns == 0 {
            return Err(anyhow!("max_turns must be > 0"));
        }
        if self.preview_limit_chars == 0 {
            return Err(anyhow!("preview_limit_chars must be > 0"));
        }
        if self.primary.program.trim().is_empty() {
            return Err(anyhow!("primary.program must be non-empty"));
        }
        if self.fallback.program.trim().is_empty() {
            return Err(anyhow!("fallback.program must be non-empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ReviewConfig::default()`.
pub fn load_config(path: &Path) -> Result<ReviewConfig> {
    if !path.exists() {
        let cfg = ReviewConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ReviewConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
