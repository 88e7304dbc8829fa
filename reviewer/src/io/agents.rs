//! Command lines and prompts for the primary and fallback reviewers.

use anyhow::Result;
use clap::ValueEnum;
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use serde_json::json;

const PRIMARY_TEMPLATE: &str = include_str!("prompts/primary_review.md");
const FALLBACK_TEMPLATE: &str = include_str!("prompts/fallback_review.md");

/// Output format requested from the primary reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// One JSON object at exit.
    Json,
    /// Line-delimited JSON events ending in a `result` event.
    StreamJson,
}

impl OutputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputMode::Json => "json",
            OutputMode::StreamJson => "stream-json",
        }
    }
}

/// Settings that shape reviewer invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub primary_program: String,
    pub fallback_program: String,
    pub max_turns: u32,
    pub output_mode: OutputMode,
}

/// The read-only reviewer role handed to the primary agent via `--agents`.
pub fn reviewer_agents_json() -> String {
    json!({
        "plan-reviewer": {
            "description": "Validates and critiques development plans based on AGENTS.md policies.",
            "prompt": "You are a meticulous reviewer. Examine plan structure, risk coverage, confidence scoring, Memory Bank references, and consistency with validation requirements. Identify omissions, policy violations, and propose concrete fixes.",
            "tools": ["Read"],
        }
    })
    .to_string()
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("primary_review", PRIMARY_TEMPLATE)
            .expect("primary review template should be valid");
        env.add_template("fallback_review", FALLBACK_TEMPLATE)
            .expect("fallback review template should be valid");
        Self { env }
    }

    /// Prompt for the primary reviewer: the literal plan document.
    pub fn render_primary(&self, plan: &str) -> Result<String> {
        let template = self.env.get_template("primary_review")?;
        Ok(template.render(context! { plan => plan })?)
    }

    /// Prompt for the fallback reviewer: role instructions plus the plan.
    pub fn render_fallback(&self, plan: &str) -> Result<String> {
        let template = self.env.get_template("fallback_review")?;
        Ok(template.render(context! { plan => plan })?)
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments for a non-interactive primary review.
pub fn primary_args(settings: &AgentSettings, prompt: &str) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-p".into(),
        "--output-format".into(),
        settings.output_mode.as_str().into(),
        "--permission-mode".into(),
        "plan".into(),
        "--max-turns".into(),
        settings.max_turns.to_string(),
        "--agents".into(),
        reviewer_agents_json(),
    ];
    if settings.output_mode == OutputMode::StreamJson {
        args.push("--verbose".into());
        args.push("--include-partial-messages".into());
    }
    args.push(prompt.to_string());
    args
}

/// Arguments for a non-interactive fallback review.
pub fn fallback_args(prompt: &str) -> Vec<String> {
    vec!["-p".to_string(), prompt.to_string()]
}

/// Redacted primary command for the audit log (no plan body, no agent JSON).
pub fn primary_audit_command(settings: &AgentSettings) -> String {
    format!(
        "{} -p --output-format {} --permission-mode plan --max-turns {} --agents <json> \"Review this plan: <PLAN_JSON>\"",
        settings.primary_program,
        settings.output_mode.as_str(),
        settings.max_turns
    )
}

/// Redacted fallback command for the audit log.
pub fn fallback_audit_command(settings: &AgentSettings) -> String {
    format!(
        "{} -p \"You are the fallback plan reviewer... Review this plan: <PLAN_JSON>\"",
        settings.fallback_program
    )
}
