//! Orchestration of one plan review: primary, optional fallback, escalation.
//!
//! Every reviewer attempt leaves exactly one agent line in the audit log.
//! Every escalation adds exactly one system line. Nothing is written in dry
//! run beyond the preflight report.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::audit::{AuditLine, EscalationLine, HUMAN_REVIEW_NEEDED, following_iteration};
use crate::core::classifier::{classify_fallback, classify_primary};
use crate::core::decision::{BOTH_FAILED, DecisionMatrix};
use crate::core::phrases::{PHRASE_POLICY_VERSION, PhrasePolicy};
use crate::core::run::{RunRequest, RunResult};
use crate::core::types::{Approval, FallbackAction, ReviewerRole};
use crate::exit_codes;
use crate::io::agents::{
    OutputMode, PromptEngine, fallback_args, fallback_audit_command, primary_args,
    primary_audit_command,
};
use crate::io::audit_log::{append_line, detect_next_iteration, timestamp_now};
use crate::io::plan::read_plan;
use crate::io::process::CommandRunner;
use crate::io::transcript::read_terminal_event;
use crate::preflight::run_preflight;
use crate::settings::ReviewSettings;

const SKIPPED_FALLBACK_SUMMARY: &str =
    "Fallback skipped by matrix/flag; explicit human approval required before execution.";
const BOTH_FAILED_SUMMARY: &str =
    "Both automated plan reviewers failed; explicit human approval required.";

/// Final summary printed as JSON on stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ReviewOutcome {
    Approved(ApprovedSummary),
    HumanReviewNeeded(EscalationSummary),
    DryRun(DryRunSummary),
}

impl ReviewOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            ReviewOutcome::Approved(_) | ReviewOutcome::DryRun(_) => exit_codes::APPROVED,
            ReviewOutcome::HumanReviewNeeded(_) => exit_codes::HUMAN_REVIEW_NEEDED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovedSummary {
    pub plan_id: String,
    pub iteration: u64,
    pub result: Approval,
    /// The precise classification label behind the approval.
    pub classification: String,
    pub reviewer: ReviewerRole,
    pub output_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationSummary {
    pub plan_id: String,
    pub iteration: u64,
    pub result: &'static str,
    /// Classification of each failed attempt, primary first.
    pub reasons: Vec<String>,
    pub primary_output_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_output_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DryRunSummary {
    pub dry_run: bool,
    pub plan_id: String,
    pub iteration: u64,
    pub home: String,
    pub primary_command: String,
    pub fallback_command: String,
    pub fallback_enabled: bool,
    pub output_mode: OutputMode,
    pub timeout_seconds: u64,
    pub fallback_timeout_seconds: u64,
    /// Absent when preflight was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preflight_log: Option<String>,
    pub phrase_policy_version: u32,
    pub matrix: DecisionMatrix,
}

/// Run one review end to end.
///
/// `on_warning` receives advisory messages (preflight blockers) as they occur.
/// Errors are internal failures: spawn failures, unwritable audit log or
/// output files.
#[instrument(skip_all, fields(plan_id = %settings.plan_id))]
pub fn run_review<R, F>(
    runner: &R,
    settings: &ReviewSettings,
    matrix: &DecisionMatrix,
    policy: &PhrasePolicy,
    mut on_warning: F,
) -> Result<ReviewOutcome>
where
    R: CommandRunner,
    F: FnMut(&str),
{
    let plan = read_plan(&settings.plan_file)?;
    let iteration = match settings.iteration_override {
        Some(iteration) => iteration,
        None => detect_next_iteration(&settings.audit_log, &settings.plan_id)?,
    };
    let fallback_iteration = following_iteration(&settings.plan_id, iteration)?;
    let (primary_output, fallback_output) = planned_output_paths(settings, iteration)?;
    info!(iteration, "review started");

    if !settings.skip_preflight {
        match run_preflight(runner, settings, policy) {
            Ok(report) if report.has_blockers() && !settings.dry_run => {
                on_warning(&format!(
                    "Preflight reported blockers. See {}. Proceeding for audit completeness.",
                    report.path.display()
                ));
            }
            Ok(_) => {}
            Err(err) => {
                warn!(err = %format!("{err:#}"), "preflight could not complete");
                on_warning(&format!("Preflight could not complete: {err:#}"));
            }
        }
    }

    if settings.dry_run {
        return Ok(ReviewOutcome::DryRun(DryRunSummary {
            dry_run: true,
            plan_id: settings.plan_id.clone(),
            iteration,
            home: settings.home.display().to_string(),
            primary_command: primary_audit_command(&settings.agents),
            fallback_command: fallback_audit_command(&settings.agents),
            fallback_enabled: settings.fallback_enabled,
            output_mode: settings.agents.output_mode,
            timeout_seconds: settings.primary_timeout_secs,
            fallback_timeout_seconds: settings.fallback_timeout_secs,
            preflight_log: (!settings.skip_preflight)
                .then(|| settings.display_path(&settings.preflight_log)),
            phrase_policy_version: PHRASE_POLICY_VERSION,
            matrix: matrix.clone(),
        }));
    }

    let prompts = PromptEngine::new();

    // Primary review.
    let request = RunRequest {
        command: settings.agents.primary_program.clone(),
        args: primary_args(&settings.agents, &prompts.render_primary(&plan)?),
        env: settings.agent_env(),
        workdir: settings.workdir.clone(),
        timeout: Duration::from_secs(settings.primary_timeout_secs),
        output_file: primary_output.clone(),
        preview_limit: settings.preview_limit,
    };
    let primary_run = runner.run(&request).context("run primary reviewer")?;
    let terminal = if primary_run.timed_out {
        None
    } else {
        read_terminal_event(&primary_output)
    };
    let primary = classify_primary(policy, &primary_run, terminal.as_ref());
    info!(classification = primary.as_str(), "primary review classified");

    let primary_rel = settings.display_path(&primary_output);
    append_line(
        &settings.audit_log,
        &agent_line(
            settings,
            ReviewerRole::Primary,
            iteration,
            primary_audit_command(&settings.agents),
            primary.approval(),
            primary.as_str(),
            &primary_run,
            settings.primary_timeout_secs,
            &primary_rel,
        ),
    )?;

    if let Some(approval) = primary.approval() {
        return Ok(ReviewOutcome::Approved(ApprovedSummary {
            plan_id: settings.plan_id.clone(),
            iteration,
            result: approval,
            classification: primary.as_str().to_string(),
            reviewer: ReviewerRole::Primary,
            output_file: primary_rel,
        }));
    }

    let action = matrix.action_for(primary);
    debug!(action = action.as_str(), fallback_enabled = settings.fallback_enabled, "decision");
    if !settings.fallback_enabled || action == FallbackAction::EscalateHumanReviewNeeded {
        append_escalation(settings, iteration, SKIPPED_FALLBACK_SUMMARY, primary.as_str())?;
        return Ok(ReviewOutcome::HumanReviewNeeded(EscalationSummary {
            plan_id: settings.plan_id.clone(),
            iteration,
            result: HUMAN_REVIEW_NEEDED,
            reasons: vec![primary.as_str().to_string()],
            primary_output_file: primary_rel,
            fallback_output_file: None,
        }));
    }

    // Fallback review.
    let request = RunRequest {
        command: settings.agents.fallback_program.clone(),
        args: fallback_args(&prompts.render_fallback(&plan)?),
        env: settings.agent_env(),
        workdir: settings.workdir.clone(),
        timeout: Duration::from_secs(settings.fallback_timeout_secs),
        output_file: fallback_output.clone(),
        preview_limit: settings.preview_limit,
    };
    let fallback_run = runner.run(&request).context("run fallback reviewer")?;
    let fallback = classify_fallback(policy, &fallback_run);
    info!(classification = fallback.as_str(), "fallback review classified");

    let fallback_rel = settings.display_path(&fallback_output);
    append_line(
        &settings.audit_log,
        &agent_line(
            settings,
            ReviewerRole::Fallback,
            fallback_iteration,
            fallback_audit_command(&settings.agents),
            fallback.approval(),
            fallback.as_str(),
            &fallback_run,
            settings.fallback_timeout_secs,
            &fallback_rel,
        ),
    )?;

    if let Some(approval) = fallback.approval() {
        return Ok(ReviewOutcome::Approved(ApprovedSummary {
            plan_id: settings.plan_id.clone(),
            iteration: fallback_iteration,
            result: approval,
            classification: fallback.as_str().to_string(),
            reviewer: ReviewerRole::Fallback,
            output_file: fallback_rel,
        }));
    }

    debug!(action = matrix.action(BOTH_FAILED).as_str(), "both reviewers failed");
    append_escalation(
        settings,
        fallback_iteration,
        BOTH_FAILED_SUMMARY,
        &format!("{}+{}", primary.as_str(), fallback.as_str()),
    )?;
    Ok(ReviewOutcome::HumanReviewNeeded(EscalationSummary {
        plan_id: settings.plan_id.clone(),
        iteration: fallback_iteration,
        result: HUMAN_REVIEW_NEEDED,
        reasons: vec![primary.as_str().to_string(), fallback.as_str().to_string()],
        primary_output_file: primary_rel,
        fallback_output_file: Some(fallback_rel),
    }))
}

#[allow(clippy::too_many_arguments)]
fn agent_line(
    settings: &ReviewSettings,
    role: ReviewerRole,
    iteration: u64,
    command: String,
    approval: Option<Approval>,
    classification: &str,
    run: &RunResult,
    timeout_seconds: u64,
    output_file: &str,
) -> String {
    let (result, summary, errors) = match approval {
        Some(approval) => (
            approval.as_str(),
            format!("{} completed with classification {classification}.", role_name(role)),
            "none".to_string(),
        ),
        None => (
            role.failure_label(),
            format!("{} failed with classification {classification}.", role_name(role)),
            classification.to_string(),
        ),
    };
    AuditLine {
        timestamp: timestamp_now(),
        plan_id: settings.plan_id.clone(),
        reviewer: role.audit_id().to_string(),
        iteration,
        command,
        result: result.to_string(),
        summary,
        errors,
        exit_code: run.exit_code,
        timeout_seconds,
        elapsed_seconds: run.elapsed_seconds,
        output_file: output_file.to_string(),
    }
    .render()
}

fn role_name(role: ReviewerRole) -> &'static str {
    match role {
        ReviewerRole::Primary => "Primary reviewer",
        ReviewerRole::Fallback => "Fallback reviewer",
    }
}

fn append_escalation(
    settings: &ReviewSettings,
    iteration: u64,
    summary: &str,
    errors: &str,
) -> Result<()> {
    info!(iteration, errors, "escalating to human review");
    let line = EscalationLine {
        timestamp: timestamp_now(),
        plan_id: settings.plan_id.clone(),
        iteration,
        summary: summary.to_string(),
        errors: errors.to_string(),
    };
    append_line(&settings.audit_log, &line.render())
}

/// Output paths a review at `iteration` will write, primary first.
pub fn planned_output_paths(settings: &ReviewSettings, iteration: u64) -> Result<(PathBuf, PathBuf)> {
    let fallback_iteration = following_iteration(&settings.plan_id, iteration)?;
    Ok((
        settings.output_path(iteration, ReviewerRole::Primary.output_suffix()),
        settings.output_path(fallback_iteration, ReviewerRole::Fallback.output_suffix()),
    ))
}
