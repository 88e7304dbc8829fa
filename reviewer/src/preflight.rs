//! Staged preflight probes for both reviewer CLIs.
//!
//! Every stage runs even when an earlier one fails. The report is advisory:
//! callers warn on blockers and continue with the review.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::phrases::{FailureKind, PhrasePolicy};
use crate::core::run::{RunRequest, RunResult};
use crate::core::types::PreflightStatus;
use crate::io::audit_log::timestamp_now;
use crate::io::process::{CommandRunner, SpawnError};
use crate::settings::ReviewSettings;

/// Timeout for `--version` probes.
pub const VERSION_PROBE_TIMEOUT_SECS: u64 = 15;
/// Upper bound for the non-interactive smoke probes.
pub const SMOKE_PROBE_TIMEOUT_CAP_SECS: u64 = 30;
pub const SMOKE_PROMPT: &str = "Reply with exactly OK";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeKind {
    Version,
    PrimarySmoke,
    FallbackSmoke,
}

#[derive(Debug, Clone)]
struct StagePlan {
    id: &'static str,
    command: String,
    args: Vec<String>,
    timeout_secs: u64,
    kind: ProbeKind,
}

impl StagePlan {
    fn detail(&self) -> String {
        let mut parts = vec![self.command.as_str()];
        parts.extend(self.args.iter().map(String::as_str));
        parts.join(" ")
    }
}

/// One probe as recorded in the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightStage {
    pub id: &'static str,
    pub status: PreflightStatus,
    pub exit_code: i32,
    pub elapsed_seconds: u64,
    /// The probed command line.
    pub detail: String,
    /// Captured probe output; absent in dry run.
    pub output_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightReport {
    pub path: PathBuf,
    pub stages: Vec<PreflightStage>,
}

impl PreflightReport {
    pub fn has_blockers(&self) -> bool {
        self.stages.iter().any(|stage| stage.status.is_blocker())
    }
}

fn stage_plans(settings: &ReviewSettings) -> Vec<StagePlan> {
    let primary = &settings.agents.primary_program;
    let fallback = &settings.agents.fallback_program;
    vec![
        StagePlan {
            id: "preflight_stage_1_claude_cli",
            command: primary.clone(),
            args: vec!["--version".to_string()],
            timeout_secs: VERSION_PROBE_TIMEOUT_SECS,
            kind: ProbeKind::Version,
        },
        StagePlan {
            id: "preflight_stage_2_gemini_cli",
            command: fallback.clone(),
            args: vec!["--version".to_string()],
            timeout_secs: VERSION_PROBE_TIMEOUT_SECS,
            kind: ProbeKind::Version,
        },
        StagePlan {
            id: "preflight_stage_3_claude_noninteractive_probe",
            command: primary.clone(),
            args: [
                "-p",
                "--output-format",
                "json",
                "--max-turns",
                "1",
                SMOKE_PROMPT,
            ]
            .map(String::from)
            .to_vec(),
            timeout_secs: settings
                .primary_timeout_secs
                .min(SMOKE_PROBE_TIMEOUT_CAP_SECS),
            kind: ProbeKind::PrimarySmoke,
        },
        StagePlan {
            id: "preflight_stage_4_gemini_noninteractive_probe",
            command: fallback.clone(),
            args: vec!["-p".to_string(), SMOKE_PROMPT.to_string()],
            timeout_secs: settings
                .fallback_timeout_secs
                .min(SMOKE_PROBE_TIMEOUT_CAP_SECS),
            kind: ProbeKind::FallbackSmoke,
        },
    ]
}

fn classify_probe(kind: ProbeKind, policy: &PhrasePolicy, result: &RunResult) -> PreflightStatus {
    match kind {
        ProbeKind::Version => {}
        ProbeKind::PrimarySmoke => match policy.detect_failure_reason(&result.preview) {
            Some(FailureKind::CreditOrQuota) => return PreflightStatus::CreditBlocked,
            Some(FailureKind::Auth) => return PreflightStatus::AuthRequired,
            None => {}
        },
        ProbeKind::FallbackSmoke => {
            if policy.fallback_auth_required(&result.preview) {
                return PreflightStatus::AuthRequired;
            }
        }
    }
    if result.success() {
        PreflightStatus::Pass
    } else {
        PreflightStatus::Fail
    }
}

/// Per-stage capture file: `<report stem>_<stage id>.txt` beside the report.
pub fn stage_output_path(report: &Path, stage_id: &str) -> PathBuf {
    let stem = report
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    report.with_file_name(format!("{stem}_{stage_id}.txt"))
}

/// Run all four probes (or record them as `dry_run`) and write the report.
#[instrument(skip_all, fields(report = %settings.preflight_log.display(), dry_run = settings.dry_run))]
pub fn run_preflight<R: CommandRunner>(
    runner: &R,
    settings: &ReviewSettings,
    policy: &PhrasePolicy,
) -> Result<PreflightReport> {
    let report_path = settings.preflight_log.clone();
    let mut stages = Vec::with_capacity(4);

    for plan in stage_plans(settings) {
        if settings.dry_run {
            stages.push(PreflightStage {
                id: plan.id,
                status: PreflightStatus::DryRun,
                exit_code: 0,
                elapsed_seconds: 0,
                detail: plan.detail(),
                output_file: None,
            });
            continue;
        }

        let output_file = stage_output_path(&report_path, plan.id);
        let request = RunRequest {
            command: plan.command.clone(),
            args: plan.args.clone(),
            env: settings.agent_env(),
            workdir: settings.workdir.clone(),
            timeout: Duration::from_secs(plan.timeout_secs),
            output_file: output_file.clone(),
            preview_limit: settings.preview_limit,
        };
        let stage = match runner.run(&request) {
            Ok(result) => PreflightStage {
                id: plan.id,
                status: classify_probe(plan.kind, policy, &result),
                exit_code: result.exit_code,
                elapsed_seconds: result.elapsed_seconds,
                detail: plan.detail(),
                output_file: Some(output_file),
            },
            Err(err) => {
                if err.downcast_ref::<SpawnError>().is_none() {
                    warn!(stage = plan.id, err = %format!("{err:#}"), "probe failed to run");
                }
                PreflightStage {
                    id: plan.id,
                    status: PreflightStatus::Fail,
                    exit_code: -1,
                    elapsed_seconds: 0,
                    detail: format!("{} ({})", plan.detail(), err),
                    output_file: Some(output_file),
                }
            }
        };
        debug!(stage = stage.id, status = stage.status.as_str(), "preflight stage finished");
        stages.push(stage);
    }

    let report = render_report(
        &timestamp_now(),
        settings.primary_timeout_secs,
        settings.fallback_timeout_secs,
        &stages,
    );
    if let Some(parent) = report_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create preflight dir {}", parent.display()))?;
    }
    fs::write(&report_path, report)
        .with_context(|| format!("write preflight report {}", report_path.display()))?;

    Ok(PreflightReport {
        path: report_path,
        stages,
    })
}

/// Render the plain-text report.
pub fn render_report(
    timestamp: &str,
    timeout_secs: u64,
    fallback_timeout_secs: u64,
    stages: &[PreflightStage],
) -> String {
    let mut lines = vec![
        "# Preflight Validation".to_string(),
        format!("timestamp_utc: {timestamp}"),
        format!("timeout_seconds: {timeout_secs}"),
        format!("fallback_timeout_seconds: {fallback_timeout_secs}"),
        String::new(),
    ];
    for stage in stages {
        let mut fields = vec![
            format!("stage={}", stage.id),
            format!("status={}", stage.status.as_str()),
            format!("exit_code={}", stage.exit_code),
            format!("elapsed_seconds={}", stage.elapsed_seconds),
            format!("detail=\"{}\"", stage.detail),
        ];
        if let Some(path) = &stage.output_file {
            fields.push(format!("output_file={}", path.display()));
        }
        lines.push(fields.join(" | "));
    }
    lines.push(String::new());
    lines.join("\n")
}
