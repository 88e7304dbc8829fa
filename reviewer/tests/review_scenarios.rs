//! End-to-end review scenarios driven through `run_review` with scripted
//! reviewer processes.
//!
//! Each test builds a scratch workspace with a plan file, queues canned
//! reviewer runs, and checks the returned summary together with the audit
//! log the run left behind.

use std::fs;

use plan_reviewer::core::audit::IterationOverflow;
use plan_reviewer::core::decision::DecisionMatrix;
use plan_reviewer::core::phrases::PhrasePolicy;
use plan_reviewer::core::types::{Approval, ReviewerRole};
use plan_reviewer::exit_codes;
use plan_reviewer::io::process::SpawnError;
use plan_reviewer::review::{ReviewOutcome, run_review};
use plan_reviewer::settings::ReviewSettings;
use plan_reviewer::test_support::{
    ScriptedRun, ScriptedRunner, ScriptedStep, TestWorkspace, stream_result,
};

const PLAN: &str = r#"{"title": "Add caching", "steps": ["measure", "cache"]}"#;

fn review(runner: &ScriptedRunner, settings: &ReviewSettings) -> (ReviewOutcome, Vec<String>) {
    let mut warnings = Vec::new();
    let outcome = run_review(
        runner,
        settings,
        &DecisionMatrix::new(),
        &PhrasePolicy::BUILTIN,
        |warning| warnings.push(warning.to_string()),
    )
    .expect("review");
    (outcome, warnings)
}

fn workspace() -> (TestWorkspace, ReviewSettings) {
    let ws = TestWorkspace::new().expect("workspace");
    ws.write_plan("plan-a.json", PLAN).expect("plan");
    let settings = ws.settings(ws.overrides("plan-a.json")).expect("settings");
    (ws, settings)
}

#[test]
fn primary_approval_ends_review_without_fallback() {
    let (ws, settings) = workspace();
    let runner = ScriptedRunner::new(vec![
        ScriptedRun::exit(0, &stream_result("success", false, "Plan approved.")).into(),
    ]);

    let (outcome, warnings) = review(&runner, &settings);
    assert!(warnings.is_empty());
    assert_eq!(outcome.exit_code(), exit_codes::APPROVED);
    let ReviewOutcome::Approved(summary) = outcome else {
        panic!("expected approval");
    };
    assert_eq!(summary.result, Approval::Approved);
    assert_eq!(summary.classification, "approved");
    assert_eq!(summary.reviewer, ReviewerRole::Primary);
    assert_eq!(summary.iteration, 1);
    assert_eq!(
        summary.output_file,
        "audit/plan_review_outputs/plan-a_round1_claude.json"
    );

    let requests = runner.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].command, "claude");
    assert_eq!(
        requests[0].args.last().map(String::as_str),
        Some(format!("Review this plan: {PLAN}").as_str())
    );
    assert_eq!(
        requests[0].env.get("HOME").map(String::as_str),
        Some(ws.path().to_string_lossy().as_ref())
    );

    let log = ws.audit_log(&settings);
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("| plan_id:plan-a | reviewer:claude-plan-reviewer | iteration:1 |"));
    assert!(lines[0].contains("| result:approved | "));
    assert!(lines[0].contains("| errors:none | "));
    assert!(lines[0].contains("--agents <json>"));
    assert!(!lines[0].contains("Add caching"));
}

#[test]
fn auth_failure_escalates_without_fallback() {
    let (ws, settings) = workspace();
    assert!(settings.fallback_enabled);
    let runner = ScriptedRunner::new(vec![
        ScriptedRun::exit(
            0,
            &stream_result("error", true, "Invalid API key. Please run /login."),
        )
        .into(),
        ScriptedRun::exit(0, "approved").into(),
    ]);

    let (outcome, _) = review(&runner, &settings);
    assert_eq!(outcome.exit_code(), exit_codes::HUMAN_REVIEW_NEEDED);
    let ReviewOutcome::HumanReviewNeeded(summary) = outcome else {
        panic!("expected escalation");
    };
    assert_eq!(summary.reasons, vec!["claude_auth_failure".to_string()]);
    assert_eq!(summary.iteration, 1);
    assert!(summary.fallback_output_file.is_none());
    assert_eq!(runner.requests().len(), 1, "fallback must not run");
    assert_eq!(runner.remaining(), 1);

    let log = ws.audit_log(&settings);
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("| result:claude_failed | "));
    assert!(lines[0].contains("| errors:claude_auth_failure | "));
    assert!(lines[1].ends_with(
        "| plan_id:plan-a | reviewer:system | iteration:1 | command:none | result:human_review_needed | summary:Fallback skipped by matrix/flag; explicit human approval required before execution. | errors:claude_auth_failure"
    ));
}

#[test]
fn silent_timeout_falls_back_at_next_iteration() {
    let (ws, settings) = workspace();
    let runner = ScriptedRunner::new(vec![
        ScriptedRun::timeout("").into(),
        ScriptedRun::exit(0, "Review complete. The plan is approved.\n").into(),
    ]);

    let (outcome, _) = review(&runner, &settings);
    assert_eq!(outcome.exit_code(), exit_codes::APPROVED);
    let ReviewOutcome::Approved(summary) = outcome else {
        panic!("expected approval");
    };
    assert_eq!(summary.result, Approval::Approved);
    assert_eq!(summary.reviewer, ReviewerRole::Fallback);
    assert_eq!(summary.iteration, 2);
    assert_eq!(
        summary.output_file,
        "audit/plan_review_outputs/plan-a_round2_gemini.txt"
    );

    let requests = runner.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].command, "gemini");
    assert_eq!(requests[1].timeout.as_secs(), 60);
    assert!(requests[1].args[1].starts_with("You are the fallback plan reviewer"));
    assert!(requests[1].args[1].ends_with(PLAN));

    let log = ws.audit_log(&settings);
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("| iteration:1 |"));
    assert!(lines[0].contains("| errors:claude_timeout_no_output | "));
    assert!(lines[1].contains("| reviewer:gemini-plan-reviewer | iteration:2 |"));
    assert!(lines[1].contains("| result:approved | "));
    assert!(lines[1].contains("| timeout_seconds:60 | "));
}

#[test]
fn double_failure_writes_combined_escalation() {
    let (ws, settings) = workspace();
    let runner = ScriptedRunner::new(vec![
        ScriptedRun::exit(1, "segfault in reviewer\n").into(),
        ScriptedRun::exit(3, "fatal: model overloaded\n").into(),
    ]);

    let (outcome, _) = review(&runner, &settings);
    assert_eq!(outcome.exit_code(), exit_codes::HUMAN_REVIEW_NEEDED);
    let ReviewOutcome::HumanReviewNeeded(summary) = outcome else {
        panic!("expected escalation");
    };
    assert_eq!(
        summary.reasons,
        vec![
            "claude_generic_nonzero".to_string(),
            "fallback_failed".to_string()
        ]
    );
    assert_eq!(summary.iteration, 2);
    assert_eq!(
        summary.fallback_output_file.as_deref(),
        Some("audit/plan_review_outputs/plan-a_round2_gemini.txt")
    );

    let log = ws.audit_log(&settings);
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains("| result:fallback_failed | "));
    assert!(lines[1].contains("| exit_code:3 | "));
    assert!(lines[2].contains("| reviewer:system | iteration:2 | command:none | result:human_review_needed |"));
    assert!(lines[2].ends_with("| errors:claude_generic_nonzero+fallback_failed"));
}

#[test]
fn iterations_continue_from_existing_log() {
    let (ws, settings) = workspace();
    fs::create_dir_all(settings.audit_log.parent().expect("parent")).expect("dir");
    fs::write(
        &settings.audit_log,
        "t | plan_id:plan-a | reviewer:x | iteration:1\n\
         t | plan_id:plan-a | reviewer:x | iteration:3\n\
         t | plan_id:plan-a-v2 | reviewer:x | iteration:9\n",
    )
    .expect("seed log");

    let runner = ScriptedRunner::new(vec![
        ScriptedRun::exit(0, &stream_result("success", false, "Approved with minor revisions.")).into(),
    ]);
    let (outcome, _) = review(&runner, &settings);
    let ReviewOutcome::Approved(summary) = outcome else {
        panic!("expected approval");
    };
    assert_eq!(summary.iteration, 4);
    assert_eq!(summary.result, Approval::ApprovedWithRevisions);
    assert!(runner.requests()[0].output_file.ends_with("plan-a_round4_claude.json"));

    let log = ws.audit_log(&settings);
    assert_eq!(log.lines().count(), 4);
    assert!(log.lines().last().expect("line").contains("| iteration:4 |"));
}

#[test]
fn oversized_iteration_in_log_still_advances() {
    let (ws, settings) = workspace();
    fs::create_dir_all(settings.audit_log.parent().expect("parent")).expect("dir");
    fs::write(
        &settings.audit_log,
        "t | plan_id:plan-a | reviewer:x | iteration:99999999999\n",
    )
    .expect("seed log");

    let runner = ScriptedRunner::new(vec![
        ScriptedRun::exit(0, &stream_result("success", false, "Approved.")).into(),
    ]);
    let (outcome, _) = review(&runner, &settings);
    let ReviewOutcome::Approved(summary) = outcome else {
        panic!("expected approval");
    };
    assert_eq!(summary.iteration, 100_000_000_000);
    assert!(
        ws.audit_log(&settings)
            .lines()
            .last()
            .expect("line")
            .contains("| iteration:100000000000 |")
    );
}

#[test]
fn exhausted_iterations_stop_before_running_reviewers() {
    for last in [u64::MAX.to_string(), u64::MAX.to_string() + "0", (u64::MAX - 1).to_string()] {
        let (ws, settings) = workspace();
        fs::create_dir_all(settings.audit_log.parent().expect("parent")).expect("dir");
        let seeded = format!("t | plan_id:plan-a | reviewer:x | iteration:{last}\n");
        fs::write(&settings.audit_log, &seeded).expect("seed log");

        let runner = ScriptedRunner::new(vec![
            ScriptedRun::exit(0, &stream_result("success", false, "Approved.")).into(),
        ]);
        let err = run_review(
            &runner,
            &settings,
            &DecisionMatrix::new(),
            &PhrasePolicy::BUILTIN,
            |_| {},
        )
        .unwrap_err();
        assert!(err.downcast_ref::<IterationOverflow>().is_some(), "{last}: {err:#}");
        assert!(runner.requests().is_empty());
        assert_eq!(ws.audit_log(&settings), seeded);
    }
}

#[test]
fn disabled_fallback_escalates_on_fallback_eligible_failure() {
    let ws = TestWorkspace::new().expect("workspace");
    ws.write_plan("plan-a.json", PLAN).expect("plan");
    let mut overrides = ws.overrides("plan-a.json");
    overrides.no_fallback = true;
    let settings = ws.settings(overrides).expect("settings");

    let runner = ScriptedRunner::new(vec![
        ScriptedRun::exit(0, &stream_result("error_max_turns", true, "")).into(),
    ]);
    let (outcome, _) = review(&runner, &settings);
    let ReviewOutcome::HumanReviewNeeded(summary) = outcome else {
        panic!("expected escalation");
    };
    assert_eq!(summary.reasons, vec!["claude_max_turns_reached".to_string()]);
    assert_eq!(runner.requests().len(), 1);
    assert!(ws.audit_log(&settings).contains("reviewer:system"));
}

#[test]
fn missing_primary_executable_is_an_error_not_a_label() {
    let (ws, settings) = workspace();
    let runner = ScriptedRunner::new(vec![ScriptedStep::SpawnFailure]);

    let err = run_review(
        &runner,
        &settings,
        &DecisionMatrix::new(),
        &PhrasePolicy::BUILTIN,
        |_| {},
    )
    .unwrap_err();
    let spawn = err.downcast_ref::<SpawnError>().expect("spawn error");
    assert!(spawn.is_not_found());
    assert_eq!(spawn.command, "claude");
    assert!(ws.audit_log(&settings).is_empty());
}

#[test]
fn preflight_runs_all_stages_and_warns_on_blockers() {
    let ws = TestWorkspace::new().expect("workspace");
    ws.write_plan("plan-a.json", PLAN).expect("plan");
    let mut overrides = ws.overrides("plan-a.json");
    overrides.skip_preflight = false;
    let settings = ws.settings(overrides).expect("settings");

    let runner = ScriptedRunner::new(vec![
        ScriptedRun::exit(0, "2.0.1 (Claude Code)\n").into(),
        ScriptedStep::SpawnFailure,
        ScriptedRun::exit(1, "Credit balance is too low\n").into(),
        ScriptedRun::exit(0, "OK\n").into(),
        ScriptedRun::exit(0, &stream_result("success", false, "Approved.")).into(),
    ]);

    let (outcome, warnings) = review(&runner, &settings);
    assert_eq!(outcome.exit_code(), exit_codes::APPROVED);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("Preflight reported blockers. See "));
    assert!(warnings[0].contains("preflight_validation_"));

    let requests = runner.requests();
    assert_eq!(requests.len(), 5);
    assert_eq!(requests[0].args, vec!["--version".to_string()]);
    assert_eq!(requests[0].timeout.as_secs(), 15);
    assert_eq!(requests[2].timeout.as_secs(), 30);
    assert_eq!(
        requests[2].args.last().map(String::as_str),
        Some("Reply with exactly OK")
    );

    let report = fs::read_to_string(&settings.preflight_log).expect("report");
    let stage_lines: Vec<&str> = report.lines().filter(|l| l.starts_with("stage=")).collect();
    assert_eq!(stage_lines.len(), 4);
    assert!(stage_lines[0].starts_with("stage=preflight_stage_1_claude_cli | status=pass | exit_code=0"));
    assert!(stage_lines[1].starts_with("stage=preflight_stage_2_gemini_cli | status=fail | exit_code=-1"));
    assert!(stage_lines[2].contains("status=credit_blocked"));
    assert!(stage_lines[3].contains("status=pass"));
    assert!(stage_lines[3].contains("output_file="));

    // The audit log only records the review itself.
    assert_eq!(ws.audit_log(&settings).lines().count(), 1);
}

#[test]
fn dry_run_previews_without_running_reviewers() {
    let ws = TestWorkspace::new().expect("workspace");
    ws.write_plan("plan-a.json", PLAN).expect("plan");
    let mut overrides = ws.overrides("plan-a.json");
    overrides.skip_preflight = false;
    overrides.dry_run = true;
    let settings = ws.settings(overrides).expect("settings");

    let runner = ScriptedRunner::new(Vec::new());
    let (outcome, warnings) = review(&runner, &settings);
    assert!(warnings.is_empty());
    assert_eq!(outcome.exit_code(), exit_codes::APPROVED);
    assert!(runner.requests().is_empty());

    let json = serde_json::to_value(&outcome).expect("json");
    assert_eq!(json["dry_run"], true);
    assert_eq!(json["iteration"], 1);
    assert_eq!(json["matrix"]["claude_auth_failure"], "escalate_human_review_needed");
    assert_eq!(json["matrix"]["claude_timeout_no_output"], "fallback_to_gemini");
    assert_eq!(json["phrase_policy_version"], 2);

    let report = fs::read_to_string(&settings.preflight_log).expect("report");
    assert_eq!(report.matches("status=dry_run").count(), 4);
    assert!(!report.contains("output_file="));
    assert!(!settings.audit_log.exists());
}
