//! `plan-review`: run the primary plan reviewer, fall back or escalate.
//!
//! Prints one JSON summary on stdout. Exit codes live in
//! [`plan_reviewer::exit_codes`].

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use plan_reviewer::core::decision::DecisionMatrix;
use plan_reviewer::core::phrases::PhrasePolicy;
use plan_reviewer::exit_codes;
use plan_reviewer::io::agents::OutputMode;
use plan_reviewer::io::process::ProcessRunner;
use plan_reviewer::logging;
use plan_reviewer::review::run_review;
use plan_reviewer::settings::{InvocationError, ReviewSettings, SettingsOverrides};

#[derive(Debug, Parser)]
#[command(
    name = "plan-review",
    version,
    about = "Review a plan with a primary reviewer, a fallback reviewer and an audit trail"
)]
struct Cli {
    /// Plan document handed to the reviewers verbatim.
    #[arg(long)]
    plan_file: PathBuf,

    /// Audit identity of the plan (default: file stem).
    #[arg(long)]
    plan_id: Option<String>,

    /// Working directory for reviewer processes and relative paths.
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// HOME exported to reviewer processes (default: workdir).
    #[arg(long)]
    home: Option<PathBuf>,

    /// Primary reviewer timeout.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_seconds: Option<u64>,

    /// Fallback reviewer timeout.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    fallback_timeout_seconds: Option<u64>,

    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_turns: Option<u32>,

    #[arg(long, value_enum)]
    output_mode: Option<OutputMode>,

    /// Directory for captured reviewer output.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long)]
    audit_log: Option<PathBuf>,

    #[arg(long)]
    preflight_log: Option<PathBuf>,

    /// Escalate instead of running the fallback reviewer.
    #[arg(long)]
    no_fallback: bool,

    #[arg(long)]
    skip_preflight: bool,

    /// Use this iteration number instead of deriving it from the audit log.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    iteration: Option<u64>,

    /// Preview the planned invocations without running any reviewer.
    #[arg(long)]
    dry_run: bool,

    /// Config file (default: `.plan-review.toml` in the workdir).
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn into_overrides(self) -> SettingsOverrides {
        SettingsOverrides {
            plan_file: self.plan_file,
            plan_id: self.plan_id,
            workdir: self.workdir,
            home: self.home,
            config: self.config,
            primary_timeout_secs: self.timeout_seconds,
            fallback_timeout_secs: self.fallback_timeout_seconds,
            max_turns: self.max_turns,
            output_mode: self.output_mode,
            output_dir: self.output_dir,
            audit_log: self.audit_log,
            preflight_log: self.preflight_log,
            no_fallback: self.no_fallback,
            skip_preflight: self.skip_preflight,
            iteration: self.iteration,
            dry_run: self.dry_run,
        }
    }
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            if err.downcast_ref::<InvocationError>().is_some() {
                exit_codes::INVALID_INVOCATION
            } else {
                exit_codes::INTERNAL_ERROR
            }
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("resolve current directory")?;
    let settings = ReviewSettings::resolve(cli.into_overrides(), &cwd)?;

    let outcome = run_review(
        &ProcessRunner,
        &settings,
        &DecisionMatrix::new(),
        &PhrasePolicy::BUILTIN,
        |warning| eprintln!("{warning}"),
    )?;
    let summary = serde_json::to_string_pretty(&outcome).context("serialize summary")?;
    println!("{summary}");
    Ok(outcome.exit_code())
}
