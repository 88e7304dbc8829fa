//! Audit line model and pure iteration scanning.
//!
//! Lines are pipe-delimited `key:value` fields in a fixed order. Readers must
//! tolerate extra fields appended after the known ones.

use regex::Regex;
use thiserror::Error;

/// Reviewer id used for synthetic escalation lines.
pub const SYSTEM_REVIEWER: &str = "system";
/// Result label of a synthetic escalation line.
pub const HUMAN_REVIEW_NEEDED: &str = "human_review_needed";

/// One agent attempt as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLine {
    pub timestamp: String,
    pub plan_id: String,
    pub reviewer: String,
    pub iteration: u64,
    pub command: String,
    pub result: String,
    pub summary: String,
    pub errors: String,
    pub exit_code: i32,
    pub timeout_seconds: u64,
    pub elapsed_seconds: u64,
    pub output_file: String,
}

impl AuditLine {
    pub fn render(&self) -> String {
        [
            format!("{} | plan_id:{}", self.timestamp, self.plan_id),
            format!("reviewer:{}", self.reviewer),
            format!("iteration:{}", self.iteration),
            format!("command:{}", sanitize_one_line(&self.command)),
            format!("result:{}", self.result),
            format!("summary:{}", sanitize_one_line(&self.summary)),
            format!("errors:{}", sanitize_one_line(&self.errors)),
            format!("exit_code:{}", self.exit_code),
            format!("timeout_seconds:{}", self.timeout_seconds),
            format!("elapsed_seconds:{}", self.elapsed_seconds),
            format!("output_file:{}", self.output_file),
        ]
        .join(" | ")
    }
}

/// Synthetic line written when the flow escalates to a human.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationLine {
    pub timestamp: String,
    pub plan_id: String,
    pub iteration: u64,
    pub summary: String,
    pub errors: String,
}

impl EscalationLine {
    pub fn render(&self) -> String {
        [
            format!("{} | plan_id:{}", self.timestamp, self.plan_id),
            format!("reviewer:{SYSTEM_REVIEWER}"),
            format!("iteration:{}", self.iteration),
            "command:none".to_string(),
            format!("result:{HUMAN_REVIEW_NEEDED}"),
            format!("summary:{}", sanitize_one_line(&self.summary)),
            format!("errors:{}", sanitize_one_line(&self.errors)),
        ]
        .join(" | ")
    }
}

/// Collapse whitespace runs (including newlines) into single spaces.
pub fn sanitize_one_line(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// No iteration number is left for a plan: the next one would not fit in `u64`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("iteration numbers exhausted for plan `{plan_id}` (last recorded or requested: {last})")]
pub struct IterationOverflow {
    pub plan_id: String,
    pub last: u64,
}

/// Highest iteration recorded for `plan_id` in `log`, or 0.
///
/// `plan_id:<id>` must be followed by a field delimiter so one id never
/// matches lines of a longer id sharing its prefix. A number too large for
/// `u64` counts as `u64::MAX`, never as absent.
pub fn max_iteration(log: &str, plan_id: &str) -> u64 {
    let plan_re = Regex::new(&format!(r"plan_id:{}(?:\s|\||$)", regex::escape(plan_id)))
        .expect("escaped plan id is a valid pattern");
    let iter_re = Regex::new(r"\biteration:(\d+)").expect("iteration pattern is valid");

    log.lines()
        .filter(|line| plan_re.is_match(line))
        .filter_map(|line| iter_re.captures(line))
        .map(|caps| caps[1].parse::<u64>().unwrap_or(u64::MAX))
        .max()
        .unwrap_or(0)
}

/// Next iteration number for `plan_id`: one past the recorded maximum.
pub fn next_iteration(log: &str, plan_id: &str) -> Result<u64, IterationOverflow> {
    let last = max_iteration(log, plan_id);
    following_iteration(plan_id, last)
}

/// `iteration + 1`, or an error when that would overflow.
pub fn following_iteration(plan_id: &str, iteration: u64) -> Result<u64, IterationOverflow> {
    iteration.checked_add(1).ok_or_else(|| IterationOverflow {
        plan_id: plan_id.to_string(),
        last: iteration,
    })
}
