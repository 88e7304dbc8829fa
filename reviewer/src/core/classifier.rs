//! Deterministic classification of reviewer runs into outcome labels.
//!
//! Classification never fails: unknown output maps to an explicit
//! "unclassified" label (primary) or a conservative default (fallback).

use tracing::{debug, instrument};

use crate::core::phrases::{FailureKind, PhrasePolicy};
use crate::core::run::RunResult;
use crate::core::terminal_event::{
    LooseResult, SUBTYPE_MAX_TURNS, SUBTYPE_SUCCESS, TerminalEvent, Transcript, first_json_object,
};
use crate::core::types::{Approval, FallbackOutcome, PrimaryOutcome};

/// Map approval text to `approved`, `approved_with_revisions` or
/// `claude_unclassified_output`.
pub fn classify_approval_text(policy: &PhrasePolicy, text: &str) -> PrimaryOutcome {
    match policy.approval(text) {
        Some(Approval::ApprovedWithRevisions) => PrimaryOutcome::ApprovedWithRevisions,
        Some(Approval::Approved) => PrimaryOutcome::Approved,
        None => PrimaryOutcome::ClaudeUnclassifiedOutput,
    }
}

/// Classify a primary reviewer run.
///
/// Order: timeout, then the terminal event (if any), then phrase/exit-code
/// rules over the raw preview.
#[instrument(skip_all, fields(exit_code = result.exit_code, timed_out = result.timed_out, has_event = terminal.is_some()))]
pub fn classify_primary(
    policy: &PhrasePolicy,
    result: &RunResult,
    terminal: Option<&TerminalEvent>,
) -> PrimaryOutcome {
    if result.timed_out {
        return if result.has_output() {
            PrimaryOutcome::ClaudeTimeoutPartialOutput
        } else {
            PrimaryOutcome::ClaudeTimeoutNoOutput
        };
    }

    let transcript = match terminal {
        Some(event) => Transcript::Structured(event.clone()),
        None => Transcript::Opaque(first_json_object(&result.preview)),
    };

    let outcome = match transcript {
        Transcript::Structured(event) => classify_terminal(policy, result, &event)
            .unwrap_or_else(|| classify_opaque(policy, result, first_json_object(&result.preview))),
        Transcript::Opaque(loose) => classify_opaque(policy, result, loose),
    };
    debug!(outcome = outcome.as_str(), "primary classified");
    outcome
}

/// Rules for a run that produced a terminal event.
///
/// Returns `None` when the event carries neither an error flag nor a subtype,
/// in which case the raw-text rules decide.
fn classify_terminal(
    policy: &PhrasePolicy,
    result: &RunResult,
    event: &TerminalEvent,
) -> Option<PrimaryOutcome> {
    let text = event.result_text();
    let failure = policy.detect_failure_reason(&text).map(failure_outcome);

    if event.subtype == SUBTYPE_MAX_TURNS {
        return Some(PrimaryOutcome::ClaudeMaxTurnsReached);
    }
    if event.is_error == Some(true) {
        return Some(failure.unwrap_or_else(|| nonzero_outcome(result)));
    }
    if !event.subtype.is_empty() && event.subtype != SUBTYPE_SUCCESS {
        return Some(failure.unwrap_or(PrimaryOutcome::ClaudeTerminalSubtypeError));
    }
    if event.is_error == Some(false) || event.subtype == SUBTYPE_SUCCESS {
        return Some(classify_approval_text(policy, &text));
    }
    failure
}

/// Rules for raw output without a terminal event.
fn classify_opaque(
    policy: &PhrasePolicy,
    result: &RunResult,
    loose: Option<LooseResult>,
) -> PrimaryOutcome {
    let loose = loose.unwrap_or_default();
    let loose_text = loose.result.unwrap_or_default().to_lowercase();
    let combined = format!("{}\n{}", result.preview, loose_text);

    if let Some(kind) = policy.detect_failure_reason(&combined) {
        return failure_outcome(kind);
    }
    if !result.success() || loose.is_error {
        return nonzero_outcome(result);
    }
    if !result.has_output() {
        return PrimaryOutcome::ClaudeEmptyOutputNonzero;
    }
    classify_approval_text(policy, &format!("{}\n{}", loose_text, result.preview))
}

fn failure_outcome(kind: FailureKind) -> PrimaryOutcome {
    match kind {
        FailureKind::CreditOrQuota => PrimaryOutcome::ClaudeCreditOrQuotaFailure,
        FailureKind::Auth => PrimaryOutcome::ClaudeAuthFailure,
    }
}

fn nonzero_outcome(result: &RunResult) -> PrimaryOutcome {
    if result.has_output() {
        PrimaryOutcome::ClaudeGenericNonzero
    } else {
        PrimaryOutcome::ClaudeEmptyOutputNonzero
    }
}

/// Classify a fallback reviewer run (plain text, no terminal event).
///
/// An auth prompt outranks everything. A clean run without any verdict
/// phrase is treated as needing revisions rather than a clean pass.
#[instrument(skip_all, fields(exit_code = result.exit_code, timed_out = result.timed_out))]
pub fn classify_fallback(policy: &PhrasePolicy, result: &RunResult) -> FallbackOutcome {
    let outcome = if policy.fallback_auth_required(&result.preview) {
        FallbackOutcome::GeminiAuthRequired
    } else if result.timed_out || !result.success() || !result.has_output() {
        FallbackOutcome::FallbackFailed
    } else {
        match policy.fallback_approval(&result.preview) {
            Some(Approval::Approved) => FallbackOutcome::Approved,
            Some(Approval::ApprovedWithRevisions) | None => FallbackOutcome::ApprovedWithRevisions,
        }
    };
    debug!(outcome = outcome.as_str(), "fallback classified");
    outcome
}
