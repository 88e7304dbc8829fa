//! Shared deterministic types for review classification.
//!
//! Labels defined here are written verbatim into the audit log and the JSON
//! summary, so their string forms are part of the external contract.

use serde::{Deserialize, Serialize};

/// Outcome of a primary (structured-output) reviewer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryOutcome {
    ClaudeTimeoutNoOutput,
    ClaudeTimeoutPartialOutput,
    ClaudeMaxTurnsReached,
    ClaudeAuthFailure,
    ClaudeCreditOrQuotaFailure,
    ClaudeEmptyOutputNonzero,
    ClaudeGenericNonzero,
    ClaudeTerminalSubtypeError,
    ClaudeUnclassifiedOutput,
    Approved,
    ApprovedWithRevisions,
}

impl PrimaryOutcome {
    pub const ALL: [PrimaryOutcome; 11] = [
        PrimaryOutcome::ClaudeTimeoutNoOutput,
        PrimaryOutcome::ClaudeTimeoutPartialOutput,
        PrimaryOutcome::ClaudeMaxTurnsReached,
        PrimaryOutcome::ClaudeAuthFailure,
        PrimaryOutcome::ClaudeCreditOrQuotaFailure,
        PrimaryOutcome::ClaudeEmptyOutputNonzero,
        PrimaryOutcome::ClaudeGenericNonzero,
        PrimaryOutcome::ClaudeTerminalSubtypeError,
        PrimaryOutcome::ClaudeUnclassifiedOutput,
        PrimaryOutcome::Approved,
        PrimaryOutcome::ApprovedWithRevisions,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PrimaryOutcome::ClaudeTimeoutNoOutput => "claude_timeout_no_output",
            PrimaryOutcome::ClaudeTimeoutPartialOutput => "claude_timeout_partial_output",
            PrimaryOutcome::ClaudeMaxTurnsReached => "claude_max_turns_reached",
            PrimaryOutcome::ClaudeAuthFailure => "claude_auth_failure",
            PrimaryOutcome::ClaudeCreditOrQuotaFailure => "claude_credit_or_quota_failure",
            PrimaryOutcome::ClaudeEmptyOutputNonzero => "claude_empty_output_nonzero",
            PrimaryOutcome::ClaudeGenericNonzero => "claude_generic_nonzero",
            PrimaryOutcome::ClaudeTerminalSubtypeError => "claude_terminal_subtype_error",
            PrimaryOutcome::ClaudeUnclassifiedOutput => "claude_unclassified_output",
            PrimaryOutcome::Approved => "approved",
            PrimaryOutcome::ApprovedWithRevisions => "approved_with_revisions",
        }
    }

    pub fn approval(self) -> Option<Approval> {
        match self {
            PrimaryOutcome::Approved => Some(Approval::Approved),
            PrimaryOutcome::ApprovedWithRevisions => Some(Approval::ApprovedWithRevisions),
            _ => None,
        }
    }

    pub fn is_approval(self) -> bool {
        self.approval().is_some()
    }
}

/// Outcome of a fallback (free-text) reviewer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackOutcome {
    GeminiAuthRequired,
    FallbackFailed,
    Approved,
    ApprovedWithRevisions,
}

impl FallbackOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackOutcome::GeminiAuthRequired => "gemini_auth_required",
            FallbackOutcome::FallbackFailed => "fallback_failed",
            FallbackOutcome::Approved => "approved",
            FallbackOutcome::ApprovedWithRevisions => "approved_with_revisions",
        }
    }

    pub fn approval(self) -> Option<Approval> {
        match self {
            FallbackOutcome::Approved => Some(Approval::Approved),
            FallbackOutcome::ApprovedWithRevisions => Some(Approval::ApprovedWithRevisions),
            _ => None,
        }
    }

    pub fn is_approval(self) -> bool {
        self.approval().is_some()
    }
}

/// The two approving labels shared by both reviewer roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approval {
    Approved,
    ApprovedWithRevisions,
}

impl Approval {
    pub fn as_str(self) -> &'static str {
        match self {
            Approval::Approved => "approved",
            Approval::ApprovedWithRevisions => "approved_with_revisions",
        }
    }
}

/// Next step after a non-approving primary classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackAction {
    FallbackToGemini,
    EscalateHumanReviewNeeded,
}

impl FallbackAction {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackAction::FallbackToGemini => "fallback_to_gemini",
            FallbackAction::EscalateHumanReviewNeeded => "escalate_human_review_needed",
        }
    }
}

/// Reviewer role; decides command, output file naming and audit identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerRole {
    Primary,
    Fallback,
}

impl ReviewerRole {
    /// Identifier recorded in the `reviewer:` audit field.
    pub fn audit_id(self) -> &'static str {
        match self {
            ReviewerRole::Primary => "claude-plan-reviewer",
            ReviewerRole::Fallback => "gemini-plan-reviewer",
        }
    }

    /// Result label recorded when this reviewer did not approve.
    pub fn failure_label(self) -> &'static str {
        match self {
            ReviewerRole::Primary => "claude_failed",
            ReviewerRole::Fallback => "fallback_failed",
        }
    }

    /// File name suffix for captured output.
    pub fn output_suffix(self) -> &'static str {
        match self {
            ReviewerRole::Primary => "claude.json",
            ReviewerRole::Fallback => "gemini.txt",
        }
    }
}

/// Classification of one preflight probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreflightStatus {
    Pass,
    Fail,
    AuthRequired,
    CreditBlocked,
    DryRun,
}

impl PreflightStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PreflightStatus::Pass => "pass",
            PreflightStatus::Fail => "fail",
            PreflightStatus::AuthRequired => "auth_required",
            PreflightStatus::CreditBlocked => "credit_blocked",
            PreflightStatus::DryRun => "dry_run",
        }
    }

    /// Whether this status should surface an advisory warning.
    pub fn is_blocker(self) -> bool {
        matches!(
            self,
            PreflightStatus::Fail | PreflightStatus::AuthRequired | PreflightStatus::CreditBlocked
        )
    }
}
