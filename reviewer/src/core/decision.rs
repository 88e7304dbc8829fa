//! Fallback decision matrix: what to do after a non-approving review.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::types::{FallbackAction, PrimaryOutcome};

/// Label used for the "both reviewers failed" terminal state.
pub const BOTH_FAILED: &str = "both_failed";
/// Legacy umbrella label for any primary timeout.
pub const CLAUDE_TIMEOUT: &str = "claude_timeout";
/// Fallback reviewer blocked on interactive login.
pub const GEMINI_AUTH_REQUIRED: &str = "gemini_auth_required";

/// Immutable label → action table. Build once and pass by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DecisionMatrix {
    entries: BTreeMap<&'static str, FallbackAction>,
}

impl DecisionMatrix {
    pub fn new() -> Self {
        use FallbackAction::{EscalateHumanReviewNeeded as Escalate, FallbackToGemini as Fallback};

        let mut entries = BTreeMap::new();
        entries.insert(CLAUDE_TIMEOUT, Fallback);
        for outcome in PrimaryOutcome::ALL {
            if outcome.is_approval() {
                continue;
            }
            let action = match outcome {
                PrimaryOutcome::ClaudeAuthFailure | PrimaryOutcome::ClaudeCreditOrQuotaFailure => {
                    Escalate
                }
                _ => Fallback,
            };
            entries.insert(outcome.as_str(), action);
        }
        entries.insert(GEMINI_AUTH_REQUIRED, Escalate);
        entries.insert(BOTH_FAILED, Escalate);
        Self { entries }
    }

    /// Look up a label; unknown labels try the fallback reviewer.
    pub fn action(&self, label: &str) -> FallbackAction {
        self.entries
            .get(label)
            .copied()
            .unwrap_or(FallbackAction::FallbackToGemini)
    }

    pub fn action_for(&self, outcome: PrimaryOutcome) -> FallbackAction {
        self.action(outcome.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&'static str, FallbackAction)> + '_ {
        self.entries.iter().map(|(label, action)| (*label, *action))
    }
}

impl Default for DecisionMatrix {
    fn default() -> Self {
        Self::new()
    }
}
