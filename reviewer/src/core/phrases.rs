//! Phrase policy used to read reviewer text.
//!
//! Upstream tools change their wording without notice, so the phrases live in
//! one versioned table instead of inline conditionals. All matching is a
//! case-insensitive substring search.

use serde::Serialize;

use crate::core::types::Approval;

/// Bump whenever a phrase list changes so audit consumers can correlate.
pub const PHRASE_POLICY_VERSION: u32 = 2;

/// Failure families recognised in reviewer text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CreditOrQuota,
    Auth,
}

/// An ordered list of phrases that maps to a single label.
#[derive(Debug, Clone, Copy)]
pub struct PhraseRule<L: 'static> {
    pub label: L,
    pub phrases: &'static [&'static str],
}

impl<L: Copy + 'static> PhraseRule<L> {
    fn matches(&self, lowered: &str) -> bool {
        self.phrases.iter().any(|phrase| lowered.contains(phrase))
    }
}

/// The full matching policy. Phrases must be lowercase.
#[derive(Debug, Clone, Copy)]
pub struct PhrasePolicy {
    pub version: u32,
    /// Checked in order; first matching rule wins.
    pub failure_rules: &'static [PhraseRule<FailureKind>],
    /// Fallback reviewer phrases meaning "interactive login is required".
    pub fallback_auth_phrases: &'static [&'static str],
    /// Approval rules; the revisions rule must precede the plain one because
    /// "approved" is a substring of every revisions phrase.
    pub approval_rules: &'static [PhraseRule<Approval>],
    /// Verdict rules for the fallback reviewer. Its revisions list is
    /// narrower, so "approved with minor revisions" reads as a plain approval.
    pub fallback_approval_rules: &'static [PhraseRule<Approval>],
}

const FAILURE_RULES: &[PhraseRule<FailureKind>] = &[
    PhraseRule {
        label: FailureKind::CreditOrQuota,
        phrases: &[
            "credit balance is too low",
            "insufficient credit",
            "quota exceeded",
            "exceeded your current quota",
        ],
    },
    PhraseRule {
        label: FailureKind::Auth,
        phrases: &[
            "invalid api key",
            "please run /login",
            "authentication_error",
            "unauthorized",
        ],
    },
];

const FALLBACK_AUTH_PHRASES: &[&str] = &[
    "code assist login required",
    "waiting for authentication",
    "authentication timed out",
];

const APPROVAL_RULES: &[PhraseRule<Approval>] = &[
    PhraseRule {
        label: Approval::ApprovedWithRevisions,
        phrases: &[
            "approved with mandatory revisions",
            "approved with minor revisions",
            "approved with revisions",
            "approve with revisions",
            "approved_with_revisions",
        ],
    },
    PhraseRule {
        label: Approval::Approved,
        phrases: &["approved"],
    },
];

const FALLBACK_APPROVAL_RULES: &[PhraseRule<Approval>] = &[
    PhraseRule {
        label: Approval::ApprovedWithRevisions,
        phrases: &[
            "approved with mandatory revisions",
            "approve with revisions",
            "approved_with_revisions",
        ],
    },
    PhraseRule {
        label: Approval::Approved,
        phrases: &["approved"],
    },
];

impl PhrasePolicy {
    pub const BUILTIN: PhrasePolicy = PhrasePolicy {
        version: PHRASE_POLICY_VERSION,
        failure_rules: FAILURE_RULES,
        fallback_auth_phrases: FALLBACK_AUTH_PHRASES,
        approval_rules: APPROVAL_RULES,
        fallback_approval_rules: FALLBACK_APPROVAL_RULES,
    };

    /// Detect a credit/quota or authentication failure in free text.
    pub fn detect_failure_reason(&self, text: &str) -> Option<FailureKind> {
        let lowered = text.to_lowercase();
        self.failure_rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(|rule| rule.label)
    }

    /// Whether the fallback reviewer is stuck waiting for a login.
    pub fn fallback_auth_required(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.fallback_auth_phrases
            .iter()
            .any(|phrase| lowered.contains(phrase))
    }

    /// Find the approval verdict expressed in primary reviewer `text`, if any.
    pub fn approval(&self, text: &str) -> Option<Approval> {
        first_match(self.approval_rules, text)
    }

    /// Find the approval verdict expressed in fallback reviewer `text`, if any.
    pub fn fallback_approval(&self, text: &str) -> Option<Approval> {
        first_match(self.fallback_approval_rules, text)
    }
}

fn first_match(rules: &[PhraseRule<Approval>], text: &str) -> Option<Approval> {
    let lowered = text.to_lowercase();
    rules
        .iter()
        .find(|rule| rule.matches(&lowered))
        .map(|rule| rule.label)
}

impl Default for PhrasePolicy {
    fn default() -> Self {
        Self::BUILTIN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_wins_over_auth_when_both_present() {
        let policy = PhrasePolicy::BUILTIN;
        let text = "Unauthorized: Credit balance is too low";
        assert_eq!(
            policy.detect_failure_reason(text),
            Some(FailureKind::CreditOrQuota)
        );
    }

    #[test]
    fn auth_phrases_are_case_insensitive() {
        let policy = PhrasePolicy::BUILTIN;
        assert_eq!(
            policy.detect_failure_reason("Invalid API key. Please run /login."),
            Some(FailureKind::Auth)
        );
        assert_eq!(policy.detect_failure_reason("all good"), None);
    }

    #[test]
    fn revisions_checked_before_plain_approval() {
        let policy = PhrasePolicy::BUILTIN;
        assert_eq!(
            policy.approval("Approved. Overall: APPROVED WITH MINOR REVISIONS"),
            Some(Approval::ApprovedWithRevisions)
        );
        assert_eq!(policy.approval("Plan approved."), Some(Approval::Approved));
        assert_eq!(policy.approval("needs work"), None);
    }

    #[test]
    fn fallback_verdicts_use_the_narrower_revisions_list() {
        let policy = PhrasePolicy::BUILTIN;
        assert_eq!(
            policy.fallback_approval("Verdict: approved with minor revisions"),
            Some(Approval::Approved)
        );
        assert_eq!(
            policy.fallback_approval("APPROVED WITH MANDATORY REVISIONS"),
            Some(Approval::ApprovedWithRevisions)
        );
        assert_eq!(
            policy.approval("Verdict: approved with minor revisions"),
            Some(Approval::ApprovedWithRevisions)
        );
        assert_eq!(policy.fallback_approval("needs work"), None);
    }

    #[test]
    fn fallback_auth_phrases_match() {
        let policy = PhrasePolicy::BUILTIN;
        assert!(policy.fallback_auth_required("Waiting for authentication..."));
        assert!(!policy.fallback_auth_required("approved"));
    }

    #[test]
    fn builtin_phrases_are_lowercase() {
        let policy = PhrasePolicy::default();
        let all = policy
            .failure_rules
            .iter()
            .flat_map(|rule| rule.phrases.iter())
            .chain(policy.fallback_auth_phrases.iter())
            .chain(policy.approval_rules.iter().flat_map(|rule| rule.phrases.iter()))
            .chain(
                policy
                    .fallback_approval_rules
                    .iter()
                    .flat_map(|rule| rule.phrases.iter()),
            );
        for phrase in all {
            assert_eq!(*phrase, phrase.to_lowercase());
        }
    }
}
