//! Deterministic evidence classification.
//!
//! The category and milestone impact of an evidence draft are inferred from
//! the draft's fields and the case's current progress only. Text rules are
//! plain keyword matches; when the text is hedged or contradictory the
//! classifier advances nothing rather than guessing.

use std::sync::LazyLock;

use regex::Regex;

use crate::case::Case;
use crate::core::types::{EvidenceCategory, Milestone};
use crate::core::update::EvidenceDraft;

static TIMELINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(started|began|since|timeline|timestamp|yesterday|ago|first (seen|noticed|observed)|at \d{1,2}:\d{2}|\d{4}-\d{2}-\d{2})\b",
    )
    .unwrap()
});

static SCOPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(all users|every (user|request|region)|affected (users|services|hosts|regions|customers)|only affects|blast radius|scope|single (host|region|user|tenant)|\d+% of)\b",
    )
    .unwrap()
});

static CHANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(deploy(ed|ment)?|releases?|released|rollout|rolled out|config(uration)? change|upgraded?|migration|commit)\b",
    )
    .unwrap()
});

static CAUSAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(root cause|caused by|because of|due to|traced (it |this )?to)\b").unwrap()
});

static HEDGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(maybe|might|possibly|perhaps|unclear|unknown|not sure|unsure|could be)\b")
        .unwrap()
});

static FIX_APPLIED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(applied|rolled back|patched|restarted|hotfix(ed)?|deployed the fix)\b")
        .unwrap()
});

static FIX_CONFIRMED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(resolved|confirmed fixed|fix (is )?(confirmed|verified|working)|no longer (occurs|reproduces|fails|errors)|error rate (is )?back to normal|issue (is )?gone)\b",
    )
    .unwrap()
});

static UNRESOLVED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(not (yet )?(resolved|fixed)|unresolved|still (failing|fails|occurs|broken|happening))\b")
        .unwrap()
});

/// Infer the category of `draft`. First matching rule wins:
///
/// 1. tests a hypothesis → `Causal`
/// 2. verification incomplete → `Symptom`
/// 3. a solution has been proposed → `Resolution`
/// 4. otherwise → `Other`
pub fn classify(draft: &EvidenceDraft, case: &Case) -> EvidenceCategory {
    if draft.tests_hypothesis_id.is_some() {
        EvidenceCategory::Causal
    } else if !case.progress.verification_complete() {
        EvidenceCategory::Symptom
    } else if case.progress.solution_proposed {
        EvidenceCategory::Resolution
    } else {
        EvidenceCategory::Other
    }
}

/// Milestones that `draft` advances, given its category.
///
/// Only milestones that are not already complete are returned, in canonical order.
pub fn advanced_milestones(
    draft: &EvidenceDraft,
    category: EvidenceCategory,
    case: &Case,
) -> Vec<Milestone> {
    let text = draft_text(draft);
    let hedged = HEDGE_RE.is_match(&text);

    let mut advanced = Vec::new();
    match category {
        EvidenceCategory::Symptom => {
            if draft
                .analysis
                .as_deref()
                .is_some_and(|analysis| !analysis.trim().is_empty())
            {
                advanced.push(Milestone::SymptomVerified);
            }
            if TIMELINE_RE.is_match(&text) {
                advanced.push(Milestone::TimelineEstablished);
            }
            if SCOPE_RE.is_match(&text) {
                advanced.push(Milestone::ScopeAssessed);
            }
            if CHANGE_RE.is_match(&text) {
                advanced.push(Milestone::ChangesIdentified);
            }
            if !hedged && CAUSAL_RE.is_match(&text) {
                advanced.push(Milestone::RootCauseIdentified);
            }
        }
        EvidenceCategory::Causal => {
            if CHANGE_RE.is_match(&text) {
                advanced.push(Milestone::ChangesIdentified);
            }
            if !hedged && draft.stance.is_some_and(|stance| stance.is_supporting()) {
                advanced.push(Milestone::RootCauseIdentified);
            }
        }
        EvidenceCategory::Resolution => {
            let applied_now = FIX_APPLIED_RE.is_match(&text);
            if applied_now {
                advanced.push(Milestone::SolutionApplied);
            }
            let applied = applied_now || case.progress.solution_applied;
            if applied
                && !hedged
                && !UNRESOLVED_RE.is_match(&text)
                && FIX_CONFIRMED_RE.is_match(&text)
            {
                advanced.push(Milestone::SolutionVerified);
            }
        }
        EvidenceCategory::Other => {}
    }

    advanced.retain(|milestone| !case.progress.is_complete(*milestone));
    advanced.sort();
    advanced
}

fn draft_text(draft: &EvidenceDraft) -> String {
    match draft.analysis.as_deref() {
        Some(analysis) => format!("{}\n{}", draft.summary, analysis),
        None => draft.summary.clone(),
    }
}
