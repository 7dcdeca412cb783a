//! Hypothesis lifecycle, hypothesis-evidence links, and anchoring detection.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::case::{Case, EvidenceLink, Hypothesis};
use crate::core::error::EngineError;
use crate::core::types::{EvidenceCategory, HypothesisStatus, Stance, Thresholds};
use crate::core::update::{EvidenceLinkDraft, HypothesisDraft, HypothesisUpdate};

const DEFAULT_LIKELIHOOD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryKind {
    CategoryAnchoring,
    SymptomReverification,
}

/// Course-correction hint for the oracle. Advisory only; never changes state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advisory {
    pub kind: AdvisoryKind,
    pub message: String,
}

/// Result of [`link_evidence`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    /// The link carried no investigative value and was dropped.
    Discarded,
}

/// Create a hypothesis from `draft` and return its id.
pub fn add_hypothesis(
    case: &mut Case,
    draft: &HypothesisDraft,
    turn: u32,
) -> Result<String, EngineError> {
    let id = match &draft.id {
        Some(id) if case.hypotheses.contains(id) => {
            return Err(EngineError::validation(
                "hypotheses.id",
                format!("hypothesis '{id}' already exists"),
            ));
        }
        Some(id) => id.clone(),
        None => next_id("hyp", case.hypotheses.len(), |id| {
            case.hypotheses.contains(id)
        }),
    };

    case.hypotheses.push(Hypothesis {
        id: id.clone(),
        statement: draft.statement.trim().to_string(),
        category: normalize_category(&draft.category),
        status: draft.status.unwrap_or(HypothesisStatus::Captured),
        likelihood: draft.likelihood.unwrap_or(DEFAULT_LIKELIHOOD),
        evidence_links: BTreeMap::new(),
        created_at_turn: turn,
        updated_at_turn: turn,
    });
    Ok(id)
}

/// Apply a status change and/or likelihood change to an existing hypothesis.
///
/// Status changes must follow [`HypothesisStatus::can_transition_to`]; a
/// terminal hypothesis accepts no update at all.
pub fn update_hypothesis(
    case: &mut Case,
    update: &HypothesisUpdate,
    turn: u32,
) -> Result<(), EngineError> {
    let hypothesis = case
        .hypotheses
        .get_mut(&update.id)
        .ok_or_else(|| EngineError::unknown("hypothesis", &update.id))?;

    if let Some(next) = update.status {
        if hypothesis.status.is_terminal()
            || (next != hypothesis.status && !hypothesis.status.can_transition_to(next))
        {
            return Err(EngineError::InvalidHypothesisTransition {
                id: hypothesis.id.clone(),
                from: hypothesis.status,
                to: next,
            });
        }
    } else if hypothesis.status.is_terminal() {
        return Err(EngineError::InvalidOperation(format!(
            "hypothesis '{}' is {} and can no longer change",
            hypothesis.id, hypothesis.status
        )));
    }

    if let Some(next) = update.status {
        hypothesis.status = next;
    }
    if let Some(likelihood) = update.likelihood {
        hypothesis.likelihood = likelihood;
    }
    if let Some(delta) = update.likelihood_delta {
        hypothesis.likelihood = (hypothesis.likelihood + delta).clamp(0.0, 1.0);
    }
    hypothesis.updated_at_turn = turn;
    Ok(())
}

/// Record how a piece of evidence bears on a hypothesis.
///
/// Irrelevant links, and neutral links below the completeness floor, are
/// discarded without error. A later link for the same evidence replaces the
/// earlier one.
pub fn link_evidence(
    case: &mut Case,
    link: &EvidenceLinkDraft,
    thresholds: &Thresholds,
    turn: u32,
) -> Result<LinkOutcome, EngineError> {
    if !case.evidence.contains(&link.evidence_id) {
        return Err(EngineError::unknown("evidence", &link.evidence_id));
    }
    let hypothesis = case
        .hypotheses
        .get_mut(&link.hypothesis_id)
        .ok_or_else(|| EngineError::unknown("hypothesis", &link.hypothesis_id))?;

    let low_value = match link.stance {
        Stance::Irrelevant => true,
        Stance::Neutral => link.completeness < thresholds.neutral_link_min_completeness,
        _ => false,
    };
    if low_value {
        return Ok(LinkOutcome::Discarded);
    }

    hypothesis.evidence_links.insert(
        link.evidence_id.clone(),
        EvidenceLink {
            stance: link.stance,
            reasoning: link.reasoning.clone(),
            completeness: link.completeness,
        },
    );
    hypothesis.updated_at_turn = turn;
    Ok(LinkOutcome::Linked)
}

/// Detect anchoring patterns that suggest the investigation is going in circles.
pub fn detect_anchoring(case: &Case, thresholds: &Thresholds) -> Vec<Advisory> {
    let mut advisories = Vec::new();

    let mut failures: BTreeMap<&str, usize> = BTreeMap::new();
    for hypothesis in &case.hypotheses {
        if matches!(
            hypothesis.status,
            HypothesisStatus::Refuted | HypothesisStatus::Inconclusive
        ) {
            *failures.entry(hypothesis.category.as_str()).or_default() += 1;
        }
    }
    for (category, count) in failures {
        if count >= thresholds.anchoring_failures {
            advisories.push(Advisory {
                kind: AdvisoryKind::CategoryAnchoring,
                message: format!("anchored on category {category}, try a different category"),
            });
        }
    }

    let window = thresholds.purpose_window;
    let recent = case.evidence.as_slice();
    if window > 0
        && recent.len() >= window
        && case.progress.verification_complete()
        && recent[recent.len() - window..]
            .iter()
            .all(|evidence| evidence.category == EvidenceCategory::Symptom)
    {
        advisories.push(Advisory {
            kind: AdvisoryKind::SymptomReverification,
            message: "stuck re-verifying symptom, move to causal investigation".to_string(),
        });
    }

    advisories
}

/// Trimmed, lowercase category so "Code" and " code" anchor together.
pub fn normalize_category(category: &str) -> String {
    category.trim().to_lowercase()
}

/// First `{prefix}-{n}` id (n counting from `len + 1`) not already taken.
pub(crate) fn next_id(prefix: &str, len: usize, taken: impl Fn(&str) -> bool) -> String {
    let mut n = len + 1;
    loop {
        let id = format!("{prefix}-{n}");
        if !taken(&id) {
            return id;
        }
        n += 1;
    }
}
