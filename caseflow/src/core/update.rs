//! The `ProposedUpdate` boundary DTO produced by the external oracle.
//!
//! Everything the oracle can ask for in a turn is expressed here. The engine
//! validates ranges and shapes with [`ProposedUpdate::validate`] before any
//! state is touched.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::error::EngineError;
use crate::core::types::{
    CaseStatus, HypothesisStatus, Milestone, RequestCategory, RequestStatus, RootCauseMethod,
    SolutionKind, SolutionStatus, Stance, TemporalState, TurnOutcome, UrgencyLevel,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProposedUpdate {
    pub outcome: TurnOutcome,
    pub milestones: MilestoneUpdate,
    pub verification: Option<VerificationUpdate>,
    pub evidence: Vec<EvidenceDraft>,
    pub hypotheses: Vec<HypothesisDraft>,
    pub hypothesis_updates: Vec<HypothesisUpdate>,
    pub evidence_links: Vec<EvidenceLinkDraft>,
    pub solutions: Vec<SolutionDraft>,
    pub solution_updates: Vec<SolutionUpdate>,
    pub evidence_requests: Vec<EvidenceRequestDraft>,
    pub evidence_request_updates: Vec<EvidenceRequestUpdate>,
    pub working_conclusion: Option<ConclusionDraft>,
    pub root_cause_conclusion: Option<ConclusionDraft>,
    pub status_request: Option<CaseStatus>,
    pub closure_reason: Option<String>,
    pub exit_degraded_mode: Option<String>,
    pub resolve_escalation: Option<String>,
    pub user_input: Option<String>,
}

/// Milestone deltas. Only `true` has an effect; `false` is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MilestoneUpdate {
    pub symptom_verified: Option<bool>,
    pub scope_assessed: Option<bool>,
    pub timeline_established: Option<bool>,
    pub changes_identified: Option<bool>,
    pub root_cause_identified: Option<bool>,
    pub solution_proposed: Option<bool>,
    pub solution_applied: Option<bool>,
    pub solution_verified: Option<bool>,
    pub mitigation_applied: Option<bool>,
    pub root_cause_confidence: Option<f64>,
    pub root_cause_method: Option<RootCauseMethod>,
}

impl MilestoneUpdate {
    /// Build an update that requests exactly `milestones`.
    pub fn from_milestones(milestones: &[Milestone]) -> Self {
        let mut update = MilestoneUpdate::default();
        for milestone in milestones {
            *update.slot_mut(*milestone) = Some(true);
        }
        update
    }

    /// Milestones requested as `true`, in canonical order.
    pub fn requested(&self) -> Vec<Milestone> {
        Milestone::ALL
            .into_iter()
            .filter(|m| self.slot(*m) == Some(true))
            .collect()
    }

    fn slot(&self, milestone: Milestone) -> Option<bool> {
        match milestone {
            Milestone::SymptomVerified => self.symptom_verified,
            Milestone::TimelineEstablished => self.timeline_established,
            Milestone::ScopeAssessed => self.scope_assessed,
            Milestone::ChangesIdentified => self.changes_identified,
            Milestone::RootCauseIdentified => self.root_cause_identified,
            Milestone::SolutionProposed => self.solution_proposed,
            Milestone::SolutionApplied => self.solution_applied,
            Milestone::SolutionVerified => self.solution_verified,
            Milestone::MitigationApplied => self.mitigation_applied,
        }
    }

    fn slot_mut(&mut self, milestone: Milestone) -> &mut Option<bool> {
        match milestone {
            Milestone::SymptomVerified => &mut self.symptom_verified,
            Milestone::TimelineEstablished => &mut self.timeline_established,
            Milestone::ScopeAssessed => &mut self.scope_assessed,
            Milestone::ChangesIdentified => &mut self.changes_identified,
            Milestone::RootCauseIdentified => &mut self.root_cause_identified,
            Milestone::SolutionProposed => &mut self.solution_proposed,
            Milestone::SolutionApplied => &mut self.solution_applied,
            Milestone::SolutionVerified => &mut self.solution_verified,
            Milestone::MitigationApplied => &mut self.mitigation_applied,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerificationUpdate {
    pub symptom_statement: Option<String>,
    pub temporal_state: Option<TemporalState>,
    pub urgency_level: Option<UrgencyLevel>,
    pub affected_services: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvidenceDraft {
    /// Caller-chosen id, so links in the same update can refer to it.
    pub id: Option<String>,
    pub summary: String,
    pub analysis: Option<String>,
    pub tests_hypothesis_id: Option<String>,
    pub stance: Option<Stance>,
    pub completeness: Option<f64>,
    pub collected_by: Option<String>,
    /// Reference to raw content, filled in by an `EvidenceContentResolver`.
    pub content_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HypothesisDraft {
    pub id: Option<String>,
    pub statement: String,
    pub category: String,
    pub likelihood: Option<f64>,
    /// Initial status; only `captured` or `active` are accepted.
    pub status: Option<HypothesisStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HypothesisUpdate {
    pub id: String,
    pub status: Option<HypothesisStatus>,
    pub likelihood: Option<f64>,
    pub likelihood_delta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvidenceLinkDraft {
    pub hypothesis_id: String,
    pub evidence_id: String,
    pub stance: Stance,
    #[serde(default)]
    pub reasoning: String,
    pub completeness: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolutionDraft {
    #[serde(default)]
    pub id: Option<String>,
    pub description: String,
    pub kind: SolutionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolutionUpdate {
    pub id: String,
    pub status: SolutionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvidenceRequestDraft {
    #[serde(default)]
    pub id: Option<String>,
    pub description: String,
    pub category: RequestCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvidenceRequestUpdate {
    pub id: String,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConclusionDraft {
    pub statement: String,
    pub confidence: f64,
}

impl ProposedUpdate {
    /// Deserialize from JSON. Unknown fields and unknown enum tags are rejected.
    pub fn from_json(raw: &str) -> Result<Self, EngineError> {
        serde_json::from_str(raw).map_err(|err| {
            EngineError::validation(
                format!("line {} column {}", err.line(), err.column()),
                err.to_string(),
            )
        })
    }

    /// Check shapes and ranges that the type system cannot express.
    ///
    /// Returns the first violation, naming the offending field.
    pub fn validate(&self) -> Result<(), EngineError> {
        if let Some(confidence) = self.milestones.root_cause_confidence {
            unit_range("milestones.root_cause_confidence", confidence)?;
        }

        let mut evidence_ids = HashSet::new();
        for (idx, draft) in self.evidence.iter().enumerate() {
            non_blank(&format!("evidence[{idx}].summary"), &draft.summary)?;
            if let Some(id) = &draft.id {
                unique_id(&format!("evidence[{idx}].id"), id, &mut evidence_ids)?;
            }
            if let Some(completeness) = draft.completeness {
                unit_range(&format!("evidence[{idx}].completeness"), completeness)?;
            }
            if draft.stance.is_some() && draft.tests_hypothesis_id.is_none() {
                return Err(EngineError::validation(
                    format!("evidence[{idx}].stance"),
                    "stance requires tests_hypothesis_id",
                ));
            }
        }

        let mut hypothesis_ids = HashSet::new();
        for (idx, draft) in self.hypotheses.iter().enumerate() {
            non_blank(&format!("hypotheses[{idx}].statement"), &draft.statement)?;
            non_blank(&format!("hypotheses[{idx}].category"), &draft.category)?;
            if let Some(id) = &draft.id {
                unique_id(&format!("hypotheses[{idx}].id"), id, &mut hypothesis_ids)?;
            }
            if let Some(likelihood) = draft.likelihood {
                unit_range(&format!("hypotheses[{idx}].likelihood"), likelihood)?;
            }
            if let Some(status) = draft.status {
                if !matches!(status, HypothesisStatus::Captured | HypothesisStatus::Active) {
                    return Err(EngineError::validation(
                        format!("hypotheses[{idx}].status"),
                        format!("new hypotheses must be captured or active, got {status}"),
                    ));
                }
            }
        }

        for (idx, update) in self.hypothesis_updates.iter().enumerate() {
            non_blank(&format!("hypothesis_updates[{idx}].id"), &update.id)?;
            if let Some(likelihood) = update.likelihood {
                unit_range(&format!("hypothesis_updates[{idx}].likelihood"), likelihood)?;
            }
            if let Some(delta) = update.likelihood_delta {
                if !(-1.0..=1.0).contains(&delta) {
                    return Err(EngineError::validation(
                        format!("hypothesis_updates[{idx}].likelihood_delta"),
                        format!("{delta} is outside [-1, 1]"),
                    ));
                }
            }
            if update.likelihood.is_some() && update.likelihood_delta.is_some() {
                return Err(EngineError::validation(
                    format!("hypothesis_updates[{idx}]"),
                    "likelihood and likelihood_delta are mutually exclusive",
                ));
            }
        }

        for (idx, link) in self.evidence_links.iter().enumerate() {
            unit_range(
                &format!("evidence_links[{idx}].completeness"),
                link.completeness,
            )?;
        }

        let mut solution_ids = HashSet::new();
        for (idx, draft) in self.solutions.iter().enumerate() {
            non_blank(&format!("solutions[{idx}].description"), &draft.description)?;
            if let Some(id) = &draft.id {
                unique_id(&format!("solutions[{idx}].id"), id, &mut solution_ids)?;
            }
        }

        let mut request_ids = HashSet::new();
        for (idx, draft) in self.evidence_requests.iter().enumerate() {
            non_blank(
                &format!("evidence_requests[{idx}].description"),
                &draft.description,
            )?;
            if let Some(id) = &draft.id {
                unique_id(&format!("evidence_requests[{idx}].id"), id, &mut request_ids)?;
            }
        }

        for (field, conclusion) in [
            ("working_conclusion", &self.working_conclusion),
            ("root_cause_conclusion", &self.root_cause_conclusion),
        ] {
            if let Some(conclusion) = conclusion {
                non_blank(&format!("{field}.statement"), &conclusion.statement)?;
                unit_range(&format!("{field}.confidence"), conclusion.confidence)?;
            }
        }

        Ok(())
    }
}

fn unit_range(field: &str, value: f64) -> Result<(), EngineError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        return Ok(());
    }
    Err(EngineError::validation(
        field,
        format!("{value} is outside [0, 1]"),
    ))
}

fn non_blank(field: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(field, "must not be empty"));
    }
    Ok(())
}

fn unique_id(field: &str, id: &str, seen: &mut HashSet<String>) -> Result<(), EngineError> {
    non_blank(field, id)?;
    if !seen.insert(id.to_string()) {
        return Err(EngineError::validation(
            field,
            format!("duplicate id '{id}' in update"),
        ));
    }
    Ok(())
}
