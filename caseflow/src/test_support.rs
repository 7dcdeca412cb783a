//! Test-only helpers for constructing cases, drafts and updates.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};

use crate::case::{Case, Evidence, Hypothesis, TurnRecord};
use crate::core::types::{
    CaseStatus, EvidenceCategory, HypothesisStatus, Milestone, RequestStatus, SolutionKind,
    SolutionStatus, TurnOutcome,
};
use crate::core::update::{
    EvidenceDraft, EvidenceRequestDraft, EvidenceRequestUpdate, HypothesisDraft,
    HypothesisUpdate, MilestoneUpdate, ProposedUpdate, SolutionDraft, SolutionUpdate,
    VerificationUpdate,
};
use crate::io::case_store::{CaseStore, MemoryCaseStore};

/// Stored evidence with deterministic defaults.
pub fn evidence(id: &str, category: EvidenceCategory) -> Evidence {
    Evidence {
        id: id.to_string(),
        category,
        summary: format!("{id} summary"),
        analysis: None,
        tests_hypothesis_id: None,
        stance: None,
        advances_milestones: Vec::new(),
        collected_at_turn: 1,
        collected_by: "user".to_string(),
    }
}

/// Evidence draft with only `summary` and optional `analysis` set.
pub fn draft(summary: &str, analysis: Option<&str>) -> EvidenceDraft {
    EvidenceDraft {
        summary: summary.to_string(),
        analysis: analysis.map(str::to_string),
        ..EvidenceDraft::default()
    }
}

/// Stored hypothesis with deterministic defaults.
pub fn hypothesis(id: &str, category: &str, status: HypothesisStatus) -> Hypothesis {
    Hypothesis {
        id: id.to_string(),
        statement: format!("{id} statement"),
        category: category.to_string(),
        status,
        likelihood: 0.5,
        evidence_links: BTreeMap::new(),
        created_at_turn: 1,
        updated_at_turn: 1,
    }
}

pub fn hypothesis_draft(id: &str, category: &str) -> HypothesisDraft {
    HypothesisDraft {
        id: Some(id.to_string()),
        statement: format!("{id} statement"),
        category: category.to_string(),
        ..HypothesisDraft::default()
    }
}

/// An investigating case with symptom, scope and timeline verified and no path yet.
pub fn verified_case() -> Case {
    let mut case = Case::new("case-verified", "Checkout errors");
    case.status = CaseStatus::Investigating;
    case.progress.symptom_verified = true;
    case.progress.scope_assessed = true;
    case.progress.timeline_established = true;
    case
}

/// A case resolved on its first turn, consistent with all invariants.
pub fn resolved_case() -> Case {
    let mut case = Case::new("case-resolved", "Checkout errors");
    for milestone in Milestone::CORE {
        case.progress.mark(milestone);
    }
    case.status = CaseStatus::Resolved;
    case.turn_count = 1;
    case.resolved_at = Some(1);
    case.closed_at = Some(1);
    case.closure_reason = Some("resolved".to_string());
    case.turn_history.push(TurnRecord {
        turn_number: 1,
        milestones_completed: Milestone::CORE.to_vec(),
        evidence_added: Vec::new(),
        hypotheses_generated: Vec::new(),
        hypotheses_concluded: Vec::new(),
        progress_made: true,
        outcome: TurnOutcome::CaseResolved,
    });
    case
}

/// Fluent builder for [`ProposedUpdate`].
#[derive(Debug, Default)]
pub struct UpdateBuilder {
    update: ProposedUpdate,
}

impl UpdateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcome(mut self, outcome: TurnOutcome) -> Self {
        self.update.outcome = outcome;
        self
    }

    pub fn milestones(mut self, milestones: &[Milestone]) -> Self {
        let mut update = MilestoneUpdate::from_milestones(milestones);
        update.root_cause_confidence = self.update.milestones.root_cause_confidence;
        update.root_cause_method = self.update.milestones.root_cause_method;
        self.update.milestones = update;
        self
    }

    pub fn verification(mut self, verification: VerificationUpdate) -> Self {
        self.update.verification = Some(verification);
        self
    }

    pub fn evidence(mut self, draft: EvidenceDraft) -> Self {
        self.update.evidence.push(draft);
        self
    }

    pub fn hypothesis(mut self, draft: HypothesisDraft) -> Self {
        self.update.hypotheses.push(draft);
        self
    }

    pub fn hypothesis_status(mut self, id: &str, status: HypothesisStatus) -> Self {
        self.update.hypothesis_updates.push(HypothesisUpdate {
            id: id.to_string(),
            status: Some(status),
            ..HypothesisUpdate::default()
        });
        self
    }

    pub fn solution(mut self, id: &str, kind: SolutionKind) -> Self {
        self.update.solutions.push(SolutionDraft {
            id: Some(id.to_string()),
            description: format!("{id} description"),
            kind,
        });
        self
    }

    pub fn solution_status(mut self, id: &str, status: SolutionStatus) -> Self {
        self.update.solution_updates.push(SolutionUpdate {
            id: id.to_string(),
            status,
        });
        self
    }

    pub fn request(mut self, draft: EvidenceRequestDraft) -> Self {
        self.update.evidence_requests.push(draft);
        self
    }

    pub fn request_status(mut self, id: &str, status: RequestStatus) -> Self {
        self.update
            .evidence_request_updates
            .push(EvidenceRequestUpdate {
                id: id.to_string(),
                status,
            });
        self
    }

    pub fn status(mut self, status: CaseStatus) -> Self {
        self.update.status_request = Some(status);
        self
    }

    pub fn user_input(mut self, input: &str) -> Self {
        self.update.user_input = Some(input.to_string());
        self
    }

    pub fn build(self) -> ProposedUpdate {
        self.update
    }
}

/// Store whose saves always fail; loads are served from the wrapped memory store.
#[derive(Debug, Default)]
pub struct FailingStore {
    pub inner: MemoryCaseStore,
}

impl CaseStore for FailingStore {
    fn load(&self, case_id: &str) -> Result<Case> {
        self.inner.load(case_id)
    }

    fn save(&self, case: &Case) -> Result<()> {
        Err(anyhow!("simulated write failure for case '{}'", case.case_id))
    }

    fn exists(&self, case_id: &str) -> Result<bool> {
        self.inner.exists(case_id)
    }

    fn list(&self) -> Result<Vec<String>> {
        self.inner.list()
    }
}
