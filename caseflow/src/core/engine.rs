//! Per-turn orchestration of the core components.
//!
//! [`Engine::apply_turn`] is a pure function of `(case, update)`: it never
//! mutates its input and never performs I/O. Fatal errors reject the whole
//! turn; reference problems are collected as warnings and the rest of the
//! update proceeds.

use std::collections::HashSet;

use serde::Serialize;

use crate::case::{
    Case, Conclusion, Evidence, EvidenceRequest, PathSelection, Solution, TurnRecord,
};
use crate::core::degraded::{self, DegradedModeEvent};
use crate::core::error::{EngineError, TurnWarning, WarningKind};
use crate::core::escalation::{self, EscalationAdvisory};
use crate::core::hypotheses::{self, Advisory, next_id};
use crate::core::milestones::apply_milestones;
use crate::core::status_validator::{self, CaseStatusTransition};
use crate::core::types::{
    CaseStatus, Milestone, RequestStatus, Routing, SolutionKind, SolutionStatus, Thresholds,
};
use crate::core::update::{
    ConclusionDraft, EvidenceLinkDraft, MilestoneUpdate, ProposedUpdate, VerificationUpdate,
};
use crate::core::{classifier, path, progress};

const DEFAULT_LINK_COMPLETENESS: f64 = 0.5;
const DEFAULT_COLLECTOR: &str = "user";

/// Everything a caller learns from one applied turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnResult {
    pub case: Case,
    /// Absent when the turn was a no-op on a terminal case.
    pub record: Option<TurnRecord>,
    pub status_transitions: Vec<CaseStatusTransition>,
    pub path_selection: Option<PathSelection>,
    pub degraded_event: Option<DegradedModeEvent>,
    pub escalation: Option<EscalationAdvisory>,
    pub advisories: Vec<Advisory>,
    pub warnings: Vec<TurnWarning>,
}

impl TurnResult {
    fn unchanged(case: &Case, warning: TurnWarning) -> Self {
        Self {
            case: case.clone(),
            record: None,
            status_transitions: Vec::new(),
            path_selection: None,
            degraded_event: None,
            escalation: None,
            advisories: Vec::new(),
            warnings: vec![warning],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Engine {
    thresholds: Thresholds,
    routing: Routing,
}

impl Engine {
    pub fn new(thresholds: Thresholds, routing: Routing) -> Self {
        Self {
            thresholds,
            routing,
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn routing(&self) -> &Routing {
        &self.routing
    }

    /// Apply one proposed update to `case` and return the next case state.
    pub fn apply_turn(
        &self,
        case: &Case,
        update: &ProposedUpdate,
    ) -> Result<TurnResult, EngineError> {
        update.validate()?;
        if let Some(to) = update.status_request {
            status_validator::validate_transition(case.status, to)?;
        }
        if case.is_terminal() {
            return Ok(TurnResult::unchanged(
                case,
                TurnWarning::new(
                    WarningKind::TerminalCase,
                    format!("case '{}' is {}; turn ignored", case.case_id, case.status),
                ),
            ));
        }
        check_id_collisions(case, update)?;

        let mut next = case.clone();
        next.turn_count += 1;
        let mut turn = Turn {
            engine: self,
            turn: next.turn_count,
            case: next,
            reserved: ReservedIds::from_update(update),
            status_transitions: Vec::new(),
            path_selection: None,
            degraded_event: None,
            escalation: None,
            warnings: Vec::new(),
        };

        if let Some(to) = update.status_request {
            let transition = status_validator::request_transition(
                &mut turn.case,
                to,
                update.closure_reason.as_deref(),
            )?;
            turn.status_transitions.push(transition);
        }

        if turn.case.is_terminal() {
            if has_investigation_content(update) {
                turn.warn(TurnWarning::new(
                    WarningKind::TerminalCase,
                    format!(
                        "case '{}' became {} this turn; investigation sub-updates ignored",
                        turn.case.case_id, turn.case.status
                    ),
                ));
            }
            if let Some(input) = &update.user_input {
                turn.case.last_user_input = Some(input.clone());
            }
        } else {
            turn.apply_investigation(update);
        }

        let record = progress::record_turn(case, &mut turn.case, update.outcome);

        if !turn.case.is_terminal() {
            turn.apply_degraded(update, record.progress_made);
            if let Some(transition) = status_validator::attempt_automatic(&mut turn.case) {
                turn.status_transitions.push(transition);
            }
        }
        if !turn.case.is_terminal() {
            turn.apply_escalation(case, update);
        }

        let advisories = if turn.case.is_terminal() {
            Vec::new()
        } else {
            hypotheses::detect_anchoring(&turn.case, &self.thresholds)
        };

        Ok(TurnResult {
            case: turn.case,
            record: Some(record),
            status_transitions: turn.status_transitions,
            path_selection: turn.path_selection,
            degraded_event: turn.degraded_event,
            escalation: turn.escalation,
            advisories,
            warnings: turn.warnings,
        })
    }

    /// Apply an explicit status change outside of a turn.
    pub fn request_transition(
        &self,
        case: &Case,
        to: CaseStatus,
        reason: Option<&str>,
    ) -> Result<(Case, CaseStatusTransition), EngineError> {
        let mut next = case.clone();
        let transition = status_validator::request_transition(&mut next, to, reason)?;
        Ok((next, transition))
    }
}

/// Caller-chosen ids carried by one update, per collection. Generated ids
/// skip these so an id-less draft never takes an id a later draft names.
#[derive(Debug, Default)]
struct ReservedIds {
    evidence: HashSet<String>,
    hypotheses: HashSet<String>,
    solutions: HashSet<String>,
    requests: HashSet<String>,
}

impl ReservedIds {
    fn from_update(update: &ProposedUpdate) -> Self {
        fn collect<'a>(ids: impl Iterator<Item = &'a Option<String>>) -> HashSet<String> {
            ids.flatten().cloned().collect()
        }
        Self {
            evidence: collect(update.evidence.iter().map(|d| &d.id)),
            hypotheses: collect(update.hypotheses.iter().map(|d| &d.id)),
            solutions: collect(update.solutions.iter().map(|d| &d.id)),
            requests: collect(update.evidence_requests.iter().map(|d| &d.id)),
        }
    }
}

/// Working state for a single turn.
struct Turn<'a> {
    engine: &'a Engine,
    case: Case,
    turn: u32,
    reserved: ReservedIds,
    status_transitions: Vec<CaseStatusTransition>,
    path_selection: Option<PathSelection>,
    degraded_event: Option<DegradedModeEvent>,
    escalation: Option<EscalationAdvisory>,
    warnings: Vec<TurnWarning>,
}

impl Turn<'_> {
    fn warn(&mut self, warning: TurnWarning) {
        tracing::warn!(case_id = %self.case.case_id, turn = self.turn, "{}", warning.message);
        self.warnings.push(warning);
    }

    fn apply_investigation(&mut self, update: &ProposedUpdate) {
        if let Some(input) = &update.user_input {
            self.case.last_user_input = Some(input.clone());
        }
        if let Some(verification) = &update.verification {
            self.merge_verification(verification);
        }
        let was_verified = self.case.progress.verification_complete();

        apply_milestones(&mut self.case.progress, &update.milestones);
        self.apply_solutions(update);
        let deferred_links = self.apply_evidence(update);
        self.apply_hypotheses(update, deferred_links);
        self.apply_requests(update);

        if let Some(draft) = &update.working_conclusion {
            self.case.working_conclusion = Some(self.conclusion(draft));
        }
        if let Some(draft) = &update.root_cause_conclusion {
            self.case.root_cause_conclusion = Some(self.conclusion(draft));
        }

        self.path_selection = path::maybe_select(&mut self.case, was_verified, self.turn);
    }

    fn merge_verification(&mut self, update: &VerificationUpdate) {
        let verification = &mut self.case.verification;
        if let Some(statement) = &update.symptom_statement {
            verification.symptom_statement = Some(statement.clone());
        }
        if let Some(temporal) = update.temporal_state {
            verification.temporal_state = Some(temporal);
        }
        if let Some(urgency) = update.urgency_level {
            verification.urgency_level = Some(urgency);
        }
        for service in &update.affected_services {
            if !verification.affected_services.contains(service) {
                verification.affected_services.push(service.clone());
            }
        }
    }

    fn mark(&mut self, milestones: &[Milestone]) {
        apply_milestones(
            &mut self.case.progress,
            &MilestoneUpdate::from_milestones(milestones),
        );
    }

    fn apply_solutions(&mut self, update: &ProposedUpdate) {
        for draft in &update.solutions {
            let id = draft.id.clone().unwrap_or_else(|| {
                next_id("sol", self.case.solutions.len(), |id| {
                    self.reserved.solutions.contains(id)
                        || self.case.solutions.iter().any(|s| s.id == id)
                })
            });
            self.case.solutions.push(Solution {
                id,
                description: draft.description.trim().to_string(),
                kind: draft.kind,
                status: SolutionStatus::Proposed,
                proposed_at_turn: self.turn,
                updated_at_turn: self.turn,
            });
            self.mark(&[Milestone::SolutionProposed]);
        }

        for change in &update.solution_updates {
            let turn = self.turn;
            let Some(solution) = self.case.solutions.iter_mut().find(|s| s.id == change.id) else {
                self.warn(EngineError::unknown("solution", &change.id).into());
                continue;
            };
            if solution.status.is_final() && solution.status != change.status {
                let message = format!(
                    "solution '{}' is already {:?}; update ignored",
                    solution.id, solution.status
                );
                self.warn(TurnWarning::new(WarningKind::RejectedSubUpdate, message));
                continue;
            }
            solution.status = change.status;
            solution.updated_at_turn = turn;
            let kind = solution.kind;
            if matches!(
                change.status,
                SolutionStatus::Applied | SolutionStatus::Succeeded
            ) {
                let milestone = match kind {
                    SolutionKind::Mitigation => Milestone::MitigationApplied,
                    SolutionKind::Fix | SolutionKind::Workaround => Milestone::SolutionApplied,
                };
                self.mark(&[milestone]);
            }
        }
    }

    /// Append evidence drafts in order. Returns the links implied by drafts
    /// that test a hypothesis, to be applied once hypotheses exist.
    fn apply_evidence(&mut self, update: &ProposedUpdate) -> Vec<EvidenceLinkDraft> {
        let mut deferred = Vec::new();
        for draft in &update.evidence {
            let category = classifier::classify(draft, &self.case);
            let advanced = classifier::advanced_milestones(draft, category, &self.case);

            let id = draft.id.clone().unwrap_or_else(|| {
                next_id("ev", self.case.evidence.len(), |id| {
                    self.reserved.evidence.contains(id) || self.case.evidence.contains(id)
                })
            });
            let added = self.case.evidence.push(Evidence {
                id: id.clone(),
                category,
                summary: draft.summary.trim().to_string(),
                analysis: draft.analysis.clone(),
                tests_hypothesis_id: draft.tests_hypothesis_id.clone(),
                stance: draft.stance,
                advances_milestones: advanced.clone(),
                collected_at_turn: self.turn,
                collected_by: draft
                    .collected_by
                    .clone()
                    .unwrap_or_else(|| DEFAULT_COLLECTOR.to_string()),
            });
            if !added {
                self.warn(TurnWarning::new(
                    WarningKind::RejectedSubUpdate,
                    format!("evidence id '{id}' is already taken; draft ignored"),
                ));
                continue;
            }
            self.mark(&advanced);

            if let (Some(hypothesis_id), Some(stance)) = (&draft.tests_hypothesis_id, draft.stance)
            {
                deferred.push(EvidenceLinkDraft {
                    hypothesis_id: hypothesis_id.clone(),
                    evidence_id: id,
                    stance,
                    reasoning: draft.summary.trim().to_string(),
                    completeness: draft.completeness.unwrap_or(DEFAULT_LINK_COMPLETENESS),
                });
            }
        }
        deferred
    }

    fn apply_hypotheses(&mut self, update: &ProposedUpdate, deferred: Vec<EvidenceLinkDraft>) {
        for draft in &update.hypotheses {
            let mut draft = draft.clone();
            if draft.id.is_none() {
                draft.id = Some(next_id("hyp", self.case.hypotheses.len(), |id| {
                    self.reserved.hypotheses.contains(id) || self.case.hypotheses.contains(id)
                }));
            }
            if let Err(err) = hypotheses::add_hypothesis(&mut self.case, &draft, self.turn) {
                self.warn(err.into());
            }
        }
        for change in &update.hypothesis_updates {
            if let Err(err) = hypotheses::update_hypothesis(&mut self.case, change, self.turn) {
                self.warn(err.into());
            }
        }
        let engine = self.engine;
        for link in update.evidence_links.iter().chain(deferred.iter()) {
            let linked =
                hypotheses::link_evidence(&mut self.case, link, &engine.thresholds, self.turn);
            if let Err(err) = linked {
                self.warn(err.into());
            }
        }
    }

    fn apply_requests(&mut self, update: &ProposedUpdate) {
        for draft in &update.evidence_requests {
            let id = draft.id.clone().unwrap_or_else(|| {
                next_id("req", self.case.evidence_requests.len(), |id| {
                    self.reserved.requests.contains(id)
                        || self.case.evidence_requests.iter().any(|r| r.id == id)
                })
            });
            self.case.evidence_requests.push(EvidenceRequest {
                id,
                description: draft.description.trim().to_string(),
                category: draft.category,
                status: RequestStatus::Pending,
                requested_at_turn: self.turn,
                updated_at_turn: self.turn,
            });
        }
        for change in &update.evidence_request_updates {
            let turn = self.turn;
            match self
                .case
                .evidence_requests
                .iter_mut()
                .find(|r| r.id == change.id)
            {
                Some(request) => {
                    request.status = change.status;
                    request.updated_at_turn = turn;
                }
                None => self.warn(EngineError::unknown("evidence request", &change.id).into()),
            }
        }
    }

    fn conclusion(&self, draft: &ConclusionDraft) -> Conclusion {
        Conclusion {
            statement: draft.statement.trim().to_string(),
            confidence: draft.confidence,
            updated_at_turn: self.turn,
        }
    }

    /// Explicit exit, automatic exit on progress, or entry on stall. At most
    /// one event per turn.
    fn apply_degraded(&mut self, update: &ProposedUpdate, progress_made: bool) {
        if let Some(reason) = &update.exit_degraded_mode {
            match degraded::exit(&mut self.case, reason.clone(), self.turn) {
                Ok(event) => self.degraded_event = Some(event),
                Err(err) => self.warn(err.into()),
            }
            return;
        }
        if progress_made && self.case.degraded_active() {
            if let Ok(event) = degraded::exit(&mut self.case, "progress resumed", self.turn) {
                self.degraded_event = Some(event);
            }
            return;
        }
        if let Some((mode_type, reason)) =
            degraded::should_enter(&self.case, &self.engine.thresholds)
        {
            if let Some(event) = degraded::enter(&mut self.case, mode_type, reason, self.turn) {
                tracing::warn!(
                    case_id = %self.case.case_id,
                    turn = self.turn,
                    mode = ?event.mode_type,
                    "entered degraded mode: {}",
                    event.reason
                );
                self.degraded_event = Some(event);
            }
        }
    }

    /// Resolve on request, then open a new escalation for the first firing
    /// trigger this case has not been escalated for yet.
    ///
    /// Nothing is opened in the turn that resolved an escalation.
    fn apply_escalation(&mut self, before: &Case, update: &ProposedUpdate) {
        if let Some(resolution) = &update.resolve_escalation {
            if let Err(err) = escalation::resolve_escalation(&mut self.case, resolution.clone()) {
                self.warn(err.into());
            }
        }
        if self.case.escalation_active() || before.escalation_active() {
            return;
        }
        let Some(decision) = escalation::pending_escalation(&self.case, &self.engine.thresholds)
        else {
            return;
        };
        if let Some(advisory) =
            escalation::open_escalation(&mut self.case, decision, &self.engine.routing)
        {
            tracing::warn!(
                case_id = %self.case.case_id,
                target = %advisory.target,
                trigger = ?advisory.trigger,
                "escalation recommended: {}",
                advisory.reason
            );
            self.escalation = Some(advisory);
        }
    }
}

/// Caller-chosen draft ids must not collide with ids already on the case.
fn check_id_collisions(case: &Case, update: &ProposedUpdate) -> Result<(), EngineError> {
    let taken = |field: &str, idx: usize, id: &Option<String>, exists: bool| {
        match (id, exists) {
            (Some(id), true) => Err(EngineError::validation(
                format!("{field}[{idx}].id"),
                format!("id '{id}' already exists on the case"),
            )),
            _ => Ok(()),
        }
    };
    for (idx, draft) in update.evidence.iter().enumerate() {
        let exists = draft.id.as_deref().is_some_and(|id| case.evidence.contains(id));
        taken("evidence", idx, &draft.id, exists)?;
    }
    for (idx, draft) in update.hypotheses.iter().enumerate() {
        let exists = draft
            .id
            .as_deref()
            .is_some_and(|id| case.hypotheses.contains(id));
        taken("hypotheses", idx, &draft.id, exists)?;
    }
    for (idx, draft) in update.solutions.iter().enumerate() {
        let exists = draft
            .id
            .as_deref()
            .is_some_and(|id| case.solutions.iter().any(|s| s.id == id));
        taken("solutions", idx, &draft.id, exists)?;
    }
    for (idx, draft) in update.evidence_requests.iter().enumerate() {
        let exists = draft
            .id
            .as_deref()
            .is_some_and(|id| case.evidence_requests.iter().any(|r| r.id == id));
        taken("evidence_requests", idx, &draft.id, exists)?;
    }
    Ok(())
}

/// True when the update carries anything beyond status, outcome and user input.
fn has_investigation_content(update: &ProposedUpdate) -> bool {
    let bare = ProposedUpdate {
        outcome: update.outcome,
        status_request: update.status_request,
        closure_reason: update.closure_reason.clone(),
        user_input: update.user_input.clone(),
        ..ProposedUpdate::default()
    };
    *update != bare
}
