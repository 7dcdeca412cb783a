//! The case aggregate: one investigation and all of its sub-entities.
//!
//! Every `*_at` field holds a turn number rather than a wall-clock time so
//! that turn application stays deterministic.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::core::types::{
    CaseStatus, DegradedModeType, EscalationTrigger, EvidenceCategory, HypothesisStatus,
    InvestigationPath, Milestone, RequestCategory, RequestStatus, RootCauseMethod, SolutionKind,
    SolutionStatus, Stance, TemporalState, TurnOutcome, UrgencyLevel,
};

/// Items stored in an [`Arena`] expose a stable string key.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// Append-only vector with an id → index map.
///
/// Items are never removed or resequenced. The index is not persisted; it is
/// rebuilt when the arena is deserialized, and duplicate keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<T>", into = "Vec<T>")]
#[serde(bound(
    serialize = "T: Serialize + Clone",
    deserialize = "T: Deserialize<'de> + Keyed"
))]
pub struct Arena<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Keyed> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `item`. Returns `false` (and drops the item) if its key is taken.
    pub fn push(&mut self, item: T) -> bool {
        if self.index.contains_key(item.key()) {
            return false;
        }
        self.index.insert(item.key().to_string(), self.items.len());
        self.items.push(item);
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.index.get(key).map(|&idx| &self.items[idx])
    }

    /// Mutable access for in-place updates. Callers must not change the key.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        match self.index.get(key) {
            Some(&idx) => Some(&mut self.items[idx]),
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.key())
    }
}

impl<T: Keyed> TryFrom<Vec<T>> for Arena<T> {
    type Error = String;

    fn try_from(items: Vec<T>) -> Result<Self, Self::Error> {
        let mut arena = Arena::default();
        for item in items {
            let key = item.key().to_string();
            if !arena.push(item) {
                return Err(format!("duplicate id '{key}'"));
            }
        }
        Ok(arena)
    }
}

impl<T> From<Arena<T>> for Vec<T> {
    fn from(arena: Arena<T>) -> Self {
        arena.items
    }
}

impl<'a, T> IntoIterator for &'a Arena<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub case_id: String,
    pub title: String,
    pub status: CaseStatus,
    pub progress: InvestigationProgress,
    pub verification: Verification,
    pub turn_count: u32,
    pub turns_without_progress: u32,
    pub path_selection: Option<PathSelection>,
    pub evidence: Arena<Evidence>,
    pub hypotheses: Arena<Hypothesis>,
    pub solutions: Vec<Solution>,
    pub evidence_requests: Vec<EvidenceRequest>,
    pub working_conclusion: Option<Conclusion>,
    pub root_cause_conclusion: Option<Conclusion>,
    pub degraded_mode: Option<DegradedMode>,
    pub escalation_state: Option<EscalationState>,
    /// Triggers this case has been escalated for, in the order they opened.
    #[serde(default)]
    pub escalated_triggers: Vec<EscalationTrigger>,
    pub last_user_input: Option<String>,
    pub resolved_at: Option<u32>,
    pub closed_at: Option<u32>,
    pub closure_reason: Option<String>,
    pub turn_history: Vec<TurnRecord>,
}

impl Case {
    /// A fresh case in `Consulting` with every sub-entity empty.
    pub fn new(case_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            case_id: case_id.into(),
            title: title.into(),
            status: CaseStatus::Consulting,
            progress: InvestigationProgress::default(),
            verification: Verification::default(),
            turn_count: 0,
            turns_without_progress: 0,
            path_selection: None,
            evidence: Arena::new(),
            hypotheses: Arena::new(),
            solutions: Vec::new(),
            evidence_requests: Vec::new(),
            working_conclusion: None,
            root_cause_conclusion: None,
            degraded_mode: None,
            escalation_state: None,
            escalated_triggers: Vec::new(),
            last_user_input: None,
            resolved_at: None,
            closed_at: None,
            closure_reason: None,
            turn_history: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn degraded_active(&self) -> bool {
        self.degraded_mode.as_ref().is_some_and(DegradedMode::is_active)
    }

    pub fn escalation_active(&self) -> bool {
        self.escalation_state
            .as_ref()
            .is_some_and(EscalationState::is_active)
    }
}

/// Milestone flags plus root-cause metadata.
///
/// Once a flag is `true` it never reverts; only the milestone tracker sets flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestigationProgress {
    pub symptom_verified: bool,
    pub scope_assessed: bool,
    pub timeline_established: bool,
    pub changes_identified: bool,
    pub root_cause_identified: bool,
    pub solution_proposed: bool,
    pub solution_applied: bool,
    pub solution_verified: bool,
    pub mitigation_applied: bool,
    pub root_cause_confidence: f64,
    pub root_cause_method: Option<RootCauseMethod>,
}

impl InvestigationProgress {
    pub fn is_complete(&self, milestone: Milestone) -> bool {
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

    pub(crate) fn mark(&mut self, milestone: Milestone) {
        let flag = match milestone {
            Milestone::SymptomVerified => &mut self.symptom_verified,
            Milestone::TimelineEstablished => &mut self.timeline_established,
            Milestone::ScopeAssessed => &mut self.scope_assessed,
            Milestone::ChangesIdentified => &mut self.changes_identified,
            Milestone::RootCauseIdentified => &mut self.root_cause_identified,
            Milestone::SolutionProposed => &mut self.solution_proposed,
            Milestone::SolutionApplied => &mut self.solution_applied,
            Milestone::SolutionVerified => &mut self.solution_verified,
            Milestone::MitigationApplied => &mut self.mitigation_applied,
        };
        *flag = true;
    }

    /// Symptom, scope and timeline are all established.
    pub fn verification_complete(&self) -> bool {
        self.symptom_verified && self.scope_assessed && self.timeline_established
    }

    /// Completed milestones in canonical order.
    pub fn completed(&self) -> Vec<Milestone> {
        Milestone::ALL
            .into_iter()
            .filter(|m| self.is_complete(*m))
            .collect()
    }
}

/// Problem-verification facts reported by the oracle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Verification {
    pub symptom_statement: Option<String>,
    pub temporal_state: Option<TemporalState>,
    pub urgency_level: Option<UrgencyLevel>,
    pub affected_services: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: String,
    pub category: EvidenceCategory,
    pub summary: String,
    pub analysis: Option<String>,
    pub tests_hypothesis_id: Option<String>,
    pub stance: Option<Stance>,
    pub advances_milestones: Vec<Milestone>,
    pub collected_at_turn: u32,
    pub collected_by: String,
}

impl Keyed for Evidence {
    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceLink {
    pub stance: Stance,
    pub reasoning: String,
    pub completeness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: String,
    pub statement: String,
    pub category: String,
    pub status: HypothesisStatus,
    pub likelihood: f64,
    pub evidence_links: BTreeMap<String, EvidenceLink>,
    pub created_at_turn: u32,
    pub updated_at_turn: u32,
}

impl Keyed for Hypothesis {
    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub id: String,
    pub description: String,
    pub kind: SolutionKind,
    pub status: SolutionStatus,
    pub proposed_at_turn: u32,
    pub updated_at_turn: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRequest {
    pub id: String,
    pub description: String,
    pub category: RequestCategory,
    pub status: RequestStatus,
    pub requested_at_turn: u32,
    pub updated_at_turn: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conclusion {
    pub statement: String,
    pub confidence: f64,
    pub updated_at_turn: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSelection {
    pub path: InvestigationPath,
    pub auto_selected: bool,
    pub rationale: String,
    pub selected_at_turn: u32,
}

/// Immutable record of one applied turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn_number: u32,
    pub milestones_completed: Vec<Milestone>,
    pub evidence_added: Vec<String>,
    pub hypotheses_generated: Vec<String>,
    /// Hypotheses that became Validated or Refuted during this turn.
    pub hypotheses_concluded: Vec<String>,
    pub progress_made: bool,
    pub outcome: TurnOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedMode {
    pub mode_type: DegradedModeType,
    pub reason: String,
    pub entered_at: u32,
    pub exited_at: Option<u32>,
    pub exit_reason: Option<String>,
}

impl DegradedMode {
    pub fn is_active(&self) -> bool {
        self.exited_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationState {
    pub trigger: EscalationTrigger,
    pub reason: String,
    pub target: String,
    pub entered_at: u32,
    pub resolved_at: Option<u32>,
    pub resolution: Option<String>,
}

impl EscalationState {
    pub fn is_active(&self) -> bool {
        self.resolved_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::evidence;

    #[test]
    fn new_case_starts_consulting_and_empty() {
        let case = Case::new("case-1", "Checkout errors");
        assert_eq!(case.status, CaseStatus::Consulting);
        assert!(case.evidence.is_empty());
        assert!(case.hypotheses.is_empty());
        assert!(case.turn_history.is_empty());
        assert!(!case.progress.verification_complete());
    }

    #[test]
    fn arena_rejects_duplicate_keys() {
        let mut arena = Arena::new();
        assert!(arena.push(evidence("ev-1", EvidenceCategory::Symptom)));
        assert!(!arena.push(evidence("ev-1", EvidenceCategory::Causal)));
        assert_eq!(arena.len(), 1);
        assert_eq!(
            arena.get("ev-1").map(|e| e.category),
            Some(EvidenceCategory::Symptom)
        );
    }

    #[test]
    fn arena_index_is_rebuilt_after_deserialize() {
        let mut case = Case::new("case-1", "t");
        case.evidence.push(evidence("ev-1", EvidenceCategory::Symptom));
        case.evidence.push(evidence("ev-2", EvidenceCategory::Other));

        let json = serde_json::to_string(&case).expect("serialize");
        let loaded: Case = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(loaded, case);
        assert!(loaded.evidence.contains("ev-2"));
        assert_eq!(loaded.evidence.keys().collect::<Vec<_>>(), vec!["ev-1", "ev-2"]);
    }

    #[test]
    fn duplicate_ids_in_persisted_arena_fail_to_load() {
        let items = vec![
            evidence("ev-1", EvidenceCategory::Symptom),
            evidence("ev-1", EvidenceCategory::Symptom),
        ];
        let json = serde_json::to_string(&items).expect("serialize");
        let err = serde_json::from_str::<Arena<Evidence>>(&json).expect_err("duplicate");
        assert!(err.to_string().contains("duplicate id 'ev-1'"));
    }

    #[test]
    fn completed_milestones_follow_canonical_order() {
        let mut progress = InvestigationProgress::default();
        progress.mark(Milestone::RootCauseIdentified);
        progress.mark(Milestone::SymptomVerified);
        assert_eq!(
            progress.completed(),
            vec![Milestone::SymptomVerified, Milestone::RootCauseIdentified]
        );
    }
}
