//! Shared deterministic types for the investigation core.
//!
//! Every loosely-typed tag an oracle can send (status, category, stance, ...)
//! is a closed enum here. Unknown values fail at deserialization and never
//! reach a stored case.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Consulting,
    Investigating,
    Resolved,
    Closed,
}

impl CaseStatus {
    /// Resolved and Closed have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, CaseStatus::Resolved | CaseStatus::Closed)
    }

    pub fn label(self) -> &'static str {
        match self {
            CaseStatus::Consulting => "consulting",
            CaseStatus::Investigating => "investigating",
            CaseStatus::Resolved => "resolved",
            CaseStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CaseStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "consulting" => Ok(CaseStatus::Consulting),
            "investigating" => Ok(CaseStatus::Investigating),
            "resolved" => Ok(CaseStatus::Resolved),
            "closed" => Ok(CaseStatus::Closed),
            other => Err(format!("unknown case status '{other}'")),
        }
    }
}

/// Boolean progress facts. Declaration order is the canonical diff order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    SymptomVerified,
    TimelineEstablished,
    ScopeAssessed,
    ChangesIdentified,
    RootCauseIdentified,
    SolutionProposed,
    SolutionApplied,
    SolutionVerified,
    MitigationApplied,
}

impl Milestone {
    pub const ALL: [Milestone; 9] = [
        Milestone::SymptomVerified,
        Milestone::TimelineEstablished,
        Milestone::ScopeAssessed,
        Milestone::ChangesIdentified,
        Milestone::RootCauseIdentified,
        Milestone::SolutionProposed,
        Milestone::SolutionApplied,
        Milestone::SolutionVerified,
        Milestone::MitigationApplied,
    ];

    /// Milestones that count toward `completion_percentage`.
    /// `MitigationApplied` is path-specific and excluded.
    pub const CORE: [Milestone; 8] = [
        Milestone::SymptomVerified,
        Milestone::TimelineEstablished,
        Milestone::ScopeAssessed,
        Milestone::ChangesIdentified,
        Milestone::RootCauseIdentified,
        Milestone::SolutionProposed,
        Milestone::SolutionApplied,
        Milestone::SolutionVerified,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Milestone::SymptomVerified => "symptom_verified",
            Milestone::TimelineEstablished => "timeline_established",
            Milestone::ScopeAssessed => "scope_assessed",
            Milestone::ChangesIdentified => "changes_identified",
            Milestone::RootCauseIdentified => "root_cause_identified",
            Milestone::SolutionProposed => "solution_proposed",
            Milestone::SolutionApplied => "solution_applied",
            Milestone::SolutionVerified => "solution_verified",
            Milestone::MitigationApplied => "mitigation_applied",
        }
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Derived investigation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Understanding,
    Diagnosing,
    Resolving,
}

/// Category of a piece of evidence. Always inferred, never supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceCategory {
    Symptom,
    Causal,
    Resolution,
    Other,
}

/// How a piece of evidence bears on a hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    StronglySupports,
    Supports,
    Neutral,
    Contradicts,
    StronglyContradicts,
    Irrelevant,
}

impl Stance {
    pub fn is_supporting(self) -> bool {
        matches!(self, Stance::StronglySupports | Stance::Supports)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisStatus {
    Captured,
    Active,
    Validated,
    Refuted,
    Inconclusive,
    Retired,
}

impl HypothesisStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            HypothesisStatus::Validated | HypothesisStatus::Refuted | HypothesisStatus::Retired
        )
    }

    /// Transitions only move toward a terminal status. `Inconclusive` may be
    /// re-entered any number of times; `Captured` is never re-entered.
    pub fn can_transition_to(self, next: HypothesisStatus) -> bool {
        if self.is_terminal() || next == HypothesisStatus::Captured {
            return false;
        }
        match self {
            HypothesisStatus::Captured => true,
            HypothesisStatus::Active => next != HypothesisStatus::Active,
            HypothesisStatus::Inconclusive => true,
            _ => false,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HypothesisStatus::Captured => "captured",
            HypothesisStatus::Active => "active",
            HypothesisStatus::Validated => "validated",
            HypothesisStatus::Refuted => "refuted",
            HypothesisStatus::Inconclusive => "inconclusive",
            HypothesisStatus::Retired => "retired",
        }
    }
}

impl fmt::Display for HypothesisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalState {
    Ongoing,
    Historical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationPath {
    MitigationFirst,
    RootCause,
    UserChoice,
}

/// Oracle-declared classification of what happened in a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    MilestoneCompleted,
    DataProvided,
    DataRequested,
    DataNotProvided,
    HypothesisTested,
    CaseResolved,
    Conversation,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCauseMethod {
    DirectEvidence,
    HypothesisValidation,
    Correlation,
    Elimination,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionKind {
    Mitigation,
    Fix,
    Workaround,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionStatus {
    Proposed,
    Applied,
    Succeeded,
    Failed,
}

impl SolutionStatus {
    pub fn is_final(self) -> bool {
        matches!(self, SolutionStatus::Succeeded | SolutionStatus::Failed)
    }
}

/// Kind of data the investigation asked the user for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestCategory {
    Symptoms,
    Timeline,
    Changes,
    Configuration,
    Scope,
    Metrics,
    Environment,
}

impl RequestCategory {
    /// Categories without which diagnosis cannot proceed.
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            RequestCategory::Symptoms | RequestCategory::Timeline | RequestCategory::Changes
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Partial,
    Complete,
    Blocked,
    Obsolete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedModeType {
    /// Too many consecutive turns without measurable progress.
    NoProgress,
    /// Every tracked hypothesis ended up inconclusive.
    HypothesesInconclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTrigger {
    TurnLimit,
    BlockedCriticalEvidence,
    FailedMitigations,
    UserRequested,
    Stalled,
}

/// Numeric policy knobs used by the stall, anchoring, and escalation checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Consecutive no-progress turns before degraded mode.
    pub stall_turns: u32,
    /// Minimum hypothesis count for the all-inconclusive stall.
    pub inconclusive_hypotheses: usize,
    /// Refuted/inconclusive hypotheses in one category before an anchoring advisory.
    pub anchoring_failures: usize,
    /// Number of most recent evidence items inspected for purpose anchoring.
    pub purpose_window: usize,
    /// Neutral links below this completeness are discarded.
    pub neutral_link_min_completeness: f64,
    /// Turns without an identified root cause before escalation.
    pub escalation_turn_limit: u32,
    /// Blocked critical evidence requests before escalation.
    pub blocked_critical_requests: usize,
    /// Failed mitigations on the mitigation-first path before escalation.
    pub failed_mitigations: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            stall_turns: 3,
            inconclusive_hypotheses: 3,
            anchoring_failures: 4,
            purpose_window: 4,
            neutral_link_min_completeness: 0.3,
            escalation_turn_limit: 10,
            blocked_critical_requests: 3,
            failed_mitigations: 3,
        }
    }
}

/// One keyword group mapped to an escalation target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub keywords: Vec<String>,
    pub target: String,
}

/// Ordered routing table; the first rule with a matching keyword wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Routing {
    pub rules: Vec<RouteRule>,
    pub default_target: String,
}

impl Default for Routing {
    fn default() -> Self {
        let rule = |keywords: &[&str], target: &str| RouteRule {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            target: target.to_string(),
        };
        Self {
            rules: vec![
                rule(
                    &["database", "postgres", "mysql", "sql", "redis"],
                    "database-oncall",
                ),
                rule(&["network", "dns", "load balancer", "latency"], "network-oncall"),
                rule(&["platform", "kubernetes", "k8s", "container"], "platform-oncall"),
                rule(&["cloud", "aws", "gcp", "azure"], "cloud-oncall"),
            ],
            default_target: "oncall".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_status_parses_case_insensitively() {
        assert_eq!(
            "Investigating".parse::<CaseStatus>(),
            Ok(CaseStatus::Investigating)
        );
        assert!("open".parse::<CaseStatus>().is_err());
    }

    #[test]
    fn terminal_hypotheses_accept_no_transition() {
        for next in [
            HypothesisStatus::Active,
            HypothesisStatus::Inconclusive,
            HypothesisStatus::Validated,
        ] {
            assert!(!HypothesisStatus::Refuted.can_transition_to(next));
            assert!(!HypothesisStatus::Validated.can_transition_to(next));
        }
    }

    #[test]
    fn inconclusive_can_repeat_but_captured_is_never_reentered() {
        assert!(HypothesisStatus::Inconclusive.can_transition_to(HypothesisStatus::Inconclusive));
        assert!(HypothesisStatus::Inconclusive.can_transition_to(HypothesisStatus::Active));
        assert!(!HypothesisStatus::Active.can_transition_to(HypothesisStatus::Captured));
    }

    #[test]
    fn unknown_tags_are_rejected() {
        let err = serde_json::from_str::<Stance>("\"kinda_supports\"");
        assert!(err.is_err());
    }
}
