//! Escalation triggers and on-call routing.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::case::{Case, EscalationState};
use crate::core::degraded;
use crate::core::error::EngineError;
use crate::core::types::{
    EscalationTrigger, InvestigationPath, RequestStatus, Routing, SolutionKind, SolutionStatus,
    Thresholds,
};

static ESCALATION_REQUEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(escalate|escalation|talk to (a|an) (human|engineer|person)|speak (to|with) (a|an) (human|engineer|person)|page (the )?on-?call|get (a|an) (human|engineer))\b",
    )
    .unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationDecision {
    pub trigger: EscalationTrigger,
    pub reason: String,
}

/// Returned to the caller when a case is escalated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationAdvisory {
    pub trigger: EscalationTrigger,
    pub reason: String,
    pub target: String,
}

/// Every escalation trigger that fires for `case`, in priority order.
pub fn escalation_triggers(case: &Case, thresholds: &Thresholds) -> Vec<EscalationDecision> {
    let mut fired = Vec::new();
    if case.turn_count >= thresholds.escalation_turn_limit && !case.progress.root_cause_identified
    {
        fired.push(EscalationDecision {
            trigger: EscalationTrigger::TurnLimit,
            reason: format!(
                "{} turns without an identified root cause",
                case.turn_count
            ),
        });
    }

    let blocked = case
        .evidence_requests
        .iter()
        .filter(|r| r.status == RequestStatus::Blocked && r.category.is_critical())
        .count();
    if blocked >= thresholds.blocked_critical_requests {
        fired.push(EscalationDecision {
            trigger: EscalationTrigger::BlockedCriticalEvidence,
            reason: format!("{blocked} critical evidence requests are blocked"),
        });
    }

    let mitigation_first = case
        .path_selection
        .as_ref()
        .is_some_and(|s| s.path == InvestigationPath::MitigationFirst);
    if mitigation_first {
        let mitigations = || {
            case.solutions
                .iter()
                .filter(|s| s.kind == SolutionKind::Mitigation)
        };
        let failed = mitigations()
            .filter(|s| s.status == SolutionStatus::Failed)
            .count();
        let succeeded = mitigations().any(|s| s.status == SolutionStatus::Succeeded);
        if failed >= thresholds.failed_mitigations && !succeeded {
            fired.push(EscalationDecision {
                trigger: EscalationTrigger::FailedMitigations,
                reason: format!("{failed} mitigations failed and none succeeded"),
            });
        }
    }

    if case
        .last_user_input
        .as_deref()
        .is_some_and(|input| ESCALATION_REQUEST_RE.is_match(input))
    {
        fired.push(EscalationDecision {
            trigger: EscalationTrigger::UserRequested,
            reason: "user asked for escalation".to_string(),
        });
    }

    if let Some((_, reason)) = degraded::should_enter(case, thresholds) {
        fired.push(EscalationDecision {
            trigger: EscalationTrigger::Stalled,
            reason: format!("investigation stalled: {reason}"),
        });
    }
    fired
}

/// First escalation trigger that fires for `case`, checked in priority order.
pub fn should_escalate(case: &Case, thresholds: &Thresholds) -> Option<EscalationDecision> {
    escalation_triggers(case, thresholds).into_iter().next()
}

/// First firing trigger this case has not been escalated for yet.
///
/// Each trigger escalates at most once per case, so a resolved
/// higher-priority trigger does not hide a lower one that fires later.
pub fn pending_escalation(case: &Case, thresholds: &Thresholds) -> Option<EscalationDecision> {
    escalation_triggers(case, thresholds)
        .into_iter()
        .find(|decision| !case.escalated_triggers.contains(&decision.trigger))
}

/// Pick the escalation target from affected services and the symptom statement.
pub fn route_target(case: &Case, routing: &Routing) -> String {
    let mut haystack = case.verification.affected_services.join(" ");
    if let Some(statement) = &case.verification.symptom_statement {
        haystack.push(' ');
        haystack.push_str(statement);
    }
    let haystack = haystack.to_lowercase();

    routing
        .rules
        .iter()
        .find(|rule| {
            rule.keywords
                .iter()
                .any(|keyword| haystack.contains(&keyword.to_lowercase()))
        })
        .map(|rule| rule.target.clone())
        .unwrap_or_else(|| routing.default_target.clone())
}

/// Open an escalation for `decision`. Returns `None` if one is already active.
pub fn open_escalation(
    case: &mut Case,
    decision: EscalationDecision,
    routing: &Routing,
) -> Option<EscalationAdvisory> {
    if case.escalation_active() {
        return None;
    }
    let target = route_target(case, routing);
    case.escalation_state = Some(EscalationState {
        trigger: decision.trigger,
        reason: decision.reason.clone(),
        target: target.clone(),
        entered_at: case.turn_count,
        resolved_at: None,
        resolution: None,
    });
    if !case.escalated_triggers.contains(&decision.trigger) {
        case.escalated_triggers.push(decision.trigger);
    }
    Some(EscalationAdvisory {
        trigger: decision.trigger,
        reason: decision.reason,
        target,
    })
}

/// Mark the active escalation resolved.
pub fn resolve_escalation(
    case: &mut Case,
    resolution: impl Into<String>,
) -> Result<(), EngineError> {
    let turn = case.turn_count;
    let state = case
        .escalation_state
        .as_mut()
        .filter(|state| state.is_active())
        .ok_or_else(|| EngineError::InvalidOperation("no active escalation".to_string()))?;
    state.resolved_at = Some(turn);
    state.resolution = Some(resolution.into());
    Ok(())
}
