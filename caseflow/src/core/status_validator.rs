//! Case status transition table.
//!
//! ```text
//! Consulting    -> Investigating | Closed
//! Investigating -> Resolved | Closed
//! Resolved, Closed: terminal
//! ```

use serde::Serialize;

use crate::case::Case;
use crate::core::error::EngineError;
use crate::core::types::CaseStatus;

/// A status change applied to a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseStatusTransition {
    pub from: CaseStatus,
    pub to: CaseStatus,
    pub automatic: bool,
    pub reason: Option<String>,
    pub at_turn: u32,
}

pub fn allowed_transitions(from: CaseStatus) -> &'static [CaseStatus] {
    match from {
        CaseStatus::Consulting => &[CaseStatus::Investigating, CaseStatus::Closed],
        CaseStatus::Investigating => &[CaseStatus::Resolved, CaseStatus::Closed],
        CaseStatus::Resolved | CaseStatus::Closed => &[],
    }
}

pub fn validate_transition(from: CaseStatus, to: CaseStatus) -> Result<(), EngineError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition { from, to })
    }
}

/// Apply an explicitly requested transition.
///
/// Closing records the supplied reason (default `closed`); resolving records
/// `resolved`. Both stamp the current turn.
pub fn request_transition(
    case: &mut Case,
    to: CaseStatus,
    reason: Option<&str>,
) -> Result<CaseStatusTransition, EngineError> {
    let from = case.status;
    validate_transition(from, to)?;
    let reason = apply_status(case, to, reason);
    Ok(CaseStatusTransition {
        from,
        to,
        automatic: false,
        reason,
        at_turn: case.turn_count,
    })
}

/// Resolve an investigating case whose fix has been verified.
pub fn attempt_automatic(case: &mut Case) -> Option<CaseStatusTransition> {
    if case.status != CaseStatus::Investigating || !case.progress.solution_verified {
        return None;
    }
    let reason = apply_status(case, CaseStatus::Resolved, None);
    Some(CaseStatusTransition {
        from: CaseStatus::Investigating,
        to: CaseStatus::Resolved,
        automatic: true,
        reason,
        at_turn: case.turn_count,
    })
}

fn apply_status(case: &mut Case, to: CaseStatus, reason: Option<&str>) -> Option<String> {
    case.status = to;
    let turn = case.turn_count;
    match to {
        CaseStatus::Resolved => {
            case.resolved_at = Some(turn);
            case.closed_at = Some(turn);
            case.closure_reason = Some("resolved".to_string());
        }
        CaseStatus::Closed => {
            case.closed_at = Some(turn);
            case.closure_reason = Some(reason.unwrap_or("closed").to_string());
        }
        CaseStatus::Consulting | CaseStatus::Investigating => {}
    }
    case.closure_reason.clone().filter(|_| to.is_terminal())
}
