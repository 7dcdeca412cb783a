//! Stall detection and degraded-mode bookkeeping.

use serde::Serialize;

use crate::case::{Case, DegradedMode};
use crate::core::error::EngineError;
use crate::core::types::{DegradedModeType, HypothesisStatus, Thresholds};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedEventKind {
    Entered,
    Exited,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedModeEvent {
    pub kind: DegradedEventKind,
    pub mode_type: DegradedModeType,
    pub reason: String,
    pub turn: u32,
}

/// Stall condition for `case`, if any. No-progress takes precedence.
pub fn should_enter(case: &Case, thresholds: &Thresholds) -> Option<(DegradedModeType, String)> {
    if case.turns_without_progress >= thresholds.stall_turns {
        return Some((
            DegradedModeType::NoProgress,
            format!(
                "{} consecutive turns without progress",
                case.turns_without_progress
            ),
        ));
    }

    let total = case.hypotheses.len();
    if total >= thresholds.inconclusive_hypotheses
        && case
            .hypotheses
            .iter()
            .all(|h| h.status == HypothesisStatus::Inconclusive)
    {
        return Some((
            DegradedModeType::HypothesesInconclusive,
            format!("all {total} hypotheses are inconclusive"),
        ));
    }

    None
}

/// Enter degraded mode. A no-op returning `None` while a mode is already active.
pub fn enter(
    case: &mut Case,
    mode_type: DegradedModeType,
    reason: impl Into<String>,
    turn: u32,
) -> Option<DegradedModeEvent> {
    if case.degraded_active() {
        return None;
    }
    let reason = reason.into();
    case.degraded_mode = Some(DegradedMode {
        mode_type,
        reason: reason.clone(),
        entered_at: turn,
        exited_at: None,
        exit_reason: None,
    });
    Some(DegradedModeEvent {
        kind: DegradedEventKind::Entered,
        mode_type,
        reason,
        turn,
    })
}

/// Exit the active degraded mode. The record stays on the case, inert.
pub fn exit(
    case: &mut Case,
    reason: impl Into<String>,
    turn: u32,
) -> Result<DegradedModeEvent, EngineError> {
    let mode = case
        .degraded_mode
        .as_mut()
        .filter(|mode| mode.is_active())
        .ok_or_else(|| EngineError::InvalidOperation("degraded mode is not active".to_string()))?;
    let reason = reason.into();
    mode.exited_at = Some(turn);
    mode.exit_reason = Some(reason.clone());
    Ok(DegradedModeEvent {
        kind: DegradedEventKind::Exited,
        mode_type: mode.mode_type,
        reason,
        turn,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::hypothesis;

    #[test]
    fn three_idle_turns_stall() {
        let thresholds = Thresholds::default();
        let mut case = Case::new("c", "t");
        case.turns_without_progress = 2;
        assert_eq!(should_enter(&case, &thresholds), None);
        case.turns_without_progress = 3;
        assert_eq!(
            should_enter(&case, &thresholds).map(|(kind, _)| kind),
            Some(DegradedModeType::NoProgress)
        );
    }

    #[test]
    fn all_inconclusive_hypotheses_stall() {
        let thresholds = Thresholds::default();
        let mut case = Case::new("c", "t");
        for id in ["h1", "h2"] {
            case.hypotheses
                .push(hypothesis(id, "code", HypothesisStatus::Inconclusive));
        }
        assert_eq!(should_enter(&case, &thresholds), None);

        case.hypotheses
            .push(hypothesis("h3", "config", HypothesisStatus::Active));
        assert_eq!(should_enter(&case, &thresholds), None);

        let mut case = Case::new("c", "t");
        for id in ["h1", "h2", "h3"] {
            case.hypotheses
                .push(hypothesis(id, "code", HypothesisStatus::Inconclusive));
        }
        assert_eq!(
            should_enter(&case, &thresholds).map(|(kind, _)| kind),
            Some(DegradedModeType::HypothesesInconclusive)
        );
    }

    #[test]
    fn enter_is_idempotent_while_active() {
        let mut case = Case::new("c", "t");
        let event = enter(&mut case, DegradedModeType::NoProgress, "stalled", 3).expect("entered");
        assert_eq!(event.kind, DegradedEventKind::Entered);
        let snapshot = case.degraded_mode.clone();

        assert_eq!(
            enter(&mut case, DegradedModeType::HypothesesInconclusive, "again", 4),
            None
        );
        assert_eq!(case.degraded_mode, snapshot);
    }

    #[test]
    fn exit_requires_active_mode() {
        let mut case = Case::new("c", "t");
        assert!(matches!(
            exit(&mut case, "done", 1),
            Err(EngineError::InvalidOperation(_))
        ));

        enter(&mut case, DegradedModeType::NoProgress, "stalled", 3);
        let event = exit(&mut case, "user re-engaged", 5).expect("exit");
        assert_eq!(event.kind, DegradedEventKind::Exited);
        assert!(!case.degraded_active());
        assert_eq!(case.degraded_mode.as_ref().and_then(|m| m.exited_at), Some(5));

        assert!(exit(&mut case, "again", 6).is_err());
    }

    #[test]
    fn re_entry_replaces_the_inert_record() {
        let mut case = Case::new("c", "t");
        enter(&mut case, DegradedModeType::NoProgress, "stalled", 3);
        exit(&mut case, "resumed", 4).expect("exit");
        enter(&mut case, DegradedModeType::HypothesesInconclusive, "again", 7).expect("re-enter");
        let mode = case.degraded_mode.as_ref().expect("mode");
        assert_eq!(mode.entered_at, 7);
        assert!(mode.is_active());
    }
}
