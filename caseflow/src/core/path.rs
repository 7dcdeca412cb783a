//! Investigation path selection from temporal state and urgency.

use crate::case::{Case, PathSelection};
use crate::core::types::{InvestigationPath, TemporalState, UrgencyLevel};

/// Pure result of the path matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDecision {
    pub path: InvestigationPath,
    pub auto_selected: bool,
    pub rationale: String,
}

/// Map (temporal state, urgency) to an investigation path.
///
/// Ongoing incidents with high stakes go straight to mitigation; historical
/// low-stakes ones go to root cause. Mixed signals defer to the user, as does
/// any missing input.
pub fn select_path(
    temporal: Option<TemporalState>,
    urgency: Option<UrgencyLevel>,
) -> PathDecision {
    let (temporal, urgency) = match (temporal, urgency) {
        (Some(temporal), Some(urgency)) => (temporal, urgency),
        (None, _) => return user_choice("temporal state is unknown"),
        (_, None) => return user_choice("urgency level is unknown"),
    };

    let high = matches!(urgency, UrgencyLevel::Critical | UrgencyLevel::High);
    match (temporal, high) {
        (TemporalState::Ongoing, true) => PathDecision {
            path: InvestigationPath::MitigationFirst,
            auto_selected: true,
            rationale: format!(
                "ongoing incident at {} urgency: mitigate first",
                urgency_label(urgency)
            ),
        },
        (TemporalState::Historical, false) => PathDecision {
            path: InvestigationPath::RootCause,
            auto_selected: true,
            rationale: format!(
                "historical incident at {} urgency: investigate root cause",
                urgency_label(urgency)
            ),
        },
        (TemporalState::Ongoing, false) => user_choice(&format!(
            "ongoing incident at {} urgency",
            urgency_label(urgency)
        )),
        (TemporalState::Historical, true) => user_choice(&format!(
            "historical incident at {} urgency",
            urgency_label(urgency)
        )),
    }
}

/// Select a path on the turn verification first completes.
///
/// Returns the new selection, or `None` when verification was already
/// complete before the turn, is still incomplete, or a path already exists.
pub fn maybe_select(case: &mut Case, was_verified: bool, turn: u32) -> Option<PathSelection> {
    if was_verified || !case.progress.verification_complete() || case.path_selection.is_some() {
        return None;
    }
    let decision = select_path(
        case.verification.temporal_state,
        case.verification.urgency_level,
    );
    let selection = PathSelection {
        path: decision.path,
        auto_selected: decision.auto_selected,
        rationale: decision.rationale,
        selected_at_turn: turn,
    };
    case.path_selection = Some(selection.clone());
    Some(selection)
}

fn user_choice(reason: &str) -> PathDecision {
    PathDecision {
        path: InvestigationPath::UserChoice,
        auto_selected: false,
        rationale: format!("{reason}: ask the user to choose"),
    }
}

fn urgency_label(urgency: UrgencyLevel) -> &'static str {
    match urgency {
        UrgencyLevel::Critical => "critical",
        UrgencyLevel::High => "high",
        UrgencyLevel::Medium => "medium",
        UrgencyLevel::Low => "low",
    }
}
