//! Monotonic milestone tracking and derived progress views.

use crate::case::InvestigationProgress;
use crate::core::types::{Milestone, Stage};
use crate::core::update::MilestoneUpdate;

/// Apply milestone deltas to `progress`.
///
/// Returns the milestones that flipped `false → true`, in canonical order.
/// Requests to clear a milestone are ignored. Root-cause confidence and method
/// are taken only when `root_cause_identified` flips in this same call.
pub fn apply_milestones(
    progress: &mut InvestigationProgress,
    update: &MilestoneUpdate,
) -> Vec<Milestone> {
    let mut completed = Vec::new();
    for milestone in update.requested() {
        if !progress.is_complete(milestone) {
            progress.mark(milestone);
            completed.push(milestone);
        }
    }

    if completed.contains(&Milestone::RootCauseIdentified) {
        if let Some(confidence) = update.root_cause_confidence {
            progress.root_cause_confidence = confidence;
        }
        if let Some(method) = update.root_cause_method {
            progress.root_cause_method = Some(method);
        }
    }

    completed
}

/// Resolving if any solution milestone is set; Diagnosing once the symptom is
/// verified but the root cause is not; Understanding otherwise.
pub fn current_stage(progress: &InvestigationProgress) -> Stage {
    if progress.solution_proposed || progress.solution_applied || progress.solution_verified {
        Stage::Resolving
    } else if progress.symptom_verified && !progress.root_cause_identified {
        Stage::Diagnosing
    } else {
        Stage::Understanding
    }
}

/// Share of core milestones completed, 0-100, rounded down.
pub fn completion_percentage(progress: &InvestigationProgress) -> u8 {
    let done = Milestone::CORE
        .iter()
        .filter(|m| progress.is_complete(**m))
        .count();
    (done * 100 / Milestone::CORE.len()) as u8
}
