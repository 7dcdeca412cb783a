//! Per-turn progress accounting.

use crate::case::{Case, TurnRecord};
use crate::core::types::{HypothesisStatus, Milestone, TurnOutcome};

/// Diff `before` against `after`, append the resulting record to `after`,
/// and update the no-progress counter.
///
/// `after.turn_count` must already be incremented for this turn.
pub fn record_turn(before: &Case, after: &mut Case, outcome: TurnOutcome) -> TurnRecord {
    let milestones_completed: Vec<Milestone> = Milestone::ALL
        .into_iter()
        .filter(|m| after.progress.is_complete(*m) && !before.progress.is_complete(*m))
        .collect();

    let evidence_added: Vec<String> = after
        .evidence
        .keys()
        .skip(before.evidence.len())
        .map(str::to_string)
        .collect();

    let hypotheses_generated: Vec<String> = after
        .hypotheses
        .keys()
        .skip(before.hypotheses.len())
        .map(str::to_string)
        .collect();

    let hypotheses_concluded: Vec<String> = after
        .hypotheses
        .iter()
        .filter(|h| concluded(h.status))
        .filter(|h| {
            before
                .hypotheses
                .get(&h.id)
                .is_none_or(|prev| !concluded(prev.status))
        })
        .map(|h| h.id.clone())
        .collect();

    let progress_made = !milestones_completed.is_empty()
        || !evidence_added.is_empty()
        || !hypotheses_concluded.is_empty();

    let record = TurnRecord {
        turn_number: after.turn_count,
        milestones_completed,
        evidence_added,
        hypotheses_generated,
        hypotheses_concluded,
        progress_made,
        outcome,
    };

    if progress_made {
        after.turns_without_progress = 0;
    } else {
        after.turns_without_progress += 1;
    }
    after.turn_history.push(record.clone());
    record
}

fn concluded(status: HypothesisStatus) -> bool {
    matches!(status, HypothesisStatus::Validated | HypothesisStatus::Refuted)
}
