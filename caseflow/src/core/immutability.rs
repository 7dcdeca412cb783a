//! Append-only and monotonicity checks between two versions of a case.

use crate::case::Case;
use crate::core::types::Milestone;

/// Validate that `next` is a legal successor of `prev`.
///
/// Enforces:
/// - No milestone reverts from `true` to `false`.
/// - Evidence, turn history and escalated triggers are append-only.
/// - Solutions are never removed.
/// - Hypotheses are never removed.
/// - A path selection, once made, is unchanged.
/// - A terminal case is unchanged.
///
/// Returns a list of stable error messages.
pub fn check_case_immutability(prev: &Case, next: &Case) -> Vec<String> {
    let mut errors = Vec::new();

    if prev.case_id != next.case_id {
        errors.push(format!(
            "case id changed from '{}' to '{}'",
            prev.case_id, next.case_id
        ));
        return errors;
    }

    if prev.is_terminal() && prev != next {
        errors.push(format!("case '{}' is {} and cannot change", prev.case_id, prev.status));
        return errors;
    }

    for milestone in Milestone::ALL {
        if prev.progress.is_complete(milestone) && !next.progress.is_complete(milestone) {
            errors.push(format!("milestone {milestone} reverted to false"));
        }
    }

    if next.turn_count < prev.turn_count {
        errors.push(format!(
            "turn_count went backwards ({} -> {})",
            prev.turn_count, next.turn_count
        ));
    }

    append_only(
        "evidence",
        prev.evidence.as_slice(),
        next.evidence.as_slice(),
        &mut errors,
    );
    append_only(
        "turn history",
        &prev.turn_history,
        &next.turn_history,
        &mut errors,
    );
    append_only(
        "escalated triggers",
        &prev.escalated_triggers,
        &next.escalated_triggers,
        &mut errors,
    );
    if next.solutions.len() < prev.solutions.len() {
        errors.push("solutions were removed".to_string());
    }

    for id in prev.hypotheses.keys() {
        if !next.hypotheses.contains(id) {
            errors.push(format!("hypothesis '{id}' was removed"));
        }
    }

    if let Some(selection) = &prev.path_selection {
        if next.path_selection.as_ref() != Some(selection) {
            errors.push("path selection changed after it was made".to_string());
        }
    }

    errors
}

fn append_only<T: PartialEq>(label: &str, prev: &[T], next: &[T], errors: &mut Vec<String>) {
    if next.len() < prev.len() {
        errors.push(format!(
            "{label} shrank from {} to {} entries",
            prev.len(),
            next.len()
        ));
    } else if next[..prev.len()] != *prev {
        errors.push(format!("existing {label} entries were modified"));
    }
}
