//! Semantic case invariants checked before a case is persisted.

use std::collections::HashSet;

use crate::case::Case;
use crate::core::types::CaseStatus;

/// Check invariants the type system does not enforce:
/// - Solution and evidence-request ids are unique
/// - Hypothesis links reference existing evidence
/// - Likelihoods and confidences are within `[0, 1]`
/// - Turn history is numbered `1..=turn_count` without gaps
/// - Terminal timestamps agree with the status
pub fn validate_invariants(case: &Case) -> Vec<String> {
    let mut errors = Vec::new();

    if case.case_id.trim().is_empty() {
        errors.push("case_id must not be empty".to_string());
    }

    unique_ids("solution", case.solutions.iter().map(|s| s.id.as_str()), &mut errors);
    unique_ids(
        "evidence request",
        case.evidence_requests.iter().map(|r| r.id.as_str()),
        &mut errors,
    );

    unit(
        "progress.root_cause_confidence",
        case.progress.root_cause_confidence,
        &mut errors,
    );
    for hypothesis in &case.hypotheses {
        unit(
            &format!("hypothesis '{}' likelihood", hypothesis.id),
            hypothesis.likelihood,
            &mut errors,
        );
        for (evidence_id, link) in &hypothesis.evidence_links {
            if !case.evidence.contains(evidence_id) {
                errors.push(format!(
                    "hypothesis '{}' links unknown evidence '{}'",
                    hypothesis.id, evidence_id
                ));
            }
            unit(
                &format!("link '{}' -> '{}' completeness", hypothesis.id, evidence_id),
                link.completeness,
                &mut errors,
            );
        }
    }

    for (idx, record) in case.turn_history.iter().enumerate() {
        let expected = idx as u32 + 1;
        if record.turn_number != expected {
            errors.push(format!(
                "turn_history[{idx}]: turn_number {} expected {expected}",
                record.turn_number
            ));
        }
    }
    if case.turn_history.len() as u32 > case.turn_count {
        errors.push(format!(
            "turn_history has {} records but turn_count is {}",
            case.turn_history.len(),
            case.turn_count
        ));
    }

    match case.status {
        CaseStatus::Resolved if case.resolved_at.is_none() => {
            errors.push("status=resolved but resolved_at is unset".to_string());
        }
        CaseStatus::Resolved | CaseStatus::Closed if case.closed_at.is_none() => {
            errors.push(format!("status={} but closed_at is unset", case.status));
        }
        CaseStatus::Consulting | CaseStatus::Investigating if case.closed_at.is_some() => {
            errors.push(format!("status={} but closed_at is set", case.status));
        }
        _ => {}
    }

    errors
}

fn unique_ids<'a>(kind: &str, ids: impl Iterator<Item = &'a str>, errors: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            errors.push(format!("duplicate {kind} id '{id}'"));
        }
    }
}

fn unit(label: &str, value: f64, errors: &mut Vec<String>) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(format!("{label} {value} is outside [0, 1]"));
    }
}
