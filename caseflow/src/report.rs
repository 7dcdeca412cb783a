//! Markdown rendering of a case for humans.

use std::sync::LazyLock;

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::case::{Case, EvidenceRequest};
use crate::core::milestones::{completion_percentage, current_stage};
use crate::core::types::{Milestone, RequestStatus};

const CASE_REPORT_TEMPLATE: &str = include_str!("templates/case_report.md");

static REPORT_ENV: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.add_template("case_report", CASE_REPORT_TEMPLATE)
        .expect("case report template should be valid");
    env
});

#[derive(Debug, Serialize)]
struct MilestoneRow {
    name: &'static str,
    done: bool,
}

/// Render `case` as a Markdown summary.
pub fn render_case_report(case: &Case) -> Result<String> {
    let milestones: Vec<MilestoneRow> = Milestone::ALL
        .into_iter()
        .map(|m| MilestoneRow {
            name: m.label(),
            done: case.progress.is_complete(m),
        })
        .collect();
    let open_requests: Vec<&EvidenceRequest> = case
        .evidence_requests
        .iter()
        .filter(|r| matches!(r.status, RequestStatus::Pending | RequestStatus::Partial))
        .collect();

    let template = REPORT_ENV.get_template("case_report")?;
    let rendered = template.render(context! {
        case => case,
        stage => current_stage(&case.progress),
        completion => completion_percentage(&case.progress),
        milestones => milestones,
        open_requests => open_requests,
        degraded => case.degraded_mode.as_ref().filter(|m| m.is_active()),
        escalation => case.escalation_state.as_ref().filter(|e| e.is_active()),
    })?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{EvidenceCategory, HypothesisStatus};
    use crate::test_support::{evidence, hypothesis, resolved_case, verified_case};

    #[test]
    fn report_lists_progress_and_entities() {
        let mut case = verified_case();
        case.evidence.push(evidence("ev-1", EvidenceCategory::Symptom));
        case.hypotheses
            .push(hypothesis("hyp-1", "config", HypothesisStatus::Active));

        let report = render_case_report(&case).expect("render");
        assert!(report.contains("`case-verified`"));
        assert!(report.contains("- Stage: diagnosing"));
        assert!(report.contains("- Completion: 37%"));
        assert!(report.contains("- [x] symptom_verified"));
        assert!(report.contains("- [ ] root_cause_identified"));
        assert!(report.contains("`ev-1` [symptom]"));
        assert!(report.contains("`hyp-1`"));
        assert!(!report.contains("## Escalation"));
    }

    #[test]
    fn resolved_case_shows_closure() {
        let report = render_case_report(&resolved_case()).expect("render");
        assert!(report.contains("- Status: resolved (resolved)"));
        assert!(report.contains("- Completion: 100%"));
    }
}
