//! Multi-turn engine scenarios.
//!
//! Each test drives `Engine::apply_turn` across several turns and checks the
//! lifecycle properties that hold across the whole case history.

use caseflow::case::Case;
use caseflow::core::engine::{Engine, TurnResult};
use caseflow::core::error::WarningKind;
use caseflow::core::escalation::should_escalate;
use caseflow::core::hypotheses::AdvisoryKind;
use caseflow::core::types::{
    CaseStatus, DegradedModeType, EscalationTrigger, HypothesisStatus, InvestigationPath,
    Milestone, RequestCategory, RequestStatus, SolutionKind, SolutionStatus, TemporalState,
    UrgencyLevel,
};
use caseflow::core::update::{EvidenceRequestDraft, ProposedUpdate, VerificationUpdate};
use caseflow::test_support::{UpdateBuilder, draft, hypothesis_draft};

fn investigating(case_id: &str) -> Case {
    let (case, _) = Engine::default()
        .request_transition(
            &Case::new(case_id, "checkout errors"),
            CaseStatus::Investigating,
            None,
        )
        .expect("start investigating");
    case
}

fn apply(case: &Case, update: &ProposedUpdate) -> TurnResult {
    Engine::default().apply_turn(case, update).expect("apply turn")
}

fn verification(temporal: TemporalState, urgency: UrgencyLevel) -> VerificationUpdate {
    VerificationUpdate {
        symptom_statement: Some("checkout returns 500".to_string()),
        temporal_state: Some(temporal),
        urgency_level: Some(urgency),
        affected_services: vec!["checkout".to_string()],
    }
}

#[test]
fn one_turn_resolution_of_the_diagnosis() {
    let case = investigating("case-1");
    let update = UpdateBuilder::new()
        .evidence(draft(
            "Checkout errors confirmed in logs",
            Some(
                "Errors started at 14:05; all users in eu-west are affected. \
                 Root cause: connection pool exhausted, caused by a retry storm.",
            ),
        ))
        .build();

    let result = apply(&case, &update);
    let record = result.record.expect("record");
    assert_eq!(
        record.milestones_completed,
        vec![
            Milestone::SymptomVerified,
            Milestone::TimelineEstablished,
            Milestone::ScopeAssessed,
            Milestone::RootCauseIdentified,
        ]
    );
    assert!(record.progress_made);
    assert_eq!(result.case.turns_without_progress, 0);
    assert_eq!(result.case.turn_history, vec![record]);
}

#[test]
fn ongoing_critical_incident_routes_to_mitigation_first() {
    let case = investigating("case-1");
    let update = UpdateBuilder::new()
        .verification(verification(TemporalState::Ongoing, UrgencyLevel::Critical))
        .milestones(&[
            Milestone::SymptomVerified,
            Milestone::ScopeAssessed,
            Milestone::TimelineEstablished,
        ])
        .build();

    let result = apply(&case, &update);
    let selection = result.path_selection.expect("path selected");
    assert_eq!(selection.path, InvestigationPath::MitigationFirst);
    assert!(selection.auto_selected);
    assert_eq!(selection.selected_at_turn, 1);
    assert_eq!(result.case.path_selection, Some(selection));
}

#[test]
fn path_is_selected_once_per_case() {
    let case = investigating("case-1");
    let first = apply(
        &case,
        &UpdateBuilder::new()
            .verification(verification(TemporalState::Historical, UrgencyLevel::Low))
            .milestones(&[
                Milestone::SymptomVerified,
                Milestone::ScopeAssessed,
                Milestone::TimelineEstablished,
            ])
            .build(),
    );
    assert_eq!(
        first.case.path_selection.as_ref().map(|s| s.path),
        Some(InvestigationPath::RootCause)
    );

    let second = apply(
        &first.case,
        &UpdateBuilder::new()
            .verification(verification(TemporalState::Ongoing, UrgencyLevel::Critical))
            .build(),
    );
    assert_eq!(second.path_selection, None);
    assert_eq!(second.case.path_selection, first.case.path_selection);
}

#[test]
fn repeated_refutations_in_one_category_raise_anchoring() {
    let case = investigating("case-1");
    let mut update = UpdateBuilder::new();
    for id in ["h1", "h2", "h3", "h4"] {
        update = update.hypothesis(hypothesis_draft(id, "code"));
    }
    let first = apply(&case, &update.build());
    assert!(first.advisories.is_empty());

    let mut refute = UpdateBuilder::new();
    for id in ["h1", "h2", "h3", "h4"] {
        refute = refute.hypothesis_status(id, HypothesisStatus::Refuted);
    }
    let second = apply(&first.case, &refute.build());

    let anchoring: Vec<_> = second
        .advisories
        .iter()
        .filter(|a| a.kind == AdvisoryKind::CategoryAnchoring)
        .collect();
    assert_eq!(anchoring.len(), 1);
    assert!(anchoring[0].message.contains("code"));
    let record = second.record.expect("record");
    assert_eq!(record.hypotheses_concluded.len(), 4);
    assert!(record.progress_made);
}

#[test]
fn blocked_critical_requests_escalate() {
    let case = investigating("case-1");
    let mut update = UpdateBuilder::new();
    for (id, category) in [
        ("req-a", RequestCategory::Symptoms),
        ("req-b", RequestCategory::Timeline),
        ("req-c", RequestCategory::Changes),
    ] {
        update = update.request(EvidenceRequestDraft {
            id: Some(id.to_string()),
            description: format!("{id} please"),
            category,
        });
    }
    let first = apply(&case, &update.build());
    assert_eq!(first.escalation, None);

    let blocked = UpdateBuilder::new()
        .request_status("req-a", RequestStatus::Blocked)
        .request_status("req-b", RequestStatus::Blocked)
        .request_status("req-c", RequestStatus::Blocked)
        .build();
    let second = apply(&first.case, &blocked);

    let decision = should_escalate(&second.case, Engine::default().thresholds())
        .expect("escalation recommended");
    assert_eq!(decision.trigger, EscalationTrigger::BlockedCriticalEvidence);
    assert!(!decision.reason.is_empty());

    let advisory = second.escalation.expect("escalation opened");
    assert_eq!(advisory.trigger, EscalationTrigger::BlockedCriticalEvidence);
    assert!(second.case.escalation_active());
}

#[test]
fn non_critical_blocked_requests_do_not_escalate() {
    let case = investigating("case-1");
    let mut update = UpdateBuilder::new();
    for id in ["req-a", "req-b", "req-c"] {
        update = update.request(EvidenceRequestDraft {
            id: Some(id.to_string()),
            description: "dashboards".to_string(),
            category: RequestCategory::Metrics,
        });
    }
    let first = apply(&case, &update.build());
    let blocked = UpdateBuilder::new()
        .request_status("req-a", RequestStatus::Blocked)
        .request_status("req-b", RequestStatus::Blocked)
        .request_status("req-c", RequestStatus::Blocked)
        .build();
    let second = apply(&first.case, &blocked);
    assert_eq!(second.escalation, None);
}

#[test]
fn milestones_never_revert_across_turns() {
    let case = investigating("case-1");
    let first = apply(
        &case,
        &UpdateBuilder::new()
            .milestones(&[Milestone::SymptomVerified, Milestone::ChangesIdentified])
            .build(),
    );

    let mut clearing = ProposedUpdate::default();
    clearing.milestones.symptom_verified = Some(false);
    clearing.milestones.changes_identified = Some(false);
    let second = apply(&first.case, &clearing);

    assert!(second.case.progress.symptom_verified);
    assert!(second.case.progress.changes_identified);
    assert_eq!(second.record.map(|r| r.progress_made), Some(false));
}

#[test]
fn no_progress_counter_counts_and_resets() {
    let mut case = investigating("case-1");
    for expected in 1..=2 {
        case = apply(&case, &ProposedUpdate::default()).case;
        assert_eq!(case.turns_without_progress, expected);
    }
    let result = apply(
        &case,
        &UpdateBuilder::new()
            .evidence(draft("new graph of p99 latency", None))
            .build(),
    );
    assert_eq!(result.case.turns_without_progress, 0);
    assert_eq!(result.case.turn_count, 3);
}

#[test]
fn degraded_mode_is_entered_once() {
    let mut case = investigating("case-1");
    let mut events = Vec::new();
    for _ in 0..5 {
        let result = apply(&case, &ProposedUpdate::default());
        events.push(result.degraded_event);
        case = result.case;
    }

    let entered: Vec<_> = events.iter().flatten().collect();
    assert_eq!(entered.len(), 1);
    assert_eq!(entered[0].mode_type, DegradedModeType::NoProgress);
    assert_eq!(entered[0].turn, 3);
    let mode = case.degraded_mode.expect("degraded");
    assert_eq!(mode.entered_at, 3);
    assert!(mode.is_active());
}

#[test]
fn succeeded_fix_resolves_automatically() {
    let case = investigating("case-1");
    let proposed = apply(
        &case,
        &UpdateBuilder::new().solution("sol-fix", SolutionKind::Fix).build(),
    );
    assert!(proposed.case.progress.solution_proposed);

    let applied = apply(
        &proposed.case,
        &UpdateBuilder::new()
            .solution_status("sol-fix", SolutionStatus::Succeeded)
            .milestones(&[Milestone::SolutionVerified])
            .build(),
    );
    assert_eq!(applied.case.status, CaseStatus::Resolved);
    assert_eq!(applied.case.resolved_at, Some(2));
    let transition = applied.status_transitions.last().expect("transition");
    assert!(transition.automatic);
}

#[test]
fn terminal_case_is_immutable() {
    let case = investigating("case-1");
    let closed = apply(
        &case,
        &UpdateBuilder::new()
            .status(CaseStatus::Closed)
            .user_input("duplicate of case-0")
            .build(),
    )
    .case;
    assert_eq!(closed.status, CaseStatus::Closed);

    let result = apply(
        &closed,
        &UpdateBuilder::new()
            .evidence(draft("late log line", None))
            .milestones(&[Milestone::RootCauseIdentified])
            .build(),
    );
    assert_eq!(result.case, closed);
    assert_eq!(result.record, None);
    assert_eq!(result.warnings[0].kind, WarningKind::TerminalCase);

    let reopen = Engine::default().request_transition(&closed, CaseStatus::Investigating, None);
    assert!(reopen.is_err());
}
