//! Orchestration of a single turn: load, resolve, apply, persist, log.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::{info, warn};

use crate::case::Case;
use crate::core::engine::{Engine, TurnResult};
use crate::core::status_validator::CaseStatusTransition;
use crate::core::types::CaseStatus;
use crate::core::update::ProposedUpdate;
use crate::io::case_store::{CaseStore, validate_case_id};
use crate::io::content::{EvidenceContentResolver, resolve_update};
use crate::io::turn_log::{TurnWriteRequest, write_turn};
use crate::io::update_schema::parse_update;

/// Binds the pure [`Engine`] to a store.
///
/// A turn is committed only when the store accepts the new case; otherwise
/// the stored case is left as it was and the error is returned.
pub struct TurnService {
    engine: Engine,
    store: Arc<dyn CaseStore>,
    resolver: Option<Arc<dyn EvidenceContentResolver>>,
    turns_dir: Option<PathBuf>,
}

impl TurnService {
    pub fn new(engine: Engine, store: Arc<dyn CaseStore>) -> Self {
        Self {
            engine,
            store,
            resolver: None,
            turns_dir: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn EvidenceContentResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Write per-turn artifacts under `turns_dir` after each committed turn.
    pub fn with_turn_log(mut self, turns_dir: impl Into<PathBuf>) -> Self {
        self.turns_dir = Some(turns_dir.into());
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn store(&self) -> &dyn CaseStore {
        self.store.as_ref()
    }

    /// Create and store a fresh case.
    pub fn open_case(&self, case_id: &str, title: &str) -> Result<Case> {
        validate_case_id(case_id)?;
        if self.store.exists(case_id)? {
            return Err(anyhow!("case '{case_id}' already exists"));
        }
        let case = Case::new(case_id, title);
        self.store.save(&case)?;
        info!(case_id, "case opened");
        Ok(case)
    }

    pub fn load(&self, case_id: &str) -> Result<Case> {
        self.store.load(case_id)
    }

    /// Parse a raw JSON update and apply it.
    pub fn apply_raw(&self, case_id: &str, raw: &str) -> Result<TurnResult> {
        let update = parse_update(raw)?;
        self.apply_update(case_id, &update)
    }

    pub fn apply_update(&self, case_id: &str, update: &ProposedUpdate) -> Result<TurnResult> {
        let case = self.store.load(case_id)?;

        let mut update = update.clone();
        if let Some(resolver) = &self.resolver {
            resolve_update(resolver.as_ref(), &mut update)?;
        }

        let result = self.engine.apply_turn(&case, &update)?;
        let Some(record) = &result.record else {
            info!(case_id, status = %case.status, "turn ignored on terminal case");
            return Ok(result);
        };

        self.store.save(&result.case)?;

        if let Some(turns_dir) = &self.turns_dir {
            let written = write_turn(&TurnWriteRequest {
                turns_dir,
                case_id,
                status: result.case.status,
                update: &update,
                record,
                warnings: result.warnings.len(),
            });
            if let Err(err) = written {
                warn!(
                    case_id,
                    turn = record.turn_number,
                    err = %format!("{err:#}"),
                    "failed to write turn log"
                );
            }
        }

        info!(
            case_id,
            turn = record.turn_number,
            status = %result.case.status,
            progress = record.progress_made,
            warnings = result.warnings.len(),
            "turn applied"
        );
        Ok(result)
    }

    /// Apply an explicit status change and persist it.
    pub fn transition(
        &self,
        case_id: &str,
        to: CaseStatus,
        reason: Option<&str>,
    ) -> Result<(Case, CaseStatusTransition)> {
        let case = self.store.load(case_id)?;
        let (next, transition) = self.engine.request_transition(&case, to, reason)?;
        self.store.save(&next)?;
        info!(case_id, from = %transition.from, to = %transition.to, "status changed");
        Ok((next, transition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::EngineError;
    use crate::core::types::{Milestone, TurnOutcome};
    use crate::io::case_store::MemoryCaseStore;
    use crate::test_support::{FailingStore, UpdateBuilder, draft};

    fn service() -> TurnService {
        TurnService::new(Engine::default(), Arc::new(MemoryCaseStore::new()))
    }

    #[test]
    fn open_then_apply_persists_next_case() {
        let service = service();
        service.open_case("case-1", "checkout errors").expect("open");

        let update = UpdateBuilder::new()
            .outcome(TurnOutcome::DataProvided)
            .evidence(draft("500s on /checkout", None))
            .build();
        let result = service.apply_update("case-1", &update).expect("apply");

        assert_eq!(result.case.turn_count, 1);
        assert_eq!(service.load("case-1").expect("load"), result.case);
    }

    #[test]
    fn opening_twice_is_an_error() {
        let service = service();
        service.open_case("case-1", "t").expect("open");
        let err = service.open_case("case-1", "t").expect_err("duplicate");
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn rejected_turn_leaves_stored_case_untouched() {
        let service = service();
        let opened = service.open_case("case-1", "t").expect("open");

        let err = service
            .apply_raw("case-1", r#"{"status_request":"resolved"}"#)
            .expect_err("consulting cannot resolve");
        assert!(
            err.chain()
                .any(|cause| cause.downcast_ref::<EngineError>().is_some())
        );
        assert_eq!(service.load("case-1").expect("load"), opened);
    }

    #[test]
    fn failed_save_does_not_commit() {
        let store = Arc::new(FailingStore::default());
        store
            .inner
            .save(&Case::new("case-1", "t"))
            .expect("seed");
        let service = TurnService::new(Engine::default(), store.clone());

        let update = UpdateBuilder::new()
            .milestones(&[Milestone::SymptomVerified])
            .build();
        assert!(service.apply_update("case-1", &update).is_err());
        assert_eq!(store.load("case-1").expect("load").turn_count, 0);
    }

    #[test]
    fn turn_log_is_written_after_commit() {
        let temp = tempfile::tempdir().expect("tempdir");
        let service = service().with_turn_log(temp.path());
        service.open_case("case-1", "t").expect("open");

        service
            .apply_update("case-1", &UpdateBuilder::new().build())
            .expect("apply");
        assert!(temp.path().join("case-1").join("1").join("meta.json").is_file());
    }

    #[test]
    fn transition_is_persisted() {
        let service = service();
        service.open_case("case-1", "t").expect("open");
        let (case, transition) = service
            .transition("case-1", CaseStatus::Investigating, None)
            .expect("transition");
        assert_eq!(transition.to, CaseStatus::Investigating);
        assert_eq!(
            service.load("case-1").expect("load").status,
            case.status
        );
    }
}
