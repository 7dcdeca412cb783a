//! Error taxonomy for turn application.
//!
//! Fatal errors (`EngineError`) reject the whole turn and leave the case
//! untouched. Reference problems are downgraded to [`TurnWarning`]s by the
//! engine so the rest of the turn can proceed.

use serde::Serialize;
use thiserror::Error;

use crate::core::types::{CaseStatus, HypothesisStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Malformed or out-of-range input.
    #[error("invalid field `{field}`: {message}")]
    Validation { field: String, message: String },

    /// Requested status edge is not in the transition table.
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: CaseStatus, to: CaseStatus },

    #[error("invalid hypothesis transition for '{id}': {from} -> {to}")]
    InvalidHypothesisTransition {
        id: String,
        from: HypothesisStatus,
        to: HypothesisStatus,
    },

    /// Update refers to an id the case does not contain.
    #[error("unknown {kind} '{id}'")]
    UnknownReference { kind: &'static str, id: String },

    /// Operation not valid in the current case state (e.g. exiting an inactive degraded mode).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl EngineError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn unknown(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::UnknownReference {
            kind,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    UnknownReference,
    RejectedSubUpdate,
    TerminalCase,
}

/// Non-fatal notice attached to a turn result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnWarning {
    pub kind: WarningKind,
    pub message: String,
}

impl TurnWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<EngineError> for TurnWarning {
    fn from(err: EngineError) -> Self {
        let kind = match err {
            EngineError::UnknownReference { .. } => WarningKind::UnknownReference,
            _ => WarningKind::RejectedSubUpdate,
        };
        TurnWarning::new(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_error_names_the_edge() {
        let err = EngineError::InvalidTransition {
            from: CaseStatus::Resolved,
            to: CaseStatus::Investigating,
        };
        assert_eq!(
            err.to_string(),
            "invalid status transition resolved -> investigating"
        );
    }

    #[test]
    fn unknown_reference_becomes_reference_warning() {
        let warning = TurnWarning::from(EngineError::unknown("hypothesis", "hyp-9"));
        assert_eq!(warning.kind, WarningKind::UnknownReference);
        assert_eq!(warning.message, "unknown hypothesis 'hyp-9'");
    }
}
