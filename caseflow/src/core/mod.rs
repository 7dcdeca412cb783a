//! Deterministic, pure investigation logic.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! cases and return deterministic outputs suitable for tests. [`engine`]
//! composes the others into a single turn.

pub mod classifier;
pub mod degraded;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod hypotheses;
pub mod immutability;
pub mod invariants;
pub mod milestones;
pub mod path;
pub mod progress;
pub mod status_validator;
pub mod types;
pub mod update;
