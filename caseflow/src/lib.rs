//! Investigation lifecycle engine for troubleshooting cases.
//!
//! A case moves through Consulting, Investigating and Resolved or Closed
//! while an external reasoning oracle proposes one structured update per
//! turn. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (milestones, hypotheses, path
//!   selection, stall detection, escalation, status transitions). No I/O.
//! - **[`io`]**: Side-effecting operations (case files, config, update
//!   schema, content resolution, turn logs).
//!
//! [`apply`] binds the two for a single turn and [`lanes`] runs turns for
//! many cases concurrently.

pub mod apply;
pub mod case;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod lanes;
pub mod logging;
pub mod report;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
