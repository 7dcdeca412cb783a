//! Turn logging helpers for `.caseflow/turns/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::case::TurnRecord;
use crate::core::types::{CaseStatus, TurnOutcome};
use crate::core::update::ProposedUpdate;

#[derive(Debug, Clone, Serialize)]
pub struct TurnMeta {
    pub case_id: String,
    pub turn: u32,
    pub outcome: TurnOutcome,
    pub progress_made: bool,
    pub status: CaseStatus,
    pub warnings: usize,
    pub written_at: String,
}

#[derive(Debug, Clone)]
pub struct TurnPaths {
    pub dir: PathBuf,
    pub update_path: PathBuf,
    pub record_path: PathBuf,
    pub meta_path: PathBuf,
}

impl TurnPaths {
    pub fn new(turns_dir: &Path, case_id: &str, turn: u32) -> Self {
        let dir = turns_dir.join(case_id).join(turn.to_string());
        Self {
            update_path: dir.join("update.json"),
            record_path: dir.join("record.json"),
            meta_path: dir.join("meta.json"),
            dir,
        }
    }
}

pub struct TurnWriteRequest<'a> {
    pub turns_dir: &'a Path,
    pub case_id: &'a str,
    pub status: CaseStatus,
    pub update: &'a ProposedUpdate,
    pub record: &'a TurnRecord,
    pub warnings: usize,
}

/// Write the artifacts of a committed turn.
pub fn write_turn(request: &TurnWriteRequest<'_>) -> Result<TurnPaths> {
    let paths = TurnPaths::new(request.turns_dir, request.case_id, request.record.turn_number);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create turn dir {}", paths.dir.display()))?;

    let meta = TurnMeta {
        case_id: request.case_id.to_string(),
        turn: request.record.turn_number,
        outcome: request.record.outcome,
        progress_made: request.record.progress_made,
        status: request.status,
        warnings: request.warnings,
        written_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    };

    write_json(&paths.update_path, request.update)?;
    write_json(&paths.record_path, request.record)?;
    write_json(&paths.meta_path, &meta)?;

    Ok(paths)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}
