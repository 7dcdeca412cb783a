//! Case persistence: one JSON document per case.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::debug;

use crate::case::Case;
use crate::core::immutability::check_case_immutability;
use crate::core::invariants::validate_invariants;

static CASE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").unwrap());

/// Storage for cases. `save` is all-or-nothing: on error the previously
/// stored version is left intact.
pub trait CaseStore: Send + Sync {
    fn load(&self, case_id: &str) -> Result<Case>;
    fn save(&self, case: &Case) -> Result<()>;
    fn exists(&self, case_id: &str) -> Result<bool>;
    /// Stored case ids in ascending order.
    fn list(&self) -> Result<Vec<String>>;
}

/// Case ids double as file names, so they are restricted to a safe alphabet.
pub fn validate_case_id(case_id: &str) -> Result<()> {
    if CASE_ID_RE.is_match(case_id) {
        return Ok(());
    }
    Err(anyhow!(
        "invalid case id '{case_id}': use letters, digits, '.', '_' or '-'"
    ))
}

/// Reject a case that breaks invariants or is not a legal successor of `prev`.
fn check_successor(prev: Option<&Case>, next: &Case) -> Result<()> {
    let mut errors = validate_invariants(next);
    if let Some(prev) = prev {
        errors.extend(check_case_immutability(prev, next));
    }
    if errors.is_empty() {
        return Ok(());
    }
    Err(anyhow!(
        "case '{}' rejected:\n- {}",
        next.case_id,
        errors.join("\n- ")
    ))
}

/// `cases/<case_id>.json` under a directory.
#[derive(Debug, Clone)]
pub struct FileCaseStore {
    dir: PathBuf,
}

impl FileCaseStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn case_path(&self, case_id: &str) -> PathBuf {
        self.dir.join(format!("{case_id}.json"))
    }

    fn read(&self, path: &Path) -> Result<Case> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read case {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parse case {}", path.display()))
    }
}

impl CaseStore for FileCaseStore {
    fn load(&self, case_id: &str) -> Result<Case> {
        validate_case_id(case_id)?;
        let path = self.case_path(case_id);
        debug!(path = %path.display(), "loading case");
        if !path.is_file() {
            return Err(anyhow!("case '{case_id}' not found"));
        }
        let case = self.read(&path)?;
        if case.case_id != case_id {
            return Err(anyhow!(
                "case file {} holds case '{}'",
                path.display(),
                case.case_id
            ));
        }
        debug!(case_id, turn = case.turn_count, status = %case.status, "case loaded");
        Ok(case)
    }

    fn save(&self, case: &Case) -> Result<()> {
        validate_case_id(&case.case_id)?;
        let path = self.case_path(&case.case_id);
        let prev = if path.is_file() {
            Some(self.read(&path)?)
        } else {
            None
        };
        check_successor(prev.as_ref(), case)?;

        debug!(path = %path.display(), turn = case.turn_count, "writing case");
        let mut buf = serde_json::to_string_pretty(case).context("serialize case")?;
        buf.push('\n');
        crate::io::write_atomic(&path, &buf)
    }

    fn exists(&self, case_id: &str) -> Result<bool> {
        validate_case_id(case_id)?;
        Ok(self.case_path(case_id).is_file())
    }

    fn list(&self) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in
            fs::read_dir(&self.dir).with_context(|| format!("list {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// In-memory store applying the same save checks as [`FileCaseStore`].
#[derive(Debug, Default)]
pub struct MemoryCaseStore {
    cases: Mutex<BTreeMap<String, Case>>,
}

impl MemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn cases(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Case>>> {
        self.cases
            .lock()
            .map_err(|_| anyhow!("case store lock poisoned"))
    }
}

impl CaseStore for MemoryCaseStore {
    fn load(&self, case_id: &str) -> Result<Case> {
        self.cases()?
            .get(case_id)
            .cloned()
            .ok_or_else(|| anyhow!("case '{case_id}' not found"))
    }

    fn save(&self, case: &Case) -> Result<()> {
        validate_case_id(&case.case_id)?;
        let mut cases = self.cases()?;
        check_successor(cases.get(&case.case_id), case)?;
        cases.insert(case.case_id.clone(), case.clone());
        Ok(())
    }

    fn exists(&self, case_id: &str) -> Result<bool> {
        Ok(self.cases()?.contains_key(case_id))
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.cases()?.keys().cloned().collect())
    }
}
