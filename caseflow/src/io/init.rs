//! Initialization helpers for `.caseflow/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{CaseflowConfig, write_config};

/// All canonical paths within `.caseflow/` for a project root.
#[derive(Debug, Clone)]
pub struct CaseflowPaths {
    pub root: PathBuf,
    pub caseflow_dir: PathBuf,
    pub cases_dir: PathBuf,
    pub turns_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
}

impl CaseflowPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let caseflow_dir = root.join(".caseflow");
        Self {
            root: root.clone(),
            cases_dir: caseflow_dir.join("cases"),
            turns_dir: caseflow_dir.join("turns"),
            gitignore_path: caseflow_dir.join(".gitignore"),
            config_path: caseflow_dir.join("config.toml"),
            caseflow_dir,
        }
    }

    /// Fail unless `init` has been run for this root.
    pub fn ensure_initialized(&self) -> Result<()> {
        if !self.cases_dir.is_dir() {
            return Err(anyhow!(
                "{} is not initialized (run `caseflow init`)",
                self.caseflow_dir.display()
            ));
        }
        Ok(())
    }
}

/// Options for `init_workspace`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing caseflow-owned files. Stored cases are kept.
    pub force: bool,
}

/// Create `.caseflow/` scaffolding in `root`.
///
/// Fails if `.caseflow/` already exists unless `options.force` is set.
pub fn init_workspace(root: &Path, options: &InitOptions) -> Result<CaseflowPaths> {
    let paths = CaseflowPaths::new(root);
    if paths.caseflow_dir.exists() && !paths.caseflow_dir.is_dir() {
        return Err(anyhow!(
            "caseflow init: .caseflow exists but is not a directory"
        ));
    }
    if paths.caseflow_dir.exists() && !options.force {
        return Err(anyhow!(
            "caseflow init: .caseflow already exists (use --force to overwrite)"
        ));
    }

    create_dir(&paths.caseflow_dir)?;
    create_dir(&paths.cases_dir)?;
    create_dir(&paths.turns_dir)?;

    fs::write(&paths.gitignore_path, CASEFLOW_GITIGNORE)
        .with_context(|| format!("write file {}", paths.gitignore_path.display()))?;
    write_config(&paths.config_path, &CaseflowConfig::default())?;

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

const CASEFLOW_GITIGNORE: &str = "turns/\n";
