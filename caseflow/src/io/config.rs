//! Caseflow configuration stored under `.caseflow/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::{Routing, Thresholds};

/// Caseflow configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to the built-in policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaseflowConfig {
    /// Truncate resolved evidence content beyond this many bytes.
    pub content_limit_bytes: usize,

    /// Number of worker lanes used by `replay`.
    pub lanes: usize,

    pub thresholds: Thresholds,

    pub routing: Routing,
}

impl Default for CaseflowConfig {
    fn default() -> Self {
        Self {
            content_limit_bytes: 64_000,
            lanes: 4,
            thresholds: Thresholds::default(),
            routing: Routing::default(),
        }
    }
}

impl CaseflowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.content_limit_bytes == 0 {
            return Err(anyhow!("content_limit_bytes must be > 0"));
        }
        if self.lanes == 0 {
            return Err(anyhow!("lanes must be > 0"));
        }
        let t = &self.thresholds;
        if t.stall_turns == 0 {
            return Err(anyhow!("thresholds.stall_turns must be > 0"));
        }
        if t.escalation_turn_limit == 0 {
            return Err(anyhow!("thresholds.escalation_turn_limit must be > 0"));
        }
        if !(0.0..=1.0).contains(&t.neutral_link_min_completeness) {
            return Err(anyhow!(
                "thresholds.neutral_link_min_completeness must be within [0, 1]"
            ));
        }
        if self.routing.default_target.trim().is_empty() {
            return Err(anyhow!("routing.default_target must not be empty"));
        }
        for (idx, rule) in self.routing.rules.iter().enumerate() {
            if rule.target.trim().is_empty() {
                return Err(anyhow!("routing.rules[{idx}].target must not be empty"));
            }
            if rule.keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(anyhow!("routing.rules[{idx}].keywords must not be empty"));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CaseflowConfig::default()`.
pub fn load_config(path: &Path) -> Result<CaseflowConfig> {
    if !path.exists() {
        let cfg = CaseflowConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CaseflowConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &CaseflowConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    crate::io::write_atomic(path, &buf)
}
