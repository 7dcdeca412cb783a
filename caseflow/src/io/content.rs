//! Resolution of raw evidence content referenced by drafts.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::core::update::{EvidenceDraft, ProposedUpdate};

/// Fills in evidence drafts from referenced content before the engine sees them.
pub trait EvidenceContentResolver: Send + Sync {
    fn resolve(&self, draft: &mut EvidenceDraft) -> Result<()>;
}

/// Resolve every evidence draft in `update` that carries a `content_ref`.
pub fn resolve_update(
    resolver: &dyn EvidenceContentResolver,
    update: &mut ProposedUpdate,
) -> Result<()> {
    for (idx, draft) in update.evidence.iter_mut().enumerate() {
        if draft.content_ref.is_some() {
            resolver
                .resolve(draft)
                .with_context(|| format!("resolve evidence[{idx}] content"))?;
        }
    }
    Ok(())
}

/// Reads `content_ref` as a path relative to `root`.
///
/// The content becomes the draft's `analysis` when the draft has none,
/// truncated to `limit_bytes`.
#[derive(Debug, Clone)]
pub struct FileContentResolver {
    root: PathBuf,
    limit_bytes: usize,
}

impl FileContentResolver {
    pub fn new(root: impl Into<PathBuf>, limit_bytes: usize) -> Self {
        Self {
            root: root.into(),
            limit_bytes,
        }
    }

    fn content_path(&self, reference: &str) -> Result<PathBuf> {
        let relative = Path::new(reference);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if reference.trim().is_empty() || escapes {
            return Err(anyhow!(
                "content_ref '{reference}' must be a relative path inside {}",
                self.root.display()
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl EvidenceContentResolver for FileContentResolver {
    fn resolve(&self, draft: &mut EvidenceDraft) -> Result<()> {
        let Some(reference) = draft.content_ref.as_deref() else {
            return Ok(());
        };
        if draft.analysis.is_some() {
            return Ok(());
        }
        let path = self.content_path(reference)?;
        let bytes = fs::read(&path).with_context(|| format!("read content {}", path.display()))?;
        let text = String::from_utf8_lossy(&bytes);
        debug!(path = %path.display(), bytes = bytes.len(), "resolved evidence content");
        draft.analysis = Some(truncate(&text, self.limit_bytes));
        Ok(())
    }
}

/// Truncate to at most `limit` bytes on a char boundary, marking the cut.
fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n[truncated {} bytes]", &text[..end], text.len() - end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::draft;

    fn with_ref(reference: &str) -> EvidenceDraft {
        EvidenceDraft {
            content_ref: Some(reference.to_string()),
            ..draft("log excerpt", None)
        }
    }

    #[test]
    fn fills_missing_analysis_from_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("app.log"), "ERROR pool exhausted").expect("write");
        let resolver = FileContentResolver::new(temp.path(), 1024);

        let mut evidence = with_ref("app.log");
        resolver.resolve(&mut evidence).expect("resolve");
        assert_eq!(evidence.analysis.as_deref(), Some("ERROR pool exhausted"));
    }

    #[test]
    fn existing_analysis_is_kept() {
        let temp = tempfile::tempdir().expect("tempdir");
        let resolver = FileContentResolver::new(temp.path(), 1024);
        let mut evidence = EvidenceDraft {
            analysis: Some("already analysed".to_string()),
            ..with_ref("missing.log")
        };
        resolver.resolve(&mut evidence).expect("resolve");
        assert_eq!(evidence.analysis.as_deref(), Some("already analysed"));
    }

    #[test]
    fn content_is_truncated_on_char_boundary() {
        assert_eq!(truncate("abc", 10), "abc");
        assert_eq!(truncate("héllo", 2), "h\n[truncated 5 bytes]");
    }

    #[test]
    fn escaping_reference_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let resolver = FileContentResolver::new(temp.path(), 1024);
        assert!(resolver.resolve(&mut with_ref("../secret")).is_err());
        assert!(resolver.resolve(&mut with_ref("/etc/passwd")).is_err());
    }

    #[test]
    fn resolve_update_names_failing_draft() {
        let temp = tempfile::tempdir().expect("tempdir");
        let resolver = FileContentResolver::new(temp.path(), 1024);
        let mut update = ProposedUpdate {
            evidence: vec![draft("plain", None), with_ref("missing.log")],
            ..ProposedUpdate::default()
        };
        let err = resolve_update(&resolver, &mut update).expect_err("missing");
        assert!(err.to_string().contains("evidence[1]"));
    }
}
