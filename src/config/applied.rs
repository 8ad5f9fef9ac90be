//! The last applied snapshot, kept as the comparison document for the next one.

use std::path::PathBuf;

/// Last applied snapshot text, optionally persisted across restarts.
#[derive(Debug, Default)]
pub struct AppliedSnapshot {
    text: Option<String>,
    persist_to: Option<PathBuf>,
}

impl AppliedSnapshot {
    /// Restore from `path` when given. A missing or blank file means nothing
    /// was applied yet.
    pub async fn load(path: Option<PathBuf>) -> Self {
        let text = match &path {
            Some(p) => tokio::fs::read_to_string(p).await.ok(),
            None => None,
        }
        .filter(|t| !t.trim().is_empty());
        Self { text, persist_to: path }
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Remember `text` as applied and write it out. A failed write is logged;
    /// the in-memory copy is still updated.
    pub async fn record(&mut self, text: String) {
        if let Some(path) = &self.persist_to {
            if let Err(e) = tokio::fs::write(path, &text).await {
                tracing::warn!(path = ?path, error = %e, "Failed to persist applied snapshot");
            }
        }
        self.text = Some(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("applied.json");

        let mut applied = AppliedSnapshot::load(Some(path.clone())).await;
        assert!(applied.text().is_none());

        applied.record("{\"stats\":{\"date\":100}}".to_string()).await;
        assert_eq!(applied.text(), Some("{\"stats\":{\"date\":100}}"));

        let restored = AppliedSnapshot::load(Some(path)).await;
        assert_eq!(restored.text(), applied.text());
    }

    #[tokio::test]
    async fn test_blank_file_and_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let blank = dir.path().join("blank.json");
        tokio::fs::write(&blank, "  \n").await.unwrap();
        assert!(AppliedSnapshot::load(Some(blank)).await.text().is_none());

        let mut applied = AppliedSnapshot::load(Some(dir.path().join("missing/dir/applied.json"))).await;
        applied.record("{}".to_string()).await;
        assert_eq!(applied.text(), Some("{}"));

        let mut memory_only = AppliedSnapshot::load(None).await;
        memory_only.record("{}".to_string()).await;
        assert_eq!(memory_only.text(), Some("{}"));
    }
}
