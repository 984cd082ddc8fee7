use crate::tokenizer::tokenize;
use crate::{Artifact, DocId, ForwardEntry, IndexError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;
use time::OffsetDateTime;

/// In-memory document store plus forward and inverted indices.
///
/// Every mutation goes through [`SearchIndex::index_document`] and
/// [`SearchIndex::remove_document`], which are exact inverses: after a removal no
/// posting set references the removed id and no empty posting set is left behind.
#[derive(Debug, Default, Clone)]
pub struct SearchIndex {
    pub(crate) artifacts: BTreeMap<DocId, Artifact>,
    pub(crate) forward: BTreeMap<DocId, ForwardEntry>,
    pub(crate) inverted: BTreeMap<String, BTreeSet<DocId>>,
    pub(crate) last_updated: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedArtifact {
    pub id: DocId,
    pub word_count: usize,
    pub unique_word_count: usize,
}

/// A single document that failed inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexingError {
    pub id: DocId,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub total: usize,
    pub indexed: Vec<IndexedArtifact>,
    pub errors: Vec<IndexingError>,
    /// Set when the progress callback asked to stop before the batch was exhausted.
    pub interrupted: bool,
    /// Why an interrupted batch stopped, as reported by the caller that stopped it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub total_artifacts: usize,
    pub total_terms: usize,
    pub total_tokens: usize,
    pub average_tokens_per_artifact: f64,
    pub types: BTreeMap<String, usize>,
    pub languages: BTreeMap<String, usize>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
}

impl SearchIndex {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.forward.len() }

    pub fn is_empty(&self) -> bool { self.forward.is_empty() }

    pub fn contains(&self, id: &str) -> bool { self.forward.contains_key(id) }

    pub fn artifact(&self, id: &str) -> Option<&Artifact> { self.artifacts.get(id) }

    pub fn postings(&self, term: &str) -> Option<&BTreeSet<DocId>> { self.inverted.get(term) }

    pub fn vocabulary(&self) -> impl Iterator<Item = &str> {
        self.inverted.keys().map(String::as_str)
    }

    /// Index (or re-index) an artifact. A previous version with the same id is fully
    /// retracted before the new postings are added.
    pub fn index_document(&mut self, artifact: Artifact) -> Result<IndexedArtifact> {
        if artifact.id.trim().is_empty() {
            return Err(IndexError::EmptyId);
        }
        self.remove_document(&artifact.id);

        let tokens = tokenize(&artifact.content);
        let unique: BTreeSet<&str> = tokens.iter().map(String::as_str).collect();
        for term in &unique {
            self.inverted
                .entry((*term).to_string())
                .or_default()
                .insert(artifact.id.clone());
        }

        let entry = ForwardEntry {
            word_count: tokens.len(),
            unique_word_count: unique.len(),
            tokens,
            title: artifact.title.clone(),
            artifact_type: artifact.artifact_type.clone(),
            language: artifact.language.clone(),
            tags: artifact.tags.clone(),
            created_at: artifact.created_at,
            updated_at: artifact.updated_at,
        };
        let indexed = IndexedArtifact {
            id: artifact.id.clone(),
            word_count: entry.word_count,
            unique_word_count: entry.unique_word_count,
        };
        tracing::debug!(doc_id = %artifact.id, tokens = entry.word_count, "indexed artifact");
        self.forward.insert(artifact.id.clone(), entry);
        self.artifacts.insert(artifact.id.clone(), artifact);
        self.touch();
        Ok(indexed)
    }

    pub fn index_batch(&mut self, artifacts: Vec<Artifact>) -> BatchReport {
        self.index_batch_with(artifacts, |_, _| ControlFlow::Continue(()))
    }

    /// Index a batch, calling `step(done, total)` before each artifact. Returning
    /// `Break` stops the batch; artifacts already indexed stay indexed.
    /// A failing artifact is recorded in the report and does not stop the rest.
    pub fn index_batch_with<F>(&mut self, artifacts: Vec<Artifact>, mut step: F) -> BatchReport
    where
        F: FnMut(usize, usize) -> ControlFlow<()>,
    {
        let total = artifacts.len();
        let mut report = BatchReport { total, ..Default::default() };
        for (done, artifact) in artifacts.into_iter().enumerate() {
            if step(done, total).is_break() {
                report.interrupted = true;
                break;
            }
            let id = artifact.id.clone();
            match self.index_document(artifact) {
                Ok(indexed) => report.indexed.push(indexed),
                Err(err) => {
                    tracing::warn!(doc_id = %id, error = %err, "failed to index artifact in batch");
                    report.errors.push(IndexingError { id, error: err.to_string() });
                }
            }
        }
        report
    }

    /// Remove an artifact and every posting it contributed. Unknown ids are a no-op.
    pub fn remove_document(&mut self, id: &str) -> bool {
        let Some(entry) = self.forward.remove(id) else {
            return false;
        };
        for term in &entry.tokens {
            if let Some(postings) = self.inverted.get_mut(term) {
                postings.remove(id);
                if postings.is_empty() {
                    self.inverted.remove(term);
                }
            }
        }
        self.artifacts.remove(id);
        self.touch();
        tracing::debug!(doc_id = %id, "removed artifact");
        true
    }

    pub fn update_document(&mut self, artifact: Artifact) -> Result<IndexedArtifact> {
        if artifact.id.trim().is_empty() {
            return Err(IndexError::EmptyId);
        }
        self.remove_document(&artifact.id);
        self.index_document(artifact)
    }

    pub fn clear(&mut self) {
        self.artifacts.clear();
        self.forward.clear();
        self.inverted.clear();
        self.touch();
    }

    pub fn stats(&self) -> IndexStats {
        let total_tokens: usize = self.forward.values().map(|e| e.word_count).sum();
        let mut types = BTreeMap::new();
        let mut languages = BTreeMap::new();
        for entry in self.forward.values() {
            if !entry.artifact_type.is_empty() {
                *types.entry(entry.artifact_type.clone()).or_insert(0) += 1;
            }
            if let Some(lang) = &entry.language {
                *languages.entry(lang.clone()).or_insert(0) += 1;
            }
        }
        let average = if self.forward.is_empty() {
            0.0
        } else {
            total_tokens as f64 / self.forward.len() as f64
        };
        IndexStats {
            total_artifacts: self.forward.len(),
            total_terms: self.inverted.len(),
            total_tokens,
            average_tokens_per_artifact: average,
            types,
            languages,
            last_updated: self.last_updated,
        }
    }

    fn touch(&mut self) {
        self.last_updated = Some(OffsetDateTime::now_utc());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reindex_retracts_old_terms() {
        let mut index = SearchIndex::new();
        index.index_document(Artifact::new("a", "alpha beta")).unwrap();
        index.index_document(Artifact::new("a", "gamma")).unwrap();
        assert!(index.postings("alpha").is_none());
        assert!(index.postings("beta").is_none());
        assert_eq!(index.postings("gamma").unwrap().len(), 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn empty_id_is_rejected() {
        let mut index = SearchIndex::new();
        assert!(matches!(index.index_document(Artifact::new(" ", "text")), Err(IndexError::EmptyId)));
        assert!(index.is_empty());
    }

    #[test]
    fn batch_collects_errors_and_continues() {
        let mut index = SearchIndex::new();
        let report = index.index_batch(vec![
            Artifact::new("1", "first document"),
            Artifact::new("", "broken"),
            Artifact::new("3", "third document"),
        ]);
        assert_eq!(report.total, 3);
        assert_eq!(report.indexed.len(), 2);
        assert_eq!(report.errors.len(), 1);
        assert!(!report.interrupted);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn batch_stops_on_break() {
        let mut index = SearchIndex::new();
        let report = index.index_batch_with(
            vec![Artifact::new("1", "one"), Artifact::new("2", "two")],
            |done, _| if done == 1 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) },
        );
        assert!(report.interrupted);
        assert_eq!(report.indexed.len(), 1);
        assert!(index.contains("1"));
        assert!(!index.contains("2"));
    }

    #[test]
    fn stats_count_types_and_languages() {
        let mut index = SearchIndex::new();
        index.index_document(Artifact::new("1", "fn main rust code").with_type("code").with_language("rust")).unwrap();
        index.index_document(Artifact::new("2", "shopping list eggs").with_type("note")).unwrap();
        let stats = index.stats();
        assert_eq!(stats.total_artifacts, 2);
        assert_eq!(stats.types.get("code"), Some(&1));
        assert_eq!(stats.languages.get("rust"), Some(&1));
        assert!(stats.last_updated.is_some());
    }
}
