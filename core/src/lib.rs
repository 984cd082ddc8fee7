pub mod analyzer;
pub mod error;
pub mod index;
pub mod persist;
pub mod query;
pub mod snippet;
pub mod tokenizer;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;

pub use error::{IndexError, Result};
pub use index::{BatchReport, IndexStats, IndexedArtifact, IndexingError, SearchIndex};
pub use query::{FuzzyOptions, SearchFilters, SearchHit, SearchOptions, SearchResults, SortBy, SortOrder};

pub type DocId = String;

/// An artifact as submitted by a caller. The id is caller-assigned and stable across updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: DocId,
    pub content: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub artifact_type: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(with = "time::serde::rfc3339", default = "now_utc")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339", default = "now_utc")]
    pub updated_at: OffsetDateTime,
}

impl Artifact {
    pub fn new(id: impl Into<DocId>, content: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.into(),
            content: content.into(),
            title: String::new(),
            artifact_type: String::new(),
            language: None,
            tags: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_type(mut self, artifact_type: impl Into<String>) -> Self {
        self.artifact_type = artifact_type.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Forward index entry: extracted tokens plus the metadata needed to filter without touching the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardEntry {
    pub tokens: Vec<String>,
    pub word_count: usize,
    pub unique_word_count: usize,
    pub title: String,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub language: Option<String>,
    pub tags: BTreeSet<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ForwardEntry {
    /// Number of occurrences of `term` in this entry's token sequence.
    pub fn term_count(&self, term: &str) -> usize {
        self.tokens.iter().filter(|t| t.as_str() == term).count()
    }
}

fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}
