use search_core::analyzer::ContentAnalysis;
use search_core::persist::IndexSnapshot;
use search_core::{Artifact, BatchReport, DocId, FuzzyOptions, IndexStats, IndexedArtifact, SearchOptions, SearchResults};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type TaskId = u64;

pub const DEFAULT_SUGGESTION_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerType {
    /// Owns a private search index.
    Search,
    /// Stateless content analysis.
    Artifact,
}

impl WorkerType {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerType::Search => "search",
            WorkerType::Artifact => "artifact",
        }
    }
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_suggestion_limit() -> usize { DEFAULT_SUGGESTION_LIMIT }

/// Task-specific payload; serialized as `{ "type": <TASK_TYPE>, "data": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPayload {
    IndexArtifact(Artifact),
    IndexBatch(Vec<Artifact>),
    Search {
        query: String,
        #[serde(default)]
        options: SearchOptions,
    },
    AdvancedSearch {
        query: String,
        #[serde(default)]
        options: SearchOptions,
    },
    FuzzySearch {
        query: String,
        #[serde(default)]
        options: FuzzyOptions,
    },
    RemoveFromIndex { id: DocId },
    UpdateIndex(Artifact),
    GetSuggestions {
        query: String,
        #[serde(default = "default_suggestion_limit")]
        limit: usize,
    },
    GetIndexStats,
    ClearIndex,
    ExportIndex,
    ImportIndex(Box<IndexSnapshot>),
    Tokenize { text: String },
    ProcessArtifact(Artifact),
}

impl TaskPayload {
    pub fn task_type(&self) -> &'static str {
        match self {
            TaskPayload::IndexArtifact(_) => "INDEX_ARTIFACT",
            TaskPayload::IndexBatch(_) => "INDEX_BATCH",
            TaskPayload::Search { .. } => "SEARCH",
            TaskPayload::AdvancedSearch { .. } => "ADVANCED_SEARCH",
            TaskPayload::FuzzySearch { .. } => "FUZZY_SEARCH",
            TaskPayload::RemoveFromIndex { .. } => "REMOVE_FROM_INDEX",
            TaskPayload::UpdateIndex(_) => "UPDATE_INDEX",
            TaskPayload::GetSuggestions { .. } => "GET_SUGGESTIONS",
            TaskPayload::GetIndexStats => "GET_INDEX_STATS",
            TaskPayload::ClearIndex => "CLEAR_INDEX",
            TaskPayload::ExportIndex => "EXPORT_INDEX",
            TaskPayload::ImportIndex(_) => "IMPORT_INDEX",
            TaskPayload::Tokenize { .. } => "TOKENIZE",
            TaskPayload::ProcessArtifact(_) => "PROCESS_ARTIFACT",
        }
    }

    /// The pool this task must be submitted to.
    pub fn worker_type(&self) -> WorkerType {
        match self {
            TaskPayload::ProcessArtifact(_) => WorkerType::Artifact,
            _ => WorkerType::Search,
        }
    }

    /// Tasks that read or write index state. These are pinned to the primary search
    /// worker so that a single authoritative index exists per pool.
    pub fn requires_index(&self) -> bool {
        !matches!(self, TaskPayload::Tokenize { .. } | TaskPayload::ProcessArtifact(_))
    }
}

/// Coordinator → worker envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub id: TaskId,
    #[serde(flatten)]
    pub task: TaskPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub message: String,
    /// 0..=100
    pub progress: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskOutput {
    Indexed(IndexedArtifact),
    Batch(BatchReport),
    Results(SearchResults),
    Removed { id: DocId, removed: bool },
    Suggestions { suggestions: Vec<String> },
    Stats(IndexStats),
    Cleared { cleared: usize },
    Snapshot(Box<IndexSnapshot>),
    Imported { artifacts: usize, terms: usize },
    Tokens { tokens: Vec<String> },
    #[serde(rename_all = "camelCase")]
    Analysis { artifact: Artifact, analysis: ContentAnalysis },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerEvent {
    Progress(Progress),
    Success(TaskOutput),
    Error { error: String },
}

impl WorkerEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerEvent::Progress(_))
    }
}

/// Worker → coordinator envelope: zero or more PROGRESS, then exactly one SUCCESS or ERROR.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerMessage {
    pub id: TaskId,
    #[serde(flatten)]
    pub event: WorkerEvent,
}
