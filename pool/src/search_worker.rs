use crate::error::WorkerError;
use crate::protocol::{TaskOutput, TaskPayload};
use crate::worker::{TaskContext, Worker};
use search_core::tokenizer::tokenize;
use search_core::SearchIndex;
use std::ops::ControlFlow;

/// Worker owning one private [`SearchIndex`] and serving every index task type.
#[derive(Default)]
pub struct SearchWorker {
    index: SearchIndex,
}

impl SearchWorker {
    pub fn new() -> Self { Self::default() }
}

impl Worker for SearchWorker {
    fn handle(&mut self, task: TaskPayload, ctx: &TaskContext) -> Result<TaskOutput, WorkerError> {
        match task {
            TaskPayload::IndexArtifact(artifact) => {
                ctx.progress(format!("Indexing artifact {}", artifact.id), 10);
                let indexed = self.index.index_document(artifact)?;
                ctx.progress("Indexing complete", 100);
                Ok(TaskOutput::Indexed(indexed))
            }
            TaskPayload::IndexBatch(artifacts) => {
                let mut stopped = None;
                let mut report = self.index.index_batch_with(artifacts, |done, total| {
                    if let Err(err) = ctx.checkpoint() {
                        stopped = Some(err);
                        return ControlFlow::Break(());
                    }
                    let percent = (done * 100 / total.max(1)) as u8;
                    ctx.progress(format!("Indexing {} of {total}", done + 1), percent);
                    ControlFlow::Continue(())
                });
                // Artifacts indexed before the stop stay indexed, so the partial report is the result.
                if let Some(err) = stopped {
                    tracing::warn!(task_id = ctx.id(), indexed = report.indexed.len(), total = report.total, error = %err, "batch stopped early");
                    report.stop_reason = Some(err.to_string());
                } else {
                    ctx.progress("Batch indexing complete", 100);
                }
                Ok(TaskOutput::Batch(report))
            }
            TaskPayload::Search { query, options } => {
                ctx.progress("Searching", 50);
                Ok(TaskOutput::Results(self.index.search(&query, &options)))
            }
            TaskPayload::AdvancedSearch { query, options } => {
                ctx.progress("Running advanced search", 50);
                Ok(TaskOutput::Results(self.index.advanced_search(&query, &options)))
            }
            TaskPayload::FuzzySearch { query, options } => {
                ctx.progress("Running fuzzy search", 50);
                let scan = self.index.fuzzy_search_with(&query, &options, || match ctx.checkpoint() {
                    Ok(()) => ControlFlow::Continue(()),
                    Err(err) => ControlFlow::Break(err),
                });
                match scan {
                    ControlFlow::Continue(results) => Ok(TaskOutput::Results(results)),
                    ControlFlow::Break(err) => Err(err),
                }
            }
            TaskPayload::RemoveFromIndex { id } => {
                let removed = self.index.remove_document(&id);
                Ok(TaskOutput::Removed { id, removed })
            }
            TaskPayload::UpdateIndex(artifact) => {
                ctx.progress(format!("Updating artifact {}", artifact.id), 10);
                Ok(TaskOutput::Indexed(self.index.update_document(artifact)?))
            }
            TaskPayload::GetSuggestions { query, limit } => {
                Ok(TaskOutput::Suggestions { suggestions: self.index.suggestions(&query, limit) })
            }
            TaskPayload::GetIndexStats => Ok(TaskOutput::Stats(self.index.stats())),
            TaskPayload::ClearIndex => {
                let cleared = self.index.len();
                self.index.clear();
                Ok(TaskOutput::Cleared { cleared })
            }
            TaskPayload::ExportIndex => {
                ctx.progress("Exporting index", 50);
                Ok(TaskOutput::Snapshot(Box::new(self.index.export_snapshot())))
            }
            TaskPayload::ImportIndex(snapshot) => {
                ctx.progress("Importing index", 50);
                self.index.import_snapshot(*snapshot)?;
                let stats = self.index.stats();
                Ok(TaskOutput::Imported { artifacts: stats.total_artifacts, terms: stats.total_terms })
            }
            TaskPayload::Tokenize { text } => Ok(TaskOutput::Tokens { tokens: tokenize(&text) }),
            other @ TaskPayload::ProcessArtifact(_) => Err(WorkerError::Unsupported(other.task_type())),
        }
    }
}
