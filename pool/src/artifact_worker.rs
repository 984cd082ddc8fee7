use crate::error::WorkerError;
use crate::protocol::{TaskOutput, TaskPayload};
use crate::worker::{TaskContext, Worker};
use search_core::analyzer::{analyze, enrich};

/// Stateless worker running content analysis ahead of indexing.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArtifactWorker;

impl Worker for ArtifactWorker {
    fn handle(&mut self, task: TaskPayload, ctx: &TaskContext) -> Result<TaskOutput, WorkerError> {
        match task {
            TaskPayload::ProcessArtifact(artifact) => {
                ctx.progress("Analyzing content", 25);
                let analysis = analyze(&artifact.content);
                ctx.checkpoint()?;
                let artifact = enrich(artifact, &analysis);
                ctx.progress("Analysis complete", 100);
                Ok(TaskOutput::Analysis { artifact, analysis })
            }
            other => Err(WorkerError::Unsupported(other.task_type())),
        }
    }
}
