//! Worker pool coordinator for the search subsystem.
//!
//! Each worker is an OS thread with private state fed over a channel. The
//! [`PoolManager`] routes typed tasks to idle workers and correlates the
//! PROGRESS / SUCCESS / ERROR messages they emit back to caller callbacks.

mod artifact_worker;
mod error;
mod manager;
mod protocol;
mod search_worker;
mod worker;

pub use artifact_worker::ArtifactWorker;
pub use error::{PoolError, WorkerError};
pub use manager::{PoolConfig, PoolManager, PoolManagerBuilder, PoolStats, TaskCallbacks, TypeStats};
pub use protocol::{Progress, TaskId, TaskOutput, TaskPayload, TaskRequest, WorkerEvent, WorkerMessage, WorkerType};
pub use search_worker::SearchWorker;
pub use worker::{TaskContext, Worker};
