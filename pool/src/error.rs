use crate::protocol::{TaskId, WorkerType};
use std::time::Duration;
use thiserror::Error;

/// Coordinator-side failures, returned synchronously from the [`crate::PoolManager`].
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("no available {0} worker; try again later")]
    NoAvailableWorker(WorkerType),

    #[error("no {0} pool was initialized")]
    UnknownPool(WorkerType),

    #[error("task {task} cannot run on a {worker_type} worker")]
    UnsupportedTask { task: &'static str, worker_type: WorkerType },

    #[error("message for unknown task {0}")]
    UnknownTask(TaskId),

    #[error("{0} worker disconnected")]
    Disconnected(WorkerType),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Failures inside a worker. They travel to the caller as the `error` string of an ERROR message.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Index(#[from] search_core::IndexError),

    #[error("task timed out after {0:?}")]
    Timeout(Duration),

    #[error("task was cancelled")]
    Cancelled,

    #[error("task {0} is not handled by this worker")]
    Unsupported(&'static str),

    #[error("worker panicked: {0}")]
    Panicked(String),
}
