use crate::error::WorkerError;
use crate::protocol::{Progress, TaskId, TaskOutput, TaskPayload, TaskRequest, WorkerEvent, WorkerMessage, WorkerType};
use crossbeam_channel::{Receiver, Sender};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A unit of background execution with private state. Tasks run to completion one
/// at a time in arrival order.
pub trait Worker: Send + 'static {
    fn handle(&mut self, task: TaskPayload, ctx: &TaskContext) -> Result<TaskOutput, WorkerError>;
}

/// Per-task handle given to [`Worker::handle`] for progress reporting and
/// cooperative cancellation/timeout checks.
pub struct TaskContext {
    id: TaskId,
    events: Sender<WorkerMessage>,
    cancelled: Arc<AtomicBool>,
    timeout: Option<Duration>,
    started: Instant,
}

impl TaskContext {
    pub fn id(&self) -> TaskId { self.id }

    pub fn progress(&self, message: impl Into<String>, progress: u8) {
        let event = WorkerEvent::Progress(Progress { message: message.into(), progress: progress.min(100) });
        // The coordinator may already be gone; progress is best-effort.
        let _ = self.events.send(WorkerMessage { id: self.id, event });
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Fails with `Cancelled` once the coordinator cancelled the task, or `Timeout`
    /// once the configured task timeout has elapsed.
    pub fn checkpoint(&self) -> Result<(), WorkerError> {
        if self.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }
        if let Some(timeout) = self.timeout {
            if self.started.elapsed() >= timeout {
                return Err(WorkerError::Timeout(timeout));
            }
        }
        Ok(())
    }
}

/// What the coordinator sends down a worker's channel.
pub(crate) struct Dispatch {
    pub request: TaskRequest,
    pub cancelled: Arc<AtomicBool>,
    pub timeout: Option<Duration>,
}

/// Coordinator-side handle to a worker thread. Dropping it closes the channel,
/// which ends the thread after its current task.
pub(crate) struct WorkerHandle {
    sender: Sender<Dispatch>,
    _thread: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn send(&self, dispatch: Dispatch) -> bool {
        self.sender.send(dispatch).is_ok()
    }
}

pub(crate) fn spawn_worker(
    worker_type: WorkerType,
    slot: usize,
    worker: Box<dyn Worker>,
    events: Sender<WorkerMessage>,
) -> std::io::Result<WorkerHandle> {
    let (sender, receiver) = crossbeam_channel::unbounded::<Dispatch>();
    let thread = thread::Builder::new()
        .name(format!("{worker_type}-worker-{slot}"))
        .spawn(move || run_worker(worker_type, slot, worker, receiver, events))?;
    Ok(WorkerHandle { sender, _thread: thread })
}

fn run_worker(
    worker_type: WorkerType,
    slot: usize,
    mut worker: Box<dyn Worker>,
    receiver: Receiver<Dispatch>,
    events: Sender<WorkerMessage>,
) {
    tracing::debug!(%worker_type, slot, "worker started");
    for Dispatch { request, cancelled, timeout } in receiver.iter() {
        let TaskRequest { id, task } = request;
        let task_type = task.task_type();
        let ctx = TaskContext {
            id,
            events: events.clone(),
            cancelled,
            timeout,
            started: Instant::now(),
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker.handle(task, &ctx)));
        let event = match outcome {
            Ok(Ok(output)) => WorkerEvent::Success(output),
            Ok(Err(err)) => {
                tracing::debug!(task_id = id, task_type, error = %err, "task failed");
                WorkerEvent::Error { error: err.to_string() }
            }
            Err(payload) => {
                let err = WorkerError::Panicked(panic_message(payload.as_ref()));
                tracing::warn!(task_id = id, task_type, error = %err, "task panicked");
                WorkerEvent::Error { error: err.to_string() }
            }
        };
        if events.send(WorkerMessage { id, event }).is_err() {
            break;
        }
    }
    tracing::debug!(%worker_type, slot, "worker stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
