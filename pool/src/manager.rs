use crate::artifact_worker::ArtifactWorker;
use crate::error::PoolError;
use crate::protocol::{Progress, TaskId, TaskOutput, TaskPayload, TaskRequest, WorkerEvent, WorkerMessage, WorkerType};
use crate::search_worker::SearchWorker;
use crate::worker::{spawn_worker, Dispatch, Worker, WorkerHandle};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

type WorkerFactory = Box<dyn Fn(usize) -> Box<dyn Worker> + Send>;
type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;
type SuccessCallback = Box<dyn FnOnce(TaskOutput) + Send>;
type ErrorCallback = Box<dyn FnOnce(String) + Send>;

#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Slot 0 holds the authoritative index; further slots only serve stateless tasks.
    pub search_workers: usize,
    pub artifact_workers: usize,
    /// Worker-side budget checked cooperatively during long tasks.
    pub task_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            search_workers: 1,
            artifact_workers: num_cpus::get().clamp(1, 4),
            task_timeout: None,
        }
    }
}

/// Callbacks invoked from the coordinator's dispatcher thread.
#[derive(Default)]
pub struct TaskCallbacks {
    on_progress: Option<ProgressCallback>,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
}

impl TaskCallbacks {
    pub fn new() -> Self { Self::default() }

    pub fn on_progress(mut self, f: impl Fn(&Progress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn on_success(mut self, f: impl FnOnce(TaskOutput) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(String) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeStats {
    pub total: usize,
    pub busy: usize,
    pub available: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub total: usize,
    pub busy: usize,
    pub available: usize,
    pub pending_tasks: usize,
    pub per_type: BTreeMap<WorkerType, TypeStats>,
}

struct WorkerSlot {
    handle: WorkerHandle,
    busy: bool,
}

struct Pool {
    factory: WorkerFactory,
    slots: Vec<WorkerSlot>,
}

impl Pool {
    fn idle_slot(&self, pinned: bool) -> Option<usize> {
        if pinned {
            self.slots.first().filter(|s| !s.busy).map(|_| 0)
        } else {
            self.slots.iter().position(|s| !s.busy)
        }
    }
}

struct PendingTask {
    worker_type: WorkerType,
    slot: usize,
    task_type: &'static str,
    cancelled: Arc<AtomicBool>,
    callbacks: TaskCallbacks,
}

#[derive(Default)]
struct Inner {
    pools: HashMap<WorkerType, Pool>,
    tasks: HashMap<TaskId, PendingTask>,
    next_id: TaskId,
}

impl Inner {
    fn release(&mut self, worker_type: WorkerType, slot: usize) {
        if let Some(s) = self.pools.get_mut(&worker_type).and_then(|p| p.slots.get_mut(slot)) {
            s.busy = false;
        }
    }
}

pub struct PoolManagerBuilder {
    pools: Vec<(WorkerType, usize, WorkerFactory)>,
    task_timeout: Option<Duration>,
}

impl PoolManagerBuilder {
    /// Register a pool of `size` workers; `factory` receives the slot index.
    pub fn pool<F, W>(mut self, worker_type: WorkerType, size: usize, factory: F) -> Self
    where
        F: Fn(usize) -> W + Send + 'static,
        W: Worker,
    {
        let factory: WorkerFactory = Box::new(move |slot| Box::new(factory(slot)) as Box<dyn Worker>);
        self.pools.push((worker_type, size, factory));
        self
    }

    pub fn task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<PoolManager, PoolError> {
        let (events, receiver) = crossbeam_channel::unbounded::<WorkerMessage>();
        let mut inner = Inner::default();
        for (worker_type, size, factory) in self.pools {
            let slots = spawn_slots(worker_type, size, &factory, &events)?;
            tracing::info!(%worker_type, size, "worker pool initialized");
            inner.pools.insert(worker_type, Pool { factory, slots });
        }
        let inner = Arc::new(Mutex::new(inner));
        let dispatcher_inner = Arc::clone(&inner);
        thread::Builder::new()
            .name("pool-dispatcher".into())
            .spawn(move || run_dispatcher(dispatcher_inner, receiver))?;
        Ok(PoolManager { inner, events, task_timeout: self.task_timeout })
    }
}

/// Owns a fixed-size pool of workers per [`WorkerType`] and correlates their
/// messages back to the callbacks registered at submission.
///
/// Submission never blocks and never queues: when no eligible worker is idle the
/// task is rejected with [`PoolError::NoAvailableWorker`].
pub struct PoolManager {
    inner: Arc<Mutex<Inner>>,
    events: Sender<WorkerMessage>,
    task_timeout: Option<Duration>,
}

impl PoolManager {
    pub fn builder() -> PoolManagerBuilder {
        PoolManagerBuilder { pools: Vec::new(), task_timeout: None }
    }

    /// Search and artifact pools with the default workers.
    pub fn new(config: &PoolConfig) -> Result<Self, PoolError> {
        Self::builder()
            .pool(WorkerType::Search, config.search_workers, |_| SearchWorker::new())
            .pool(WorkerType::Artifact, config.artifact_workers, |_| ArtifactWorker)
            .task_timeout(config.task_timeout)
            .build()
    }

    pub fn submit_task(&self, worker_type: WorkerType, task: TaskPayload, callbacks: TaskCallbacks) -> Result<TaskId, PoolError> {
        let task_type = task.task_type();
        if task.worker_type() != worker_type {
            return Err(PoolError::UnsupportedTask { task: task_type, worker_type });
        }
        let mut guard = self.inner.lock();
        let Inner { pools, tasks, next_id } = &mut *guard;
        let pool = pools.get_mut(&worker_type).ok_or(PoolError::UnknownPool(worker_type))?;
        let slot = pool.idle_slot(task.requires_index()).ok_or(PoolError::NoAvailableWorker(worker_type))?;

        let id = *next_id;
        let cancelled = Arc::new(AtomicBool::new(false));
        let request = TaskRequest { id, task };
        let dispatch = Dispatch { request, cancelled: Arc::clone(&cancelled), timeout: self.task_timeout };
        if !pool.slots[slot].handle.send(dispatch) {
            return Err(PoolError::Disconnected(worker_type));
        }
        *next_id += 1;
        pool.slots[slot].busy = true;
        tasks.insert(id, PendingTask { worker_type, slot, task_type, cancelled, callbacks });
        tracing::debug!(task_id = id, %worker_type, slot, task_type, "task submitted");
        Ok(id)
    }

    /// Stop tracking a task and free its worker. The worker is only asked to stop
    /// cooperatively; whatever it eventually reports is dropped.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        let mut inner = self.inner.lock();
        let Some(task) = inner.tasks.remove(&id) else {
            return false;
        };
        task.cancelled.store(true, Ordering::Relaxed);
        inner.release(task.worker_type, task.slot);
        tracing::debug!(task_id = id, task_type = task.task_type, "task cancelled");
        true
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        let mut stats = PoolStats { pending_tasks: inner.tasks.len(), ..Default::default() };
        for (worker_type, pool) in &inner.pools {
            let total = pool.slots.len();
            let busy = pool.slots.iter().filter(|s| s.busy).count();
            stats.total += total;
            stats.busy += busy;
            stats.per_type.insert(*worker_type, TypeStats { total, busy, available: total - busy });
        }
        stats.available = stats.total - stats.busy;
        stats
    }

    /// Replace every worker of `worker_type` with a fresh one.
    ///
    /// Tasks in flight on the old workers are abandoned: their callbacks are dropped
    /// without being called and their ids are returned. Fresh search workers start
    /// with an empty index.
    pub fn restart_pool(&self, worker_type: WorkerType) -> Result<Vec<TaskId>, PoolError> {
        let mut inner = self.inner.lock();
        let pool = inner.pools.get_mut(&worker_type).ok_or(PoolError::UnknownPool(worker_type))?;
        let slots = spawn_slots(worker_type, pool.slots.len(), &pool.factory, &self.events)?;
        pool.slots = slots;

        let abandoned: Vec<TaskId> = inner
            .tasks
            .iter()
            .filter(|(_, t)| t.worker_type == worker_type)
            .map(|(id, _)| *id)
            .collect();
        for id in &abandoned {
            if let Some(task) = inner.tasks.remove(id) {
                task.cancelled.store(true, Ordering::Relaxed);
                tracing::warn!(task_id = id, task_type = task.task_type, %worker_type, "task abandoned by pool restart");
            }
        }
        tracing::info!(%worker_type, abandoned = abandoned.len(), "worker pool restarted");
        Ok(abandoned)
    }
}

impl Drop for PoolManager {
    fn drop(&mut self) {
        // Closing every worker channel lets the threads wind down; the dispatcher
        // exits once the last event sender is gone.
        let mut inner = self.inner.lock();
        inner.pools.clear();
        inner.tasks.clear();
    }
}

fn spawn_slots(
    worker_type: WorkerType,
    size: usize,
    factory: &WorkerFactory,
    events: &Sender<WorkerMessage>,
) -> Result<Vec<WorkerSlot>, PoolError> {
    (0..size)
        .map(|slot| {
            let handle = spawn_worker(worker_type, slot, factory(slot), events.clone())?;
            Ok::<_, PoolError>(WorkerSlot { handle, busy: false })
        })
        .collect()
}

enum Delivery {
    Progress(ProgressCallback, Progress),
    Success(Option<SuccessCallback>, TaskOutput),
    Error(Option<ErrorCallback>, String),
}

fn run_dispatcher(inner: Arc<Mutex<Inner>>, receiver: Receiver<WorkerMessage>) {
    for message in receiver.iter() {
        let id = message.id;
        // Callbacks run with the lock released so they may submit follow-up tasks.
        let delivery = {
            let mut guard = inner.lock();
            match message.event {
                WorkerEvent::Progress(progress) => match guard.tasks.get(&id) {
                    Some(task) => task.callbacks.on_progress.clone().map(|cb| Delivery::Progress(cb, progress)),
                    None => {
                        tracing::debug!(error = %PoolError::UnknownTask(id), "dropping progress message");
                        None
                    }
                },
                terminal => match guard.tasks.remove(&id) {
                    Some(task) => {
                        guard.release(task.worker_type, task.slot);
                        let callbacks = task.callbacks;
                        match terminal {
                            WorkerEvent::Success(output) => Some(Delivery::Success(callbacks.on_success, output)),
                            WorkerEvent::Error { error } => Some(Delivery::Error(callbacks.on_error, error)),
                            WorkerEvent::Progress(_) => None,
                        }
                    }
                    None => {
                        tracing::debug!(error = %PoolError::UnknownTask(id), "dropping result message");
                        None
                    }
                },
            }
        };
        match delivery {
            Some(Delivery::Progress(cb, progress)) => cb(&progress),
            Some(Delivery::Success(Some(cb), output)) => cb(output),
            Some(Delivery::Error(Some(cb), error)) => cb(error),
            Some(Delivery::Error(None, error)) => {
                tracing::warn!(task_id = id, %error, "task failed with no error callback");
            }
            _ => {}
        }
    }
    tracing::debug!("pool dispatcher stopped");
}
