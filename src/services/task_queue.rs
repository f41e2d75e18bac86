//! Task Queue (§4.4 Task Queue, C6): lane-limited FIFO with delayed
//! enqueue, completion waiters, and cooperative cancellation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{watch, Mutex, Semaphore};
use uuid::Uuid;

use crate::domain::error::{TaskError, WaitError};
use crate::domain::models::{Lane, Task, TaskResult, TaskStatus};
use crate::services::task_store::TaskStore;

/// A runner resolves with the task's result or fails with a message stored
/// on the task record (§4.4, §7 propagation policy).
pub type RunnerFn = Arc<dyn Fn(Task, CancellationSignal) -> BoxFuture<'static, Result<TaskResult, String>> + Send + Sync>;

/// Cooperative cancellation token handed to runners (§5 cancellation model).
#[derive(Clone)]
pub struct CancellationSignal {
    rx: watch::Receiver<bool>,
}

impl CancellationSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|v| *v).await;
    }
}

struct QueuedItem {
    task: Task,
    runner: RunnerFn,
}

type Completion = Result<TaskResult, TaskError>;
type Completions = Arc<Mutex<HashMap<Uuid, watch::Sender<Option<Completion>>>>>;
type Cancellations = Arc<Mutex<HashMap<Uuid, watch::Sender<bool>>>>;
type InFlight = Arc<Mutex<HashMap<Uuid, Lane>>>;

struct LaneState {
    queue: Mutex<VecDeque<QueuedItem>>,
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

pub struct TaskQueue {
    store: Arc<TaskStore>,
    lanes: HashMap<Lane, Arc<LaneState>>,
    completions: Completions,
    cancellations: Cancellations,
    in_flight: InFlight,
}

impl TaskQueue {
    pub fn new(store: Arc<TaskStore>, max_concurrent: HashMap<Lane, usize>) -> Self {
        let mut lanes = HashMap::new();
        for lane in [Lane::Main, Lane::Autonomous, Lane::Maintenance] {
            let cap = max_concurrent.get(&lane).copied().unwrap_or(lane.default_max_concurrent() as usize);
            lanes.insert(
                lane,
                Arc::new(LaneState {
                    queue: Mutex::new(VecDeque::new()),
                    semaphore: Arc::new(Semaphore::new(cap)),
                    capacity: cap,
                }),
            );
        }
        Self {
            store,
            lanes,
            completions: Arc::new(Mutex::new(HashMap::new())),
            cancellations: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Current count of running tasks in `lane` (§5 invariant `inFlight <= maxConcurrent`).
    pub fn in_flight_count(&self, lane: Lane) -> usize {
        let lane_state = &self.lanes[&lane];
        lane_state.capacity - lane_state.semaphore.available_permits()
    }

    pub async fn enqueue(&self, task: Task, runner: RunnerFn) -> Result<(), TaskError> {
        let lane = task.lane;
        self.register_waiters(task.id).await;
        let lane_state = self.lanes[&lane].clone();
        lane_state.queue.lock().await.push_back(QueuedItem { task, runner });
        self.dispatch(lane);
        Ok(())
    }

    /// Defers enqueue by `delay_ms`. The task is marked `retrying` for the
    /// wait and transitioned back to `queued` immediately before dispatch.
    pub fn enqueue_with_delay(self: &Arc<Self>, task: Task, runner: RunnerFn, delay_ms: u64) {
        let this = self.clone();
        let task_id = task.id;
        tokio::spawn(async move {
            this.register_waiters(task_id).await;
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let mut task = task;
            if this.store.get(task.id).await.ok().flatten().is_some() {
                if let Ok(updated) = this.store.update_status(task.id, TaskStatus::Queued, None).await {
                    task = updated;
                }
            }
            let _ = this.enqueue(task, runner).await;
        });
    }

    async fn register_waiters(&self, id: Uuid) {
        let (tx, _rx) = watch::channel(None);
        self.completions.lock().await.insert(id, tx);
        let (ctx, _crx) = watch::channel(false);
        self.cancellations.lock().await.insert(id, ctx);
    }

    fn dispatch(&self, lane: Lane) {
        spawn_lane_worker(
            lane,
            self.lanes[&lane].clone(),
            self.store.clone(),
            self.completions.clone(),
            self.cancellations.clone(),
            self.in_flight.clone(),
        );
    }

    pub async fn wait_for_completion(&self, task_id: Uuid, timeout_ms: u64) -> Result<TaskResult, WaitError> {
        let mut rx = {
            let completions = self.completions.lock().await;
            match completions.get(&task_id) {
                Some(tx) => tx.subscribe(),
                None => return Err(WaitError::Timeout),
            }
        };

        let wait = async {
            loop {
                if let Some(completion) = rx.borrow().clone() {
                    return completion;
                }
                if rx.changed().await.is_err() {
                    return Err(TaskError::Store("completion channel closed".to_string()));
                }
            }
        };

        match tokio::time::timeout(Duration::from_millis(timeout_ms), wait).await {
            Ok(Ok(task_result)) => Ok(task_result),
            _ => Err(WaitError::Timeout),
        }
    }

    /// Cancels a task. Queued tasks are removed without running; running
    /// tasks are signalled cooperatively (§4.4, §5).
    pub async fn cancel(&self, task_id: Uuid) -> Result<(), TaskError> {
        for lane_state in self.lanes.values() {
            let mut queue = lane_state.queue.lock().await;
            if let Some(pos) = queue.iter().position(|item| item.task.id == task_id) {
                queue.remove(pos);
                self.store.update_status(task_id, TaskStatus::Cancelled, None).await?;
                if let Some(tx) = self.completions.lock().await.remove(&task_id) {
                    let _ = tx.send(Some(Err(TaskError::Store("cancelled".to_string()))));
                }
                return Ok(());
            }
        }
        if let Some(tx) = self.cancellations.lock().await.get(&task_id) {
            let _ = tx.send(true);
        }
        Ok(())
    }
}

/// Pulls queued items for `lane` while permits are available, running each
/// on its own task. Re-invoked (rather than looped forever) whenever new
/// work arrives — by `enqueue`, or by the delayed retry re-queue below —
/// since it exits as soon as the lane's queue runs dry.
fn spawn_lane_worker(
    lane: Lane,
    lane_state: Arc<LaneState>,
    store: Arc<TaskStore>,
    completions: Completions,
    cancellations: Cancellations,
    in_flight: InFlight,
) {
    tokio::spawn(async move {
        loop {
            let permit = match lane_state.semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let item = {
                let mut queue = lane_state.queue.lock().await;
                queue.pop_front()
            };
            let Some(item) = item else {
                drop(permit);
                return;
            };

            let lane_state = lane_state.clone();
            let store = store.clone();
            let completions = completions.clone();
            let cancellations = cancellations.clone();
            let in_flight = in_flight.clone();
            tokio::spawn(async move {
                let _permit = permit;
                run_item(lane, lane_state, item, store, completions, cancellations, in_flight).await;
            });
        }
    });
}

/// Runs one queued item to its conclusion: success/failure/cancellation
/// resolve the task's completion waiters; a failure with attempts left
/// instead schedules a delayed re-queue (§4.4 `enqueueWithDelay`) and
/// leaves the completion waiters registered for the eventual outcome.
async fn run_item(
    lane: Lane,
    lane_state: Arc<LaneState>,
    item: QueuedItem,
    store: Arc<TaskStore>,
    completions: Completions,
    cancellations: Cancellations,
    in_flight: InFlight,
) {
    let task_id = item.task.id;
    in_flight.lock().await.insert(task_id, lane);

    let cancel_rx = cancellations
        .lock()
        .await
        .get(&task_id)
        .map(|tx| tx.subscribe())
        .unwrap_or_else(|| watch::channel(false).1);
    let signal = CancellationSignal { rx: cancel_rx.clone() };

    let _ = store.update_status(task_id, TaskStatus::Running, None).await;
    let result = (item.runner)(item.task.clone(), signal).await;

    if *cancel_rx.borrow() {
        let _ = store.update_status(task_id, TaskStatus::Cancelled, None).await;
        in_flight.lock().await.remove(&task_id);
        if let Some(tx) = completions.lock().await.remove(&task_id) {
            let _ = tx.send(Some(Err(TaskError::Store("cancelled".to_string()))));
        }
        cancellations.lock().await.remove(&task_id);
        return;
    }

    let message = match result {
        Ok(task_result) => {
            let _ = store.record_success(task_id).await;
            let _ = store.set_result(task_id, task_result.clone()).await;
            in_flight.lock().await.remove(&task_id);
            if let Some(tx) = completions.lock().await.remove(&task_id) {
                let _ = tx.send(Some(Ok(task_result)));
            }
            cancellations.lock().await.remove(&task_id);
            return;
        }
        Err(message) => message,
    };

    let exhausted = match store.get(task_id).await {
        Ok(Some(task)) => task.retry.attempted + 1 >= task.retry.max_attempts,
        _ => true,
    };

    in_flight.lock().await.remove(&task_id);

    if exhausted {
        let updated = store.record_failure(task_id, message.clone()).await;
        let completion = match updated {
            Ok(_) => Err(TaskError::Store(message)),
            Err(e) => Err(e),
        };
        if let Some(tx) = completions.lock().await.remove(&task_id) {
            let _ = tx.send(Some(completion));
        }
        cancellations.lock().await.remove(&task_id);
        return;
    }

    match store.record_retry(task_id, message).await {
        Ok((_, delay_ms)) => {
            let runner = item.runner.clone();
            let cancel_rx = cancel_rx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                if *cancel_rx.borrow() {
                    let _ = store.update_status(task_id, TaskStatus::Cancelled, None).await;
                    if let Some(tx) = completions.lock().await.remove(&task_id) {
                        let _ = tx.send(Some(Err(TaskError::Store("cancelled".to_string()))));
                    }
                    cancellations.lock().await.remove(&task_id);
                    return;
                }
                if let Ok(task) = store.update_status(task_id, TaskStatus::Queued, None).await {
                    lane_state.queue.lock().await.push_back(QueuedItem { task, runner });
                    spawn_lane_worker(lane, lane_state, store, completions, cancellations, in_flight);
                }
            });
        }
        Err(_) => {
            if let Some(tx) = completions.lock().await.remove(&task_id) {
                let _ = tx.send(Some(Err(TaskError::Store("retry bookkeeping failed".to_string()))));
            }
            cancellations.lock().await.remove(&task_id);
        }
    }
}
