//! Scheduler run loop.
//!
//! A single thread executes every task body, one at a time. Due work sits
//! in a FIFO ready queue; future work sits in a min-heap ordered by
//! deadline. The loop moves expired heap entries to the ready queue,
//! drains it, then blocks on a [`WakeSignal`] until the next deadline, a
//! new submission, or a stop request.

use crate::config::SchedulerConfig;
use crate::error::{AgentError, Result};
use crate::scheduler::tasks::{Delay, Task, TaskId, TaskRecord};
use crate::scheduler::wake::WakeSignal;
use crate::state::StateStore;
use crate::util::{format_elapsed, now_epoch_secs};
use serde_json::Value;
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Name of the built-in task record sweep.
pub const TASK_MAINTENANCE: &str = "scheduler_maintenance";

/// A task waiting in the ready queue.
struct ReadyTask {
    id: TaskId,
    task: Task,
}

/// A task waiting in the sleeping heap.
struct SleepingTask {
    deadline: f64,
    seq: u64,
    id: TaskId,
    task: Task,
    period: u64,
    periodic: bool,
}

impl Ord for SleepingTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.deadline
            .total_cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for SleepingTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SleepingTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for SleepingTask {}

#[derive(Default)]
struct Queues {
    ready: VecDeque<ReadyTask>,
    sleeping: BinaryHeap<Reverse<SleepingTask>>,
}

impl Queues {
    fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.sleeping.is_empty()
    }

    fn earliest_deadline(&self) -> Option<f64> {
        self.sleeping.peek().map(|Reverse(entry)| entry.deadline)
    }
}

struct Inner {
    queues: Mutex<Queues>,
    wake: WakeSignal,
    state: StateStore,
    shutdown: CancellationToken,
    loop_active: AtomicBool,
    next_seq: AtomicU64,
    config: SchedulerConfig,
}

/// Cooperative single-threaded task scheduler.
///
/// Cloning yields another handle to the same scheduler, so task bodies and
/// other threads can submit work or request a stop.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Create a scheduler publishing status into `state`.
    ///
    /// `shutdown` is the host-wide running flag: the loop exits once it is
    /// cancelled. Resets any scheduler and task status already present in
    /// the store, and submits the maintenance sweep when enabled.
    pub fn new(state: StateStore, shutdown: CancellationToken, config: SchedulerConfig) -> Self {
        debug!("init scheduler");
        {
            let mut guard = state.acquire();
            guard.scheduler = Default::default();
            guard.tasks.clear();
        }

        let scheduler = Self {
            inner: Arc::new(Inner {
                queues: Mutex::new(Queues::default()),
                wake: WakeSignal::new(),
                state,
                shutdown,
                loop_active: AtomicBool::new(false),
                next_seq: AtomicU64::new(1),
                config,
            }),
        };

        if scheduler.inner.config.run_maintenance {
            let weak = Arc::downgrade(&scheduler.inner);
            let period = scheduler.inner.config.maintenance_period_secs;
            scheduler.submit_after(maintenance_task(weak), period, true);
        }

        scheduler
    }

    /// The state store this scheduler publishes into.
    pub fn state(&self) -> &StateStore {
        &self.inner.state
    }

    /// The host-wide shutdown token.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Returns `true` while [`start`](Self::start) is executing.
    pub fn is_running(&self) -> bool {
        self.inner.loop_active.load(Ordering::SeqCst)
    }

    /// Diagnostic status payload, see [`StateStore::status`].
    pub fn status(&self) -> Value {
        self.inner.state.status()
    }

    /// Queue `task` to run on the next loop iteration.
    pub fn submit_now(&self, task: Task) -> TaskId {
        let id = self.next_task_id(task.name());
        info!(task_id = %id, "task scheduled to run");

        {
            // Queue lock first: a sweep must never see the record without
            // the queued task.
            let mut queues = self.queues();
            self.insert_record(&id, TaskRecord::new(&task, 0.0, 0));
            queues.ready.push_back(ReadyTask {
                id: id.clone(),
                task,
            });
        }
        self.notify();
        id
    }

    /// Queue `task` to run once `delay` seconds from now, and then every
    /// `delay` seconds when `periodic` is set.
    ///
    /// Malformed delays are replaced by the configured default.
    pub fn submit_after(&self, task: Task, delay: impl Into<Delay>, periodic: bool) -> TaskId {
        let delay = delay.into();
        let default = self.inner.config.default_delay_secs;
        if let Delay::Invalid(raw) = &delay {
            warn!(task = task.name(), delay = %raw, default, "invalid delay, using default");
        }
        let secs = delay.resolve(default);

        let id = self.next_task_id(task.name());
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        let deadline = now_epoch_secs() + secs as f64;
        debug!(task_id = %id, secs, periodic, "scheduling task");

        let period = if periodic { secs } else { 0 };
        {
            let mut queues = self.queues();
            self.insert_record(&id, TaskRecord::new(&task, deadline, period));
            queues.sleeping.push(Reverse(SleepingTask {
                deadline,
                seq,
                id: id.clone(),
                task,
                period: secs,
                periodic,
            }));
        }
        self.notify();
        id
    }

    /// Request loop shutdown.
    ///
    /// Cancels the shared token and wakes a blocked loop. Safe to call
    /// repeatedly, from any thread, and from inside a task body. `signal`
    /// is the OS signal number that triggered the stop, or 0.
    pub fn stop(&self, signal: i32) {
        if signal > 0 {
            info!(signal, "received signal");
        }
        info!("stopping scheduler");
        self.inner.shutdown.cancel();
        self.inner.wake.set();
    }

    /// Run the loop on the calling thread until both queues are empty or a
    /// stop is requested.
    ///
    /// Sleeping tasks still queued at shutdown are abandoned.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Scheduler`] if the loop is already running on
    /// another thread.
    pub fn start(&self) -> Result<()> {
        if self
            .inner
            .loop_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AgentError::Scheduler("scheduler is already running".into()));
        }

        info!("starting scheduler");
        self.set_running(true);

        loop {
            let sleeping = {
                let queues = self.queues();
                if queues.is_empty() {
                    break;
                }
                queues.sleeping.len()
            };

            if self.inner.wake.clear() {
                self.inner.state.acquire().scheduler.last_event = now_epoch_secs();
            }

            if self.inner.shutdown.is_cancelled() {
                info!(sleeping, "shutdown requested, leaving scheduler loop");
                break;
            }

            debug!(sleeping, "scheduler loop");

            self.promote_due();
            self.run_ready();

            // Measured after the pass so re-armed periodic tasks count.
            let idle = self.queues().ready.is_empty();
            if idle
                && let Some(timeout) = self.wait_timeout(now_epoch_secs())
            {
                debug!(?timeout, "waiting for next deadline");
                self.inner.wake.wait_timeout(timeout);
            }
        }

        self.set_running(false);
        self.inner.loop_active.store(false, Ordering::SeqCst);
        info!("scheduler finished");
        Ok(())
    }

    /// Remove the records of consumed one-shot tasks.
    ///
    /// A record is removed when its `next_run` is 0 and it is not running.
    /// Records of tasks still waiting in the ready queue are kept. Returns
    /// the number of records removed.
    pub fn sweep_finished(&self) -> usize {
        sweep(&self.inner)
    }

    fn next_task_id(&self, name: &str) -> TaskId {
        TaskId::new(name, self.inner.next_seq.fetch_add(1, Ordering::SeqCst))
    }

    fn queues(&self) -> MutexGuard<'_, Queues> {
        self.inner
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        if self.is_running() {
            self.inner.wake.set();
        }
    }

    fn set_running(&self, running: bool) {
        let mut state = self.inner.state.acquire();
        state.scheduler.running = running;
        if running {
            state.scheduler.start = now_epoch_secs();
        }
    }

    fn insert_record(&self, id: &TaskId, record: TaskRecord) {
        self.inner.state.acquire().tasks.insert(id.clone(), record);
    }

    fn update_record(&self, id: &TaskId, update: impl FnOnce(&mut TaskRecord)) {
        let mut state = self.inner.state.acquire();
        match state.tasks.get_mut(id) {
            Some(record) => update(record),
            None => warn!(task_id = %id, "task record missing"),
        }
    }

    /// Time until the earliest deadline, capped at `max_wait_secs`.
    ///
    /// `None` when nothing is sleeping.
    fn wait_timeout(&self, now: f64) -> Option<Duration> {
        let deadline = self.queues().earliest_deadline()?;
        let max_wait = Duration::from_secs(self.inner.config.max_wait_secs);
        let until = Duration::try_from_secs_f64(deadline - now).unwrap_or(Duration::ZERO);
        Some(until.min(max_wait))
    }

    /// Move expired sleeping tasks to the ready queue.
    ///
    /// Only runs when the ready queue is empty. Each heap entry is promoted
    /// at most once per call; periodic tasks are pushed back onto the heap
    /// `period` seconds after the firing time.
    fn promote_due(&self) {
        let mut next_runs = Vec::new();
        {
            let mut queues = self.queues();
            if !queues.ready.is_empty() {
                return;
            }

            let now = now_epoch_secs();
            let mut due = Vec::new();
            while queues
                .earliest_deadline()
                .is_some_and(|deadline| deadline <= now)
            {
                let Some(Reverse(entry)) = queues.sleeping.pop() else {
                    break;
                };
                due.push(entry);
            }

            for entry in due {
                debug!(task_id = %entry.id, "task is ready");
                queues.ready.push_back(ReadyTask {
                    id: entry.id.clone(),
                    task: entry.task.clone(),
                });

                if entry.periodic {
                    let deadline = now + entry.period as f64;
                    next_runs.push((entry.id.clone(), deadline));
                    queues.sleeping.push(Reverse(SleepingTask { deadline, ..entry }));
                } else {
                    next_runs.push((entry.id, 0.0));
                }
            }
        }

        for (id, next_run) in next_runs {
            self.update_record(&id, |record| record.next_run = next_run);
        }
    }

    /// Execute every ready task, including ones queued while draining.
    fn run_ready(&self) {
        loop {
            let ready = {
                let mut queues = self.queues();
                let Some(ready) = queues.ready.pop_front() else {
                    break;
                };
                // Marked running before the queue lock is released, so a
                // sweep never finds it idle and unqueued.
                self.update_record(&ready.id, |record| {
                    record.last_run = now_epoch_secs();
                    record.running = true;
                });
                ready
            };
            self.execute(ready);
        }
    }

    fn execute(&self, ReadyTask { id, task }: ReadyTask) {
        debug!(task_id = %id, "running task");
        let started = Instant::now();

        match panic::catch_unwind(AssertUnwindSafe(|| task.invoke())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(task_id = %id, args = ?task.args(), "task failed: {e:#}");
            }
            Err(payload) => {
                error!(
                    task_id = %id,
                    args = ?task.args(),
                    "task panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }

        let runtime = format_elapsed(started.elapsed());
        debug!(task_id = %id, runtime = %runtime, "finished task");
        self.update_record(&id, |record| {
            record.running = false;
            record.runtime = Some(runtime);
        });
    }
}

fn sweep(inner: &Inner) -> usize {
    // Held until the records are pruned so no submission slips in between.
    let queues = inner
        .queues
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let pending: HashSet<&TaskId> = queues.ready.iter().map(|ready| &ready.id).collect();

    let mut state = inner.state.acquire();
    let before = state.tasks.len();
    state
        .tasks
        .retain(|id, record| !record.is_finished() || pending.contains(id));
    before - state.tasks.len()
}

fn maintenance_task(inner: Weak<Inner>) -> Task {
    Task::new(TASK_MAINTENANCE, move |_| {
        let Some(inner) = inner.upgrade() else {
            return Ok(());
        };
        let removed = sweep(&inner);
        debug!(removed, "swept finished task records");
        Ok(())
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
