//! Single-threaded deadline executor.
//!
//! Tasks are kept sorted by ascending deadline. A single background worker
//! runs every task whose deadline has passed, re-checking the front of the
//! list after each one, and otherwise sleeps until the next deadline or until
//! a new task arrives. The lock is released while a task body runs, so tasks
//! may themselves call [`ExecutorService::execute`] or
//! [`ExecutorService::schedule`].

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, trace};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct ScheduledTask {
    deadline: Instant,
    task: Task,
}

#[derive(Default)]
struct ExecutorState {
    tasks: VecDeque<ScheduledTask>,
    running: bool,
}

#[derive(Default)]
struct ExecutorInner {
    state: Mutex<ExecutorState>,
    condition: Condvar,
}

impl ExecutorInner {
    fn run(&self) {
        let mut state = self.state.lock();
        while state.running {
            let now = Instant::now();
            let next_deadline = state.tasks.front().map(|t| t.deadline);
            match next_deadline {
                Some(deadline) if deadline <= now => {
                    if let Some(scheduled) = state.tasks.pop_front() {
                        MutexGuard::unlocked(&mut state, || run_task(scheduled.task));
                    }
                }
                Some(deadline) => {
                    self.condition.wait_until(&mut state, deadline);
                }
                None => {
                    self.condition.wait(&mut state);
                }
            }
        }
        trace!("executor worker exiting");
    }
}

fn run_task(task: Task) {
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        error!("executor task panicked");
    }
}

/// Background worker executing deadline-ordered tasks.
pub struct ExecutorService {
    name: String,
    inner: Arc<ExecutorInner>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ExecutorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorService")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Default for ExecutorService {
    fn default() -> Self {
        Self::new("executor")
    }
}

impl ExecutorService {
    /// Creates a stopped executor; `name` labels the worker thread.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(ExecutorInner::default()),
            thread: Mutex::new(None),
        }
    }

    /// Starts the worker thread. Does nothing if already running.
    pub fn start(&self) {
        let mut thread = self.thread.lock();
        {
            let mut state = self.inner.state.lock();
            if state.running {
                return;
            }
            state.running = true;
        }

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || inner.run());
        match spawned {
            Ok(handle) => {
                debug!(executor = %self.name, "executor started");
                *thread = Some(handle);
            }
            Err(e) => {
                error!(executor = %self.name, error = %e, "failed to spawn executor thread");
                self.inner.state.lock().running = false;
            }
        }
    }

    /// Stops the worker and waits for it to exit. Pending tasks are kept.
    pub fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            state.running = false;
            self.inner.condition.notify_all();
        }
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            // A task stopping its own executor cannot join itself.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
            debug!(executor = %self.name, "executor stopped");
        }
    }

    /// Returns true while the worker thread is running.
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Runs `task` as soon as possible.
    pub fn execute<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(Instant::now(), task);
    }

    /// Runs `task` once `when` has passed.
    pub fn schedule<F>(&self, when: Instant, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        // Tasks sharing a deadline run in submission order.
        let position = state.tasks.partition_point(|t| t.deadline <= when);
        state.tasks.insert(
            position,
            ScheduledTask {
                deadline: when,
                task: Box::new(task),
            },
        );
        self.inner.condition.notify_all();
    }

    /// Drops every pending task without running it.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        let dropped = state.tasks.len();
        state.tasks.clear();
        trace!(executor = %self.name, dropped, "executor cleared");
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().tasks.len()
    }
}

impl Drop for ExecutorService {
    fn drop(&mut self) {
        self.stop();
    }
}
