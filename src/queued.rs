//! Queue-backed worker pool.
//!
//! A fixed set of long-lived workers, each owning a private [`SruClient`],
//! serve a bounded FIFO queue guarded by one mutex and condition variable.
//! Requests cannot be cancelled individually once queued; only the whole
//! pool can be shut down. Failures go to the pool-wide error callback.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::client::{SruClient, SruClientConfig};
use crate::config::ConfigManager;
use crate::error::{Result, SruError};
use crate::request::{ExplainRequest, ScanRequest, SearchRetrieveRequest, SruRequest};
use crate::response::{ExplainResponse, ScanResponse, SearchRetrieveResponse};
use crate::task::Task;

const TARGET: &str = "sru_client::queued";

/// Pool-wide error callback, invoked with the failed request and the failure
pub type ErrorCallback = Arc<dyn Fn(&SruRequest, SruError) + Send + Sync>;

/// Lifecycle of a [`QueuedClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunState {
    /// Accepting and executing requests
    Running,
    /// No new requests; queued requests are still drained
    Shutdown,
    /// No new requests; queued requests are discarded
    Stop,
    /// All workers have exited
    Terminated,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Running => "running",
            RunState::Shutdown => "shutting down",
            RunState::Stop => "stopped",
            RunState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

struct PoolState {
    run_state: RunState,
    queue: VecDeque<Task>,
    live_workers: usize,
}

struct Shared {
    state: Mutex<PoolState>,
    /// Signalled on submission and on every run state change
    work_available: Condvar,
    /// Signalled when the pool reaches [`RunState::Terminated`]
    terminated: Condvar,
    capacity: usize,
    on_error: ErrorCallback,
}

impl Shared {
    /// Lock the pool state. Critical sections never run request code, so
    /// the state behind a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(recover)
    }
}

fn recover<G>(poisoned: PoisonError<G>) -> G {
    warn!(target: TARGET, "queue lock poisoned, continuing with its state");
    poisoned.into_inner()
}

pub struct QueuedClient {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl QueuedClient {
    /// Start the pool with `pool.threads` workers (default: one per CPU)
    pub fn new<F>(config: SruClientConfig, on_error: F) -> Result<Self>
    where
        F: Fn(&SruRequest, SruError) + Send + Sync + 'static,
    {
        let threads = ConfigManager::get_thread_count(config.client_config());
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                run_state: RunState::Running,
                queue: VecDeque::new(),
                live_workers: 0,
            }),
            work_available: Condvar::new(),
            terminated: Condvar::new(),
            capacity: config.client_config().pool.queue_capacity,
            on_error: Arc::new(on_error),
        });

        let client = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(threads)),
        };
        for index in 0..threads {
            // on failure, dropping `client` shuts down the workers already running
            client.spawn_worker(index, config.clone())?;
        }
        debug!(target: TARGET, threads, capacity = client.shared.capacity, "queued client started");
        Ok(client)
    }

    fn spawn_worker(&self, index: usize, config: SruClientConfig) -> Result<()> {
        self.shared.lock().live_workers += 1;
        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name(format!("sru-queued-{}", index))
            .spawn(move || worker_loop(index, shared, config));
        match spawned {
            Ok(handle) => {
                self.workers.lock().unwrap_or_else(recover).push(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.lock().live_workers -= 1;
                Err(err.into())
            }
        }
    }

    pub fn explain<F>(&self, request: ExplainRequest, on_success: F) -> Result<()>
    where
        F: FnOnce(ExplainResponse) + Send + 'static,
    {
        let exchange_request = request.clone();
        self.submit(request.into(), move |client| client.explain(&exchange_request), on_success)
    }

    pub fn scan<F>(&self, request: ScanRequest, on_success: F) -> Result<()>
    where
        F: FnOnce(ScanResponse) + Send + 'static,
    {
        let exchange_request = request.clone();
        self.submit(request.into(), move |client| client.scan(&exchange_request), on_success)
    }

    pub fn search_retrieve<F>(&self, request: SearchRetrieveRequest, on_success: F) -> Result<()>
    where
        F: FnOnce(SearchRetrieveResponse) + Send + 'static,
    {
        let exchange_request = request.clone();
        self.submit(
            request.into(),
            move |client| client.search_retrieve(&exchange_request),
            on_success,
        )
    }

    fn submit<T, E, S>(&self, request: SruRequest, exchange: E, on_success: S) -> Result<()>
    where
        T: Send + 'static,
        E: FnOnce(&SruClient) -> Result<T> + Send + 'static,
        S: FnOnce(T) + Send + 'static,
    {
        let on_error = self.shared.on_error.clone();
        let failed_request = request.clone();
        let task = Task::new(request, exchange, move |result| match result {
            Ok(response) => on_success(response),
            Err(err) => on_error(&failed_request, err),
        });

        let mut state = self.shared.lock();
        if state.run_state != RunState::Running {
            return Err(SruError::Rejected {
                state: state.run_state.to_string(),
            });
        }
        if state.queue.len() >= self.shared.capacity {
            return Err(SruError::QueueFull {
                capacity: self.shared.capacity,
            });
        }
        debug!(target: TARGET, task = %task.id(), queued = state.queue.len() + 1, "request queued");
        state.queue.push_back(task);
        drop(state);
        self.shared.work_available.notify_one();
        Ok(())
    }

    pub fn run_state(&self) -> RunState {
        self.shared.lock().run_state
    }

    /// Number of requests waiting for a worker
    pub fn queued(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Stop accepting requests; requests already queued are still executed
    pub fn shutdown(&self) -> Result<()> {
        let mut state = self.shared.lock();
        if state.run_state == RunState::Running {
            state.run_state = RunState::Shutdown;
            debug!(target: TARGET, pending = state.queue.len(), "shutdown requested");
        }
        drop(state);
        self.shared.work_available.notify_all();
        Ok(())
    }

    /// Stop accepting requests and discard the queue.
    ///
    /// Idle workers exit immediately, busy workers after their current
    /// request. Returns the requests that will never run.
    pub fn shutdown_now(&self) -> Result<Vec<SruRequest>> {
        let mut state = self.shared.lock();
        if state.run_state < RunState::Stop {
            state.run_state = RunState::Stop;
        }
        let discarded: Vec<SruRequest> = state
            .queue
            .drain(..)
            .map(|task| task.request().clone())
            .collect();
        drop(state);
        if !discarded.is_empty() {
            warn!(target: TARGET, discarded = discarded.len(), "queued requests discarded");
        }
        self.shared.work_available.notify_all();
        Ok(discarded)
    }

    /// Block until every worker has exited or `timeout` elapses.
    ///
    /// Returns whether the pool terminated.
    pub fn await_termination(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        while state.run_state != RunState::Terminated {
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let (guard, _) = self
                .shared
                .terminated
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(recover);
            state = guard;
        }
        Ok(true)
    }
}

impl Drop for QueuedClient {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(target: TARGET, error = %err, "shutdown on drop failed");
        }
        let workers = match self.workers.get_mut() {
            Ok(workers) => std::mem::take(workers),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        for worker in workers {
            if worker.join().is_err() {
                warn!(target: TARGET, "worker thread panicked");
            }
        }
    }
}

fn worker_loop(index: usize, shared: Arc<Shared>, config: SruClientConfig) {
    debug!(target: TARGET, worker = index, "worker started");
    let mut client: Option<SruClient> = None;

    while let Some(task) = next_task(&shared) {
        if client.is_none() {
            match SruClient::new(config.clone()) {
                Ok(created) => client = Some(created),
                Err(err) => {
                    task.run(Err(err));
                    continue;
                }
            }
        }
        if let Some(client) = client.as_ref() {
            task.run(Ok(client));
        }
    }

    // last worker out marks the pool terminated
    let mut state = shared.lock();
    state.live_workers -= 1;
    if state.live_workers == 0 {
        state.run_state = RunState::Terminated;
        shared.terminated.notify_all();
    }
    debug!(target: TARGET, worker = index, "worker exited");
}

/// Wait for the next task; `None` tells the worker to exit
fn next_task(shared: &Shared) -> Option<Task> {
    let mut state = shared.lock();
    loop {
        match state.run_state {
            RunState::Stop | RunState::Terminated => return None,
            RunState::Shutdown => {
                let task = state.queue.pop_front();
                if task.is_none() {
                    // drained
                    state.run_state = RunState::Stop;
                    shared.work_available.notify_all();
                }
                return task;
            }
            RunState::Running => {
                if let Some(task) = state.queue.pop_front() {
                    return Some(task);
                }
                state = shared.work_available.wait(state).unwrap_or_else(recover);
            }
        }
    }
}
