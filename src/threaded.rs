//! Fixed-size thread pool returning one completion handle per request.
//!
//! Each worker creates its private [`SruClient`] on first use and drops it
//! when the thread exits. Whatever happens while servicing a request,
//! including a panic, is delivered through that request's handle or
//! callback and never reaches another request or the worker itself.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::client::{SruClient, SruClientConfig};
use crate::config::ConfigManager;
use crate::error::{Result, SruError};
use crate::request::{ExplainRequest, ScanRequest, SearchRetrieveRequest, SruRequest};
use crate::response::{ExplainResponse, ScanResponse, SearchRetrieveResponse};
use crate::task::Task;

const TARGET: &str = "sru_client::threaded";

/// Receives the outcome of one request submitted with a callback
pub trait SruCallback<Q, R>: Send + 'static {
    fn on_success(&self, response: R);

    fn on_error(&self, request: Q, error: SruError);
}

/// Pending result of one submitted request.
///
/// Either block on it with [`CompletionHandle::wait`] or `.await` it.
#[derive(Debug)]
pub struct CompletionHandle<T> {
    receiver: oneshot::Receiver<Result<T>>,
}

impl<T> CompletionHandle<T> {
    /// Block the current thread until the result is available.
    ///
    /// Must not be called from within an async runtime; `.await` the handle there.
    pub fn wait(self) -> Result<T> {
        self.receiver.blocking_recv().unwrap_or_else(|_| Err(lost_result()))
    }

    /// Take the result if it is already available
    pub fn try_take(&mut self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(lost_result())),
        }
    }
}

impl<T> Future for CompletionHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(lost_result())))
    }
}

fn lost_result() -> SruError {
    SruError::Concurrency {
        details: "worker dropped the request without a result".to_string(),
    }
}

pub struct ThreadedClient {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadedClient {
    /// Start `pool.threads` workers (default: one per CPU)
    pub fn new(config: SruClientConfig) -> Result<Self> {
        let threads = ConfigManager::get_thread_count(config.client_config());
        let (sender, receiver) = crossbeam_channel::unbounded::<Task>();

        let mut client = Self {
            sender: Some(sender),
            workers: Vec::with_capacity(threads),
        };
        for index in 0..threads {
            let receiver = receiver.clone();
            let config = config.clone();
            let handle = thread::Builder::new()
                .name(format!("sru-threaded-{}", index))
                .spawn(move || worker_loop(index, receiver, config))?;
            client.workers.push(handle);
        }
        debug!(target: TARGET, threads, "threaded client started");
        Ok(client)
    }

    pub fn explain(&self, request: ExplainRequest) -> Result<CompletionHandle<ExplainResponse>> {
        let exchange_request = request.clone();
        self.submit(request.into(), move |client| client.explain(&exchange_request))
    }

    pub fn scan(&self, request: ScanRequest) -> Result<CompletionHandle<ScanResponse>> {
        let exchange_request = request.clone();
        self.submit(request.into(), move |client| client.scan(&exchange_request))
    }

    pub fn search_retrieve(
        &self,
        request: SearchRetrieveRequest,
    ) -> Result<CompletionHandle<SearchRetrieveResponse>> {
        let exchange_request = request.clone();
        self.submit(request.into(), move |client| {
            client.search_retrieve(&exchange_request)
        })
    }

    pub fn explain_with_callback<C>(&self, request: ExplainRequest, callback: C) -> Result<()>
    where
        C: SruCallback<ExplainRequest, ExplainResponse>,
    {
        let exchange_request = request.clone();
        self.submit_with_callback(
            request,
            move |client| client.explain(&exchange_request),
            callback,
        )
    }

    pub fn scan_with_callback<C>(&self, request: ScanRequest, callback: C) -> Result<()>
    where
        C: SruCallback<ScanRequest, ScanResponse>,
    {
        let exchange_request = request.clone();
        self.submit_with_callback(request, move |client| client.scan(&exchange_request), callback)
    }

    pub fn search_retrieve_with_callback<C>(
        &self,
        request: SearchRetrieveRequest,
        callback: C,
    ) -> Result<()>
    where
        C: SruCallback<SearchRetrieveRequest, SearchRetrieveResponse>,
    {
        let exchange_request = request.clone();
        self.submit_with_callback(
            request,
            move |client| client.search_retrieve(&exchange_request),
            callback,
        )
    }

    fn submit<T, E>(&self, request: SruRequest, exchange: E) -> Result<CompletionHandle<T>>
    where
        T: Send + 'static,
        E: FnOnce(&SruClient) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let task = Task::new(request, exchange, move |result| {
            // the caller may have dropped the handle
            let _ = tx.send(result);
        });
        self.enqueue(task)?;
        Ok(CompletionHandle { receiver: rx })
    }

    fn submit_with_callback<Q, T, E, C>(&self, request: Q, exchange: E, callback: C) -> Result<()>
    where
        Q: Into<SruRequest> + Clone + Send + 'static,
        T: Send + 'static,
        E: FnOnce(&SruClient) -> Result<T> + Send + 'static,
        C: SruCallback<Q, T>,
    {
        let failed_request = request.clone();
        let task = Task::new(request.into(), exchange, move |result| match result {
            Ok(response) => callback.on_success(response),
            Err(err) => callback.on_error(failed_request, err),
        });
        self.enqueue(task)
    }

    fn enqueue(&self, task: Task) -> Result<()> {
        let sender = self.sender.as_ref().ok_or_else(|| SruError::Rejected {
            state: "shut down".to_string(),
        })?;
        debug!(target: TARGET, task = %task.id(), "request submitted");
        sender.send(task).map_err(|_| SruError::Rejected {
            state: "without workers".to_string(),
        })
    }

    /// Stop accepting requests, finish the submitted ones and join the workers
    pub fn shutdown(mut self) {
        self.join_workers();
    }

    fn join_workers(&mut self) {
        // closing the channel ends every worker loop once it is drained
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!(target: TARGET, "worker thread panicked");
            }
        }
    }
}

impl Drop for ThreadedClient {
    fn drop(&mut self) {
        self.join_workers();
    }
}

fn worker_loop(index: usize, receiver: Receiver<Task>, config: SruClientConfig) {
    debug!(target: TARGET, worker = index, "worker started");
    let mut client: Option<SruClient> = None;

    for task in receiver.iter() {
        if client.is_none() {
            match SruClient::new(config.clone()) {
                Ok(created) => {
                    debug!(target: TARGET, worker = index, "worker client created");
                    client = Some(created);
                }
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
    debug!(target: TARGET, worker = index, "worker exited");
}
