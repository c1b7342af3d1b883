//! A unit of work for the worker pools: one request, the exchange to run on
//! a worker's private client, and the sink its outcome is delivered to.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{error, trace};
use uuid::Uuid;

use crate::client::SruClient;
use crate::error::{Result, SruError};
use crate::request::SruRequest;

const TARGET: &str = "sru_client::task";

type Job = Box<dyn FnOnce(Result<&SruClient>) + Send>;

pub(crate) struct Task {
    id: Uuid,
    request: SruRequest,
    job: Job,
}

impl Task {
    /// Bundle `exchange` with the `sink` receiving its result.
    ///
    /// Panics raised by the exchange are delivered to the sink as
    /// [`SruError::WorkerPanic`]; panics raised by the sink are logged.
    pub(crate) fn new<T, E, S>(request: SruRequest, exchange: E, sink: S) -> Self
    where
        T: Send + 'static,
        E: FnOnce(&SruClient) -> Result<T> + Send + 'static,
        S: FnOnce(Result<T>) + Send + 'static,
    {
        let id = Uuid::new_v4();
        let job: Job = Box::new(move |client: Result<&SruClient>| {
            let result = match client {
                Ok(client) => match catch_unwind(AssertUnwindSafe(|| exchange(client))) {
                    Ok(result) => result,
                    Err(payload) => Err(SruError::WorkerPanic {
                        details: panic_message(payload.as_ref()),
                    }),
                },
                Err(err) => Err(err),
            };
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| sink(result))) {
                error!(
                    target: TARGET,
                    task = %id,
                    details = %panic_message(payload.as_ref()),
                    "result callback panicked"
                );
            }
        });
        Self { id, request, job }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn request(&self) -> &SruRequest {
        &self.request
    }

    /// Run on a worker; `client` is the worker's client or the reason it has none
    pub(crate) fn run(self, client: Result<&SruClient>) {
        trace!(
            target: TARGET,
            task = %self.id,
            operation = %self.request.operation(),
            endpoint = %self.request.endpoint(),
            "running task"
        );
        (self.job)(client);
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
