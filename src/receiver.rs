use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::client::{Message, QueueService, create_sqs_client_from_env};
use crate::decoder::{BodyDecoder, JsonDecoder};
use crate::errors::SqsRuntimeError;

pub mod backoff;
pub mod config;
pub mod handler;
mod poll_loop;
pub mod state;

use self::config::{QueueConfig, ReceiveRequest};
use handler::MessageHandler;
use poll_loop::{Dispatch, EventDispatch, PollLoop, RawDispatch};
use state::{Lifecycle, State};

/// Consumes any number of queues, one poll loop per queue.
///
/// Each `handle_*` call validates its configuration, spawns a poll loop on the
/// current tokio runtime and returns straight away. Errors inside a running
/// loop are logged and never end it; only [`SqsRuntime::shutdown`] (or
/// [`QueueHandle::shutdown`] for a single queue) does.
pub struct SqsRuntime<S = aws_sdk_sqs::Client>
where
    S: QueueService,
{
    /// The queue service shared by every poll loop.
    service: Arc<S>,

    /// Runtime-wide lifecycle, independent from each loop's own.
    lifecycle: Lifecycle,

    loops: Mutex<Vec<RunningLoop>>,
}

struct RunningLoop {
    queue_url: String,
    lifecycle: Lifecycle,
    task: JoinHandle<()>,
}

/// Handle to one queue's poll loop.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    queue_url: String,
    lifecycle: Lifecycle,
}

impl QueueHandle {
    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    pub fn state(&self) -> State {
        self.lifecycle.current()
    }

    /// Asks this queue's loop to stop after its current batch.
    pub fn shutdown(&self) {
        self.lifecycle.advance(State::ShuttingDown);
    }

    /// Resolves once the loop has exited.
    pub async fn stopped(&self) {
        self.lifecycle.reached(State::Shutdown).await;
    }
}

impl SqsRuntime<aws_sdk_sqs::Client> {
    /// Creates a runtime backed by an AWS SQS client configured from the environment.
    pub async fn from_env() -> Self {
        SqsRuntime::new(create_sqs_client_from_env().await)
    }
}

impl<S> SqsRuntime<S>
where
    S: QueueService,
{
    pub fn new(service: S) -> Self {
        SqsRuntime {
            service: Arc::new(service),
            lifecycle: Lifecycle::new(),
            loops: Mutex::new(Vec::new()),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// The runtime-wide state.
    ///
    /// `Receiving` once any queue has been started, `ShuttingDown` while
    /// [`SqsRuntime::shutdown`] drains the loops and `Shutdown` after.
    pub fn state(&self) -> State {
        self.lifecycle.current()
    }

    /// Whether any poll loop has not yet been asked to stop.
    pub fn is_receiving(&self) -> bool {
        self.lock_loops()
            .iter()
            .any(|running| running.lifecycle.current() < State::ShuttingDown)
    }

    /// URLs of the queues whose poll loops have not exited yet.
    pub fn queue_urls(&self) -> Vec<String> {
        self.lock_loops()
            .iter()
            .map(|running| running.queue_url.clone())
            .collect()
    }

    /// Consumes raw messages described by `request`.
    pub fn handle_messages<H>(
        &self,
        request: ReceiveRequest,
        handler: H,
    ) -> Result<QueueHandle, SqsRuntimeError>
    where
        H: MessageHandler<Message>,
    {
        self.spawn_loop(request, RawDispatch::new(handler))
    }

    /// Resolves `queue_name` and consumes its raw messages with default settings.
    pub async fn handle_messages_in_queue<H>(
        &self,
        queue_name: &str,
        handler: H,
    ) -> Result<QueueHandle, SqsRuntimeError>
    where
        H: MessageHandler<Message>,
    {
        self.handle_messages_in_queue_with_config(queue_name, &QueueConfig::default(), handler)
            .await
    }

    pub async fn handle_messages_in_queue_with_config<H>(
        &self,
        queue_name: &str,
        config: &QueueConfig,
        handler: H,
    ) -> Result<QueueHandle, SqsRuntimeError>
    where
        H: MessageHandler<Message>,
    {
        let request = self.resolve_request(queue_name, config).await?;
        self.handle_messages(request, handler)
    }

    /// Consumes messages whose bodies are JSON-encoded `E` values.
    ///
    /// Messages that fail to decode are logged and left on the queue.
    pub fn handle_events<E, H>(
        &self,
        request: ReceiveRequest,
        handler: H,
    ) -> Result<QueueHandle, SqsRuntimeError>
    where
        E: DeserializeOwned + Send + 'static,
        H: MessageHandler<E>,
    {
        self.handle_events_with_decoder(request, JsonDecoder, handler)
    }

    /// Consumes events decoded with a custom [`BodyDecoder`].
    pub fn handle_events_with_decoder<E, D, H>(
        &self,
        request: ReceiveRequest,
        decoder: D,
        handler: H,
    ) -> Result<QueueHandle, SqsRuntimeError>
    where
        E: Send + 'static,
        D: BodyDecoder<E>,
        H: MessageHandler<E>,
    {
        self.spawn_loop(request, EventDispatch::new(decoder, handler))
    }

    pub async fn handle_events_in_queue<E, H>(
        &self,
        queue_name: &str,
        handler: H,
    ) -> Result<QueueHandle, SqsRuntimeError>
    where
        E: DeserializeOwned + Send + 'static,
        H: MessageHandler<E>,
    {
        self.handle_events_in_queue_with_config(
            queue_name,
            &QueueConfig::default(),
            JsonDecoder,
            handler,
        )
        .await
    }

    pub async fn handle_events_in_queue_with_config<E, D, H>(
        &self,
        queue_name: &str,
        config: &QueueConfig,
        decoder: D,
        handler: H,
    ) -> Result<QueueHandle, SqsRuntimeError>
    where
        E: Send + 'static,
        D: BodyDecoder<E>,
        H: MessageHandler<E>,
    {
        let request = self.resolve_request(queue_name, config).await?;
        self.handle_events_with_decoder(request, decoder, handler)
    }

    /// Stops every poll loop and waits for them to exit.
    ///
    /// Batches already in flight run to completion; no new receive starts.
    /// The drain carries on if this future is dropped, and any later call
    /// waits for that same drain to finish.
    pub async fn shutdown(&self) {
        let running = {
            let mut loops = self.lock_loops();
            self.lifecycle
                .advance(State::ShuttingDown)
                .then(|| std::mem::take(&mut *loops))
        };

        if let Some(running) = running {
            info!(queues = running.len(), "shutting down sqs runtime");
            for running_loop in &running {
                running_loop.lifecycle.advance(State::ShuttingDown);
            }
            // Joined on its own task so `Shutdown` is still reached if this
            // future is dropped mid-drain.
            tokio::spawn(join_loops(running, self.lifecycle.clone()));
        }

        self.lifecycle.reached(State::Shutdown).await;
    }

    /// Runs until `signal` resolves, then shuts down.
    ///
    /// ```rust,no_run
    /// use sqs_poll_runtime::{SqsRuntime, client::Message, receiver::handler};
    ///
    /// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
    /// let runtime = SqsRuntime::from_env().await;
    /// runtime
    ///     .handle_messages_in_queue(
    ///         "orders",
    ///         handler::from_fn(|message: Message| async move {
    ///             println!("{}", message.body_str());
    ///             Ok::<(), std::io::Error>(())
    ///         }),
    ///     )
    ///     .await?;
    /// runtime
    ///     .run_until(async {
    ///         let _ = tokio::signal::ctrl_c().await;
    ///     })
    ///     .await;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run_until<F>(&self, signal: F)
    where
        F: Future<Output = ()>,
    {
        signal.await;
        self.shutdown().await;
    }

    async fn resolve_request(
        &self,
        queue_name: &str,
        config: &QueueConfig,
    ) -> Result<ReceiveRequest, SqsRuntimeError> {
        // Reject bad settings before touching the queue service.
        if queue_name.trim().is_empty() {
            return Err(SqsRuntimeError::InvalidConfiguration(
                "queue name must not be empty".to_string(),
            ));
        }
        config.into_request(queue_name).validate()?;

        let queue_url = self.service.resolve_queue_url(queue_name).await?;
        info!(queue_name, %queue_url, "resolved queue url");
        Ok(config.into_request(queue_url))
    }

    fn spawn_loop<D>(
        &self,
        request: ReceiveRequest,
        dispatch: D,
    ) -> Result<QueueHandle, SqsRuntimeError>
    where
        D: Dispatch,
    {
        request.validate()?;

        let mut loops = self.lock_loops();
        if !self.lifecycle.is_running() {
            return Err(SqsRuntimeError::ShuttingDown);
        }

        let lifecycle = Lifecycle::new();
        let queue_url = request.queue_url.clone();
        let poll_loop = PollLoop::new(
            Arc::clone(&self.service),
            request,
            dispatch,
            lifecycle.clone(),
        );
        let task = tokio::spawn(poll_loop.run());

        self.lifecycle.advance(State::Receiving);
        loops.push(RunningLoop {
            queue_url: queue_url.clone(),
            lifecycle: lifecycle.clone(),
            task,
        });

        Ok(QueueHandle {
            queue_url,
            lifecycle,
        })
    }

    /// Locks the loop list, dropping loops that have already exited.
    fn lock_loops(&self) -> MutexGuard<'_, Vec<RunningLoop>> {
        let mut loops = self.loops.lock().unwrap_or_else(PoisonError::into_inner);
        loops.retain(|running| !running.has_exited());
        loops
    }
}

impl RunningLoop {
    fn has_exited(&self) -> bool {
        self.task.is_finished() || self.lifecycle.current() == State::Shutdown
    }
}

async fn join_loops(running: Vec<RunningLoop>, lifecycle: Lifecycle) {
    let (queue_urls, tasks): (Vec<_>, Vec<_>) = running
        .into_iter()
        .map(|running_loop| (running_loop.queue_url, running_loop.task))
        .unzip();
    for (queue_url, joined) in queue_urls.iter().zip(join_all(tasks).await) {
        if let Err(join_err) = joined {
            error!(%queue_url, error = %join_err, "poll loop task ended abnormally");
        }
    }

    lifecycle.advance(State::Shutdown);
    info!("sqs runtime shut down");
}

impl<S> Drop for SqsRuntime<S>
where
    S: QueueService,
{
    /// Loops left running when the runtime is dropped are asked to stop after
    /// their current batch; nothing waits for them.
    fn drop(&mut self) {
        for running_loop in self.lock_loops().iter() {
            running_loop.lifecycle.advance(State::ShuttingDown);
        }
    }
}
