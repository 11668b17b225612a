//! Handler shapes accepted by the runtime.
//!
//! Every handler is turned into a [`MessageHandler`], the one asynchronous
//! contract the poll loop drives. Three adapters cover the common shapes:
//!
//! - [`blocking`]: a synchronous function, run on tokio's blocking pool.
//! - [`with_completion`]: a function that reports completion through a
//!   [`Completion`] signal, for work whose end is not otherwise observable.
//! - [`from_fn`] / [`from_fn_with_shared`]: an async function used directly.
//!
//! The input type `I` is [`Message`](crate::client::Message) for raw handlers
//! and the decoded event type for event handlers.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::errors::{DecodeError, GenericError, HandlerError};

/// The asynchronous handling contract the poll loop consumes.
///
/// Returning `Ok(())` marks the message for deletion. Returning an error
/// leaves it on the queue, to be redelivered once its visibility timeout
/// expires.
#[async_trait]
pub trait MessageHandler<I>: Send + Sync + 'static {
    async fn handle(&self, input: I) -> Result<(), HandlerError>;
}

#[async_trait]
impl<I, H> MessageHandler<I> for Arc<H>
where
    I: Send + 'static,
    H: MessageHandler<I> + ?Sized,
{
    async fn handle(&self, input: I) -> Result<(), HandlerError> {
        (**self).handle(input).await
    }
}

/// How handling one message ended.
#[derive(Debug)]
pub enum HandlerOutcome {
    Success,
    HandlerFailed(HandlerError),
    DecodeFailed(DecodeError),
    /// The handler did not finish within the configured handler timeout.
    TimedOut,
}

impl HandlerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, HandlerOutcome::Success)
    }
}

impl From<Result<(), HandlerError>> for HandlerOutcome {
    fn from(result: Result<(), HandlerError>) -> Self {
        match result {
            Ok(()) => HandlerOutcome::Success,
            Err(err) => HandlerOutcome::HandlerFailed(err),
        }
    }
}

/// One-shot signal a completion-style handler uses to report that it is done.
#[derive(Debug)]
pub struct Completion {
    tx: oneshot::Sender<Result<(), HandlerError>>,
}

impl Completion {
    fn new() -> (Self, oneshot::Receiver<Result<(), HandlerError>>) {
        let (tx, rx) = oneshot::channel();
        (Completion { tx }, rx)
    }

    /// Reports that the message was handled successfully.
    pub fn done(self) {
        let _ = self.tx.send(Ok(()));
    }

    /// Reports that handling failed.
    pub fn fail(self, err: impl Into<HandlerError>) {
        let _ = self.tx.send(Err(err.into()));
    }
}

/// Handler adapter for synchronous functions. See [`blocking`].
pub struct BlockingHandler<F> {
    handler_fn: Arc<F>,
}

#[async_trait]
impl<I, F, E> MessageHandler<I> for BlockingHandler<F>
where
    I: Send + 'static,
    F: Fn(I) -> Result<(), E> + Send + Sync + 'static,
    E: Into<HandlerError> + 'static,
{
    async fn handle(&self, input: I) -> Result<(), HandlerError> {
        let handler_fn = Arc::clone(&self.handler_fn);
        tokio::task::spawn_blocking(move || handler_fn(input).map_err(Into::into))
            .await
            .map_err(|join_err| {
                GenericError::new(format!("blocking handler panicked: {join_err}"))
            })?
    }
}

/// Handler adapter for completion-signalling functions. See [`with_completion`].
pub struct CompletionHandler<F> {
    handler_fn: F,
}

#[async_trait]
impl<I, F, E> MessageHandler<I> for CompletionHandler<F>
where
    I: Send + 'static,
    F: Fn(I, Completion) -> Result<(), E> + Send + Sync + 'static,
    E: Into<HandlerError> + 'static,
{
    async fn handle(&self, input: I) -> Result<(), HandlerError> {
        let (completion, mut rx) = Completion::new();
        if let Err(err) = (self.handler_fn)(input, completion) {
            // A handler that already signalled keeps its first resolution.
            return match rx.try_recv() {
                Ok(result) => result,
                Err(_) => Err(err.into()),
            };
        }
        rx.await.map_err(|_| {
            GenericError::new("handler dropped its completion signal without signalling")
        })?
    }
}

/// Handler adapter for async functions. See [`from_fn`].
pub struct FnHandler<F> {
    handler_fn: F,
}

#[async_trait]
impl<I, F, Fut, E> MessageHandler<I> for FnHandler<F>
where
    I: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<HandlerError> + 'static,
{
    async fn handle(&self, input: I) -> Result<(), HandlerError> {
        (self.handler_fn)(input).await.map_err(Into::into)
    }
}

/// Handler adapter for async functions that take a shared resource.
/// See [`from_fn_with_shared`].
pub struct SharedFnHandler<F, T> {
    handler_fn: F,
    shared_resources: T,
}

#[async_trait]
impl<I, F, Fut, E, T> MessageHandler<I> for SharedFnHandler<F, T>
where
    I: Send + 'static,
    F: Fn(I, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<HandlerError> + 'static,
    T: Clone + Send + Sync + 'static,
{
    async fn handle(&self, input: I) -> Result<(), HandlerError> {
        (self.handler_fn)(input, self.shared_resources.clone())
            .await
            .map_err(Into::into)
    }
}

/// Wraps a synchronous handler.
///
/// Each call runs on tokio's blocking thread pool so a slow handler never
/// occupies an async worker. Returning normally is success; an error or a
/// panic is failure.
pub fn blocking<I, F, E>(handler_fn: F) -> BlockingHandler<F>
where
    F: Fn(I) -> Result<(), E> + Send + Sync + 'static,
{
    BlockingHandler {
        handler_fn: Arc::new(handler_fn),
    }
}

/// Wraps a handler that signals completion explicitly.
///
/// The outcome resolves when the handler calls [`Completion::done`] or
/// [`Completion::fail`], possibly from another task or thread. Returning an
/// error before signalling fails immediately, and dropping the `Completion`
/// unsignalled counts as a failure.
///
/// ```rust
/// use sqs_poll_runtime::receiver::handler::{self, Completion};
/// use sqs_poll_runtime::client::Message;
///
/// let handler = handler::with_completion(|message: Message, done: Completion| {
///     tokio::spawn(async move {
///         println!("processing {}", message.body_str());
///         done.done();
///     });
///     Ok::<(), std::io::Error>(())
/// });
/// # let _ = handler;
/// ```
pub fn with_completion<I, F, E>(handler_fn: F) -> CompletionHandler<F>
where
    F: Fn(I, Completion) -> Result<(), E> + Send + Sync + 'static,
{
    CompletionHandler { handler_fn }
}

/// Wraps an async handler.
pub fn from_fn<I, F, Fut, E>(handler_fn: F) -> FnHandler<F>
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    FnHandler { handler_fn }
}

/// Wraps an async handler that receives a clone of `shared_resources` with
/// every message.
pub fn from_fn_with_shared<I, F, Fut, E, T>(
    shared_resources: T,
    handler_fn: F,
) -> SharedFnHandler<F, T>
where
    F: Fn(I, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    SharedFnHandler {
        handler_fn,
        shared_resources,
    }
}
