use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::backoff;
use super::config::ReceiveRequest;
use super::handler::{HandlerOutcome, MessageHandler};
use super::state::{Lifecycle, State};
use crate::client::{Message, QueueService};
use crate::decoder::BodyDecoder;

/// Turns one received message into a handling outcome.
///
/// Raw mode hands the message to the handler as is; event mode decodes the
/// body first.
#[async_trait]
pub(crate) trait Dispatch: Send + Sync + 'static {
    async fn dispatch(&self, message: Message) -> HandlerOutcome;
}

pub(crate) struct RawDispatch<H> {
    handler: H,
}

impl<H> RawDispatch<H> {
    pub(crate) fn new(handler: H) -> Self {
        RawDispatch { handler }
    }
}

#[async_trait]
impl<H> Dispatch for RawDispatch<H>
where
    H: MessageHandler<Message>,
{
    async fn dispatch(&self, message: Message) -> HandlerOutcome {
        self.handler.handle(message).await.into()
    }
}

pub(crate) struct EventDispatch<E, D, H> {
    decoder: D,
    handler: H,
    _event: PhantomData<fn() -> E>,
}

impl<E, D, H> EventDispatch<E, D, H> {
    pub(crate) fn new(decoder: D, handler: H) -> Self {
        EventDispatch {
            decoder,
            handler,
            _event: PhantomData,
        }
    }
}

#[async_trait]
impl<E, D, H> Dispatch for EventDispatch<E, D, H>
where
    E: Send + 'static,
    D: BodyDecoder<E>,
    H: MessageHandler<E>,
{
    async fn dispatch(&self, message: Message) -> HandlerOutcome {
        match self.decoder.decode(message.body.as_deref()) {
            Ok(event) => self.handler.handle(event).await.into(),
            Err(err) => HandlerOutcome::DecodeFailed(err),
        }
    }
}

/// Counts of what happened to one batch, for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BatchSummary {
    pub(crate) received: usize,
    pub(crate) succeeded: usize,
    pub(crate) deleted: usize,
    pub(crate) failed: usize,
}

struct Processed {
    success: bool,
    deleted: bool,
}

/// Receives, dispatches and acknowledges messages for one queue until its
/// lifecycle reaches [`State::ShuttingDown`].
pub(crate) struct PollLoop<S, D> {
    service: Arc<S>,
    request: ReceiveRequest,
    dispatch: Arc<D>,
    lifecycle: Lifecycle,
}

impl<S, D> PollLoop<S, D>
where
    S: QueueService,
    D: Dispatch,
{
    pub(crate) fn new(
        service: Arc<S>,
        request: ReceiveRequest,
        dispatch: D,
        lifecycle: Lifecycle,
    ) -> Self {
        PollLoop {
            service,
            request,
            dispatch: Arc::new(dispatch),
            lifecycle,
        }
    }

    pub(crate) async fn run(self) {
        self.lifecycle.advance(State::Receiving);
        info!(queue_url = %self.request.queue_url, "poll loop started");

        let mut delay = Duration::ZERO;
        // Shutdown is only observed between batches, so a batch in flight
        // always drains.
        while self.lifecycle.is_running() {
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.lifecycle.reached(State::ShuttingDown) => break,
                }
            }

            match self.service.receive(&self.request).await {
                Ok(messages) if messages.is_empty() => {
                    delay = backoff::next(delay);
                    debug!(
                        queue_url = %self.request.queue_url,
                        backoff_ms = delay.as_millis() as u64,
                        "no messages received"
                    );
                }
                Ok(messages) => {
                    delay = Duration::ZERO;
                    let summary = self.process_batch(messages).await;
                    debug!(
                        queue_url = %self.request.queue_url,
                        received = summary.received,
                        succeeded = summary.succeeded,
                        deleted = summary.deleted,
                        failed = summary.failed,
                        "batch settled"
                    );
                }
                Err(err) => {
                    error!(
                        queue_url = %self.request.queue_url,
                        error = %err,
                        "failed to receive messages"
                    );
                }
            }
        }

        self.lifecycle.advance(State::Shutdown);
        info!(queue_url = %self.request.queue_url, "poll loop stopped");
    }

    /// Handles every message of a batch concurrently and waits for all of them.
    async fn process_batch(&self, messages: Vec<Message>) -> BatchSummary {
        let mut summary = BatchSummary {
            received: messages.len(),
            ..BatchSummary::default()
        };

        let mut in_flight = JoinSet::new();
        for message in messages {
            in_flight.spawn(process_message(
                Arc::clone(&self.service),
                Arc::clone(&self.dispatch),
                self.request.queue_url.clone(),
                self.request.handler_timeout,
                message,
            ));
        }

        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok(processed) => {
                    if processed.success {
                        summary.succeeded += 1;
                    } else {
                        summary.failed += 1;
                    }
                    if processed.deleted {
                        summary.deleted += 1;
                    }
                }
                Err(join_err) => {
                    summary.failed += 1;
                    warn!(
                        queue_url = %self.request.queue_url,
                        error = %join_err,
                        "handler task panicked; leaving message for redelivery"
                    );
                }
            }
        }

        summary
    }
}

async fn process_message<S, D>(
    service: Arc<S>,
    dispatch: Arc<D>,
    queue_url: String,
    handler_timeout: Option<Duration>,
    message: Message,
) -> Processed
where
    S: QueueService,
    D: Dispatch,
{
    let receipt_handle = message.receipt_handle.clone();
    let message_id = message.message_id.clone();

    let outcome = match handler_timeout {
        Some(limit) => tokio::time::timeout(limit, dispatch.dispatch(message))
            .await
            .unwrap_or(HandlerOutcome::TimedOut),
        None => dispatch.dispatch(message).await,
    };

    match outcome {
        HandlerOutcome::Success => {
            let deleted = match service.delete(&queue_url, &receipt_handle).await {
                Ok(()) => true,
                Err(err) => {
                    warn!(
                        %queue_url,
                        ?message_id,
                        error = %err,
                        "failed to delete handled message"
                    );
                    false
                }
            };
            Processed {
                success: true,
                deleted,
            }
        }
        HandlerOutcome::HandlerFailed(err) => {
            warn!(%queue_url, ?message_id, error = %err, "message handler failed");
            Processed {
                success: false,
                deleted: false,
            }
        }
        HandlerOutcome::DecodeFailed(err) => {
            warn!(%queue_url, ?message_id, error = %err, "failed to decode message body");
            Processed {
                success: false,
                deleted: false,
            }
        }
        HandlerOutcome::TimedOut => {
            warn!(
                %queue_url,
                ?message_id,
                timeout_ms = handler_timeout.map(|limit| limit.as_millis() as u64),
                "message handler timed out"
            );
            Processed {
                success: false,
                deleted: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::JsonDecoder;
    use crate::errors::{DecodeError, GenericError};
    use crate::receiver::handler;

    #[tokio::test]
    async fn raw_dispatch_passes_message_through() {
        let dispatch = RawDispatch::new(handler::from_fn(|message: Message| async move {
            if message.body_str() == "ok" {
                Ok(())
            } else {
                Err(GenericError::new("bad body"))
            }
        }));
        assert!(dispatch.dispatch(Message::new("ok", "rh-1")).await.is_success());
        assert!(matches!(
            dispatch.dispatch(Message::new("nope", "rh-2")).await,
            HandlerOutcome::HandlerFailed(_)
        ));
    }

    #[tokio::test]
    async fn event_dispatch_decodes_before_handling() {
        let dispatch: EventDispatch<u32, _, _> = EventDispatch::new(
            JsonDecoder,
            handler::from_fn(|value: u32| async move {
                if value == 42 {
                    Ok(())
                } else {
                    Err(GenericError::new("unexpected value"))
                }
            }),
        );
        assert!(dispatch.dispatch(Message::new("42", "rh")).await.is_success());
        assert!(matches!(
            dispatch.dispatch(Message::new("7", "rh")).await,
            HandlerOutcome::HandlerFailed(_)
        ));
        assert!(matches!(
            dispatch.dispatch(Message::new("{", "rh")).await,
            HandlerOutcome::DecodeFailed(DecodeError::MalformedPayload(_))
        ));

        let no_body = Message {
            message_id: None,
            body: None,
            receipt_handle: "rh".to_string(),
        };
        assert!(matches!(
            dispatch.dispatch(no_body).await,
            HandlerOutcome::DecodeFailed(DecodeError::NoBody)
        ));
    }
}
