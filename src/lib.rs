//! # SQS Poll Runtime
//!
//! A runtime that keeps pulling messages from AWS SQS queues, hands each one
//! to your handler and deletes only the messages that were handled
//! successfully.
//!
//! ## Features
//!
//! - One poll loop per queue, running on tokio
//! - Messages of a batch handled concurrently; the next receive waits for the whole batch
//! - Backoff of 0, 200 and 400ms between empty polls
//! - Blocking, completion-signal and async handlers behind one [`MessageHandler`] trait
//! - Raw messages or JSON-decoded typed events
//! - Continue-on-error semantics: transport, decode and handler errors are logged, never fatal
//! - Cooperative shutdown that drains the batch in flight
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde::Deserialize;
//! use sqs_poll_runtime::{SqsRuntime, receiver::handler};
//!
//! #[derive(Deserialize)]
//! struct OrderPlaced {
//!     order_id: u64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = SqsRuntime::from_env().await;
//!
//!     runtime
//!         .handle_events_in_queue(
//!             "orders",
//!             handler::from_fn(|event: OrderPlaced| async move {
//!                 println!("order {} placed", event.order_id);
//!                 Ok::<(), std::io::Error>(())
//!             }),
//!         )
//!         .await?;
//!
//!     runtime
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await;
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod decoder;
pub mod errors;
pub mod receiver;

pub use client::{Message, QueueService};
pub use decoder::{BodyDecoder, JsonDecoder};
pub use errors::{DecodeError, GenericError, HandlerError, SqsRuntimeError};
pub use receiver::config::{QueueConfig, ReceiveRequest};
pub use receiver::handler::{Completion, HandlerOutcome, MessageHandler};
pub use receiver::state::State;
pub use receiver::{QueueHandle, SqsRuntime};
