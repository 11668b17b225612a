#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqs_poll_runtime::{Message, QueueService, ReceiveRequest, SqsRuntimeError};
use tokio::time::Instant;

/// What the next receive call on a queue returns.
#[derive(Debug, Clone)]
pub enum Step {
    Batch(Vec<Message>),
    Fail(String),
}

impl Step {
    pub fn empty() -> Self {
        Step::Batch(Vec::new())
    }
}

#[derive(Default)]
struct Inner {
    queues: HashMap<String, String>,
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    receive_times: Mutex<Vec<(String, Instant)>>,
    deletes: Mutex<Vec<(String, String)>>,
    failing_deletes: Mutex<HashSet<String>>,
    resolve_calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    receives_with_work_in_flight: AtomicUsize,
}

/// In-memory queue service that replays scripted receive results and
/// records every call it sees.
///
/// Once a queue's script is exhausted every receive returns an empty batch.
#[derive(Clone, Default)]
pub struct ScriptedQueue {
    inner: Arc<Inner>,
}

impl ScriptedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a queue name that resolves to `queue_url`.
    pub fn with_queue(self, queue_name: &str, queue_url: &str) -> Self {
        let mut inner = Arc::try_unwrap(self.inner).unwrap_or_else(|_| {
            panic!("with_queue must be called before the service is shared")
        });
        inner
            .queues
            .insert(queue_name.to_string(), queue_url.to_string());
        ScriptedQueue {
            inner: Arc::new(inner),
        }
    }

    pub fn script(&self, queue_url: &str, steps: impl IntoIterator<Item = Step>) {
        self.inner
            .scripts
            .lock()
            .unwrap()
            .entry(queue_url.to_string())
            .or_default()
            .extend(steps);
    }

    pub fn fail_delete_for(&self, receipt_handle: &str) {
        self.inner
            .failing_deletes
            .lock()
            .unwrap()
            .insert(receipt_handle.to_string());
    }

    pub fn receive_count(&self, queue_url: &str) -> usize {
        self.receive_times(queue_url).len()
    }

    pub fn receive_times(&self, queue_url: &str) -> Vec<Instant> {
        self.inner
            .receive_times
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| url == queue_url)
            .map(|(_, at)| *at)
            .collect()
    }

    /// Receipt handles of successful deletes, sorted.
    pub fn deleted(&self, queue_url: &str) -> Vec<String> {
        let mut handles: Vec<String> = self
            .inner
            .deletes
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| url == queue_url)
            .map(|(_, handle)| handle.clone())
            .collect();
        handles.sort();
        handles
    }

    pub fn resolve_calls(&self) -> usize {
        self.inner.resolve_calls.load(Ordering::SeqCst)
    }

    /// Gauge handlers bump while they run, sampled on every receive.
    pub fn in_flight_gauge(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.inner.in_flight)
    }

    pub fn receives_with_work_in_flight(&self) -> usize {
        self.inner
            .receives_with_work_in_flight
            .load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueService for ScriptedQueue {
    async fn resolve_queue_url(&self, queue_name: &str) -> Result<String, SqsRuntimeError> {
        self.inner.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .queues
            .get(queue_name)
            .cloned()
            .ok_or_else(|| SqsRuntimeError::QueueNotFound(queue_name.to_string()))
    }

    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<Message>, SqsRuntimeError> {
        if self.inner.in_flight.load(Ordering::SeqCst) > 0 {
            self.inner
                .receives_with_work_in_flight
                .fetch_add(1, Ordering::SeqCst);
        }
        self.inner
            .receive_times
            .lock()
            .unwrap()
            .push((request.queue_url.clone(), Instant::now()));

        let step = self
            .inner
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.queue_url)
            .and_then(VecDeque::pop_front);

        match step {
            Some(Step::Batch(messages)) => {
                let limit = request.max_number_of_messages as usize;
                Ok(messages.into_iter().take(limit).collect())
            }
            Some(Step::Fail(message)) => Err(SqsRuntimeError::Transport {
                operation: "ReceiveMessage",
                message,
            }),
            None => Ok(Vec::new()),
        }
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), SqsRuntimeError> {
        if self
            .inner
            .failing_deletes
            .lock()
            .unwrap()
            .contains(receipt_handle)
        {
            return Err(SqsRuntimeError::Transport {
                operation: "DeleteMessage",
                message: format!("cannot delete {receipt_handle}"),
            });
        }
        self.inner
            .deletes
            .lock()
            .unwrap()
            .push((queue_url.to_string(), receipt_handle.to_string()));
        Ok(())
    }
}

/// Message `n` with body `body`, receipt handle `rh-n` and id `m-n`.
pub fn message(n: usize, body: &str) -> Message {
    Message::new(body, format!("rh-{n}")).with_message_id(format!("m-{n}"))
}

pub fn handles(ns: &[usize]) -> Vec<String> {
    let mut handles: Vec<String> = ns.iter().map(|n| format!("rh-{n}")).collect();
    handles.sort();
    handles
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition was not met in time");
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
