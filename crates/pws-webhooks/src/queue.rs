//! Named job queues.
//!
//! Producers call [`JobQueue::enqueue`], which never waits on delivery.
//! Consumers register a [`JobHandler`] with [`JobQueue::process`]; every job
//! is handed over together with an [`Ack`] that must be consumed once the job
//! is done.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, mpsc, watch};
use tokio::task::JoinHandle;

use crate::job::DeliveryJob;
use crate::policy::{DeadLetter, DeadLetterSink};
use crate::transport::DeliveryResult;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Queue is closed: {0}")]
    Closed(String),

    #[error("Queue already has a processor: {0}")]
    AlreadyProcessing(String),

    #[error("No async runtime available to schedule job on queue {0}")]
    NoRuntime(String),
}

/// Consumer side of a queue.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Handle one job. `ack` must be consumed exactly once.
    async fn handle(&self, job: DeliveryJob, ack: Ack);
}

pub trait JobQueue: Send + Sync {
    /// Add a job to the named queue without waiting for it to be processed.
    fn enqueue(&self, queue: &str, job: DeliveryJob) -> Result<(), QueueError>;

    /// Add a job that becomes visible to consumers after `delay`.
    fn enqueue_delayed(
        &self,
        queue: &str,
        job: DeliveryJob,
        delay: Duration,
    ) -> Result<(), QueueError>;

    /// Start consuming the named queue with `handler`.
    fn process(&self, queue: &str, handler: Arc<dyn JobHandler>) -> Result<(), QueueError>;
}

/// Completion handle for a dequeued job.
///
/// Consuming it with [`Ack::ack`] marks the job done. Dropping it without
/// acknowledging also completes the job, with a warning.
pub struct Ack {
    queue: String,
    on_ack: Option<Box<dyn FnOnce() + Send>>,
}

impl Ack {
    pub fn new(queue: impl Into<String>, on_ack: impl FnOnce() + Send + 'static) -> Self {
        Self {
            queue: queue.into(),
            on_ack: Some(Box::new(on_ack)),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn ack(mut self) {
        if let Some(on_ack) = self.on_ack.take() {
            on_ack();
        }
    }
}

impl Drop for Ack {
    fn drop(&mut self) {
        if let Some(on_ack) = self.on_ack.take() {
            tracing::warn!(queue = %self.queue, "Job handler finished without acknowledging");
            on_ack();
        }
    }
}

impl std::fmt::Debug for Ack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ack")
            .field("queue", &self.queue)
            .field("pending", &self.on_ack.is_some())
            .finish()
    }
}

/// Job counters of one named queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub acked: u64,
}

impl QueueStats {
    pub fn pending(&self) -> u64 {
        self.enqueued.saturating_sub(self.acked)
    }
}

struct NamedQueue {
    name: String,
    tx: mpsc::UnboundedSender<DeliveryJob>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<DeliveryJob>>>,
    enqueued: AtomicU64,
    acked: AtomicU64,
    idle: Notify,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
}

impl NamedQueue {
    fn new(name: &str, dead_letters: Option<Arc<dyn DeadLetterSink>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: name.to_string(),
            tx,
            rx: Mutex::new(Some(rx)),
            enqueued: AtomicU64::new(0),
            acked: AtomicU64::new(0),
            idle: Notify::new(),
            dead_letters,
        }
    }

    fn push(&self, job: DeliveryJob) -> Result<(), QueueError> {
        self.tx
            .send(job)
            .map_err(|_| QueueError::Closed(self.name.clone()))
    }

    fn complete(&self) {
        self.acked.fetch_add(1, Ordering::SeqCst);
        self.idle.notify_waiters();
    }

    /// Complete a job that will never reach a handler.
    fn discard(&self, job: DeliveryJob, reason: &str) {
        match &self.dead_letters {
            Some(sink) => sink.store(DeadLetter {
                job,
                result: DeliveryResult::failure(reason, 0),
            }),
            None => tracing::warn!(
                queue = %self.name,
                url = %job.endpoint.url,
                attempt = job.attempt,
                reason,
                "Discarding undelivered job"
            ),
        }
        self.complete();
    }

    /// Close `rx` and discard whatever is still buffered in it.
    fn drain(&self, mut rx: mpsc::UnboundedReceiver<DeliveryJob>) {
        rx.close();
        let mut discarded = 0u64;
        while let Ok(job) = rx.try_recv() {
            self.discard(job, "queue shut down before delivery");
            discarded += 1;
        }
        if discarded > 0 {
            tracing::warn!(queue = %self.name, discarded, "Queue shut down with undelivered jobs");
        }
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.enqueued.load(Ordering::SeqCst),
            acked: self.acked.load(Ordering::SeqCst),
        }
    }
}

/// In-process queue on tokio channels.
///
/// Each named queue is an unbounded FIFO. A processed queue runs one
/// dispatch loop that hands jobs to the handler on separate tasks, with at
/// most `concurrency` jobs unacknowledged at a time.
///
/// Jobs that can no longer be handed to a handler because the queue shut
/// down are completed and passed to the dead-letter sink, if one is set.
pub struct MemoryQueue {
    queues: DashMap<String, Arc<NamedQueue>>,
    concurrency: usize,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
}

impl MemoryQueue {
    pub fn new(concurrency: usize) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            queues: DashMap::new(),
            concurrency: concurrency.max(1),
            shutdown,
            tasks: Mutex::new(Vec::new()),
            dead_letters: None,
        }
    }

    /// Store jobs discarded at shutdown in `sink` instead of only logging them.
    pub fn with_dead_letters(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    fn named(&self, queue: &str) -> Arc<NamedQueue> {
        self.queues
            .entry(queue.to_string())
            .or_insert_with(|| Arc::new(NamedQueue::new(queue, self.dead_letters.clone())))
            .clone()
    }

    fn is_stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn stats(&self, queue: &str) -> QueueStats {
        self.queues
            .get(queue)
            .map(|q| q.stats())
            .unwrap_or_default()
    }

    /// Wait until every job enqueued so far on `queue` has been acknowledged.
    pub async fn wait_idle(&self, queue: &str) {
        let named = self.named(queue);
        loop {
            let notified = named.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if named.stats().pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop all dispatch loops and wait for them to exit.
    ///
    /// Jobs already handed to a handler keep running to completion. Jobs
    /// still buffered, and delayed jobs not yet due, are discarded: they
    /// count as acknowledged and go to the dead-letter sink. Once this
    /// returns, [`MemoryQueue::wait_idle`] only waits for in-flight handlers.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let tasks = std::mem::take(
            &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Queue dispatch loop panicked");
            }
        }

        // Queues that never got a processor still own their receiver
        let unprocessed: Vec<Arc<NamedQueue>> =
            self.queues.iter().map(|entry| entry.value().clone()).collect();
        for named in unprocessed {
            let rx = named.rx.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(rx) = rx {
                named.drain(rx);
            }
        }
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(1)
    }
}

impl JobQueue for MemoryQueue {
    fn enqueue(&self, queue: &str, job: DeliveryJob) -> Result<(), QueueError> {
        let named = self.named(queue);
        named.enqueued.fetch_add(1, Ordering::SeqCst);
        named.push(job).inspect_err(|_| named.complete())
    }

    fn enqueue_delayed(
        &self,
        queue: &str,
        job: DeliveryJob,
        delay: Duration,
    ) -> Result<(), QueueError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| QueueError::NoRuntime(queue.to_string()))?;
        if self.is_stopping() {
            return Err(QueueError::Closed(queue.to_string()));
        }
        let named = self.named(queue);
        named.enqueued.fetch_add(1, Ordering::SeqCst);
        let shutdown = self.shutdown.subscribe();

        runtime.spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = stopped(shutdown) => {
                    named.discard(job, "queue shut down before retry was due");
                    return;
                }
            }
            if let Err(mpsc::error::SendError(job)) = named.tx.send(job) {
                named.discard(job, "queue closed");
            }
        });
        Ok(())
    }

    fn process(&self, queue: &str, handler: Arc<dyn JobHandler>) -> Result<(), QueueError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| QueueError::NoRuntime(queue.to_string()))?;
        if self.is_stopping() {
            return Err(QueueError::Closed(queue.to_string()));
        }
        let named = self.named(queue);
        let rx = named
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| QueueError::AlreadyProcessing(queue.to_string()))?;

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let task = runtime.spawn(dispatch_loop(
            named,
            rx,
            handler,
            permits,
            self.shutdown.subscribe(),
        ));
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);

        tracing::info!(queue, concurrency = self.concurrency, "Queue processor started");
        Ok(())
    }
}

async fn dispatch_loop(
    queue: Arc<NamedQueue>,
    mut rx: mpsc::UnboundedReceiver<DeliveryJob>,
    handler: Arc<dyn JobHandler>,
    permits: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let job = tokio::select! {
            biased;

            result = shutdown.changed() => {
                match result {
                    Ok(()) if *shutdown.borrow() => break,
                    Ok(()) => continue,
                    Err(_) => break,
                }
            }
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let Ok(permit) = permits.clone().acquire_owned().await else {
            queue.discard(job, "queue shut down before delivery");
            break;
        };
        let ack = acknowledger(queue.clone(), permit);
        let handler = handler.clone();
        let name = queue.name.clone();

        tokio::spawn(async move {
            let handle = tokio::spawn(async move { handler.handle(job, ack).await });
            if let Err(e) = handle.await {
                tracing::error!(queue = %name, error = %e, "Job handler panicked");
            }
        });
    }

    queue.drain(rx);
    tracing::info!(queue = %queue.name, "Queue processor stopped");
}

/// Resolves once shutdown has been requested or the queue is gone.
async fn stopped(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

fn acknowledger(queue: Arc<NamedQueue>, permit: OwnedSemaphorePermit) -> Ack {
    let name = queue.name.clone();
    Ack::new(name, move || {
        drop(permit);
        queue.complete();
    })
}
