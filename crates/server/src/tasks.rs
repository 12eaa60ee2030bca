//! Bounded background work queue.
//!
//! Cache writes and referer tracking are submitted here instead of being
//! awaited on the request path. One worker drains the queue in submission
//! order, so writes from a single request land in the order they were
//! queued. A full queue drops the job; failures are logged, never returned.

use std::future::Future;
use std::pin::Pin;

use resizer_core::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

enum Message {
    Run(Job),
    Flush(oneshot::Sender<()>),
}

/// Handle for submitting background jobs. Cloning shares the queue.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::Sender<Message>,
}

impl TaskQueue {
    /// Start the worker and return a handle to its queue.
    ///
    /// The worker stops once `shutdown` fires, after running whatever was
    /// already queued.
    pub fn spawn(capacity: usize, shutdown: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(worker(rx, shutdown));
        (Self { tx }, handle)
    }

    /// Queue `job` without waiting. Returns `false` if it was dropped.
    pub fn submit<F>(&self, name: &'static str, job: F) -> bool
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let wrapped = Box::pin(async move {
            if let Err(err) = job.await {
                warn!(task = name, error = %err, "background task failed");
            }
        });

        match self.tx.try_send(Message::Run(wrapped)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(task = name, "task queue full, dropping job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(task = name, "task queue closed, dropping job");
                false
            }
        }
    }

    /// Wait until every job queued before this call has finished.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Message::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn worker(mut rx: mpsc::Receiver<Message>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                rx.close();
                let mut drained = 0usize;
                while let Some(message) = rx.recv().await {
                    run(message).await;
                    drained += 1;
                }
                info!(drained, "task queue shut down");
                return;
            }

            message = rx.recv() => match message {
                Some(message) => run(message).await,
                None => {
                    debug!("task queue senders dropped");
                    return;
                }
            },
        }
    }
}

async fn run(message: Message) {
    match message {
        Message::Run(job) => job.await,
        Message::Flush(done) => {
            let _ = done.send(());
        }
    }
}
