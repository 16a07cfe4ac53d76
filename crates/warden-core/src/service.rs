use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex as StdMutex,
};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    dedupe::TtlSet,
    domain::MessageTask,
    metrics::Metrics,
    ports::SessionFactory,
    processor::MessageProcessor,
};

enum QueueItem {
    Task(MessageTask),
    /// Graceful-shutdown sentinel; each worker exits on observing one.
    Shutdown,
}

/// Queue-backed anti-spam service.
///
/// A bounded FIFO queue feeds a fixed pool of workers; each worker
/// deduplicates, opens a fresh storage session and runs the message
/// processor. Processing failures are logged and never kill a worker loop.
pub struct AntiSpamService {
    tx: mpsc::Sender<QueueItem>,
    rx: Arc<Mutex<mpsc::Receiver<QueueItem>>>,
    workers: usize,
    depth: Arc<AtomicUsize>,
    seen: Arc<StdMutex<TtlSet<(i64, i32)>>>,
    processor: Arc<MessageProcessor>,
    metrics: Arc<Metrics>,
    state: Mutex<ServiceState>,
}

#[derive(Default)]
struct ServiceState {
    started: bool,
    handles: Vec<JoinHandle<()>>,
}

impl AntiSpamService {
    pub fn new(cfg: &Config, processor: Arc<MessageProcessor>, metrics: Arc<Metrics>) -> Self {
        let (tx, rx) = mpsc::channel(cfg.queue_size);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            workers: cfg.workers,
            depth: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(StdMutex::new(TtlSet::new(
                cfg.dedupe_ttl,
                cfg.dedupe_max_size,
            ))),
            processor,
            metrics,
            state: Mutex::new(ServiceState::default()),
        }
    }

    /// Non-blocking put; on a full queue the caller is backpressured with a
    /// blocking put rather than the message being dropped.
    pub async fn enqueue(&self, task: MessageTask) {
        match self.tx.try_send(QueueItem::Task(task)) {
            Ok(()) => {
                self.depth.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(item)) => {
                if let QueueItem::Task(t) = &item {
                    warn!(
                        chat_id = t.chat_id.0,
                        msg_id = t.message_id.0,
                        user_id = t.user_id.0,
                        "anti-spam queue full -> waiting"
                    );
                }
                if self.tx.send(item).await.is_ok() {
                    self.depth.fetch_add(1, Ordering::Relaxed);
                } else {
                    warn!("anti-spam service stopped; task dropped");
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("anti-spam service stopped; task dropped");
            }
        }
    }

    /// Idempotent: spawns exactly `workers` loop tasks on first call.
    pub async fn start(&self, session_factory: Arc<dyn SessionFactory>) {
        let mut st = self.state.lock().await;
        if st.started {
            return;
        }
        st.started = true;

        for idx in 0..self.workers {
            st.handles.push(tokio::spawn(worker_loop(
                idx,
                self.rx.clone(),
                self.seen.clone(),
                self.depth.clone(),
                session_factory.clone(),
                self.processor.clone(),
                self.metrics.clone(),
            )));
        }

        info!(
            queue_size = self.tx.max_capacity(),
            workers = self.workers,
            "anti-spam service started"
        );
    }

    /// Idempotent graceful shutdown: one sentinel per worker, then await
    /// all worker loops. Tasks already queued ahead of the sentinels are
    /// still processed.
    pub async fn stop(&self) {
        let handles = {
            let mut st = self.state.lock().await;
            if !st.started {
                return;
            }
            st.started = false;
            std::mem::take(&mut st.handles)
        };

        for _ in 0..handles.len() {
            let _ = self.tx.send(QueueItem::Shutdown).await;
        }
        for handle in handles {
            let _ = handle.await;
        }

        info!("anti-spam service stopped");
    }

    pub fn queue_len(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    idx: usize,
    rx: Arc<Mutex<mpsc::Receiver<QueueItem>>>,
    seen: Arc<StdMutex<TtlSet<(i64, i32)>>>,
    depth: Arc<AtomicUsize>,
    session_factory: Arc<dyn SessionFactory>,
    processor: Arc<MessageProcessor>,
    metrics: Arc<Metrics>,
) {
    loop {
        // Hold the receiver lock only around the dequeue itself.
        let item = { rx.lock().await.recv().await };
        let Some(item) = item else {
            break;
        };
        let task = match item {
            QueueItem::Shutdown => break,
            QueueItem::Task(task) => task,
        };
        depth.fetch_sub(1, Ordering::Relaxed);

        let fresh = {
            let mut seen = match seen.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            seen.add_if_new(task.dedupe_key())
        };
        if !fresh {
            debug!(
                chat_id = task.chat_id.0,
                msg_id = task.message_id.0,
                worker = idx,
                "duplicate task skipped"
            );
            continue;
        }

        let mut session = match session_factory.session().await {
            Ok(session) => session,
            Err(e) => {
                metrics.incr_processing_errors();
                error!(
                    worker = idx,
                    chat_id = task.chat_id.0,
                    msg_id = task.message_id.0,
                    "could not open storage session: {e}"
                );
                continue;
            }
        };

        match processor.process(session.as_mut(), &task).await {
            Ok(_) => metrics.incr_messages_processed(),
            Err(e) => {
                metrics.incr_processing_errors();
                error!(
                    worker = idx,
                    chat_id = task.chat_id.0,
                    msg_id = task.message_id.0,
                    user_id = task.user_id.0,
                    "anti-spam worker failed: {e}"
                );
                if let Err(re) = session.rollback().await {
                    error!(worker = idx, "rollback failed: {re}");
                }
            }
        }
    }

    debug!(worker = idx, "anti-spam worker exited");
}
