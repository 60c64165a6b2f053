//! The batch lifecycle engine: admission, one-at-a-time delivery, oversize
//! splitting, and backoff retry.
//!
//! All engine state is owned by a single worker task draining a command
//! channel, so every mutation is serialized and the at-most-one-in-flight
//! invariant needs no locks. Network sends and retry timers run as spawned
//! tasks that report back through the same channel.

pub mod retry;

pub use retry::{RetryConfig, RetrySchedule};

use crate::app::config::BatchSizeConfig;
use crate::domain::{Batch, BatchRecord, Event, MetaProvider};
use crate::sender::BatchSender;
use crate::storage::{BatchStore, Counter, MemoryPressure, PendingLedger, keys};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const COMMAND_BUFFER: usize = 256;

enum EngineCommand {
    AddBatch {
        events: Vec<Event>,
    },
    SendEventSync {
        event: Event,
        reply: oneshot::Sender<bool>,
    },
    DidSend {
        success: bool,
    },
    RetryFired,
}

/// Delivery state. `NeedRetain` pins the failed record: nothing else is
/// sent until the retry timer resends that exact record.
enum SendState {
    Normal,
    NeedRetain(BatchRecord),
}

/// Everything the engine needs injected. Shared pieces (counter, pressure
/// flag) arrive as handles so multiple engine instances in one process
/// stay independent.
pub struct EngineDeps<S: BatchSender> {
    pub sender: Arc<S>,
    pub store: Box<dyn BatchStore>,
    pub ledger: Box<dyn PendingLedger>,
    pub counter: Arc<dyn Counter>,
    pub meta: Box<dyn MetaProvider>,
    pub pressure: MemoryPressure,
}

/// Cloneable handle enqueueing work onto the engine's command queue.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// Admits a sealed group of events as a new batch.
    pub async fn add_batch(&self, events: Vec<Event>) {
        if self
            .tx
            .send(EngineCommand::AddBatch { events })
            .await
            .is_err()
        {
            warn!("batch engine is gone, dropping batch");
        }
    }

    /// Wraps a single event as a synchronous batch and resolves once its
    /// send attempt completes. Synchronous batches are never persisted.
    pub async fn send_event_sync(&self, event: Event) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = EngineCommand::SendEventSync {
            event,
            reply: reply_tx,
        };
        if self.tx.send(command).await.is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }
}

pub struct BatchEngine<S: BatchSender> {
    sender: Arc<S>,
    store: Box<dyn BatchStore>,
    ledger: Box<dyn PendingLedger>,
    counter: Arc<dyn Counter>,
    meta: Box<dyn MetaProvider>,
    pressure: MemoryPressure,
    retry: RetrySchedule,
    sizes: BatchSizeConfig,
    state: SendState,
    in_flight: Option<BatchRecord>,
    pending_reply: Option<oneshot::Sender<bool>>,
    /// Ledger entries restored at setup; drained ahead of everything else.
    restored: VecDeque<BatchRecord>,
    /// Memory-only fallback while the pressure flag is constrained.
    backlog: Vec<BatchRecord>,
    /// Synchronous sends waiting for the line to free up.
    sync_queue: VecDeque<(BatchRecord, oneshot::Sender<bool>)>,
    rx: mpsc::Receiver<EngineCommand>,
    tx: mpsc::Sender<EngineCommand>,
}

impl<S: BatchSender> BatchEngine<S> {
    /// Restores pre-crash state, resets the pressure flag, spawns the
    /// worker task, and kicks off the first send.
    pub fn spawn(
        deps: EngineDeps<S>,
        retry_config: RetryConfig,
        sizes: BatchSizeConfig,
        shutdown: CancellationToken,
    ) -> EngineHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let restored: VecDeque<BatchRecord> = deps.ledger.load_pending().into();
        if !restored.is_empty() {
            info!("restored {} pending batches from ledger", restored.len());
        }
        deps.pressure.reset();

        let engine = Self {
            sender: deps.sender,
            store: deps.store,
            ledger: deps.ledger,
            counter: deps.counter,
            meta: deps.meta,
            pressure: deps.pressure,
            retry: RetrySchedule::new(retry_config),
            sizes,
            state: SendState::Normal,
            in_flight: None,
            pending_reply: None,
            restored,
            backlog: Vec::new(),
            sync_queue: VecDeque::new(),
            rx,
            tx: tx.clone(),
        };
        tokio::spawn(engine.run(shutdown));
        EngineHandle { tx }
    }

    async fn run(mut self, shutdown: CancellationToken) {
        self.try_send_next();
        loop {
            // Biased: queued work (notably admissions) drains before the
            // shutdown signal is honored, so a terminating host gets its
            // sealed batches persisted.
            tokio::select! {
                biased;
                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = shutdown.cancelled() => {
                    debug!("batch engine shutting down");
                    break;
                }
            }
        }
    }

    fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::AddBatch { events } => self.admit_events(events),
            EngineCommand::SendEventSync { event, reply } => self.handle_sync(event, reply),
            EngineCommand::DidSend { success } => self.did_send(success),
            EngineCommand::RetryFired => self.retry_fired(),
        }
    }

    /// Admission: build the record, persist it (or fall back to memory
    /// under pressure), then try to dispatch.
    fn admit_events(&mut self, events: Vec<Event>) {
        debug!("adding batch of {} events", events.len());
        let batch_num = self.counter.incremented_count(keys::BATCH_NUM);
        let batch = Batch::new(self.meta.snapshot(), batch_num, events);
        let record = BatchRecord::new(batch);

        if self.pressure.is_constrained() {
            self.backlog.push(record);
        } else if let Err(e) = self.store.insert(&record) {
            error!("failed to persist batch {}: {e}", record.id);
            self.pressure.set_constrained();
            self.backlog.push(record);
        }
        self.try_send_next();
    }

    fn handle_sync(&mut self, event: Event, reply: oneshot::Sender<bool>) {
        let batch_num = self.counter.incremented_count(keys::BATCH_NUM);
        let batch = Batch::new(self.meta.snapshot(), batch_num, vec![event]);
        let record = BatchRecord::synchronous(batch);

        if self.in_flight.is_some() || matches!(self.state, SendState::NeedRetain(_)) {
            self.sync_queue.push_back((record, reply));
        } else {
            self.send_record(record, Some(reply));
        }
    }

    /// Idempotent dispatch: picks the next candidate unless a retained
    /// record or an in-flight send takes precedence.
    fn try_send_next(&mut self) {
        if matches!(self.state, SendState::NeedRetain(_)) {
            return;
        }
        if self.in_flight.is_some() {
            debug!("batch sending already in progress");
            return;
        }
        if let Some((record, reply)) = self.sync_queue.pop_front() {
            self.send_record(record, Some(reply));
            return;
        }

        let candidate = if let Some(record) = self.restored.front() {
            Some(record.clone())
        } else if self.pressure.is_constrained() {
            self.backlog.first().cloned()
        } else {
            match self.store.fetch_oldest() {
                Ok(record) => record,
                Err(e) => {
                    warn!("failed to fetch next batch: {e}");
                    None
                }
            }
        };

        match candidate {
            Some(record) => self.send_record(record, None),
            None => debug!("no pending batches to send"),
        }
    }

    fn send_record(&mut self, record: BatchRecord, reply: Option<oneshot::Sender<bool>>) {
        debug!("trying to send batch {}", record.id);
        self.in_flight = Some(record.clone());
        self.pending_reply = reply;

        let payload = match serde_json::to_vec(&record.batch) {
            Ok(payload) => payload,
            Err(e) => {
                error!("failed to serialize batch {}: {e}", record.id);
                self.did_send(false);
                return;
            }
        };

        // Whole-KB comparison: a batch exactly at the limit goes out, one
        // KB over splits. An oversized single-event batch is sent as-is.
        let size_kb = payload.len() / self.sizes.bytes_per_kb;
        if size_kb > self.sizes.max_batch_size_kb && record.batch.is_splittable() {
            self.split_oversize(record);
            return;
        }

        let sender = Arc::clone(&self.sender);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let success = sender.send_batch(Bytes::from(payload)).await;
            let _ = tx.send(EngineCommand::DidSend { success }).await;
        });
    }

    /// Oversize handling: never send; retire the original record and push
    /// both halves back through admission, where they get fresh sequence
    /// numbers and metadata.
    fn split_oversize(&mut self, record: BatchRecord) {
        info!("batch {} exceeds the size limit, splitting", record.id);
        self.in_flight = None;
        if let Some(reply) = self.pending_reply.take() {
            let _ = reply.send(false);
        }

        if let Some(pos) = self.restored.iter().position(|r| r.id == record.id) {
            self.restored.remove(pos);
        } else if let Some(pos) = self.backlog.iter().position(|r| r.id == record.id) {
            self.backlog.remove(pos);
        } else if let Err(e) = self.store.remove(&record.id) {
            warn!("failed to remove oversize batch {}: {e}", record.id);
        }

        let (first, second) = record.batch.split_halves();
        self.admit_events(first);
        self.admit_events(second);
    }

    fn did_send(&mut self, success: bool) {
        let Some(record) = self.in_flight.take() else {
            warn!("send completion arrived with no batch in flight");
            return;
        };
        debug!("did send batch {}, successfully: {success}", record.id);

        if success {
            if !record.synchronous {
                self.retire(&record);
            }
            self.state = SendState::Normal;
        } else {
            self.state = SendState::NeedRetain(record.clone());
        }

        if let Some(reply) = self.pending_reply.take() {
            let _ = reply.send(success);
        }
        self.schedule_retry(&record.id);
    }

    /// Removes a delivered record from whichever source held it. A restored
    /// record's removal is persisted back to the ledger immediately.
    fn retire(&mut self, record: &BatchRecord) {
        if let Some(pos) = self.restored.iter().position(|r| r.id == record.id) {
            self.restored.remove(pos);
            let remaining: Vec<BatchRecord> = self.restored.iter().cloned().collect();
            if let Err(e) = self.ledger.save_pending(&remaining) {
                error!("failed to save pending-batches ledger: {e}");
            }
        } else if let Some(pos) = self.backlog.iter().position(|r| r.id == record.id) {
            self.backlog.remove(pos);
        } else if let Err(e) = self.store.remove(&record.id) {
            warn!("failed to remove sent batch {}: {e}", record.id);
        }
    }

    fn schedule_retry(&mut self, id: &str) {
        let delay = self.retry.delay_for(id);
        debug!("scheduling next send attempt in {delay:?}");
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(EngineCommand::RetryFired).await;
        });
    }

    /// Timer callback: a retained record gets resent as a fresh attempt;
    /// otherwise pick up whatever queued while we waited.
    fn retry_fired(&mut self) {
        match std::mem::replace(&mut self.state, SendState::Normal) {
            SendState::NeedRetain(record) => self.send_record(record, None),
            SendState::Normal => self.try_send_next(),
        }
    }
}
