use std::{str::FromStr, sync::Arc};

use thiserror::Error;
use tokio::{
    sync::{Mutex, broadcast, mpsc, oneshot},
    time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

use crate::{
    contact::{Contact, ContactDraft},
    core::store::{ContactStore, StoreError, StoreSnapshotV1},
    op::StoredOp,
    persist::{OpSink, PersistError},
    types::{ContactId, OpSeq},
};

use super::events::ContactEvent;

/// Failures surfaced through [`PhonebookHandle`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The store rejected the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The operation could not be made durable and was rolled back.
    #[error("persistence failed: {0}")]
    Persist(#[from] PersistError),
    /// The runtime task is gone.
    #[error("phonebook runtime is not running")]
    ChannelClosed,
}

/// When a mutation is acknowledged to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// After the sink committed the op.
    #[default]
    Durable,
    /// As soon as the op is applied in memory and queued for persistence.
    InMemory,
}

impl FromStr for AckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "durable" => Ok(Self::Durable),
            "memory" | "in-memory" | "in_memory" => Ok(Self::InMemory),
            other => Err(format!("unknown ack mode `{other}` (expected durable or memory)")),
        }
    }
}

/// Tuning knobs for the runtime and its persistence worker.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Acknowledgement policy for mutations.
    pub ack_mode: AckMode,
    /// Batch size that forces a write in [`AckMode::InMemory`].
    pub batch_max_ops: usize,
    /// Longest time a queued op waits before being written.
    pub batch_max_latency_ms: u64,
    /// Capacity of the persistence queue.
    pub persist_queue_bound: usize,
    /// Write a snapshot after this many mutations; 0 disables.
    pub snapshot_every_ops: usize,
    /// Drop journal entries covered by a fresh snapshot.
    pub compact_after_snapshot: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ack_mode: AckMode::Durable,
            batch_max_ops: 32,
            batch_max_latency_ms: 75,
            persist_queue_bound: 64,
            snapshot_every_ops: 2000,
            compact_after_snapshot: false,
        }
    }
}

/// Cloneable entry point to the single-writer phonebook runtime.
pub struct PhonebookHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<ContactEvent>,
}

impl Clone for PhonebookHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

enum Command {
    ListAll {
        resp: oneshot::Sender<Vec<Contact>>,
    },
    Get {
        id: ContactId,
        resp: oneshot::Sender<Option<Contact>>,
    },
    Count {
        resp: oneshot::Sender<usize>,
    },
    Create {
        draft: ContactDraft,
        resp: oneshot::Sender<Result<Contact, RuntimeError>>,
    },
    Update {
        id: ContactId,
        draft: ContactDraft,
        resp: oneshot::Sender<Result<Contact, RuntimeError>>,
    },
    Delete {
        id: ContactId,
        resp: oneshot::Sender<Result<bool, RuntimeError>>,
    },
    Flush {
        resp: oneshot::Sender<Result<OpSeq, RuntimeError>>,
    },
    Checkpoint {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

enum PersistMsg {
    Op {
        stored: StoredOp,
        ack: Option<oneshot::Sender<Result<OpSeq, PersistError>>>,
    },
    Flush {
        resp: oneshot::Sender<Result<OpSeq, PersistError>>,
    },
    Checkpoint {
        snapshot: StoreSnapshotV1,
        last_seq: OpSeq,
        compact: bool,
        resp: oneshot::Sender<Result<(), PersistError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), PersistError>>,
    },
}

/// Starts the runtime task that owns `store` and, optionally, `sink`.
///
/// Without a sink the phonebook lives purely in memory. Must be called from
/// inside a tokio runtime.
pub fn spawn_phonebook(
    store: ContactStore,
    sink: Option<Box<dyn OpSink>>,
    config: RuntimeConfig,
) -> PhonebookHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(256);
    let (events_tx, _) = broadcast::channel::<ContactEvent>(1024);

    let (persist_tx, mut durable_rx) = match sink {
        Some(sink) => {
            let (persist_tx, persist_rx) = mpsc::channel::<PersistMsg>(config.persist_queue_bound);
            let (durable_tx, durable_rx) = mpsc::unbounded_channel::<OpSeq>();
            spawn_journal_writer(sink, persist_rx, durable_tx, config.clone());
            (Some(persist_tx), Some(durable_rx))
        }
        None => (None, None),
    };

    let events_tx_loop = events_tx.clone();

    tokio::spawn(async move {
        let mut store = store;
        let mut ops_since_snapshot = 0usize;
        info!(contacts = store.count(), ack_mode = ?config.ack_mode, "phonebook runtime started");

        loop {
            let wake = match durable_rx.as_mut() {
                Some(rx) => tokio::select! {
                    cmd = cmd_rx.recv() => Wake::Command(cmd),
                    durable = rx.recv() => Wake::Durable(durable),
                },
                None => Wake::Command(cmd_rx.recv().await),
            };

            match wake {
                Wake::Durable(Some(op_seq)) => {
                    let _ = events_tx_loop.send(ContactEvent::DurableUpTo { op_seq });
                }
                Wake::Durable(None) => durable_rx = None,
                Wake::Command(None) => break,
                Wake::Command(Some(cmd)) => {
                    let done = handle_command(
                        cmd,
                        &mut store,
                        &events_tx_loop,
                        persist_tx.as_ref(),
                        &config,
                        &mut ops_since_snapshot,
                    )
                    .await;
                    if done {
                        break;
                    }
                }
            }
        }

        info!("phonebook runtime stopped");
    });

    PhonebookHandle {
        cmd_tx,
        events_tx,
    }
}

enum Wake {
    Command(Option<Command>),
    Durable(Option<OpSeq>),
}

impl PhonebookHandle {
    /// Subscribes to the runtime event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ContactEvent> {
        self.events_tx.subscribe()
    }

    /// Every contact, in listing order.
    pub async fn list_all(&self) -> Result<Vec<Contact>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ListAll { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// The contact with `id`, if any.
    pub async fn get(&self, id: ContactId) -> Result<Option<Contact>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Get { id, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Number of stored contacts.
    pub async fn count(&self) -> Result<usize, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Count { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Validates and stores a new contact.
    pub async fn create(&self, draft: ContactDraft) -> Result<Contact, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Create { draft, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Replaces the fields of an existing contact.
    pub async fn update(&self, id: ContactId, draft: ContactDraft) -> Result<Contact, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Update { id, draft, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Removes a contact. Returns whether anything was removed.
    pub async fn delete(&self, id: ContactId) -> Result<bool, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Delete { id, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Writes out every queued op and returns the highest durable sequence.
    pub async fn flush(&self) -> Result<OpSeq, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Flush { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Writes a snapshot of the current state.
    pub async fn checkpoint(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Checkpoint { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Drains the persistence queue and stops the runtime.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }
}

async fn handle_command(
    cmd: Command,
    store: &mut ContactStore,
    events_tx: &broadcast::Sender<ContactEvent>,
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
    config: &RuntimeConfig,
    ops_since_snapshot: &mut usize,
) -> bool {
    match cmd {
        Command::ListAll { resp } => {
            let _ = resp.send(store.list_cloned());
        }
        Command::Get { id, resp } => {
            let _ = resp.send(store.get_cloned(id));
        }
        Command::Count { resp } => {
            let _ = resp.send(store.count());
        }
        Command::Create { draft, resp } => {
            let res = match store.create(draft) {
                Ok((contact, stored)) => commit(store, stored, events_tx, persist_tx, config)
                    .await
                    .map(|()| {
                        let _ = events_tx.send(ContactEvent::Created { id: contact.id });
                        contact
                    }),
                Err(err) => Err(err.into()),
            };
            if res.is_ok() {
                *ops_since_snapshot += 1;
                maybe_auto_checkpoint(store, persist_tx, config, ops_since_snapshot).await;
            }
            let _ = resp.send(res);
        }
        Command::Update { id, draft, resp } => {
            let res = match store.update(id, draft) {
                Ok((contact, stored)) => commit(store, stored, events_tx, persist_tx, config)
                    .await
                    .map(|()| {
                        let _ = events_tx.send(ContactEvent::Updated { id });
                        contact
                    }),
                Err(err) => Err(err.into()),
            };
            if res.is_ok() {
                *ops_since_snapshot += 1;
                maybe_auto_checkpoint(store, persist_tx, config, ops_since_snapshot).await;
            }
            let _ = resp.send(res);
        }
        Command::Delete { id, resp } => {
            let res = match store.delete(id) {
                Some(stored) => commit(store, stored, events_tx, persist_tx, config)
                    .await
                    .map(|()| {
                        let _ = events_tx.send(ContactEvent::Deleted { id });
                        true
                    }),
                None => Ok(false),
            };
            if matches!(res, Ok(true)) {
                *ops_since_snapshot += 1;
                maybe_auto_checkpoint(store, persist_tx, config, ops_since_snapshot).await;
            }
            let _ = resp.send(res);
        }
        Command::Flush { resp } => {
            let out = if let Some(tx) = persist_tx {
                let (flush_tx, flush_rx) = oneshot::channel();
                if tx
                    .send(PersistMsg::Flush { resp: flush_tx })
                    .await
                    .is_err()
                {
                    Err(RuntimeError::ChannelClosed)
                } else {
                    flush_rx
                        .await
                        .map_err(|_| RuntimeError::ChannelClosed)
                        .and_then(|r| r.map_err(RuntimeError::from))
                }
            } else {
                Ok(store.latest_op_seq())
            };
            let _ = resp.send(out);
        }
        Command::Checkpoint { resp } => {
            let out = if let Some(tx) = persist_tx {
                request_checkpoint(store, tx, config).await
            } else {
                Ok(())
            };
            if out.is_ok() {
                *ops_since_snapshot = 0;
            }
            let _ = resp.send(out);
        }
        Command::Shutdown { resp } => {
            let out = if let Some(tx) = persist_tx {
                let (done_tx, done_rx) = oneshot::channel();
                let send_res = tx.send(PersistMsg::Shutdown { resp: done_tx }).await;
                if send_res.is_err() {
                    Err(RuntimeError::ChannelClosed)
                } else {
                    done_rx
                        .await
                        .map_err(|_| RuntimeError::ChannelClosed)
                        .and_then(|r| r.map_err(RuntimeError::from))
                }
            } else {
                Ok(())
            };
            let _ = resp.send(out);
            return true;
        }
    }

    false
}

/// Hands a freshly applied op to persistence, reverting it on failure so the
/// store never holds a change the caller was told had failed.
async fn commit(
    store: &mut ContactStore,
    stored: StoredOp,
    events_tx: &broadcast::Sender<ContactEvent>,
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
    config: &RuntimeConfig,
) -> Result<(), RuntimeError> {
    // Ops are shipped directly from here; the store's pending buffer is unused.
    store.drain_pending_ops();

    let Some(tx) = persist_tx else {
        let _ = events_tx.send(ContactEvent::DurableUpTo { op_seq: stored.seq });
        return Ok(());
    };

    let res = match config.ack_mode {
        AckMode::InMemory => enqueue_persist(tx, stored.clone()),
        AckMode::Durable => persist_and_wait(tx, stored.clone()).await,
    };

    if let Err(err) = &res {
        warn!(seq = stored.seq, error = %err, "rolling back op that could not be persisted");
        if let Err(revert_err) = store.revert(&stored) {
            error!(seq = stored.seq, error = %revert_err, "rollback failed");
        }
    }
    res
}

async fn persist_and_wait(tx: &mpsc::Sender<PersistMsg>, stored: StoredOp) -> Result<(), RuntimeError> {
    let (ack_tx, ack_rx) = oneshot::channel();
    tx.send(PersistMsg::Op {
        stored,
        ack: Some(ack_tx),
    })
    .await
    .map_err(|_| RuntimeError::ChannelClosed)?;
    ack_rx
        .await
        .map_err(|_| RuntimeError::ChannelClosed)?
        .map(|_| ())
        .map_err(RuntimeError::from)
}

/// Owns the sink for the runtime and everything accepted but not yet
/// committed to it.
struct JournalWriter {
    sink: Arc<Mutex<Box<dyn OpSink>>>,
    /// Accepted ops not yet in the journal, in seq order.
    unwritten: Vec<StoredOp>,
    durable: OpSeq,
    durable_tx: mpsc::UnboundedSender<OpSeq>,
}

impl JournalWriter {
    fn new(sink: Box<dyn OpSink>, durable_tx: mpsc::UnboundedSender<OpSeq>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            unwritten: Vec::new(),
            durable: 0,
            durable_tx,
        }
    }

    /// Appends every unwritten op, then syncs the sink when `sync` is set.
    ///
    /// A failed append leaves the batch queued ahead of anything accepted
    /// later, so the next write retries it in seq order. Returns the highest
    /// durable sequence.
    async fn write(&mut self, sync: bool) -> Result<OpSeq, PersistError> {
        let batch = self.unwritten.clone();
        let sink = Arc::clone(&self.sink);
        let (appended, synced) = tokio::task::spawn_blocking(move || {
            let mut sink = sink.blocking_lock();
            let appended = if batch.is_empty() {
                Ok(None)
            } else {
                sink.append_ops(&batch).map(Some)
            };
            let synced = if sync && appended.is_ok() {
                sink.flush()
            } else {
                Ok(())
            };
            (appended, synced)
        })
        .await
        .map_err(|e| PersistError::Message(format!("journal writer task failed: {e}")))?;

        match appended {
            Ok(Some(seq)) => {
                self.unwritten.clear();
                self.durable = self.durable.max(seq);
                let _ = self.durable_tx.send(self.durable);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(
                    unwritten = self.unwritten.len(),
                    first_seq = ?self.unwritten.first().map(|op| op.seq),
                    error = %err,
                    "journal append failed, keeping ops for retry"
                );
                return Err(err);
            }
        }
        synced?;
        Ok(self.durable)
    }

    /// Writes `stored` for a caller waiting on the result. On failure the op
    /// is dropped, since that caller rolls the change back.
    async fn write_acked(&mut self, stored: StoredOp) -> Result<OpSeq, PersistError> {
        let seq = stored.seq;
        self.unwritten.push(stored);
        let res = self.write(false).await;
        if res.is_err() {
            self.unwritten.retain(|op| op.seq != seq);
        }
        res
    }

    async fn checkpoint(
        &mut self,
        snapshot: StoreSnapshotV1,
        last_seq: OpSeq,
        compact: bool,
    ) -> Result<(), PersistError> {
        // The snapshot may only land once every op before it is journaled.
        self.write(true).await?;

        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || {
            let mut sink = sink.blocking_lock();
            sink.write_snapshot(&snapshot, last_seq)?;
            if compact {
                let removed = sink.compact_through(last_seq)?;
                debug!(last_seq, removed, "compacted journal");
            }
            Ok::<(), PersistError>(())
        })
        .await
        .map_err(|e| PersistError::Message(format!("journal writer task failed: {e}")))?
    }
}

fn spawn_journal_writer(
    sink: Box<dyn OpSink>,
    mut rx: mpsc::Receiver<PersistMsg>,
    durable_tx: mpsc::UnboundedSender<OpSeq>,
    config: RuntimeConfig,
) {
    tokio::spawn(async move {
        let mut writer = JournalWriter::new(sink, durable_tx);
        let latency = Duration::from_millis(config.batch_max_latency_ms);
        let mut deadline = Instant::now() + latency;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        if writer.write(true).await.is_err() {
                            error!(unwritten = writer.unwritten.len(), "journal closed with unwritten ops");
                        }
                        break;
                    };

                    match msg {
                        PersistMsg::Op { stored, ack: Some(ack) } => {
                            let _ = ack.send(writer.write_acked(stored).await);
                        }
                        PersistMsg::Op { stored, ack: None } => {
                            writer.unwritten.push(stored);
                            if writer.unwritten.len() < config.batch_max_ops {
                                continue;
                            }
                            // Failure is logged and the batch retried on the next write.
                            let _ = writer.write(true).await;
                        }
                        PersistMsg::Flush { resp } => {
                            let _ = resp.send(writer.write(true).await);
                        }
                        PersistMsg::Checkpoint { snapshot, last_seq, compact, resp } => {
                            let _ = resp.send(writer.checkpoint(snapshot, last_seq, compact).await);
                        }
                        PersistMsg::Shutdown { resp } => {
                            let res = writer.write(true).await.map(|_| ());
                            if res.is_err() {
                                error!(unwritten = writer.unwritten.len(), "journal closed with unwritten ops");
                            }
                            let _ = resp.send(res);
                            break;
                        }
                    }
                    deadline = Instant::now() + latency;
                }
                _ = tokio::time::sleep_until(deadline), if !writer.unwritten.is_empty() => {
                    let _ = writer.write(false).await;
                    deadline = Instant::now() + latency;
                }
            }
        }
    });
}

async fn request_checkpoint(
    store: &ContactStore,
    tx: &mpsc::Sender<PersistMsg>,
    config: &RuntimeConfig,
) -> Result<(), RuntimeError> {
    let snapshot = store.export_snapshot();
    let last_seq = store.latest_op_seq();
    let (cp_tx, cp_rx) = oneshot::channel();
    tx.send(PersistMsg::Checkpoint {
        snapshot,
        last_seq,
        compact: config.compact_after_snapshot,
        resp: cp_tx,
    })
    .await
    .map_err(|_| RuntimeError::ChannelClosed)?;
    cp_rx
        .await
        .map_err(|_| RuntimeError::ChannelClosed)?
        .map_err(RuntimeError::from)
}

async fn maybe_auto_checkpoint(
    store: &ContactStore,
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
    config: &RuntimeConfig,
    ops_since_snapshot: &mut usize,
) {
    if config.snapshot_every_ops == 0 || *ops_since_snapshot < config.snapshot_every_ops {
        return;
    }

    let Some(tx) = persist_tx else {
        return;
    };

    match request_checkpoint(store, tx, config).await {
        Ok(()) => {
            debug!(last_seq = store.latest_op_seq(), "automatic snapshot written");
            *ops_since_snapshot = 0;
        }
        Err(err) => warn!(error = %err, "automatic snapshot failed"),
    }
}

fn enqueue_persist(tx: &mpsc::Sender<PersistMsg>, stored: StoredOp) -> Result<(), RuntimeError> {
    tx.try_send(PersistMsg::Op { stored, ack: None })
        .map_err(|err| RuntimeError::Persist(PersistError::Message(format!("persist queue error: {err}"))))
}
