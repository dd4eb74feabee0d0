//! Debounced, crash-safe persistence of registry records.
//!
//! One background task owns the authoritative record map and its dirty
//! flag. Callers talk to it over a channel; mutations never touch the disk.
//! The task flushes on a fixed interval when dirty, and once more on close.

use crate::tool_registry::{
    domain::RegistryRecord,
    ports::{PersistenceError, RegistrySnapshotStore, RegistryStoreResult},
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Default period between flush attempts.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

const COMMAND_BUFFER: usize = 256;

enum Command {
    Upsert(RegistryRecord),
    Remove {
        name: String,
        reply: oneshot::Sender<bool>,
    },
    ReadAll {
        reply: oneshot::Sender<Vec<RegistryRecord>>,
    },
    IsDirty {
        reply: oneshot::Sender<bool>,
    },
    Flush {
        reply: oneshot::Sender<RegistryStoreResult<bool>>,
    },
    Close {
        reply: oneshot::Sender<RegistryStoreResult<bool>>,
    },
}

/// Handle to the persistence task.
pub struct RegistryPersistence {
    commands: mpsc::Sender<Command>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct PersistenceState<S> {
    store: Arc<S>,
    records: BTreeMap<String, RegistryRecord>,
    dirty: bool,
}

impl<S> PersistenceState<S>
where
    S: RegistrySnapshotStore,
{
    fn upsert(&mut self, record: RegistryRecord) {
        if self.records.get(&record.name) == Some(&record) {
            return;
        }
        self.records.insert(record.name.clone(), record);
        self.dirty = true;
    }

    fn remove(&mut self, name: &str) -> bool {
        let removed = self.records.remove(name).is_some();
        self.dirty |= removed;
        removed
    }

    async fn flush_if_dirty(&mut self) -> RegistryStoreResult<bool> {
        if !self.dirty {
            return Ok(false);
        }
        let snapshot: Vec<RegistryRecord> = self.records.values().cloned().collect();
        let count = snapshot.len();
        self.store.commit(snapshot).await?;
        self.dirty = false;
        debug!(records = count, "flushed registry snapshot");
        Ok(true)
    }

    async fn flush_logged(&mut self) {
        if let Err(err) = self.flush_if_dirty().await {
            warn!(error = %err, "registry flush failed, will retry");
        }
    }
}

async fn run<S>(
    mut state: PersistenceState<S>,
    mut commands: mpsc::Receiver<Command>,
    flush_interval: Duration,
) where
    S: RegistrySnapshotStore,
{
    let first_flush = Instant::now()
        .checked_add(flush_interval)
        .unwrap_or_else(Instant::now);
    let mut ticker = tokio::time::interval_at(first_flush, flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Upsert(record)) => state.upsert(record),
                Some(Command::Remove { name, reply }) => {
                    let _sent = reply.send(state.remove(&name));
                }
                Some(Command::ReadAll { reply }) => {
                    let _sent = reply.send(state.records.values().cloned().collect());
                }
                Some(Command::IsDirty { reply }) => {
                    let _sent = reply.send(state.dirty);
                }
                Some(Command::Flush { reply }) => {
                    let _sent = reply.send(state.flush_if_dirty().await);
                }
                Some(Command::Close { reply }) => {
                    let _sent = reply.send(state.flush_if_dirty().await);
                    break;
                }
                None => {
                    state.flush_logged().await;
                    break;
                }
            },
            _ = ticker.tick() => state.flush_logged().await,
        }
    }
}

impl RegistryPersistence {
    /// Loads the stored snapshot and starts the flush task.
    ///
    /// A corrupt snapshot is logged and replaced by an empty map; it is only
    /// overwritten once a mutation makes the map dirty.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the snapshot cannot be read for any
    /// reason other than corruption.
    pub async fn open<S>(store: Arc<S>, flush_interval: Duration) -> RegistryStoreResult<Self>
    where
        S: RegistrySnapshotStore + 'static,
    {
        let loaded = match store.load().await {
            Ok(records) => records,
            Err(PersistenceError::Corrupt(reason)) => {
                error!(%reason, "registry snapshot is corrupt, starting empty");
                Vec::new()
            }
            Err(err) => return Err(err),
        };
        info!(records = loaded.len(), "loaded registry snapshot");

        let state = PersistenceState {
            store,
            records: loaded
                .into_iter()
                .map(|record| (record.name.clone(), record))
                .collect(),
            dirty: false,
        };
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(run(state, receiver, flush_interval));

        Ok(Self {
            commands: sender,
            task: Mutex::new(Some(task)),
        })
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> RegistryStoreResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| PersistenceError::Closed)?;
        response.await.map_err(|_| PersistenceError::Closed)
    }

    /// Inserts or replaces a record. Identical records leave the map clean.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Closed`] after [`RegistryPersistence::close`].
    pub async fn upsert(&self, record: RegistryRecord) -> RegistryStoreResult<()> {
        self.commands
            .send(Command::Upsert(record))
            .await
            .map_err(|_| PersistenceError::Closed)
    }

    /// Removes a record and returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Closed`] after [`RegistryPersistence::close`].
    pub async fn remove(&self, name: &str) -> RegistryStoreResult<bool> {
        let owned_name = name.to_owned();
        self.request(|reply| Command::Remove {
            name: owned_name,
            reply,
        })
        .await
    }

    /// Returns every record ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Closed`] after [`RegistryPersistence::close`].
    pub async fn read_all(&self) -> RegistryStoreResult<Vec<RegistryRecord>> {
        self.request(|reply| Command::ReadAll { reply }).await
    }

    /// Returns whether mutations are waiting to be flushed.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Closed`] after [`RegistryPersistence::close`].
    pub async fn is_dirty(&self) -> RegistryStoreResult<bool> {
        self.request(|reply| Command::IsDirty { reply }).await
    }

    /// Commits the map if dirty and returns whether a commit happened.
    ///
    /// The dirty flag is cleared only after the commit succeeds.
    ///
    /// # Errors
    ///
    /// Returns the store's [`PersistenceError`] when the commit fails.
    pub async fn flush_if_dirty(&self) -> RegistryStoreResult<bool> {
        self.request(|reply| Command::Flush { reply }).await?
    }

    /// Performs a final flush and stops the task.
    ///
    /// Calling `close` again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the final flush's [`PersistenceError`], or
    /// [`PersistenceError::Task`] if the task panicked.
    pub async fn close(&self) -> RegistryStoreResult<()> {
        let Some(task) = self.task.lock().await.take() else {
            return Ok(());
        };
        let flushed = self.request(|reply| Command::Close { reply }).await;
        task.await
            .map_err(|err| PersistenceError::Task(err.to_string()))?;
        match flushed {
            Ok(result) => result.map(|_| ()),
            Err(PersistenceError::Closed) => Ok(()),
            Err(err) => Err(err),
        }
    }
}
