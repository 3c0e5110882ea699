use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::store::MazeStore;
use crate::types::{MazeStatePatch, PersistedMazeState, Vec2};

#[derive(Debug)]
enum SyncCommand {
    SaveFull(PersistedMazeState),
    PositionMoved,
    Flush(oneshot::Sender<()>),
}

/// Position state shared between the handle and the writer task.
#[derive(Debug, Default)]
struct PendingSaves {
    /// Latest position not yet written.
    position: Option<Vec2>,
    /// Position written while the handle was dropped; structural saves still
    /// queued at that point are rewritten to carry it.
    final_position: Option<Vec2>,
}

fn lock_pending(pending: &Mutex<PendingSaves>) -> MutexGuard<'_, PendingSaves> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counters reported by the writer task when it stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub full_saves: u32,
    pub position_saves: u32,
    pub failures: u32,
}

/// Pushes maze changes to a [`MazeStore`] from a background task.
///
/// Structural changes are written at once. Position changes are coalesced
/// and written after a quiet window without further moves. Failed writes are
/// logged and not retried.
///
/// Teardown is [`shutdown`](Self::shutdown), which flushes the pending
/// position and waits for the writer. Dropping the handle instead writes the
/// pending position from `Drop` when the store completes without suspending,
/// so nothing is left for the background task to fire later.
pub struct PersistenceSynchronizer {
    tx: Option<mpsc::UnboundedSender<SyncCommand>>,
    worker: Option<JoinHandle<SyncStats>>,
    writer: Option<Arc<Writer>>,
    pending: Arc<Mutex<PendingSaves>>,
}

impl PersistenceSynchronizer {
    pub fn spawn(
        store: Arc<dyn MazeStore>,
        user_id: String,
        credential: String,
        quiet_window: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = Arc::new(Writer {
            store,
            user_id,
            credential,
        });
        let pending = Arc::new(Mutex::new(PendingSaves::default()));
        let worker = tokio::spawn(run_writer(
            writer.clone(),
            pending.clone(),
            quiet_window,
            rx,
        ));
        Self {
            tx: Some(tx),
            worker: Some(worker),
            writer: Some(writer),
            pending,
        }
    }

    /// Synchronizer that drops every change, for sessions running without a
    /// reachable backend.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            worker: None,
            writer: None,
            pending: Arc::new(Mutex::new(PendingSaves::default())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn save_full(&self, state: PersistedMazeState) {
        if !self.is_enabled() {
            return;
        }
        // The snapshot already carries the latest position.
        lock_pending(&self.pending).position = None;
        self.send(SyncCommand::SaveFull(state));
    }

    pub fn position_moved(&self, position: Vec2) {
        if !self.is_enabled() {
            return;
        }
        lock_pending(&self.pending).position = Some(position);
        self.send(SyncCommand::PositionMoved);
    }

    /// Writes any pending position now and waits for it to land.
    pub async fn flush(&self) {
        let Some(tx) = &self.tx else {
            return;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(SyncCommand::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    pub async fn shutdown(mut self) -> SyncStats {
        self.tx.take();
        match self.worker.take() {
            Some(worker) => worker.await.unwrap_or_else(|error| {
                tracing::warn!(%error, "persistence writer task failed");
                SyncStats::default()
            }),
            None => SyncStats::default(),
        }
    }

    fn send(&self, command: SyncCommand) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(command).is_err() {
            tracing::warn!("persistence writer is gone; change not saved");
        }
    }

    fn flush_on_drop(&self, writer: &Writer) {
        let position = {
            let mut pending = lock_pending(&self.pending);
            let position = pending.position.take();
            pending.final_position = position;
            position
        };
        let Some(position) = position else {
            return;
        };

        let patch = MazeStatePatch::PositionOnly {
            player_position: position,
        };
        match writer
            .store
            .save(&writer.user_id, &writer.credential, patch)
            .now_or_never()
        {
            Some(Ok(())) => {
                tracing::debug!(user_id = %writer.user_id, ?position, "pending position flushed on drop");
            }
            Some(Err(error)) => {
                tracing::warn!(user_id = %writer.user_id, %error, "maze save failed");
            }
            None => {
                tracing::warn!(
                    user_id = %writer.user_id,
                    "synchronizer dropped without shutdown; pending position left to the writer task"
                );
                let mut pending = lock_pending(&self.pending);
                pending.position = Some(position);
                pending.final_position = None;
            }
        }
    }
}

impl Drop for PersistenceSynchronizer {
    fn drop(&mut self) {
        // `shutdown` already closed the channel and flushed.
        let Some(tx) = self.tx.take() else {
            return;
        };
        if let Some(writer) = self.writer.take() {
            self.flush_on_drop(&writer);
        }
        drop(tx);
    }
}

async fn run_writer(
    writer: Arc<Writer>,
    pending: Arc<Mutex<PendingSaves>>,
    quiet_window: Duration,
    mut rx: mpsc::UnboundedReceiver<SyncCommand>,
) -> SyncStats {
    let mut stats = SyncStats::default();
    let mut armed = false;
    let deadline = tokio::time::sleep(quiet_window);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(SyncCommand::SaveFull(mut state)) => {
                    armed = false;
                    let final_position = lock_pending(&pending).final_position;
                    if let Some(position) = final_position {
                        state.player_position = position;
                    }
                    writer.write(MazeStatePatch::Full(state), &mut stats).await;
                }
                Some(SyncCommand::PositionMoved) => {
                    armed = true;
                    deadline.as_mut().reset(Instant::now() + quiet_window);
                }
                Some(SyncCommand::Flush(ack)) => {
                    armed = false;
                    writer.write_pending(&pending, &mut stats).await;
                    let _ = ack.send(());
                }
                None => {
                    writer.write_pending(&pending, &mut stats).await;
                    break;
                }
            },
            () = &mut deadline, if armed => {
                armed = false;
                writer.write_pending(&pending, &mut stats).await;
            }
        }
    }

    tracing::debug!(
        user_id = %writer.user_id,
        full_saves = stats.full_saves,
        position_saves = stats.position_saves,
        failures = stats.failures,
        "persistence writer stopped"
    );
    stats
}

struct Writer {
    store: Arc<dyn MazeStore>,
    user_id: String,
    credential: String,
}

impl Writer {
    async fn write_pending(&self, pending: &Mutex<PendingSaves>, stats: &mut SyncStats) {
        let position = lock_pending(pending).position.take();
        if let Some(position) = position {
            let patch = MazeStatePatch::PositionOnly {
                player_position: position,
            };
            self.write(patch, stats).await;
        }
    }

    async fn write(&self, patch: MazeStatePatch, stats: &mut SyncStats) {
        let full = patch.is_full();
        match self.store.save(&self.user_id, &self.credential, patch).await {
            Ok(()) if full => stats.full_saves += 1,
            Ok(()) => stats.position_saves += 1,
            Err(error) => {
                stats.failures += 1;
                tracing::warn!(user_id = %self.user_id, full, %error, "maze save failed");
            }
        }
    }
}
