//! Background writer wrapping another respawn store
//!
//! Saves, deletes and full clears are handed to a writer thread over a
//! channel so the tick never waits on storage. A write that fails on the
//! writer thread is sent back and surfaces through `take_failed_writes`,
//! where the scheduler picks it up for retry. Loads and flushes are
//! synchronous.

use super::{PersistOp, PersistenceError, PersistenceResult, RespawnStore};
use crate::entity::SpawnCategory;
use crate::respawn::RespawnRecord;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;

enum WriterCommand {
    Write { instance_id: u32, op: PersistOp },
    Flush(Sender<PersistenceResult<()>>),
    Shutdown,
}

pub struct AsyncRespawnStore<S: RespawnStore + 'static> {
    inner: Arc<Mutex<S>>,
    commands: Sender<WriterCommand>,
    failures: Receiver<PersistOp>,
    worker_thread: Option<thread::JoinHandle<()>>,
}

impl<S: RespawnStore + 'static> AsyncRespawnStore<S> {
    /// Start the writer thread in front of `inner`
    pub fn spawn(inner: S) -> PersistenceResult<Self> {
        let inner = Arc::new(Mutex::new(inner));
        let (command_tx, command_rx) = unbounded();
        let (failure_tx, failure_rx) = unbounded();

        let worker_inner = Arc::clone(&inner);
        let worker_thread = thread::Builder::new()
            .name("respawn-writer".to_string())
            .spawn(move || Self::writer_loop(worker_inner, command_rx, failure_tx))?;

        Ok(Self {
            inner,
            commands: command_tx,
            failures: failure_rx,
            worker_thread: Some(worker_thread),
        })
    }

    fn writer_loop(
        inner: Arc<Mutex<S>>,
        commands: Receiver<WriterCommand>,
        failures: Sender<PersistOp>,
    ) {
        for command in commands.iter() {
            match command {
                WriterCommand::Write { instance_id, op } => {
                    let result = op.apply(&mut *inner.lock(), instance_id);
                    if let Err(e) = result {
                        log::warn!(
                            "[AsyncRespawnStore] Instance {}: {} failed: {}",
                            instance_id,
                            op,
                            e
                        );
                        // Receiver only disappears with the store itself
                        let _ = failures.send(op);
                    }
                }
                WriterCommand::Flush(reply) => {
                    let result = inner.lock().flush();
                    let _ = reply.send(result);
                }
                WriterCommand::Shutdown => break,
            }
        }
        log::debug!("[AsyncRespawnStore] Writer thread exiting");
    }

    fn send(&self, command: WriterCommand) -> PersistenceResult<()> {
        self.commands
            .send(command)
            .map_err(|_| PersistenceError::WriterUnavailable("writer thread stopped".to_string()))
    }

    /// Access the wrapped store. Pending writes may not have landed yet;
    /// call `flush` first when that matters.
    pub fn inner(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.inner)
    }
}

impl<S: RespawnStore + 'static> RespawnStore for AsyncRespawnStore<S> {
    fn save_respawn(&mut self, instance_id: u32, record: &RespawnRecord) -> PersistenceResult<()> {
        self.send(WriterCommand::Write {
            instance_id,
            op: PersistOp::Save(record.clone()),
        })
    }

    fn delete_respawn(
        &mut self,
        instance_id: u32,
        category: SpawnCategory,
        spawn_id: u64,
    ) -> PersistenceResult<()> {
        self.send(WriterCommand::Write {
            instance_id,
            op: PersistOp::Delete { category, spawn_id },
        })
    }

    fn load_all_respawns(&mut self, instance_id: u32) -> PersistenceResult<Vec<RespawnRecord>> {
        self.flush()?;
        self.inner.lock().load_all_respawns(instance_id)
    }

    fn delete_all_respawns(&mut self, instance_id: u32) -> PersistenceResult<()> {
        self.send(WriterCommand::Write {
            instance_id,
            op: PersistOp::DeleteAll,
        })
    }

    fn flush(&mut self) -> PersistenceResult<()> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.send(WriterCommand::Flush(reply_tx))?;
        reply_rx
            .recv()
            .map_err(|_| PersistenceError::WriterUnavailable("writer dropped flush".to_string()))?
    }

    fn take_failed_writes(&mut self) -> Vec<PersistOp> {
        self.failures.try_iter().collect()
    }
}

impl<S: RespawnStore + 'static> Drop for AsyncRespawnStore<S> {
    fn drop(&mut self) {
        let _ = self.commands.send(WriterCommand::Shutdown);
        if let Some(handle) = self.worker_thread.take() {
            if handle.join().is_err() {
                log::error!("[AsyncRespawnStore] Writer thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryRespawnStore;

    fn record(spawn_id: u64) -> RespawnRecord {
        RespawnRecord {
            category: SpawnCategory::Creature,
            spawn_id,
            template_id: 1,
            due_time: 500,
            cell_id: 2,
        }
    }

    #[test]
    fn test_writes_land_after_flush() {
        let backing = MemoryRespawnStore::new();
        let mut store = AsyncRespawnStore::spawn(backing.clone()).expect("spawn writer");

        store.save_respawn(1, &record(1)).expect("queue save");
        store.save_respawn(1, &record(2)).expect("queue save");
        store.delete_respawn(1, SpawnCategory::Creature, 1).expect("queue delete");
        store.flush().expect("flush");

        assert_eq!(backing.row_count(1), 1);
        assert!(backing.row(1, SpawnCategory::Creature, 2).is_some());
    }

    #[test]
    fn test_failed_writes_are_reported() {
        let backing = MemoryRespawnStore::new();
        backing.fail_next_writes(1);
        let mut store = AsyncRespawnStore::spawn(backing.clone()).expect("spawn writer");

        // Accepted immediately, fails on the writer thread
        store.save_respawn(1, &record(7)).expect("queue save");
        store.flush().expect("flush");

        let failed = store.take_failed_writes();
        assert_eq!(failed, vec![PersistOp::Save(record(7))]);
        assert!(store.take_failed_writes().is_empty());
        assert_eq!(backing.row_count(1), 0);
    }

    #[test]
    fn test_failed_clear_is_reported() {
        let backing = MemoryRespawnStore::new();
        let mut store = AsyncRespawnStore::spawn(backing.clone()).expect("spawn writer");
        store.save_respawn(2, &record(1)).expect("queue save");
        store.flush().expect("flush");

        backing.fail_next_writes(1);
        store.delete_all_respawns(2).expect("queue delete all");
        store.flush().expect("flush");

        assert_eq!(store.take_failed_writes(), vec![PersistOp::DeleteAll]);
        assert_eq!(backing.row_count(2), 1);
    }

    #[test]
    fn test_load_sees_queued_writes() {
        let mut store = AsyncRespawnStore::spawn(MemoryRespawnStore::new()).expect("spawn writer");
        store.save_respawn(3, &record(1)).expect("queue save");
        assert_eq!(store.load_all_respawns(3).expect("load").len(), 1);

        store.delete_all_respawns(3).expect("queue delete all");
        assert!(store.load_all_respawns(3).expect("load").is_empty());
    }
}
