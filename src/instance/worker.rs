//! One thread per world instance
//!
//! The worker owns its instance outright; other threads reach it only
//! through the callback sender. The loop ticks at a fixed interval until it
//! is stopped or the teardown policy says the empty instance may unload,
//! then shuts the instance down so persistence is flushed before the thread
//! exits.

use super::callbacks::CallbackSender;
use super::world_instance::WorldInstance;
use crate::error::{RealmError, RealmResult};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

pub struct InstanceWorker {
    instance_id: u32,
    callbacks: CallbackSender,
    stop_signal: Sender<()>,
    worker_thread: Option<thread::JoinHandle<RealmResult<()>>>,
}

impl InstanceWorker {
    pub fn spawn(instance: WorldInstance, tick_interval: Duration) -> RealmResult<Self> {
        let instance_id = instance.instance_id();
        let callbacks = instance.callback_sender();
        let (stop_tx, stop_rx) = bounded(1);

        let worker_thread = thread::Builder::new()
            .name(format!("realm-{}", instance_id))
            .spawn(move || Self::run(instance, tick_interval, stop_rx))
            .map_err(|e| RealmError::WorkerSpawnFailed {
                instance_id,
                error: e.to_string(),
            })?;

        log::info!(
            "[InstanceWorker] Instance {} running every {:?}",
            instance_id,
            tick_interval
        );

        Ok(Self {
            instance_id,
            callbacks,
            stop_signal: stop_tx,
            worker_thread: Some(worker_thread),
        })
    }

    fn run(
        mut instance: WorldInstance,
        tick_interval: Duration,
        stop: Receiver<()>,
    ) -> RealmResult<()> {
        let mut last_tick = Instant::now();
        loop {
            match stop.recv_timeout(tick_interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }

            let now = Instant::now();
            let diff_ms = now.duration_since(last_tick).as_millis().min(u32::MAX as u128) as u32;
            last_tick = now;

            instance.update(diff_ms);
            if instance.can_unload(diff_ms) {
                log::info!(
                    "[InstanceWorker] Instance {} empty long enough, unloading",
                    instance.instance_id()
                );
                break;
            }
        }
        instance.shutdown()
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    /// Sender for posting work onto the worker's thread
    pub fn callbacks(&self) -> CallbackSender {
        self.callbacks.clone()
    }

    /// True once the loop has exited on its own or after `stop`
    pub fn is_finished(&self) -> bool {
        self.worker_thread
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Stop the loop and wait until the instance has shut down
    pub fn stop(&mut self) -> RealmResult<()> {
        let Some(handle) = self.worker_thread.take() else {
            return Ok(());
        };
        // The loop may already have exited and dropped its receiver
        let _ = self.stop_signal.try_send(());

        match handle.join() {
            Ok(result) => {
                log::info!("[InstanceWorker] Instance {} stopped", self.instance_id);
                result
            }
            Err(_) => {
                log::error!("[InstanceWorker] Instance {} worker panicked", self.instance_id);
                Err(RealmError::WorkerPanicked {
                    instance_id: self.instance_id,
                })
            }
        }
    }
}

impl Drop for InstanceWorker {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("[InstanceWorker] Instance {} stop failed: {}", self.instance_id, e);
        }
    }
}
