//! Cross-instance callbacks
//!
//! The only way to touch an instance from outside its worker. Any thread
//! holding a `CallbackSender` can enqueue a closure; the instance runs queued
//! closures in FIFO order at the start of its next tick, on its own thread.

use super::WorldInstance;
use crate::error::{RealmError, RealmResult};
use crossbeam_channel::{unbounded, Receiver, Sender};

pub type InstanceCallback = Box<dyn FnOnce(&mut WorldInstance) + Send + 'static>;

/// Receiving end, owned by the instance
pub struct CallbackQueue {
    sender: Sender<InstanceCallback>,
    receiver: Receiver<InstanceCallback>,
    instance_id: u32,
}

impl CallbackQueue {
    pub fn new(instance_id: u32) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            instance_id,
        }
    }

    pub fn sender(&self) -> CallbackSender {
        CallbackSender {
            sender: self.sender.clone(),
            instance_id: self.instance_id,
        }
    }

    /// Take the callbacks queued so far. Callbacks enqueued while these run
    /// wait for the next drain.
    pub fn drain(&self) -> Vec<InstanceCallback> {
        let queued = self.receiver.len();
        self.receiver.try_iter().take(queued).collect()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Cloneable handle for posting work to one instance
#[derive(Clone)]
pub struct CallbackSender {
    sender: Sender<InstanceCallback>,
    instance_id: u32,
}

impl CallbackSender {
    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    pub fn send<F>(&self, callback: F) -> RealmResult<()>
    where
        F: FnOnce(&mut WorldInstance) + Send + 'static,
    {
        self.sender
            .send(Box::new(callback))
            .map_err(|_| RealmError::ChannelClosed {
                name: format!("instance {} callbacks", self.instance_id),
            })
    }
}

impl std::fmt::Debug for CallbackSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSender")
            .field("instance_id", &self.instance_id)
            .finish()
    }
}
