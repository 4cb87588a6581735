//! Push dispatcher
//!
//! Polling tasks never touch a socket. They call [`PushDispatcher::publish`],
//! which drops a [`PushWork`] item into the queue of the HTTP worker that owns
//! the tracked websocket. That worker formats a fresh snapshot and sends it.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, info};
use thiserror_no_std::Error;

use crate::config::PUSH_QUEUE_DEPTH;

/// Identifies one websocket connection: the worker serving it and that
/// worker's connection counter at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientId {
    pub worker: u8,
    pub generation: u32,
}

/// The single tracked push client. A newer connection replaces the old one.
pub struct ClientSlot {
    inner: Mutex<CriticalSectionRawMutex, Cell<Option<ClientId>>>,
}

impl ClientSlot {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Cell::new(None)),
        }
    }

    pub fn track(&self, client: ClientId) {
        let previous = self.inner.lock(|cell| cell.replace(Some(client)));
        match previous {
            Some(old) if old != client => {
                info!("push client {:?} replaces {:?}", client, old)
            }
            _ => info!("push client {:?} tracked", client),
        }
    }

    pub fn current(&self) -> Option<ClientId> {
        self.inner.lock(|cell| cell.get())
    }
}

impl Default for ClientSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// One unit of push work for the worker that owns `client`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushWork {
    pub client: ClientId,
}

pub type PushQueue = Channel<CriticalSectionRawMutex, PushWork, PUSH_QUEUE_DEPTH>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    NoClient,
    Queued(ClientId),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    #[error("push queue of worker {worker} is full")]
    QueueFull { worker: u8 },
    #[error("client {generation} on worker {worker} is gone")]
    ClientGone { worker: u8, generation: u32 },
    #[error("failed to send push frame")]
    SendFailed,
}

/// Borrowed view over the client slot and the worker queues.
#[derive(Clone, Copy)]
pub struct PushDispatcher<'a> {
    clients: &'a ClientSlot,
    queues: &'a [PushQueue],
}

impl<'a> PushDispatcher<'a> {
    pub fn new(clients: &'a ClientSlot, queues: &'a [PushQueue]) -> Self {
        Self { clients, queues }
    }

    /// Queue a push of the current weather to the tracked client, if any.
    pub fn publish(&self) -> Result<Publish, PushError> {
        let Some(client) = self.clients.current() else {
            return Ok(Publish::NoClient);
        };
        let queue = self
            .queues
            .get(usize::from(client.worker))
            .ok_or(PushError::ClientGone {
                worker: client.worker,
                generation: client.generation,
            })?;
        queue
            .try_send(PushWork { client })
            .map_err(|_| PushError::QueueFull {
                worker: client.worker,
            })?;
        debug!("push queued for {:?}", client);
        Ok(Publish::Queued(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queues() -> [PushQueue; 2] {
        [const { Channel::new() }; 2]
    }

    #[test]
    fn test_publish_without_client() {
        let slot = ClientSlot::new();
        let queues = queues();
        let push = PushDispatcher::new(&slot, &queues);
        assert_eq!(push.publish(), Ok(Publish::NoClient));
        assert!(queues[0].try_receive().is_err());
        assert!(queues[1].try_receive().is_err());
    }

    #[test]
    fn test_publish_targets_owning_worker() {
        let slot = ClientSlot::new();
        let queues = queues();
        let push = PushDispatcher::new(&slot, &queues);
        let client = ClientId {
            worker: 1,
            generation: 4,
        };
        slot.track(client);

        assert_eq!(push.publish(), Ok(Publish::Queued(client)));
        assert!(queues[0].try_receive().is_err());
        assert_eq!(queues[1].try_receive(), Ok(PushWork { client }));
    }

    #[test]
    fn test_newer_client_replaces_older() {
        let slot = ClientSlot::new();
        let first = ClientId {
            worker: 0,
            generation: 1,
        };
        let second = ClientId {
            worker: 1,
            generation: 1,
        };
        slot.track(first);
        slot.track(second);
        assert_eq!(slot.current(), Some(second));
    }

    #[test]
    fn test_full_queue_is_reported() {
        let slot = ClientSlot::new();
        let queues = queues();
        let push = PushDispatcher::new(&slot, &queues);
        slot.track(ClientId {
            worker: 0,
            generation: 9,
        });

        for _ in 0..PUSH_QUEUE_DEPTH {
            assert!(push.publish().is_ok());
        }
        assert_eq!(push.publish(), Err(PushError::QueueFull { worker: 0 }));
        // The slot is untouched by a failed publish
        assert!(slot.current().is_some());
    }
}
