//! Process-wide application state
//!
//! Everything the tasks share lives in one [`AppState`], placed in a
//! `StaticCell` by the firmware and borrowed as `&'static` from there.

use embassy_sync::channel::Channel;

use crate::config::HTTP_WORKER_COUNT;
use crate::push::{ClientSlot, PushDispatcher, PushQueue};
use crate::session::{SessionPool, VisitorCounter};
use crate::weather::WeatherState;

pub struct AppState {
    pub weather: WeatherState,
    pub clients: ClientSlot,
    pub sessions: SessionPool,
    pub visitors: VisitorCounter,
    push_queues: [PushQueue; HTTP_WORKER_COUNT],
}

impl AppState {
    pub const fn new() -> Self {
        Self {
            weather: WeatherState::new(),
            clients: ClientSlot::new(),
            sessions: SessionPool::new(),
            visitors: VisitorCounter::new(),
            push_queues: [const { Channel::new() }; HTTP_WORKER_COUNT],
        }
    }

    pub fn push(&self) -> PushDispatcher<'_> {
        PushDispatcher::new(&self.clients, &self.push_queues)
    }

    /// Work queue drained by HTTP worker `worker`.
    pub fn push_queue(&self, worker: u8) -> Option<&PushQueue> {
        self.push_queues.get(usize::from(worker))
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
