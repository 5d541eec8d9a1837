//! Live push of attendance changes and badge counts over WebSockets.

use std::sync::Arc;

pub mod counter;
pub mod dispatcher;
pub mod events;
pub mod hub;
pub mod socket;

pub use counter::NotificationCounter;
pub use events::{ChangeEvent, ClientMessage, EventBus, PushMessage};
pub use hub::RealtimeHub;

/// Everything a socket session or the dispatcher needs, shared as app data.
#[derive(Clone)]
pub struct Realtime {
    pub hub: Arc<RealtimeHub>,
    pub counter: Arc<NotificationCounter>,
    pub bus: EventBus,
}

impl Realtime {
    pub fn new(counter: Arc<NotificationCounter>, bus: EventBus) -> Self {
        Self {
            hub: Arc::new(RealtimeHub::new()),
            counter,
            bus,
        }
    }

    /// Starts the bus → counter → hub pipeline on the current runtime.
    pub fn spawn_dispatcher(&self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(dispatcher::dispatch_events(
            self.bus.subscribe(),
            self.counter.clone(),
            self.hub.clone(),
        ))
    }
}
