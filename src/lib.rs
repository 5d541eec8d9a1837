//! Worker attendance: geofenced clock-in, daily hours cards with
//! sign-off and employer approval, and live push of every change.

use std::sync::Arc;

pub mod api;
pub mod attendance;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod docs;
pub mod model;
pub mod models;
pub mod realtime;
pub mod routes;
pub mod store;
pub mod utils;

use attendance::{ApprovalWorkflow, AttendanceStore, Rules, StoreSettings};
use config::Config;
use realtime::{EventBus, NotificationCounter, Realtime};
use store::{AttendanceRepository, CounterSource};
use utils::clock::Clock;

/// The long-lived services shared by every HTTP worker.
#[derive(Clone)]
pub struct Services {
    pub workflow: ApprovalWorkflow,
    pub realtime: Realtime,
}

impl Services {
    pub fn new(
        repo: Arc<dyn AttendanceRepository>,
        counts: Arc<dyn CounterSource>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let bus = EventBus::new(config.event_bus_capacity);
        let settings = StoreSettings {
            request_timeout: config.request_timeout,
            rules: Rules {
                long_shift_hours: config.long_shift_hours,
            },
        };
        let store = Arc::new(AttendanceStore::new(repo, bus.clone(), clock, settings));
        let counter = Arc::new(NotificationCounter::new(counts, config.counts_ttl));

        Self {
            workflow: ApprovalWorkflow::new(store),
            realtime: Realtime::new(counter, bus),
        }
    }
}
