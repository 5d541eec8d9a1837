use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use super::counter::NotificationCounter;
use super::events::{ChangeEvent, PushMessage};
use super::hub::RealtimeHub;

/// Drains the change feed into the counter and out to connected clients.
///
/// Per event: counts are adjusted first, then the record change is pushed,
/// then fresh counts go to every affected user who is online. If the
/// subscription falls behind, every connection is dropped so clients resync.
/// Returns when the bus is closed.
pub async fn dispatch_events(
    mut rx: broadcast::Receiver<ChangeEvent>,
    counter: Arc<NotificationCounter>,
    hub: Arc<RealtimeHub>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => dispatch(&event, &counter, &hub).await,
            Err(RecvError::Lagged(skipped)) => {
                // pushes were lost: recount on next read and make every
                // client reconnect, which reconciles its state
                counter.invalidate_all();
                let dropped = hub.disconnect_all();
                warn!(skipped, dropped, "Event dispatcher lagged, forcing clients to resync");
            }
            Err(RecvError::Closed) => {
                info!("Event bus closed, dispatcher stopping");
                return;
            }
        }
    }
}

pub async fn dispatch(event: &ChangeEvent, counter: &NotificationCounter, hub: &RealtimeHub) {
    let affected = counter.observe(event).await;

    if let ChangeEvent::Attendance { record, recipients } = event {
        let message = PushMessage::AttendanceChanged {
            record: record.clone(),
        };
        hub.publish_to_many(recipients, &message);
    }

    for user_id in affected.into_iter().filter(|u| hub.is_online(*u)) {
        match counter.counts(user_id).await {
            Ok(counts) => {
                hub.publish(user_id, &PushMessage::from(counts));
            }
            Err(e) => warn!(user_id, "Could not load counts for push: {}", e),
        }
    }
}
