use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::model::counts::PendingCounts;
use crate::model::hours_card::HoursCard;

/// "What changed", as seen by everything downstream of a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// An hours card moved. `recipients` are the worker and the employer's
    /// approvers.
    Attendance {
        record: HoursCard,
        recipients: Vec<u64>,
    },
    /// Published by the messaging service when `user_id` gets a message.
    MessageReceived {
        user_id: u64,
    },
    /// Published when `user_id` reads messages, here or in the messaging
    /// service.
    MessagesRead {
        user_id: u64,
    },
    /// Published by the invitation service when `user_id` gains or answers
    /// a staff invitation.
    InvitationsChanged {
        user_id: u64,
    },
}

/// Server → client push frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    AttendanceChanged { record: HoursCard },
    Counts { unread: u64, invitations: u64 },
}

impl From<PendingCounts> for PushMessage {
    fn from(c: PendingCounts) -> Self {
        PushMessage::Counts {
            unread: c.unread,
            invitations: c.invitations,
        }
    }
}

/// Client → server frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    MarkRead { other_user_id: u64 },
    RefreshCounts,
}

/// In-process change feed. Publishing never waits on subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: ChangeEvent) {
        if self.tx.send(event).is_err() {
            debug!("Change event dropped, no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}
