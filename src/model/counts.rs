use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Derived per-user badge counts. Never authoritative: always recomputable
/// from the message and invitation tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PendingCounts {
    #[schema(example = 3)]
    pub unread: u64,
    #[schema(example = 1)]
    pub invitations: u64,
}
