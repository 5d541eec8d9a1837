use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::debug;

use crate::model::counts::PendingCounts;
use crate::store::{CounterSource, StoreError};

use super::events::ChangeEvent;

/// Per-user unread / invitation badge counts.
///
/// A read-through cache over [`CounterSource`]: a miss, an expiry or an
/// invalidation falls back to a full recount, so a missed event heals on the
/// next read. Incremental updates only ever adjust entries already cached.
pub struct NotificationCounter {
    cache: Cache<u64, PendingCounts>,
    source: Arc<dyn CounterSource>,
}

impl NotificationCounter {
    pub fn new(source: Arc<dyn CounterSource>, ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(ttl)
                .build(),
            source,
        }
    }

    /// Cached counts, recomputed from the source on a miss.
    pub async fn counts(&self, user_id: u64) -> Result<PendingCounts, Arc<StoreError>> {
        self.cache
            .try_get_with(user_id, self.load(user_id))
            .await
    }

    /// Full recount from the source, replacing whatever was cached.
    pub async fn recount(&self, user_id: u64) -> Result<PendingCounts, StoreError> {
        let counts = self.load(user_id).await?;
        self.cache.insert(user_id, counts).await;
        Ok(counts)
    }

    pub async fn invalidate(&self, user_id: u64) {
        self.cache.invalidate(&user_id).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Marks a conversation read at the source and drops the cached counts.
    pub async fn mark_read(&self, user_id: u64, other_user_id: u64) -> Result<u64, StoreError> {
        let marked = self.source.mark_messages_read(user_id, other_user_id).await?;
        self.invalidate(user_id).await;
        Ok(marked)
    }

    /// Applies an event to the cache. Returns the users whose counts may have
    /// changed.
    pub async fn observe(&self, event: &ChangeEvent) -> Vec<u64> {
        match event {
            ChangeEvent::Attendance { .. } => Vec::new(),
            ChangeEvent::MessageReceived { user_id } => {
                if let Some(mut counts) = self.cache.get(user_id).await {
                    counts.unread += 1;
                    self.cache.insert(*user_id, counts).await;
                }
                vec![*user_id]
            }
            ChangeEvent::MessagesRead { user_id } | ChangeEvent::InvitationsChanged { user_id } => {
                self.invalidate(*user_id).await;
                vec![*user_id]
            }
        }
    }

    async fn load(&self, user_id: u64) -> Result<PendingCounts, StoreError> {
        let unread = self.source.unread_messages(user_id).await?;
        let invitations = self.source.pending_invitations(user_id).await?;
        debug!(user_id, unread, invitations, "Recounted pending counts");
        Ok(PendingCounts { unread, invitations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn counter() -> (Arc<MemoryStore>, NotificationCounter) {
        let store = Arc::new(MemoryStore::new());
        let counter = NotificationCounter::new(store.clone(), Duration::from_secs(300));
        (store, counter)
    }

    #[tokio::test]
    async fn miss_loads_from_source() {
        let (store, counter) = counter();
        store.push_message(2, 1);
        store.set_pending_invitations(1, 3);
        assert_eq!(
            counter.counts(1).await.unwrap(),
            PendingCounts {
                unread: 1,
                invitations: 3
            }
        );
    }

    #[tokio::test]
    async fn cached_value_can_be_stale_until_recount() {
        let (store, counter) = counter();
        assert_eq!(counter.counts(1).await.unwrap().unread, 0);

        store.push_message(2, 1);
        assert_eq!(counter.counts(1).await.unwrap().unread, 0);
        assert_eq!(counter.recount(1).await.unwrap().unread, 1);
        assert_eq!(counter.counts(1).await.unwrap().unread, 1);
    }

    #[tokio::test]
    async fn message_received_bumps_cached_entry_only() {
        let (store, counter) = counter();
        counter.counts(1).await.unwrap();

        store.push_message(2, 1);
        assert_eq!(counter.observe(&ChangeEvent::MessageReceived { user_id: 1 }).await, vec![1]);
        assert_eq!(counter.counts(1).await.unwrap().unread, 1);

        // not cached: nothing to bump, next read goes to the source
        store.push_message(2, 5);
        counter.observe(&ChangeEvent::MessageReceived { user_id: 5 }).await;
        assert_eq!(counter.counts(5).await.unwrap().unread, 1);
    }

    #[tokio::test]
    async fn mark_read_heals_the_cache() {
        let (store, counter) = counter();
        store.push_message(2, 1);
        store.push_message(3, 1);
        assert_eq!(counter.counts(1).await.unwrap().unread, 2);

        assert_eq!(counter.mark_read(1, 2).await.unwrap(), 1);
        assert_eq!(counter.counts(1).await.unwrap().unread, 1);
    }

    #[tokio::test]
    async fn attendance_events_leave_counts_alone() {
        let (_store, counter) = counter();
        let event = ChangeEvent::Attendance {
            record: crate::model::hours_card::fixtures::open_card(),
            recipients: vec![1, 2],
        };
        assert!(counter.observe(&event).await.is_empty());
    }
}
