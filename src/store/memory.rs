use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::hours_card::{HoursCard, HoursCardStatus};
use crate::model::workplace::{StaffMember, Workplace};

use super::{AttendanceRepository, CardFilter, CounterSource, StoreError, WorkerSummary};

#[derive(Debug, Clone)]
struct Message {
    sender_id: u64,
    receiver_id: u64,
    is_read: bool,
}

#[derive(Debug, Default)]
struct Tables {
    workplaces: HashMap<u64, Workplace>,
    staff: HashMap<u64, StaffMember>,
    cards: BTreeMap<u64, HoursCard>,
    next_card_id: u64,
    messages: Vec<Message>,
    /// user id -> pending invitation count
    invitations: HashMap<u64, u64>,
}

/// Process-local store, used with `STORAGE=memory` and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put_workplace(&self, workplace: Workplace) {
        self.write().workplaces.insert(workplace.business_id, workplace);
    }

    pub fn put_staff(&self, staff: StaffMember) {
        self.write().staff.insert(staff.id, staff);
    }

    pub fn push_message(&self, sender_id: u64, receiver_id: u64) {
        self.write().messages.push(Message {
            sender_id,
            receiver_id,
            is_read: false,
        });
    }

    pub fn set_pending_invitations(&self, user_id: u64, count: u64) {
        self.write().invitations.insert(user_id, count);
    }
}

#[async_trait]
impl AttendanceRepository for MemoryStore {
    async fn staff_for_user(&self, user_id: u64) -> Result<Option<StaffMember>, StoreError> {
        Ok(self
            .read()
            .staff
            .values()
            .filter(|s| s.user_id == Some(user_id))
            .min_by_key(|s| (!s.is_active(), s.id))
            .cloned())
    }

    async fn staff(&self, staff_id: u64) -> Result<Option<StaffMember>, StoreError> {
        Ok(self.read().staff.get(&staff_id).cloned())
    }

    async fn workplace(&self, business_id: u64) -> Result<Option<Workplace>, StoreError> {
        Ok(self.read().workplaces.get(&business_id).cloned())
    }

    async fn card(&self, id: u64) -> Result<Option<HoursCard>, StoreError> {
        Ok(self.read().cards.get(&id).cloned())
    }

    async fn card_for_day(&self, staff_id: u64, date: NaiveDate) -> Result<Option<HoursCard>, StoreError> {
        Ok(self
            .read()
            .cards
            .values()
            .find(|c| c.staff_id == staff_id && c.date == date)
            .cloned())
    }

    async fn latest_open_card(&self, staff_id: u64) -> Result<Option<HoursCard>, StoreError> {
        Ok(self
            .read()
            .cards
            .values()
            .filter(|c| c.staff_id == staff_id && c.is_open())
            .max_by_key(|c| (c.date, c.id))
            .cloned())
    }

    async fn insert_card(&self, mut card: HoursCard) -> Result<HoursCard, StoreError> {
        let mut tables = self.write();
        if tables
            .cards
            .values()
            .any(|c| c.staff_id == card.staff_id && c.date == card.date)
        {
            return Err(StoreError::Duplicate);
        }
        tables.next_card_id += 1;
        card.id = tables.next_card_id;
        tables.cards.insert(card.id, card.clone());
        Ok(card)
    }

    async fn update_card(&self, card: &HoursCard, expected_revision: u32) -> Result<(), StoreError> {
        let mut tables = self.write();
        let stored = tables.cards.get_mut(&card.id).ok_or(StoreError::NotFound)?;
        if stored.revision != expected_revision {
            return Err(StoreError::Conflict);
        }
        *stored = card.clone();
        Ok(())
    }

    async fn list_cards(&self, filter: &CardFilter) -> Result<(Vec<HoursCard>, i64), StoreError> {
        let tables = self.read();
        let mut matching: Vec<&HoursCard> = tables.cards.values().filter(|c| filter.matches(c)).collect();
        matching.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.per_page() as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn summaries(
        &self,
        business_id: u64,
        staff_id: Option<u64>,
    ) -> Result<Vec<WorkerSummary>, StoreError> {
        let tables = self.read();
        let mut by_staff: BTreeMap<u64, WorkerSummary> = BTreeMap::new();

        for card in tables
            .cards
            .values()
            .filter(|c| c.business_id == business_id && staff_id.is_none_or(|id| c.staff_id == id))
        {
            let summary = by_staff.entry(card.staff_id).or_insert_with(|| WorkerSummary {
                staff_id: card.staff_id,
                ..Default::default()
            });
            summary.days_recorded += 1;
            match card.status {
                HoursCardStatus::Pending => summary.pending_days += 1,
                HoursCardStatus::Signed => summary.signed_days += 1,
                HoursCardStatus::Approved => {
                    summary.approved_days += 1;
                    summary.total_approved_hours += card.total_hours.unwrap_or(0.0);
                }
                HoursCardStatus::Rejected => summary.rejected_days += 1,
            }
        }

        Ok(by_staff.into_values().collect())
    }
}

#[async_trait]
impl CounterSource for MemoryStore {
    async fn unread_messages(&self, user_id: u64) -> Result<u64, StoreError> {
        Ok(self
            .read()
            .messages
            .iter()
            .filter(|m| m.receiver_id == user_id && !m.is_read)
            .count() as u64)
    }

    async fn pending_invitations(&self, user_id: u64) -> Result<u64, StoreError> {
        Ok(self.read().invitations.get(&user_id).copied().unwrap_or(0))
    }

    async fn mark_messages_read(&self, user_id: u64, other_user_id: u64) -> Result<u64, StoreError> {
        let mut tables = self.write();
        let mut marked = 0;
        for message in tables
            .messages
            .iter_mut()
            .filter(|m| m.receiver_id == user_id && m.sender_id == other_user_id && !m.is_read)
        {
            message.is_read = true;
            marked += 1;
        }
        Ok(marked)
    }
}
