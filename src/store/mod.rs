//! Persistence collaborators for the attendance core.

use async_trait::async_trait;
use chrono::NaiveDate;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::hours_card::{HoursCard, HoursCardStatus};
use crate::model::workplace::{StaffMember, Workplace};

pub mod memory;
pub mod mysql;

pub use memory::MemoryStore;
pub use mysql::MySqlStore;

#[derive(Debug, Display)]
pub enum StoreError {
    #[display(fmt = "record not found")]
    NotFound,
    /// A conditional write lost against a concurrent writer.
    #[display(fmt = "record was modified concurrently")]
    Conflict,
    /// Unique `(staff_id, date)` violated.
    #[display(fmt = "duplicate hours card")]
    Duplicate,
    #[display(fmt = "database error: {}", _0)]
    Database(sqlx::Error),
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return StoreError::Duplicate;
            }
        }
        StoreError::Database(e)
    }
}

/// Listing criteria. `business_id` / `staff_id` scoping is filled in by the
/// workflow from the caller's identity.
#[derive(Debug, Clone, Default)]
pub struct CardFilter {
    pub staff_id: Option<u64>,
    pub business_id: Option<u64>,
    pub status: Option<HoursCardStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl CardFilter {
    pub fn per_page(&self) -> u64 {
        self.per_page.unwrap_or(20).clamp(1, 100)
    }

    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn offset(&self) -> u64 {
        (self.page() - 1) * self.per_page()
    }

    pub fn matches(&self, card: &HoursCard) -> bool {
        self.staff_id.is_none_or(|id| card.staff_id == id)
            && self.business_id.is_none_or(|id| card.business_id == id)
            && self.status.is_none_or(|s| card.status == s)
            && self.date_from.is_none_or(|d| card.date >= d)
            && self.date_to.is_none_or(|d| card.date <= d)
    }
}

/// Per-worker dashboard aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WorkerSummary {
    #[schema(example = 1000)]
    pub staff_id: u64,
    #[schema(example = 20)]
    pub days_recorded: u64,
    #[schema(example = 1)]
    pub pending_days: u64,
    #[schema(example = 2)]
    pub signed_days: u64,
    #[schema(example = 16)]
    pub approved_days: u64,
    #[schema(example = 1)]
    pub rejected_days: u64,
    #[schema(example = 128.5)]
    pub total_approved_hours: f64,
}

/// Hours cards plus the employer and staff records they hang off.
#[async_trait]
pub trait AttendanceRepository: Send + Sync {
    async fn staff_for_user(&self, user_id: u64) -> Result<Option<StaffMember>, StoreError>;
    async fn staff(&self, staff_id: u64) -> Result<Option<StaffMember>, StoreError>;
    async fn workplace(&self, business_id: u64) -> Result<Option<Workplace>, StoreError>;

    async fn card(&self, id: u64) -> Result<Option<HoursCard>, StoreError>;
    async fn card_for_day(&self, staff_id: u64, date: NaiveDate) -> Result<Option<HoursCard>, StoreError>;
    /// Most recent card of the worker that has not been clocked out.
    async fn latest_open_card(&self, staff_id: u64) -> Result<Option<HoursCard>, StoreError>;

    /// Inserts a new card and returns it with its id. `Duplicate` if the
    /// worker already has a card for that date.
    async fn insert_card(&self, card: HoursCard) -> Result<HoursCard, StoreError>;
    /// Writes `card` only if the stored revision is still `expected_revision`.
    async fn update_card(&self, card: &HoursCard, expected_revision: u32) -> Result<(), StoreError>;

    async fn list_cards(&self, filter: &CardFilter) -> Result<(Vec<HoursCard>, i64), StoreError>;
    async fn summaries(
        &self,
        business_id: u64,
        staff_id: Option<u64>,
    ) -> Result<Vec<WorkerSummary>, StoreError>;
}

/// Authoritative source behind the notification badge counts.
#[async_trait]
pub trait CounterSource: Send + Sync {
    async fn unread_messages(&self, user_id: u64) -> Result<u64, StoreError>;
    async fn pending_invitations(&self, user_id: u64) -> Result<u64, StoreError>;
    /// Marks everything `other_user_id` sent to `user_id` as read.
    async fn mark_messages_read(&self, user_id: u64, other_user_id: u64) -> Result<u64, StoreError>;
}
