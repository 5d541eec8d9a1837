use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, MySqlPool};

use crate::model::hours_card::{GeoPoint, HoursCard, HoursCardStatus};
use crate::model::workplace::{StaffMember, StaffStatus, Workplace};

use super::{AttendanceRepository, CardFilter, CounterSource, StoreError, WorkerSummary};

const CARD_COLUMNS: &str = r#"
    id, staff_id, business_id, shift_id, date, clock_in_at, clock_out_at,
    clock_in_latitude, clock_in_longitude, clock_in_distance_meters,
    break_minutes, total_hours, flagged_for_review, status,
    worker_signature, worker_signed_at, approved_by, approved_at,
    rejection_reason, notes, revision
"#;

#[derive(FromRow)]
struct HoursCardRow {
    id: u64,
    staff_id: u64,
    business_id: u64,
    shift_id: Option<u64>,
    date: NaiveDate,
    clock_in_at: Option<DateTime<Utc>>,
    clock_out_at: Option<DateTime<Utc>>,
    clock_in_latitude: Option<f64>,
    clock_in_longitude: Option<f64>,
    clock_in_distance_meters: Option<f64>,
    break_minutes: u32,
    total_hours: Option<f64>,
    flagged_for_review: bool,
    status: String,
    worker_signature: Option<String>,
    worker_signed_at: Option<DateTime<Utc>>,
    approved_by: Option<u64>,
    approved_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    notes: Option<String>,
    revision: u32,
}

impl TryFrom<HoursCardRow> for HoursCard {
    type Error = StoreError;

    fn try_from(row: HoursCardRow) -> Result<Self, Self::Error> {
        let status = HoursCardStatus::from_str(&row.status)
            .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;
        let clock_in_location = match (row.clock_in_latitude, row.clock_in_longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint { latitude, longitude }),
            _ => None,
        };

        Ok(HoursCard {
            id: row.id,
            staff_id: row.staff_id,
            business_id: row.business_id,
            shift_id: row.shift_id,
            date: row.date,
            clock_in_at: row.clock_in_at,
            clock_out_at: row.clock_out_at,
            clock_in_location,
            clock_in_distance_meters: row.clock_in_distance_meters,
            break_minutes: row.break_minutes,
            total_hours: row.total_hours,
            flagged_for_review: row.flagged_for_review,
            status,
            worker_signature: row.worker_signature,
            worker_signed_at: row.worker_signed_at,
            approved_by: row.approved_by,
            approved_at: row.approved_at,
            rejection_reason: row.rejection_reason,
            notes: row.notes,
            revision: row.revision,
        })
    }
}

#[derive(FromRow)]
struct WorkplaceRow {
    id: u64,
    owner_user_id: u64,
    name: String,
    workplace_latitude: Option<f64>,
    workplace_longitude: Option<f64>,
    clock_in_radius_meters: f64,
    require_location_for_clock_in: bool,
    utc_offset_minutes: i32,
}

impl From<WorkplaceRow> for Workplace {
    fn from(row: WorkplaceRow) -> Self {
        Workplace {
            business_id: row.id,
            owner_user_id: row.owner_user_id,
            name: row.name,
            workplace_latitude: row.workplace_latitude,
            workplace_longitude: row.workplace_longitude,
            clock_in_radius_meters: row.clock_in_radius_meters,
            require_location_for_clock_in: row.require_location_for_clock_in,
            utc_offset_minutes: row.utc_offset_minutes,
        }
    }
}

#[derive(FromRow)]
struct StaffRow {
    id: u64,
    business_id: u64,
    user_id: Option<u64>,
    name: String,
    status: String,
}

impl TryFrom<StaffRow> for StaffMember {
    type Error = StoreError;

    fn try_from(row: StaffRow) -> Result<Self, Self::Error> {
        let status = StaffStatus::from_str(&row.status)
            .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;
        Ok(StaffMember {
            id: row.id,
            business_id: row.business_id,
            user_id: row.user_id,
            name: row.name,
            status,
        })
    }
}

#[derive(FromRow)]
struct SummaryRow {
    staff_id: u64,
    days_recorded: i64,
    pending_days: i64,
    signed_days: i64,
    approved_days: i64,
    rejected_days: i64,
    total_approved_hours: f64,
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    Str(&'static str),
    Date(NaiveDate),
}

/// MySQL-backed store over the `hours_cards`, `business_staff`,
/// `businesses`, `messages` and `staff_invitations` tables.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn fetch_card(&self, where_sql: &str, args: &[FilterValue]) -> Result<Option<HoursCard>, StoreError> {
        let sql = format!("SELECT {CARD_COLUMNS} FROM hours_cards {where_sql}");
        let mut q = sqlx::query_as::<_, HoursCardRow>(&sql);
        for arg in args {
            q = match arg {
                FilterValue::U64(v) => q.bind(*v),
                FilterValue::Str(s) => q.bind(*s),
                FilterValue::Date(d) => q.bind(*d),
            };
        }
        q.fetch_optional(&self.pool)
            .await?
            .map(HoursCard::try_from)
            .transpose()
    }
}

#[async_trait]
impl AttendanceRepository for MySqlStore {
    async fn staff_for_user(&self, user_id: u64) -> Result<Option<StaffMember>, StoreError> {
        sqlx::query_as::<_, StaffRow>(
            r#"
            SELECT id, business_id, user_id, name, status
            FROM business_staff
            WHERE user_id = ?
            ORDER BY status = 'ACTIVE' DESC, id
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(StaffMember::try_from)
        .transpose()
    }

    async fn staff(&self, staff_id: u64) -> Result<Option<StaffMember>, StoreError> {
        sqlx::query_as::<_, StaffRow>(
            "SELECT id, business_id, user_id, name, status FROM business_staff WHERE id = ?",
        )
        .bind(staff_id)
        .fetch_optional(&self.pool)
        .await?
        .map(StaffMember::try_from)
        .transpose()
    }

    async fn workplace(&self, business_id: u64) -> Result<Option<Workplace>, StoreError> {
        let row = sqlx::query_as::<_, WorkplaceRow>(
            r#"
            SELECT id, owner_user_id, name, workplace_latitude, workplace_longitude,
                   clock_in_radius_meters, require_location_for_clock_in, utc_offset_minutes
            FROM businesses
            WHERE id = ?
            "#,
        )
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Workplace::from))
    }

    async fn card(&self, id: u64) -> Result<Option<HoursCard>, StoreError> {
        self.fetch_card("WHERE id = ?", &[FilterValue::U64(id)]).await
    }

    async fn card_for_day(&self, staff_id: u64, date: NaiveDate) -> Result<Option<HoursCard>, StoreError> {
        self.fetch_card(
            "WHERE staff_id = ? AND date = ?",
            &[FilterValue::U64(staff_id), FilterValue::Date(date)],
        )
        .await
    }

    async fn latest_open_card(&self, staff_id: u64) -> Result<Option<HoursCard>, StoreError> {
        self.fetch_card(
            r#"
            WHERE staff_id = ?
            AND status = ?
            AND clock_out_at IS NULL
            ORDER BY date DESC, id DESC
            LIMIT 1
            "#,
            &[
                FilterValue::U64(staff_id),
                FilterValue::Str(HoursCardStatus::Pending.as_str()),
            ],
        )
        .await
    }

    async fn insert_card(&self, mut card: HoursCard) -> Result<HoursCard, StoreError> {
        let (lat, lon) = card
            .clock_in_location
            .map_or((None, None), |p| (Some(p.latitude), Some(p.longitude)));

        let result = sqlx::query(
            r#"
            INSERT INTO hours_cards
                (staff_id, business_id, shift_id, date, clock_in_at,
                 clock_in_latitude, clock_in_longitude, clock_in_distance_meters,
                 status, notes, revision)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(card.staff_id)
        .bind(card.business_id)
        .bind(card.shift_id)
        .bind(card.date)
        .bind(card.clock_in_at)
        .bind(lat)
        .bind(lon)
        .bind(card.clock_in_distance_meters)
        .bind(card.status.as_str())
        .bind(card.notes.as_deref())
        .bind(card.revision)
        .execute(&self.pool)
        .await?;

        card.id = result.last_insert_id();
        Ok(card)
    }

    async fn update_card(&self, card: &HoursCard, expected_revision: u32) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE hours_cards
            SET clock_out_at = ?,
                break_minutes = ?,
                total_hours = ?,
                flagged_for_review = ?,
                status = ?,
                worker_signature = ?,
                worker_signed_at = ?,
                approved_by = ?,
                approved_at = ?,
                rejection_reason = ?,
                notes = ?,
                revision = ?
            WHERE id = ?
            AND revision = ?
            "#,
        )
        .bind(card.clock_out_at)
        .bind(card.break_minutes)
        .bind(card.total_hours)
        .bind(card.flagged_for_review)
        .bind(card.status.as_str())
        .bind(card.worker_signature.as_deref())
        .bind(card.worker_signed_at)
        .bind(card.approved_by)
        .bind(card.approved_at)
        .bind(card.rejection_reason.as_deref())
        .bind(card.notes.as_deref())
        .bind(card.revision)
        .bind(card.id)
        .bind(expected_revision)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.card(card.id).await? {
                Some(_) => Err(StoreError::Conflict),
                None => Err(StoreError::NotFound),
            };
        }
        Ok(())
    }

    async fn list_cards(&self, filter: &CardFilter) -> Result<(Vec<HoursCard>, i64), StoreError> {
        // -------------------------
        // WHERE clause
        // -------------------------
        let mut where_sql = String::from(" WHERE 1=1");
        let mut args: Vec<FilterValue> = Vec::new();

        if let Some(staff_id) = filter.staff_id {
            where_sql.push_str(" AND staff_id = ?");
            args.push(FilterValue::U64(staff_id));
        }
        if let Some(business_id) = filter.business_id {
            where_sql.push_str(" AND business_id = ?");
            args.push(FilterValue::U64(business_id));
        }
        if let Some(status) = filter.status {
            where_sql.push_str(" AND status = ?");
            args.push(FilterValue::Str(status.as_str()));
        }
        if let Some(from) = filter.date_from {
            where_sql.push_str(" AND date >= ?");
            args.push(FilterValue::Date(from));
        }
        if let Some(to) = filter.date_to {
            where_sql.push_str(" AND date <= ?");
            args.push(FilterValue::Date(to));
        }

        // -------------------------
        // COUNT query
        // -------------------------
        let count_sql = format!("SELECT COUNT(*) FROM hours_cards{}", where_sql);
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for arg in &args {
            count_q = match arg {
                FilterValue::U64(v) => count_q.bind(*v),
                FilterValue::Str(s) => count_q.bind(*s),
                FilterValue::Date(d) => count_q.bind(*d),
            };
        }
        let total = count_q.fetch_one(&self.pool).await?;

        // -------------------------
        // DATA query
        // -------------------------
        let data_sql = format!(
            "SELECT {CARD_COLUMNS} FROM hours_cards{where_sql} ORDER BY date DESC, id DESC LIMIT ? OFFSET ?"
        );
        let mut data_q = sqlx::query_as::<_, HoursCardRow>(&data_sql);
        for arg in args {
            data_q = match arg {
                FilterValue::U64(v) => data_q.bind(v),
                FilterValue::Str(s) => data_q.bind(s),
                FilterValue::Date(d) => data_q.bind(d),
            };
        }

        let cards = data_q
            .bind(filter.per_page())
            .bind(filter.offset())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(HoursCard::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((cards, total))
    }

    async fn summaries(
        &self,
        business_id: u64,
        staff_id: Option<u64>,
    ) -> Result<Vec<WorkerSummary>, StoreError> {
        let mut sql = String::from(
            r#"
            SELECT
                staff_id,
                COUNT(*) AS days_recorded,
                CAST(SUM(status = 'PENDING') AS SIGNED) AS pending_days,
                CAST(SUM(status = 'SIGNED') AS SIGNED) AS signed_days,
                CAST(SUM(status = 'APPROVED') AS SIGNED) AS approved_days,
                CAST(SUM(status = 'REJECTED') AS SIGNED) AS rejected_days,
                COALESCE(SUM(CASE WHEN status = 'APPROVED' THEN total_hours END), 0e0) AS total_approved_hours
            FROM hours_cards
            WHERE business_id = ?
            "#,
        );
        if staff_id.is_some() {
            sql.push_str(" AND staff_id = ?");
        }
        sql.push_str(" GROUP BY staff_id ORDER BY staff_id");

        let mut q = sqlx::query_as::<_, SummaryRow>(&sql).bind(business_id);
        if let Some(staff_id) = staff_id {
            q = q.bind(staff_id);
        }

        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| WorkerSummary {
                staff_id: r.staff_id,
                days_recorded: r.days_recorded.max(0) as u64,
                pending_days: r.pending_days.max(0) as u64,
                signed_days: r.signed_days.max(0) as u64,
                approved_days: r.approved_days.max(0) as u64,
                rejected_days: r.rejected_days.max(0) as u64,
                total_approved_hours: r.total_approved_hours,
            })
            .collect())
    }
}

#[async_trait]
impl CounterSource for MySqlStore {
    async fn unread_messages(&self, user_id: u64) -> Result<u64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM messages WHERE receiver_id = ? AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn pending_invitations(&self, user_id: u64) -> Result<u64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM staff_invitations WHERE user_id = ? AND status = 'PENDING'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn mark_messages_read(&self, user_id: u64, other_user_id: u64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE
            WHERE receiver_id = ?
            AND sender_id = ?
            AND is_read = FALSE
            "#,
        )
        .bind(user_id)
        .bind(other_user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
