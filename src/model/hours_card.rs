use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, IntoStaticStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum HoursCardStatus {
    Pending,
    Signed,
    Approved,
    Rejected,
}

impl HoursCardStatus {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// APPROVED and REJECTED admit no further transition.
    pub fn is_final(self) -> bool {
        matches!(self, HoursCardStatus::Approved | HoursCardStatus::Rejected)
    }
}

/// Where a card sits in its lifecycle. `status` alone cannot tell an open
/// card from a closed one, both are PENDING.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Open,
    Closed,
    Signed,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    #[schema(example = 51.5007)]
    pub latitude: f64,
    #[schema(example = -0.1246)]
    pub longitude: f64,
}

/// One worker's attendance for one business-local day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HoursCard {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1000)]
    pub staff_id: u64,
    #[schema(example = 7)]
    pub business_id: u64,
    pub shift_id: Option<u64>,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = "2026-01-01T08:00:00Z", format = "date-time", value_type = String)]
    pub clock_in_at: Option<DateTime<Utc>>,
    #[schema(example = "2026-01-01T16:00:00Z", format = "date-time", value_type = String)]
    pub clock_out_at: Option<DateTime<Utc>>,
    pub clock_in_location: Option<GeoPoint>,
    /// Rounded to the nearest meter; absent when the geofence was not checked.
    #[schema(example = 12.0)]
    pub clock_in_distance_meters: Option<f64>,
    pub break_minutes: u32,
    #[schema(example = 8.0)]
    pub total_hours: Option<f64>,
    /// Shift longer than the configured sanity threshold; reporting only.
    pub flagged_for_review: bool,
    pub status: HoursCardStatus,
    #[schema(example = "Jane Doe")]
    pub worker_signature: Option<String>,
    #[schema(example = "2026-01-01T16:05:00Z", format = "date-time", value_type = String)]
    pub worker_signed_at: Option<DateTime<Utc>>,
    pub approved_by: Option<u64>,
    #[schema(example = "2026-01-02T09:00:00Z", format = "date-time", value_type = String)]
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub notes: Option<String>,
    /// Bumped on every write; guards against lost updates.
    pub revision: u32,
}

impl HoursCard {
    pub fn phase(&self) -> Phase {
        match self.status {
            HoursCardStatus::Pending if self.clock_out_at.is_none() => Phase::Open,
            HoursCardStatus::Pending => Phase::Closed,
            HoursCardStatus::Signed => Phase::Signed,
            HoursCardStatus::Approved => Phase::Approved,
            HoursCardStatus::Rejected => Phase::Rejected,
        }
    }

    pub fn is_open(&self) -> bool {
        self.phase() == Phase::Open
    }

    /// Live "hours worked so far" for an open card. Display only, never stored.
    pub fn hours_so_far(&self, now: DateTime<Utc>) -> f64 {
        match (self.clock_in_at, self.clock_out_at) {
            (Some(start), None) => ((now - start).num_seconds() as f64 / 3600.0).max(0.0),
            _ => self.total_hours.unwrap_or(0.0),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::open_card;
    use super::*;
    use chrono::Duration;
    use std::str::FromStr;

    #[test]
    fn phase_distinguishes_open_from_closed_pending() {
        let mut card = open_card();
        assert_eq!(card.phase(), Phase::Open);
        card.clock_out_at = card.clock_in_at.map(|t| t + Duration::hours(1));
        assert_eq!(card.phase(), Phase::Closed);
        card.status = HoursCardStatus::Signed;
        assert_eq!(card.phase(), Phase::Signed);
    }

    #[test]
    fn hours_so_far_tracks_the_supplied_clock() {
        let card = open_card();
        let start = card.clock_in_at.unwrap();
        assert_eq!(card.hours_so_far(start + Duration::minutes(90)), 1.5);
        assert_eq!(card.hours_so_far(start - Duration::minutes(5)), 0.0);
    }

    #[test]
    fn status_uses_upper_snake_case_on_the_wire_and_in_storage() {
        assert_eq!(HoursCardStatus::Approved.as_str(), "APPROVED");
        assert_eq!(HoursCardStatus::from_str("SIGNED").unwrap(), HoursCardStatus::Signed);
        assert_eq!(serde_json::to_string(&HoursCardStatus::Rejected).unwrap(), "\"REJECTED\"");
        assert!(HoursCardStatus::Rejected.is_final());
        assert!(!HoursCardStatus::Signed.is_final());
    }
}
