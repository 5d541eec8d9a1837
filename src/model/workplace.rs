use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use super::hours_card::GeoPoint;

pub const DEFAULT_CLOCK_IN_RADIUS_METERS: f64 = 100.0;

/// An employer and its clock-in geofence. Read-only input to attendance;
/// editing it never touches cards that already exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workplace {
    pub business_id: u64,
    pub owner_user_id: u64,
    pub name: String,
    pub workplace_latitude: Option<f64>,
    pub workplace_longitude: Option<f64>,
    pub clock_in_radius_meters: f64,
    pub require_location_for_clock_in: bool,
    /// Offset of the business-local calendar from UTC.
    pub utc_offset_minutes: i32,
}

impl Workplace {
    pub fn location(&self) -> Option<GeoPoint> {
        match (self.workplace_latitude, self.workplace_longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint { latitude, longitude }),
            _ => None,
        }
    }

    /// Calendar date at the business for the given instant.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        match FixedOffset::east_opt(self.utc_offset_minutes * 60) {
            Some(offset) => at.with_timezone(&offset).date_naive(),
            None => at.date_naive(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StaffStatus {
    Active,
    Inactive,
    Terminated,
    OnLeave,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: u64,
    pub business_id: u64,
    pub user_id: Option<u64>,
    pub name: String,
    pub status: StaffStatus,
}

impl StaffMember {
    pub fn is_active(&self) -> bool {
        self.status == StaffStatus::Active
    }
}
