//! Geofence admission for clock-in.

use crate::model::hours_card::GeoPoint;
use crate::model::workplace::Workplace;

use super::error::AttendanceError;

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeofenceVerdict {
    pub within_range: bool,
    /// Unrounded great-circle distance.
    pub distance_meters: f64,
}

impl GeofenceVerdict {
    pub fn from_distance(distance_meters: f64, radius_meters: f64) -> Self {
        Self {
            within_range: distance_meters <= radius_meters,
            distance_meters,
        }
    }

    pub fn display_distance(&self) -> f64 {
        self.distance_meters.round()
    }
}

/// Outcome of a successful admission check.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Admission {
    pub location: Option<GeoPoint>,
    pub distance_meters: Option<f64>,
}

pub fn is_valid(point: GeoPoint) -> bool {
    point.latitude.is_finite()
        && point.longitude.is_finite()
        && (-90.0..=90.0).contains(&point.latitude)
        && (-180.0..=180.0).contains(&point.longitude)
}

/// Haversine distance in meters.
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.latitude.to_radians(), a.longitude.to_radians());
    let (lat2, lon2) = (b.latitude.to_radians(), b.longitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // rounding can push h a hair past 1 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();
    c * EARTH_RADIUS_METERS
}

pub fn validate(worker: GeoPoint, workplace: GeoPoint, radius_meters: f64) -> GeofenceVerdict {
    GeofenceVerdict::from_distance(distance_meters(worker, workplace), radius_meters)
}

/// Decides whether a clock-in from `location` is admitted at `workplace`.
pub fn admit(workplace: &Workplace, location: Option<GeoPoint>) -> Result<Admission, AttendanceError> {
    if let Some(point) = location {
        if !is_valid(point) {
            return Err(AttendanceError::InvalidCoordinates);
        }
    }

    if !workplace.require_location_for_clock_in {
        return Ok(Admission {
            location,
            distance_meters: None,
        });
    }

    let site = workplace
        .location()
        .ok_or(AttendanceError::WorkplaceNotConfigured)?;
    let worker = location.ok_or(AttendanceError::LocationRequired)?;

    let verdict = validate(worker, site, workplace.clock_in_radius_meters);
    if !verdict.within_range {
        return Err(AttendanceError::GeofenceViolation {
            distance_meters: verdict.display_distance(),
        });
    }

    Ok(Admission {
        location: Some(worker),
        distance_meters: Some(verdict.display_distance()),
    })
}
