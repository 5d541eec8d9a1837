use crate::attendance::store::ClockInRequest;
use crate::attendance::{ApprovalWorkflow, AttendanceError};
use crate::auth::auth::AuthUser;
use crate::model::hours_card::GeoPoint;
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ClockIn {
    /// Device latitude; required together with `longitude` when the
    /// workplace enforces its geofence
    #[schema(example = 51.5007)]
    pub latitude: Option<f64>,
    #[schema(example = -0.1246)]
    pub longitude: Option<f64>,
    #[schema(example = 42)]
    pub shift_id: Option<u64>,
    #[schema(example = "Opening shift")]
    pub notes: Option<String>,
}

impl ClockIn {
    fn into_request(self) -> Result<ClockInRequest, AttendanceError> {
        let location = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint { latitude, longitude }),
            (None, None) => None,
            // half a coordinate is as good as a bad one
            _ => return Err(AttendanceError::InvalidCoordinates),
        };
        Ok(ClockInRequest {
            location,
            shift_id: self.shift_id,
            notes: self.notes,
        })
    }
}

/* =========================
Clock in
========================= */
#[utoipa::path(
    post,
    path = "/api/attendance/clock-in",
    request_body(
        content = ClockIn,
        description = "Clock-in payload",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Clocked in, today's hours card opened", body = crate::model::hours_card::HoursCard),
        (status = 400, description = "Location required or invalid", body = Object, example = json!({
            "code": "LOCATION_REQUIRED",
            "message": "Location is required to clock in at this workplace"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Already clocked in today"),
        (status = 422, description = "Outside the workplace geofence", body = Object, example = json!({
            "code": "GEOFENCE_VIOLATION",
            "message": "You are 250 m away from the workplace",
            "distance_meters": 250.0
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn clock_in(
    auth: AuthUser,
    workflow: web::Data<ApprovalWorkflow>,
    payload: web::Json<ClockIn>,
) -> Result<HttpResponse, AttendanceError> {
    let request = payload.into_inner().into_request()?;
    let card = workflow.clock_in(&auth.actor(), request).await?;
    Ok(HttpResponse::Ok().json(card))
}

/* =========================
Open hours card (live readout)
========================= */
#[utoipa::path(
    get,
    path = "/api/attendance/open",
    responses(
        (status = 200, description = "Open hours card with hours worked so far", body = crate::attendance::store::OpenCardView),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not clocked in", body = Object, example = json!({
            "code": "NOT_CLOCKED_IN",
            "message": "No active clock-in found"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn open_card(
    auth: AuthUser,
    workflow: web::Data<ApprovalWorkflow>,
) -> Result<HttpResponse, AttendanceError> {
    match workflow.open_card(&auth.actor()).await? {
        Some(view) => Ok(HttpResponse::Ok().json(view)),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({
            "code": AttendanceError::NotClockedIn.code(),
            "message": AttendanceError::NotClockedIn.to_string()
        }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_come_in_pairs() {
        let half = ClockIn {
            latitude: Some(1.0),
            longitude: None,
            shift_id: None,
            notes: None,
        };
        assert!(matches!(half.into_request(), Err(AttendanceError::InvalidCoordinates)));

        let none = ClockIn {
            latitude: None,
            longitude: None,
            shift_id: Some(3),
            notes: None,
        };
        let req = none.into_request().unwrap();
        assert!(req.location.is_none());
        assert_eq!(req.shift_id, Some(3));
    }
}
