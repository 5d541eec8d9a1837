use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use derive_more::Display;
use serde_json::json;

use crate::store::StoreError;

/// Everything an attendance operation can refuse with.
///
/// Grouped by how a caller should react: validation errors are fixed by the
/// user, state conflicts mean the caller's view is stale and it should refetch,
/// `Forbidden` is final, `Timeout` may be retried after reconciliation.
#[derive(Debug, Display)]
pub enum AttendanceError {
    // validation
    #[display(fmt = "Location is required to clock in at this workplace")]
    LocationRequired,
    #[display(fmt = "Coordinates are out of range")]
    InvalidCoordinates,
    #[display(fmt = "The workplace has not configured its clock-in location")]
    WorkplaceNotConfigured,
    #[display(fmt = "You are {} m away from the workplace", distance_meters)]
    GeofenceViolation { distance_meters: f64 },
    #[display(fmt = "A signature is required")]
    SignatureRequired,
    #[display(fmt = "A rejection reason is required")]
    RejectionReasonRequired,
    #[display(fmt = "Clock-out must be after clock-in")]
    InvalidClockOut,

    // state conflicts
    #[display(fmt = "Already clocked in today")]
    AlreadyClockedIn,
    #[display(fmt = "Today's hours card is already closed")]
    DayAlreadyRecorded,
    #[display(fmt = "No active clock-in found")]
    NotClockedIn,
    #[display(fmt = "Hours card is not ready to be signed")]
    NotReadyToSign,
    #[display(fmt = "Hours card is not awaiting approval")]
    NotAwaitingApproval,
    #[display(fmt = "Hours card has already been finalized")]
    AlreadyFinalized,
    #[display(fmt = "Hours card was modified concurrently")]
    Conflict,

    #[display(fmt = "Forbidden")]
    Forbidden,
    #[display(fmt = "Hours card not found")]
    NotFound,
    #[display(fmt = "Request timed out, refresh and retry")]
    Timeout,
    #[display(fmt = "Internal Server Error")]
    Storage(StoreError),
}

impl std::error::Error for AttendanceError {}

impl AttendanceError {
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::LocationRequired => "LOCATION_REQUIRED",
            AttendanceError::InvalidCoordinates => "INVALID_COORDINATES",
            AttendanceError::WorkplaceNotConfigured => "WORKPLACE_NOT_CONFIGURED",
            AttendanceError::GeofenceViolation { .. } => "GEOFENCE_VIOLATION",
            AttendanceError::SignatureRequired => "SIGNATURE_REQUIRED",
            AttendanceError::RejectionReasonRequired => "REJECTION_REASON_REQUIRED",
            AttendanceError::InvalidClockOut => "INVALID_CLOCK_OUT",
            AttendanceError::AlreadyClockedIn => "ALREADY_CLOCKED_IN",
            AttendanceError::DayAlreadyRecorded => "DAY_ALREADY_RECORDED",
            AttendanceError::NotClockedIn => "NOT_CLOCKED_IN",
            AttendanceError::NotReadyToSign => "NOT_READY_TO_SIGN",
            AttendanceError::NotAwaitingApproval => "NOT_AWAITING_APPROVAL",
            AttendanceError::AlreadyFinalized => "ALREADY_FINALIZED",
            AttendanceError::Conflict => "CONFLICT",
            AttendanceError::Forbidden => "FORBIDDEN",
            AttendanceError::NotFound => "NOT_FOUND",
            AttendanceError::Timeout => "TIMEOUT",
            AttendanceError::Storage(_) => "INTERNAL",
        }
    }

    /// True for errors that mean the caller acted on a stale view.
    pub fn is_state_conflict(&self) -> bool {
        matches!(
            self,
            AttendanceError::AlreadyClockedIn
                | AttendanceError::DayAlreadyRecorded
                | AttendanceError::NotClockedIn
                | AttendanceError::NotReadyToSign
                | AttendanceError::NotAwaitingApproval
                | AttendanceError::AlreadyFinalized
                | AttendanceError::Conflict
        )
    }
}

impl From<StoreError> for AttendanceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => AttendanceError::Conflict,
            StoreError::NotFound => AttendanceError::NotFound,
            other => AttendanceError::Storage(other),
        }
    }
}

impl ResponseError for AttendanceError {
    fn status_code(&self) -> StatusCode {
        match self {
            AttendanceError::LocationRequired
            | AttendanceError::InvalidCoordinates
            | AttendanceError::SignatureRequired
            | AttendanceError::RejectionReasonRequired
            | AttendanceError::InvalidClockOut => StatusCode::BAD_REQUEST,
            AttendanceError::WorkplaceNotConfigured | AttendanceError::GeofenceViolation { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AttendanceError::Forbidden => StatusCode::FORBIDDEN,
            AttendanceError::NotFound => StatusCode::NOT_FOUND,
            AttendanceError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            AttendanceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::CONFLICT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let AttendanceError::Storage(e) = self {
            tracing::error!(error = %e, "Attendance storage failure");
        }
        let mut body = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let AttendanceError::GeofenceViolation { distance_meters } = self {
            body["distance_meters"] = json!(distance_meters);
        }
        HttpResponse::build(self.status_code()).json(body)
    }
}
