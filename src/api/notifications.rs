use crate::attendance::AttendanceError;
use crate::auth::auth::AuthUser;
use crate::realtime::Realtime;
use actix_web::{HttpResponse, web};

/// Reconciliation fetch: always recounted from the source, never served from
/// the cache.
#[utoipa::path(
    get,
    path = "/api/notifications/counts",
    responses(
        (status = 200, description = "Unread messages and pending invitations", body = crate::model::counts::PendingCounts),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Notifications"
)]
pub async fn counts(auth: AuthUser, realtime: web::Data<Realtime>) -> Result<HttpResponse, AttendanceError> {
    let counts = realtime.counter.recount(auth.user_id).await?;
    Ok(HttpResponse::Ok().json(counts))
}
