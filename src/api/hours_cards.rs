use crate::attendance::{ApprovalWorkflow, AttendanceError};
use crate::auth::auth::AuthUser;
use crate::model::hours_card::HoursCardStatus;
use crate::store::CardFilter;
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, IntoParams)]
pub struct CardQuery {
    /// Filter by staff id (ignored for workers, who only see their own cards)
    pub staff_id: Option<u64>,
    /// PENDING, SIGNED, APPROVED or REJECTED
    #[param(value_type = Option<String>, example = "SIGNED")]
    pub status: Option<HoursCardStatus>,
    /// First business-local day to include
    #[param(value_type = Option<String>, example = "2026-01-01")]
    pub date_from: Option<NaiveDate>,
    /// Last business-local day to include
    #[param(value_type = Option<String>, example = "2026-01-31")]
    pub date_to: Option<NaiveDate>,
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    /// Items per page, at most 100
    pub per_page: Option<u64>,
}

impl From<CardQuery> for CardFilter {
    fn from(q: CardQuery) -> Self {
        CardFilter {
            staff_id: q.staff_id,
            business_id: None,
            status: q.status,
            date_from: q.date_from,
            date_to: q.date_to,
            page: q.page,
            per_page: q.per_page,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SummaryQuery {
    /// Restrict to one worker
    pub staff_id: Option<u64>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ClockOut {
    #[schema(example = "Closed the till")]
    pub notes: Option<String>,
    /// Unpaid break taken during the shift
    #[schema(example = 30)]
    pub break_minutes: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignCard {
    /// Typed name confirming the hours
    #[serde(default)]
    #[schema(example = "Jane Doe")]
    pub signature: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RejectCard {
    #[serde(default)]
    #[schema(example = "wrong hours")]
    pub reason: String,
}

/// for listing hours cards endpoint
#[utoipa::path(
    get,
    path = "/api/hours-cards",
    params(CardQuery),
    responses(
        (status = 200, description = "Paginated hours cards", body = crate::attendance::workflow::CardPage),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Hours Cards"
)]
pub async fn list_cards(
    auth: AuthUser,
    workflow: web::Data<ApprovalWorkflow>,
    query: web::Query<CardQuery>,
) -> Result<HttpResponse, AttendanceError> {
    let page = workflow
        .list_cards(&auth.actor(), query.into_inner().into())
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/hours-cards/summary",
    params(SummaryQuery),
    responses(
        (status = 200, description = "Per-worker totals", body = [crate::store::WorkerSummary]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Hours Cards"
)]
pub async fn summary(
    auth: AuthUser,
    workflow: web::Data<ApprovalWorkflow>,
    query: web::Query<SummaryQuery>,
) -> Result<HttpResponse, AttendanceError> {
    let rows = workflow.summaries(&auth.actor(), query.staff_id).await?;
    Ok(HttpResponse::Ok().json(rows))
}

/// for getting a single hours card endpoint
#[utoipa::path(
    get,
    path = "/api/hours-cards/{card_id}",
    params(
        ("card_id" = u64, Path, description = "ID of the hours card to fetch")
    ),
    responses(
        (status = 200, description = "Hours card found", body = crate::model::hours_card::HoursCard),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Hours card not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Hours Cards"
)]
pub async fn get_card(
    auth: AuthUser,
    workflow: web::Data<ApprovalWorkflow>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AttendanceError> {
    let card = workflow.card(&auth.actor(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(card))
}

#[utoipa::path(
    post,
    path = "/api/hours-cards/{card_id}/clock-out",
    params(
        ("card_id" = u64, Path, description = "ID of the open hours card")
    ),
    request_body(content = ClockOut, content_type = "application/json"),
    responses(
        (status = 200, description = "Clocked out, total hours computed", body = crate::model::hours_card::HoursCard),
        (status = 400, description = "Clock-out before clock-in"),
        (status = 403, description = "Not your hours card"),
        (status = 404, description = "Hours card not found"),
        (status = 409, description = "Not clocked in", body = Object, example = json!({
            "code": "NOT_CLOCKED_IN",
            "message": "No active clock-in found"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Hours Cards"
)]
pub async fn clock_out(
    auth: AuthUser,
    workflow: web::Data<ApprovalWorkflow>,
    path: web::Path<u64>,
    payload: Option<web::Json<ClockOut>>,
) -> Result<HttpResponse, AttendanceError> {
    let body = payload.map(web::Json::into_inner).unwrap_or_default();
    let card = workflow
        .clock_out(
            &auth.actor(),
            path.into_inner(),
            body.notes,
            body.break_minutes.unwrap_or(0),
        )
        .await?;
    Ok(HttpResponse::Ok().json(card))
}

#[utoipa::path(
    post,
    path = "/api/hours-cards/{card_id}/sign",
    params(
        ("card_id" = u64, Path, description = "ID of the closed hours card")
    ),
    request_body(content = SignCard, content_type = "application/json"),
    responses(
        (status = 200, description = "Signed, awaiting approval", body = crate::model::hours_card::HoursCard),
        (status = 400, description = "Signature missing"),
        (status = 403, description = "Not your hours card"),
        (status = 404, description = "Hours card not found"),
        (status = 409, description = "Not ready to sign")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Hours Cards"
)]
pub async fn sign(
    auth: AuthUser,
    workflow: web::Data<ApprovalWorkflow>,
    path: web::Path<u64>,
    payload: web::Json<SignCard>,
) -> Result<HttpResponse, AttendanceError> {
    let card = workflow
        .sign(&auth.actor(), path.into_inner(), payload.into_inner().signature)
        .await?;
    Ok(HttpResponse::Ok().json(card))
}

#[utoipa::path(
    post,
    path = "/api/hours-cards/{card_id}/approve",
    params(
        ("card_id" = u64, Path, description = "ID of the signed hours card")
    ),
    responses(
        (status = 200, description = "Approved", body = crate::model::hours_card::HoursCard),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Hours card not found"),
        (status = 409, description = "Already finalized or not awaiting approval", body = Object, example = json!({
            "code": "ALREADY_FINALIZED",
            "message": "Hours card has already been finalized"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Hours Cards"
)]
pub async fn approve(
    auth: AuthUser,
    workflow: web::Data<ApprovalWorkflow>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AttendanceError> {
    let card = workflow.approve(&auth.actor(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(card))
}

#[utoipa::path(
    post,
    path = "/api/hours-cards/{card_id}/reject",
    params(
        ("card_id" = u64, Path, description = "ID of the signed hours card")
    ),
    request_body(content = RejectCard, content_type = "application/json"),
    responses(
        (status = 200, description = "Rejected", body = crate::model::hours_card::HoursCard),
        (status = 400, description = "Reason missing"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Hours card not found"),
        (status = 409, description = "Already finalized or not awaiting approval")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Hours Cards"
)]
pub async fn reject(
    auth: AuthUser,
    workflow: web::Data<ApprovalWorkflow>,
    path: web::Path<u64>,
    payload: web::Json<RejectCard>,
) -> Result<HttpResponse, AttendanceError> {
    let card = workflow
        .reject(&auth.actor(), path.into_inner(), payload.into_inner().reason)
        .await?;
    Ok(HttpResponse::Ok().json(card))
}
