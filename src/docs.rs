use crate::api::attendance::ClockIn;
use crate::api::hours_cards::{ClockOut, RejectCard, SignCard};
use crate::attendance::store::OpenCardView;
use crate::attendance::workflow::CardPage;
use crate::model::counts::PendingCounts;
use crate::model::hours_card::{GeoPoint, HoursCard, HoursCardStatus};
use crate::store::WorkerSummary;
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Workforce Attendance API",
        version = "1.0.0",
        description = r#"
## Workforce Attendance

Daily hours cards for hourly staff, from clock-in to employer approval.

### Key Features
- **Geofenced clock-in** against the workplace's coordinates and radius
- **Hours cards**: clock-out, worker signature, approve / reject by the employer
- **Live updates** over `GET /ws?token=…`: `attendance_changed` and `counts` pushes

### Security
Endpoints are protected using **JWT Bearer authentication**. Workers act on
their own cards; a business approves cards of its own staff.

### Errors
`{"code": "...", "message": "..."}`; geofence refusals add `distance_meters`.
"#,
    ),
    paths(
        crate::api::attendance::clock_in,
        crate::api::attendance::open_card,

        crate::api::hours_cards::list_cards,
        crate::api::hours_cards::summary,
        crate::api::hours_cards::get_card,
        crate::api::hours_cards::clock_out,
        crate::api::hours_cards::sign,
        crate::api::hours_cards::approve,
        crate::api::hours_cards::reject,

        crate::api::notifications::counts
    ),
    components(
        schemas(
            ClockIn,
            ClockOut,
            SignCard,
            RejectCard,
            GeoPoint,
            HoursCard,
            HoursCardStatus,
            OpenCardView,
            CardPage,
            WorkerSummary,
            PendingCounts
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Clock-in and live hours"),
        (name = "Hours Cards", description = "Hours card lifecycle and reporting"),
        (name = "Notifications", description = "Badge counts"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
