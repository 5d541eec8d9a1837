use crate::{
    api::{attendance, hours_cards, notifications},
    auth::middleware::auth_middleware,
    config::Config,
    realtime::socket,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Helper to build per-scope limiter
fn build_limiter(requests_per_min: u32) -> anyhow::Result<Governor<PeerIpKeyExtractor, NoOpMiddleware>> {
    let requests_per_min = requests_per_min.max(1);
    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request((60_000 / u64::from(requests_per_min)).max(1))
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("invalid rate limit of {requests_per_min}/min"))?;
    Ok(Governor::new(&cfg))
}

/// Limiters are built once per server so every worker shares the same quota.
#[derive(Clone)]
pub struct Limiters {
    protected: Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>,
    socket: Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>,
}

impl Limiters {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            protected: Arc::new(build_limiter(config.rate_protected_per_min)?),
            socket: Arc::new(build_limiter(config.rate_socket_per_min)?),
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: Limiters) {
    // Live updates; token is checked by the handler before the upgrade
    cfg.service(
        web::resource("/ws")
            .wrap(limiters.socket)
            .route(web::get().to(socket::ws_connect)),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            // authentication
            .wrap(limiters.protected) // rate limiting
            .service(
                web::scope("/attendance")
                    // /attendance/clock-in
                    .service(web::resource("/clock-in").route(web::post().to(attendance::clock_in)))
                    // /attendance/open
                    .service(web::resource("/open").route(web::get().to(attendance::open_card))),
            )
            .service(
                web::scope("/hours-cards")
                    // /hours-cards
                    .service(web::resource("").route(web::get().to(hours_cards::list_cards)))
                    // /hours-cards/summary (before /{id})
                    .service(web::resource("/summary").route(web::get().to(hours_cards::summary)))
                    // /hours-cards/{id}
                    .service(web::resource("/{id}").route(web::get().to(hours_cards::get_card)))
                    .service(
                        web::resource("/{id}/clock-out").route(web::post().to(hours_cards::clock_out)),
                    )
                    .service(web::resource("/{id}/sign").route(web::post().to(hours_cards::sign)))
                    .service(
                        web::resource("/{id}/approve").route(web::post().to(hours_cards::approve)),
                    )
                    .service(
                        web::resource("/{id}/reject").route(web::post().to(hours_cards::reject)),
                    ),
            )
            .service(
                web::scope("/notifications")
                    .service(web::resource("/counts").route(web::get().to(notifications::counts))),
            ),
    );
}
