use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use workforce::Services;
use workforce::config::{Config, StorageKind};
use workforce::db::init_db;
use workforce::docs::ApiDoc;
use workforce::routes::{self, Limiters};
use workforce::store::{AttendanceRepository, CounterSource, MemoryStore, MySqlStore};
use workforce::utils::clock::SystemClock;

#[get("/")]
async fn index() -> impl Responder {
    "Workforce attendance service"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    info!(storage = ?config.storage, addr = %config.server_addr, "Server starting...");

    let (repo, counts): (Arc<dyn AttendanceRepository>, Arc<dyn CounterSource>) = match config.storage {
        StorageKind::MySql => {
            let url = config.database_url.as_deref().context("DATABASE_URL must be set")?;
            let store = Arc::new(MySqlStore::new(init_db(url).await?));
            (store.clone(), store)
        }
        StorageKind::Memory => {
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store)
        }
    };

    let services = Services::new(repo, counts, Arc::new(SystemClock), &config);
    services.realtime.spawn_dispatcher();

    let limiters = Limiters::from_config(&config)?;
    let server_addr = config.server_addr.clone();
    let workflow = Data::new(services.workflow);
    let realtime = Data::new(services.realtime);
    let config_data = Data::new(config);

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(config_data.clone())
            .app_data(workflow.clone())
            .app_data(realtime.clone())
            .service(index)
            // protected routes and the socket endpoint, each with its own limiter
            .configure(|cfg| routes::configure(cfg, &config_data, limiters.clone()))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await?;

    info!("Server stopped");
    Ok(())
}
