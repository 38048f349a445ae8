use actix_web::{middleware::Compress, web, App, HttpServer};
use actix_cors::Cors;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;
use tracing_actix_web::TracingLogger;

use anonboard::settings::AppConfig;
use anonboard::hasher::Argon2Hasher;
use anonboard::openapi::ApiDoc;
use anonboard::rate_limit::{InMemoryRateLimiter, RateLimiterFacade};
use anonboard::repo::RecordStore;
use anonboard::{config, AppState, SecurityHeaders};

#[cfg(not(any(feature = "inmem-store", feature = "postgres-store")))]
compile_error!("enable the `inmem-store` or `postgres-store` feature");

const DEV_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://127.0.0.1:3000",
    "http://localhost:5173",
    "http://127.0.0.1:5173",
];

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // .env only in debug builds; deployments set the environment themselves
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping message board server");
    let cfg = AppConfig::from_env()?;

    #[cfg(feature = "postgres-store")]
    let pg = anonboard::repo::pg::PgRepo::connect(cfg.require_database_url()?, cfg.db_max_connections).await?;
    #[cfg(feature = "postgres-store")]
    let store: Arc<dyn RecordStore> = {
        info!("Using Postgres record store");
        Arc::new(pg.clone())
    };

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let store: Arc<dyn RecordStore> = {
        info!(data_dir = %cfg.data_dir.display(), "Using in-memory record store");
        Arc::new(anonboard::repo::inmem::InMemRepo::with_snapshot_dir(&cfg.data_dir))
    };

    let hasher = Arc::new(Argon2Hasher::new(cfg.hash_cost)?);
    let mut state = AppState::new(store, hasher);
    if let Some(rl) = cfg.rate_limit.clone() {
        info!(?rl, "Rate limiting enabled");
        state = state.with_rate_limiter(RateLimiterFacade::new(InMemoryRateLimiter::new(), rl));
    }
    warn!("/_api/delete-all-threads is reachable without authentication");

    let openapi = ApiDoc::openapi();
    let state = web::Data::new(state);
    let cors_origins = cfg.cors_origins.clone();
    let enable_hsts = cfg.enable_hsts;

    let server = HttpServer::new(move || {
        let cors = DEV_ORIGINS
            .iter()
            .copied()
            .chain(cors_origins.iter().map(String::as_str))
            .fold(Cors::default(), |c, origin| c.allowed_origin(origin))
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::new(enable_hsts))
            .wrap(cors)
            .app_data(state.clone())
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind((cfg.bind_addr.as_str(), cfg.port))?;

    info!("Listening on http://{}:{}", cfg.bind_addr, cfg.port);

    server.run().await?;

    #[cfg(feature = "postgres-store")]
    pg.close().await;
    info!("Server stopped");
    Ok(())
}
