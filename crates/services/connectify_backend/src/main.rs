// File: services/connectify_backend/src/main.rs
use axum::{extract::State, routing::get, Json, Router};
use connectify_backend::app_state::AppState;
use connectify_backend::background::{self, TickOptions};
use connectify_common::logging;
use connectify_config::load_config;
use connectify_gcal_sync::routes as gcal_sync_routes;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

async fn health(State(state): State<Option<AppState>>) -> Json<Value> {
    let database = match &state {
        Some(state) => Some(state.db_client.is_healthy().await),
        None => None,
    };
    Json(json!({ "status": "ok", "database": database }))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    let config = match load_config() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            eprintln!("Failed to load config: {}", err);
            std::process::exit(1);
        }
    };
    let _log_guard = logging::init(&config.logging);

    let state = if config.use_gcal_sync {
        match AppState::initialize(config.clone()).await {
            Ok(state) => Some(state),
            Err(err) => {
                error!("Calendar sync could not be initialized: {}", err);
                std::process::exit(1);
            }
        }
    } else {
        warn!("Calendar sync is disabled (use_gcal_sync = false)");
        None
    };

    let api_router = Router::new()
        .route("/", get(|| async { "Welcome to Connectify-Rs API!" }))
        .route("/health", get(health))
        .with_state(state.clone());

    let api_router = Router::new().nest("/api", {
        let mut router = api_router;
        if let Some(state) = &state {
            router = router.merge(gcal_sync_routes::routes(state.gcal_sync_state()));
        }
        router
    });

    #[allow(unused_mut)]
    let mut app = api_router;

    // Swagger UI and JSON endpoint when the openapi feature is enabled
    #[cfg(feature = "openapi")]
    {
        use connectify_gcal_sync::doc::GcalSyncApiDoc;
        use utoipa::OpenApi;
        use utoipa_swagger_ui::SwaggerUi;

        #[derive(OpenApi)]
        #[openapi(
            info(
                title = "Connectify API",
                version = "0.1.0",
                description = "Connectify calendar sync API",
                license(name = "MIT", url = "https://opensource.org/licenses/MIT")
            ),
            components(),
            tags( (name = "Connectify", description = "Core service endpoints")),
            servers( (url = "/api", description = "Main API Prefix")),
        )]
        struct ApiDoc;

        let mut openapi_doc = ApiDoc::openapi();
        openapi_doc.merge(GcalSyncApiDoc::openapi());
        info!("Adding Swagger UI at /api/docs");

        let swagger_ui = SwaggerUi::new("/api/docs").url("/api/docs/openapi.json", openapi_doc);
        app = app.merge(swagger_ui);
    }

    let app = app.layer(TraceLayer::new_for_http());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = match &state {
        Some(state) if config.worker.enabled => Some(background::spawn(
            state.gcal_sync.clone(),
            TickOptions {
                max_items: config.worker.batch_size,
                specialist_id: None,
                reap: true,
            },
            Duration::from_secs(config.worker.poll_interval_secs.max(1)),
            shutdown_rx,
        )),
        _ => None,
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("Failed to bind {}: {}", addr, err);
            std::process::exit(1);
        }
    };
    info!("Starting server at http://{}", addr);
    info!("API endpoints available at http://{}/api", addr);

    if let Err(err) = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
    }

    let _ = shutdown_tx.send(true);
    if let Some(worker) = worker {
        if let Err(err) = worker.await {
            warn!("Queue worker ended abnormally: {}", err);
        }
    }
}
