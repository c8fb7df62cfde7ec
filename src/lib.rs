pub mod api;
pub mod config;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::api::error::AppError;
use crate::config::ServiceConfig;
use crate::services::engine::{EngineGate, SeparationEngine};
use crate::services::retrieval::RetrievalService;
use crate::services::separation::SeparationService;
use crate::services::workspace::WorkspaceManager;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::separate::separate_audio,
        api::handlers::files::serve_stem,
        api::handlers::files::download_file,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::separate::SeparateResponse,
            api::handlers::separate::SeparateForm,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "separation", description = "Stem separation jobs"),
        (name = "files", description = "Stem and upload retrieval"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

/// Process-wide context shared by all handlers. Built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub separation: Arc<SeparationService>,
    pub retrieval: Arc<RetrievalService>,
    pub config: ServiceConfig,
}

impl AppState {
    /// Wires the services around an already loaded engine.
    pub fn new(config: ServiceConfig, engine: Arc<dyn SeparationEngine>) -> Self {
        let workspaces = WorkspaceManager::new(config.storage_root.clone());
        let gate = EngineGate::new(engine, config.engine_concurrency, config.engine_timeout);

        Self {
            separation: Arc::new(SeparationService::new(
                workspaces.clone(),
                gate,
                config.max_upload_size as u64,
            )),
            retrieval: Arc::new(RetrievalService::new(workspaces)),
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    // Multipart framing on top of the file; the file itself is capped while streaming
    let body_limit = state.config.max_upload_size + 1024 * 1024;

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/separate/",
            post(api::handlers::separate::separate_audio).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/separate",
            post(api::handlers::separate::separate_audio).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/static/:workspace_id/:filename",
            get(api::handlers::files::serve_stem),
        )
        .route(
            "/download/:workspace_id/:filename",
            get(api::handlers::files::download_file),
        )
        .fallback(|| async { AppError::NotFound("No such route".to_string()) })
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}
