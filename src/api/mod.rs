//! REST API layer: route handlers, DTOs, router composition and the
//! OpenAPI document.

pub mod dto;
pub mod handlers;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI description of every relay endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "pool-relay", description = "WebRTC data channel signaling and broadcast relay"),
    paths(
        handlers::pool::list_pools,
        handlers::pool::create_pool,
        handlers::pool::get_pool,
        handlers::pool::join_pool,
        handlers::pool::close_session,
        handlers::system::health_handler,
        handlers::system::metrics_handler,
    ),
    tags(
        (name = "Pools", description = "Pool registry"),
        (name = "Sessions", description = "Peer sessions within a pool"),
        (name = "System", description = "Health and metrics"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = handlers::routes();

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    #[cfg(not(feature = "swagger-ui"))]
    let router = router.route(
        "/api-docs/openapi.json",
        axum::routing::get(|| async { axum::Json(ApiDoc::openapi()) }),
    );

    router
}

/// Builds the served application: routes, tracing, permissive CORS and
/// state.
pub fn app(state: AppState) -> Router {
    build_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
