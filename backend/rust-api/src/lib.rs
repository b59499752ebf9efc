use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    // JSON-only API: nothing may be loaded or framed from its responses.
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    response.headers_mut().insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    // The presentation layer runs on its own origin
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::RETRY_AFTER])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler).layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::metrics_auth_middleware,
            )),
        )
        .nest("/api/v1", api_routes(app_state.clone()))
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(csp_middleware))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn api_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Settings change the shared AI credential and require admin Basic Auth
    let settings_routes = Router::new()
        .route(
            "/settings/ai",
            get(handlers::settings::get_ai_settings).put(handlers::settings::update_ai_settings),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::admin_auth_middleware,
        ));

    Router::new()
        .route("/sessions", post(handlers::sessions::create_session))
        .route(
            "/sessions/{id}",
            get(handlers::sessions::get_session).delete(handlers::sessions::delete_session),
        )
        .route(
            "/sessions/{id}/ticket",
            post(handlers::sessions::generate_ticket).delete(handlers::sessions::reset_ticket),
        )
        .route(
            "/sessions/{id}/solution",
            put(handlers::sessions::submit_solution),
        )
        .route("/sessions/{id}/hints", post(handlers::sessions::request_hint))
        .route(
            "/sessions/{id}/evaluation",
            post(handlers::sessions::request_evaluation),
        )
        .merge(settings_routes)
}
