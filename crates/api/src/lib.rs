//! HTTP API server for the marketplace order engine.
//!
//! Exposes checkout, fulfillment and listing endpoints behind a CID identity
//! middleware, with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, patch, post};
use checkout::CheckoutOrchestrator;
use domain::{FulfillmentService, IdentityResolver};
use metrics_exporter_prometheus::PrometheusHandle;
use store::MarketStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, LogFormat};
pub use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: MarketStore>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let orders = Router::new()
        .route("/orders/buy", post(routes::orders::buy::<S>))
        .route("/orders/cart-checkout", post(routes::orders::cart_checkout::<S>))
        .route("/orders/checkout", post(routes::orders::batch_checkout::<S>))
        .route("/orders/scan", post(routes::orders::scan::<S>))
        .route("/orders/my", get(routes::orders::my_orders::<S>))
        .route("/orders/seller", get(routes::orders::seller_orders::<S>))
        .route("/orders/shipped", get(routes::orders::shipped_orders::<S>))
        .route("/orders/transporter", get(routes::orders::transporter_orders::<S>))
        .route("/orders/transport-search", get(routes::orders::transport_search::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/confirm", patch(routes::orders::confirm::<S>))
        .route("/orders/{id}/shipped", patch(routes::orders::ship::<S>))
        .route(
            "/orders/{id}/out-for-delivery",
            patch(routes::orders::accept_for_transport::<S>),
        )
        .route("/orders/{id}/picked-up", patch(routes::orders::pick_up::<S>))
        .route("/orders/{id}/delivered", patch(routes::orders::deliver::<S>))
        .route("/orders/{id}/cancel", patch(routes::orders::cancel::<S>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_identity::<S>,
        ))
        .with_state(state);

    Router::new()
        .route("/health", get(routes::health::check))
        .merge(orders)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over a store.
pub fn create_default_state<S: MarketStore>(store: S) -> Arc<AppState<S>> {
    Arc::new(AppState {
        checkout: CheckoutOrchestrator::new(store.clone()),
        fulfillment: FulfillmentService::new(store.clone()),
        identity: IdentityResolver::new(store),
    })
}
