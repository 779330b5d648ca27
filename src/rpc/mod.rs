//! HTTP/JSON front end for an oracle instance.
//!
//! Requires the `rpc-server` feature. Gated routes read the caller from the
//! `x-principal` header; read-only routes take no caller.
//!
//! | Method | Path | Operation |
//! |---|---|---|
//! | GET | `/health` | statistics |
//! | GET | `/price` | latest aggregate |
//! | GET | `/prices` | live samples |
//! | GET | `/sources` | source listing |
//! | GET | `/sources/:id` | one source |
//! | POST | `/sources` | register a source |
//! | DELETE | `/sources/:id` | remove a source |
//! | PUT | `/sources/:id/weight` | change weight |
//! | PUT | `/sources/:id/active` | activate / deactivate |
//! | POST | `/recompute` | publish a new aggregate |
//! | POST | `/deviation/check` | deviation check |
//! | PUT | `/deviation/threshold` | change threshold |
//! | POST | `/roles/grant` | grant a role |
//! | POST | `/roles/revoke` | revoke a role |

pub mod handlers;
pub mod middleware;

pub use middleware::*;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::oracle::OracleAggregator;

/// Shared handler state
pub type AppState = Arc<OracleAggregator>;

/// Build the router for `oracle`
pub fn router(oracle: AppState) -> Router {
    Router::new()
        // Health & reads
        .route("/health", get(handlers::health))
        .route("/price", get(handlers::get_price))
        .route("/prices", get(handlers::get_prices))
        .route("/sources", get(handlers::list_sources).post(handlers::add_source))
        .route(
            "/sources/:id",
            get(handlers::get_source).delete(handlers::remove_source),
        )
        .route("/sources/:id/weight", put(handlers::update_weight))
        .route("/sources/:id/active", put(handlers::set_active))
        // Aggregation & deviation
        .route("/recompute", post(handlers::recompute))
        .route("/deviation/check", post(handlers::check_deviation))
        .route("/deviation/threshold", put(handlers::update_threshold))
        // Roles
        .route("/roles/grant", post(handlers::grant_role))
        .route("/roles/revoke", post(handlers::revoke_role))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(oracle)
}
