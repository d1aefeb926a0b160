//! HTTP surfaces for each service role.
//!
//! Endpoints:
//! - `POST /feeds` (command): create a feed
//! - `GET /feeds`, `GET /search?q=` (query): read the search projection
//! - `GET /ws` (pusher): websocket stream of created feeds
//! - `GET /health` (every role)
//!
//! Each `*_routes` function returns the role's endpoints only, so roles can
//! be merged into one router before [`app`] adds the shared layers.

mod command;
mod pusher;
mod query;

pub use command::command_routes;
pub use pusher::pusher_routes;
pub use query::{query_routes, SearchParams};

use ::http::{Method, StatusCode};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::command::FeedCommandHandler;
use crate::projectors::NotificationHub;
use crate::query::FeedQuery;

/// Add `/health`, CORS and request tracing to a set of role routes.
pub fn app(routes: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    routes
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Router for the command role.
pub fn command_router(handler: FeedCommandHandler) -> Router {
    app(command_routes(handler))
}

/// Router for the query role.
pub fn query_router(query: FeedQuery) -> Router {
    app(query_routes(query))
}

/// Router for the pusher role.
pub fn pusher_router(hub: NotificationHub) -> Router {
    app(pusher_routes(hub))
}

async fn health() -> StatusCode {
    StatusCode::OK
}
