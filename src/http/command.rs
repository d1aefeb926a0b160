use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use tracing::{error, warn};

use crate::command::{CommandError, CreateFeed, FeedCommandHandler};
use crate::models::Feed;

/// `POST /feeds`.
pub fn command_routes(handler: FeedCommandHandler) -> Router {
    Router::new()
        .route("/feeds", post(create_feed))
        .with_state(handler)
}

async fn create_feed(
    State(handler): State<FeedCommandHandler>,
    Json(command): Json<CreateFeed>,
) -> Result<(StatusCode, Json<Feed>), (StatusCode, String)> {
    match handler.create(command).await {
        Ok(feed) => Ok((StatusCode::CREATED, Json(feed))),
        Err(CommandError::Invalid(reason)) => {
            warn!(reason = %reason, "Rejected create feed");
            Err((StatusCode::BAD_REQUEST, reason))
        }
        Err(e) => {
            error!(error = %e, "Failed to create feed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
