use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::error;

use crate::models::Feed;
use crate::query::FeedQuery;

/// Query string of `GET /search`.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

/// `GET /feeds` and `GET /search`.
pub fn query_routes(query: FeedQuery) -> Router {
    Router::new()
        .route("/feeds", get(list_feeds))
        .route("/search", get(search_feeds))
        .with_state(query)
}

async fn list_feeds(State(query): State<FeedQuery>) -> Result<Json<Vec<Feed>>, StatusCode> {
    let feeds = query.list().await.map_err(|e| {
        error!(error = %e, "Failed to list feeds");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(feeds))
}

async fn search_feeds(
    State(query): State<FeedQuery>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Feed>>, (StatusCode, String)> {
    let text = params.q.trim();
    if text.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "missing query parameter q".to_string()));
    }

    let feeds = query.search(text).await.map_err(|e| {
        error!(error = %e, query = %text, "Failed to search feeds");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok(Json(feeds))
}
