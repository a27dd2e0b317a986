use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use cinerec::services::scoring::interaction_delta;
use cinerec::utils::{sanitize_string, validation};
use cinerec::{init_tracing, AppError, AppResult, AppState, Config};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

const MAX_COMMENT_LENGTH: usize = 2000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionBody {
    user_id: String,
    action: String,
    movie_id: u64,
    rating: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RecommendQuery {
    user: String,
    page: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InteractionBody {
    user_id: String,
    action: String,
    rating: Option<i64>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    query: String,
    page: Option<u32>,
}

#[derive(Debug, Serialize)]
struct InteractionResponse {
    success: bool,
}

async fn health_check() -> Json<HashMap<String, String>> {
    let mut status = HashMap::new();
    status.insert("status".to_string(), "healthy".to_string());
    status.insert("service".to_string(), "cinerec".to_string());
    status.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());

    Json(status)
}

/// Fire-and-forget ingestion: validate, publish durably, return the request
/// id. The caller never waits for scoring; a broker failure is surfaced, an
/// invalid request is rejected before anything is published.
async fn record_action(
    State(state): State<AppState>,
    Json(body): Json<ActionBody>,
) -> AppResult<Json<cinerec::ActionResponse>> {
    validation::validate_user_id(&body.user_id)?;
    let action = validation::parse_action(&body.action)?;
    let rating = validation::validate_rating(action, body.rating)?;

    let event = cinerec::InteractionEvent::new(body.user_id, action, body.movie_id, rating);
    state.queue_producer.publish_action(&event).await?;

    Ok(Json(cinerec::ActionResponse {
        message: "Action recorded".to_string(),
        req_id: event.req_id,
    }))
}

/// Enqueues the request for the worker pipeline, then answers best-effort
/// from current score state. Scores still in flight on the queue simply
/// miss this response; the next read picks them up.
async fn recommend(
    State(state): State<AppState>,
    Query(params): Query<RecommendQuery>,
) -> AppResult<Json<cinerec::RecommendResponse>> {
    validation::validate_user_id(&params.user)?;
    let page = params.page.unwrap_or(1);

    let request = cinerec::RecommendationRequest::new(params.user.clone());
    state
        .queue_producer
        .publish_recommendation_request(&request)
        .await?;

    let recommendations = state.assembler.assemble(&params.user, page).await?;

    Ok(Json(cinerec::RecommendResponse {
        req_id: request.req_id,
        recommendations,
    }))
}

/// Direct interaction writes (like / rate / comment) from the item surface.
/// Only the scoring side effect lives here: the delta is folded into the
/// score store atomically, exactly as the queued path does it.
async fn record_interaction(
    State(state): State<AppState>,
    Path(movie_id): Path<u64>,
    Json(body): Json<InteractionBody>,
) -> AppResult<Json<InteractionResponse>> {
    validation::validate_user_id(&body.user_id)?;
    let kind = validation::parse_interaction(&body.action)?;
    let rating = validation::validate_interaction_rating(kind, body.rating)?;

    if kind == cinerec::ItemInteraction::Comment {
        let text = body.text.as_deref().unwrap_or("");
        if sanitize_string(text, MAX_COMMENT_LENGTH).trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "comment text cannot be empty".to_string(),
            ));
        }
    }

    let delta = interaction_delta(kind, rating);
    if delta != 0.0 {
        state
            .score_store
            .increment(movie_id, &body.user_id, delta)
            .await?;
    }

    info!(
        "Recorded {:?} on movie {} by user {} (delta {})",
        kind, movie_id, body.user_id, delta
    );

    Ok(Json(InteractionResponse { success: true }))
}

async fn search_movies(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> AppResult<Json<cinerec::MoviePage>> {
    let page = params.page.unwrap_or(1);
    let results = state.catalog.search(&params.query, page).await?;
    Ok(Json(results))
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "health": "ok" }))
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/v1/action", post(record_action))
        .route("/api/v1/recommend", get(recommend))
        .route("/api/v1/movies/:id/interactions", post(record_interaction))
        .route("/api/v1/movies/search", get(search_movies))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing().await;

    let config = if std::path::Path::new("config/default.toml").exists() {
        Config::from_file("config/default")?
    } else {
        Config::default()
    };
    info!("Starting cinerec server with config: {:?}", config.server);

    let state = AppState::new(config.clone())?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.server.socket_addr()).await?;
    info!("Server listening on {}", config.server.socket_addr());

    axum::serve(listener, app).await?;

    Ok(())
}
