use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::PathRejection, Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{generate_api_key, AuthedUser};
use crate::db::{
    CreateFeedFollowParams, CreateFeedParams, CreateUserParams, Database, Feed, FeedFollow,
};
use crate::error::{respond_with_json, ApiError};

pub struct AppState {
    pub db: Arc<Database>,
}

/// Request body shared by the create endpoints. Absent fields decode to
/// their zero values.
#[derive(Debug, Default, Deserialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub feed_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CreatedFeed {
    pub feed: Feed,
    pub feed_follow: FeedFollow,
}

/// Decode a JSON body, falling back to the zero value on any error.
fn decode_lenient<T: DeserializeOwned + Default>(body: &[u8]) -> T {
    serde_json::from_slice(body).unwrap_or_else(|e| {
        debug!("Ignoring undecodable request body: {}", e);
        T::default()
    })
}

/// Build the application router with all `/v1` endpoints mounted.
pub fn router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let v1 = Router::new()
        .route("/readiness", get(readiness))
        .route("/err", get(err))
        .route("/users", post(create_user).get(get_user))
        .route("/feeds", post(create_feed).get(get_feeds))
        .route("/feed_follows", post(create_feed_follow).get(get_feed_follows))
        .route("/feed_follows/:feed_follow_id", delete(delete_feed_follow))
        .with_state(state);

    Router::new().nest("/v1", v1).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(cors_origins)),
    )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {:?}: {}", origin, e);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

// Route handlers
pub async fn readiness() -> Response {
    respond_with_json(StatusCode::OK, &json!({ "status": "ok" }))
}

pub async fn err() -> ApiError {
    ApiError::Internal
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: CreateRequest = decode_lenient(&body);
    let now = Utc::now();
    let params = CreateUserParams {
        id: Uuid::new_v4(),
        created_at: now,
        updated_at: now,
        name: request.name,
        api_key: generate_api_key(),
    };

    let user = state.db.create_user(params).await.map_err(|e| {
        warn!("Failed to create user: {}", e);
        ApiError::Forbidden(e.to_string())
    })?;

    info!("Created user {} ({})", user.name, user.id);
    Ok(respond_with_json(StatusCode::CREATED, &user))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    AuthedUser(user): AuthedUser,
) -> Result<Response, ApiError> {
    let user = state
        .db
        .get_user_by_api_key(&user.api_key)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;

    Ok(respond_with_json(StatusCode::OK, &user))
}

pub async fn create_feed(
    State(state): State<Arc<AppState>>,
    AuthedUser(user): AuthedUser,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: CreateRequest = decode_lenient(&body);
    let now = Utc::now();
    let params = CreateFeedParams {
        id: Uuid::new_v4(),
        created_at: now,
        updated_at: now,
        name: request.name,
        url: request.url,
        user_id: user.id,
    };

    let feed = state.db.create_feed(params).await.map_err(|e| {
        warn!("Failed to create feed for user {}: {}", user.id, e);
        ApiError::NotFound(e.to_string())
    })?;

    let now = Utc::now();
    let follow_params = CreateFeedFollowParams {
        id: Uuid::new_v4(),
        created_at: now,
        updated_at: now,
        user_id: user.id,
        feed_id: feed.id,
    };

    let feed_follow = state.db.create_feed_follow(follow_params).await.map_err(|e| {
        warn!("Failed to auto-follow feed {}: {}", feed.id, e);
        ApiError::NotFound(e.to_string())
    })?;

    info!("User {} created feed {} ({})", user.id, feed.name, feed.url);
    Ok(respond_with_json(
        StatusCode::CREATED,
        &CreatedFeed { feed, feed_follow },
    ))
}

pub async fn get_feeds(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let feeds = state
        .db
        .get_all_feeds()
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;

    Ok(respond_with_json(StatusCode::OK, &feeds))
}

pub async fn create_feed_follow(
    State(state): State<Arc<AppState>>,
    AuthedUser(user): AuthedUser,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: CreateRequest = decode_lenient(&body);
    let now = Utc::now();
    let params = CreateFeedFollowParams {
        id: Uuid::new_v4(),
        created_at: now,
        updated_at: now,
        user_id: user.id,
        feed_id: request.feed_id,
    };

    let feed_follow = state.db.create_feed_follow(params).await.map_err(|e| {
        warn!("Failed to follow feed {} for user {}: {}", request.feed_id, user.id, e);
        ApiError::NotFound(e.to_string())
    })?;

    Ok(respond_with_json(StatusCode::CREATED, &feed_follow))
}

pub async fn delete_feed_follow(
    State(state): State<Arc<AppState>>,
    feed_follow_id: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    // Undecodable path segments are reported like any other bad id.
    let Path(feed_follow_id) =
        feed_follow_id.map_err(|rejection| ApiError::NotFound(rejection.body_text()))?;
    let id = Uuid::parse_str(&feed_follow_id).map_err(|e| ApiError::NotFound(e.to_string()))?;

    state.db.delete_feed_follow(id).await.map_err(|e| {
        warn!("Failed to delete feed follow {}: {}", id, e);
        ApiError::NotFound(e.to_string())
    })?;

    Ok(StatusCode::OK)
}

pub async fn get_feed_follows(
    State(state): State<Arc<AppState>>,
    AuthedUser(user): AuthedUser,
) -> Result<Response, ApiError> {
    let follows = state
        .db
        .get_feed_follows_for_user(user.id)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;

    Ok(respond_with_json(StatusCode::OK, &follows))
}
