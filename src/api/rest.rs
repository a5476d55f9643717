use crate::config::ApiConfig;
use crate::db::models::detection_event_models::{DetectionEvent, PersonDetectionStats};
use crate::db::models::device_models::{DeviceToken, RegisterDeviceRequest};
use crate::db::repositories::detection_events::DetectionEventsRepository;
use crate::db::repositories::device_tokens::DeviceTokensRepository;
use crate::db::DatabaseService;
use crate::error::Error;
use crate::messaging::feed::FeedSubscriber;
use crate::security::auth::AuthService;
use crate::security::sessions::SessionEntry;
use crate::services::monitoring::{CameraStatus, MonitoringService, UpstreamStatus};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub database: Arc<DatabaseService>,
    pub events: DetectionEventsRepository,
    pub devices: DeviceTokensRepository,
    pub monitoring: Arc<MonitoringService>,
    pub feed: Arc<FeedSubscriber>,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
    pub status: u16,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Authentication(_) => ApiError {
                message: err.to_string(),
                status: StatusCode::UNAUTHORIZED.as_u16(),
            },
            Error::NotFound(_) => ApiError {
                message: err.to_string(),
                status: StatusCode::NOT_FOUND.as_u16(),
            },
            Error::AlreadyExists(_) => ApiError {
                message: err.to_string(),
                status: StatusCode::CONFLICT.as_u16(),
            },
            Error::Config(_) | Error::Decode(_) => ApiError {
                message: err.to_string(),
                status: StatusCode::BAD_REQUEST.as_u16(),
            },
            _ => ApiError {
                message: err.to_string(),
                status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            },
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(err) = err.downcast_ref::<Error>() {
            return err.clone().into();
        }

        ApiError {
            message: err.to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Read-only status and auth surface
pub struct RestApi {
    config: ApiConfig,
    state: AppState,
}

impl RestApi {
    pub fn new(config: &ApiConfig, state: AppState) -> Self {
        Self {
            config: config.clone(),
            state,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .max_age(Duration::from_secs(3600));

        let protected = Router::new()
            .route("/api/auth/logout", post(logout))
            .route("/api/devices", post(register_device))
            .route("/api/devices/:token", delete(unregister_device))
            .route("/api/events", get(list_events))
            .route("/api/status/last-event", get(last_event))
            .route("/api/status/cameras", get(camera_status))
            .route("/api/status/detections/person", get(person_stats))
            .route("/api/status/upstream", get(upstream_status))
            .route("/api/status/feed", get(feed_status))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                require_auth,
            ));

        let app = Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/health", get(health))
            .merge(protected)
            .layer(cors)
            .with_state(self.state.clone());

        let addr: SocketAddr = format!("{}:{}", self.config.address, self.config.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid API address: {}", e)))?;

        info!("API server listening on {}", addr);

        axum::Server::bind(&addr)
            .serve(app.into_make_service())
            .await
            .map_err(|e| Error::Service(format!("API server error: {}", e)))?;

        Ok(())
    }
}

/// Bearer-token gate backed by the session cache
async fn require_auth<B>(
    State(state): State<AppState>,
    mut request: Request<B>,
    next: Next<B>,
) -> ApiResult<Response> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::from(Error::Authentication("Missing bearer token".to_string())))?
        .to_string();

    let session = state.auth.authorize(&token).await.map_err(ApiError::from)?;

    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let (token, expires_at) = state.auth.login(&body.username, &body.password).await?;
    Ok(Json(LoginResponse { token, expires_at }))
}

async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<SessionEntry>,
) -> ApiResult<StatusCode> {
    state.auth.logout(&session.token).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn register_device(
    State(state): State<AppState>,
    Extension(session): Extension<SessionEntry>,
    Json(body): Json<RegisterDeviceRequest>,
) -> ApiResult<Json<DeviceToken>> {
    let registration = state
        .devices
        .register(&session.account_id, &body.token, &body.device_name)
        .await?;
    Ok(Json(registration))
}

async fn unregister_device(
    State(state): State<AppState>,
    Extension(session): Extension<SessionEntry>,
    Path(token): Path<String>,
) -> ApiResult<StatusCode> {
    let deleted = state
        .devices
        .delete_for_account(&session.account_id, &token)
        .await?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound("Device token not found".to_string()).into())
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    database: bool,
}

async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let database = state.database.health_check().await?;
    Ok(Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        database,
    }))
}

#[derive(Debug, Deserialize)]
struct EventRangeQuery {
    start: f64,
    end: f64,
}

async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventRangeQuery>,
) -> ApiResult<Json<Vec<DetectionEvent>>> {
    let events = state.events.list_by_time_range(query.start, query.end).await?;
    Ok(Json(events))
}

#[derive(Debug, Deserialize)]
struct LastEventQuery {
    camera: Option<String>,
    label: Option<String>,
}

#[derive(Debug, Serialize)]
struct LastEventResponse {
    last_event_time: f64,
}

async fn last_event(
    State(state): State<AppState>,
    Query(query): Query<LastEventQuery>,
) -> ApiResult<Json<LastEventResponse>> {
    let last_event_time = state
        .events
        .last_event_time(query.camera.as_deref(), query.label.as_deref())
        .await?;
    Ok(Json(LastEventResponse { last_event_time }))
}

async fn camera_status(
    State(state): State<AppState>,
    Extension(session): Extension<SessionEntry>,
) -> ApiResult<Json<CameraStatus>> {
    let token = state.auth.upstream_token(&session.account_id).await?;
    let status = state.monitoring.camera_status(&token).await?;
    Ok(Json(status))
}

async fn person_stats(State(state): State<AppState>) -> ApiResult<Json<PersonDetectionStats>> {
    let stats = state.events.person_detection_stats().await?;
    Ok(Json(stats))
}

async fn upstream_status(
    State(state): State<AppState>,
    Extension(session): Extension<SessionEntry>,
) -> ApiResult<Json<UpstreamStatus>> {
    let token = state.auth.upstream_token(&session.account_id).await?;
    Ok(Json(state.monitoring.upstream_status(&token).await))
}

#[derive(Debug, Serialize)]
struct FeedStatusResponse {
    connected: bool,
}

async fn feed_status(State(state): State<AppState>) -> Json<FeedStatusResponse> {
    Json(FeedStatusResponse {
        connected: state.feed.is_connected(),
    })
}
