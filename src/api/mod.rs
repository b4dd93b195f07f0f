// REST API endpoints for the identity gate

use axum::{
    Router,
    extract::{
        DefaultBodyLimit, Multipart, Path, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{
    AuthError, AuthService, ErrorBody, Identity, LinkStore, UserContext, UserStore,
    require_session,
};
use crate::config::AuthConfig;
use crate::db::{Db, ImageCreate, ImageMeta, Insert, InvalidImage, MAX_IMAGE_BYTES, UserCreate};
use crate::images::{ImageStore, SurrealImageStore};
use crate::types::{ChannelId, Credentials, UserId};

/// Multipart field carrying the uploaded file.
pub const IMAGE_FIELD: &str = "fileKey";

/// Request body cap for uploads: the image plus multipart framing.
const IMAGE_BODY_LIMIT: usize = MAX_IMAGE_BYTES + 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub users: Arc<UserStore>,
    pub images: Arc<dyn ImageStore>,
}

impl AppState {
    /// Wire the stores and the auth service over one database handle.
    pub fn new(db: Db, config: &AuthConfig) -> Self {
        let users = Arc::new(UserStore::new(db.clone()));
        let links = Arc::new(LinkStore::new(db.clone()));
        let images = Arc::new(SurrealImageStore::new(db));
        let auth = Arc::new(AuthService::new(config, users.clone(), links));
        Self {
            auth,
            users,
            images,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/user/me", get(current_user))
        .route("/user/{id}", get(get_user))
        .route(
            "/image/add",
            post(add_image).layer(DefaultBodyLimit::max(IMAGE_BODY_LIMIT)),
        )
        .route("/image/list", get(list_images))
        .route("/image/{key}", get(get_image))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_session,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/user/auth", post(authorize))
        .route("/user/add", post(add_user))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Failures surfaced by handlers, rendered as `{message, error: true}`.
#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    TooLarge(String),
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth(err) => write!(f, "{}", err),
            Self::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            Self::NotFound(msg) | Self::Conflict(msg) | Self::TooLarge(msg) => write!(f, "{}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::TooLarge(err.body_text())
        } else {
            Self::BadRequest(err.body_text())
        }
    }
}

impl From<InvalidImage> for ApiError {
    fn from(err: InvalidImage) -> Self {
        match err {
            InvalidImage::TooLarge(_) => Self::TooLarge(err.to_string()),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Auth(err) => return err.clone().into_response(),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody::new("Internal server error")),
                )
                    .into_response();
            }
        };
        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub login: String,
    pub password: String,
}

/// Success envelope mirroring the error payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
    pub error: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddUserRequest {
    pub name: String,
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub identity: Identity,
    pub channels: Vec<ChannelId>,
    /// Validity window of the caller's own token; only on `/user/me`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionWindow>,
}

#[derive(Debug, Serialize)]
pub struct SessionWindow {
    pub issued_at: i64,
    pub expires_at: i64,
}

async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn authorize(
    State(state): State<AppState>,
    payload: Result<Json<AuthRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = payload?;
    let credentials = Credentials::new(request.login, request.password);

    let token = state.auth.authorize(&credentials).await?;

    Ok(Json(MessageResponse {
        message: token,
        error: false,
    }))
}

async fn add_user(
    State(state): State<AppState>,
    payload: Result<Json<AddUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Identity>), ApiError> {
    let Json(request) = payload?;

    let create = UserCreate::new(
        request.login,
        request.password,
        request.name,
        request.description,
    )
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    match state.users.create_user(&create).await? {
        Insert::Created(identity) => Ok((StatusCode::CREATED, Json(identity))),
        Insert::Conflict => Err(ApiError::Conflict(format!(
            "Login {} is already taken",
            create.login()
        ))),
    }
}

async fn current_user(
    State(state): State<AppState>,
    ctx: UserContext,
) -> Result<Json<ProfileResponse>, ApiError> {
    let mut response = profile(&state, ctx.user_id()).await?;
    response.session = ctx
        .issued_at()
        .zip(ctx.expires_at())
        .map(|(issued_at, expires_at)| SessionWindow {
            issued_at,
            expires_at,
        });
    Ok(Json(response))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    _ctx: UserContext,
) -> Result<Json<ProfileResponse>, ApiError> {
    profile(&state, UserId::new(id)).await.map(Json)
}

async fn profile(state: &AppState, user_id: UserId) -> Result<ProfileResponse, ApiError> {
    let identity = state.auth.identity(user_id).await?;
    let channels = state.auth.linked_channels(user_id).await?;
    Ok(ProfileResponse {
        identity,
        channels,
        session: None,
    })
}

/// Store the `fileKey` part of a multipart upload for the caller.
async fn add_image(
    State(state): State<AppState>,
    ctx: UserContext,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<ImageMeta>), ApiError> {
    let mut multipart = multipart?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or("image").to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let data = field.bytes().await?;

        let upload = ImageCreate::new(ctx.user_id(), name, &content_type, data.to_vec())?;
        let meta = state.images.put(&upload).await?;
        return Ok((StatusCode::CREATED, Json(meta)));
    }

    Err(ApiError::BadRequest(format!(
        "missing multipart field {:?}",
        IMAGE_FIELD
    )))
}

async fn list_images(
    State(state): State<AppState>,
    ctx: UserContext,
) -> Result<Json<Vec<ImageMeta>>, ApiError> {
    let images = state.images.list(ctx.user_id()).await?;
    Ok(Json(images))
}

/// Raw image bytes. Other users' images are reported as missing.
async fn get_image(
    State(state): State<AppState>,
    Path(key): Path<String>,
    ctx: UserContext,
) -> Result<Response, ApiError> {
    match state.images.fetch(&key).await? {
        Some(image) if image.meta.user_id == ctx.user_id() => Ok((
            [(header::CONTENT_TYPE, image.meta.content_type)],
            image.data,
        )
            .into_response()),
        _ => Err(ApiError::NotFound(format!("Image {} not found", key))),
    }
}
