use axum::extract::{Multipart, Path, Query, State};
use axum::{Json, http::StatusCode, response::IntoResponse};
use axum_extra::extract::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::{
    AppState,
    auth::{Session, resolve_session},
    error::ApiError,
    models::{CheckoutSession, Coach, ContentView, EventDetailsUpdate, RegistrationRequest},
    registration::CheckoutOutcome,
    upload::ImageFile,
};

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ImageUploadResponse {
    pub url: String,
}

/// Multipart body of an image upload.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ImageUploadForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutOutcomeRequest {
    pub outcome: CheckoutOutcome,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckoutRedirect {
    pub redirect: Option<String>,
    pub message: Option<String>,
}

fn session(
    state: &AppState,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    query: &TokenQuery,
) -> Result<Session, ApiError> {
    let auth_header = auth.map(|TypedHeader(a)| a);
    resolve_session(&state.settings, auth_header, query.token.as_deref())
}

/// Non-admin callers get a 403 without reaching the store's shared error.
fn require_admin(session: &Session) -> Result<(), ApiError> {
    if session.is_admin {
        return Ok(());
    }
    Err(ApiError::Forbidden(
        "You don't have permission to update content.".into(),
    ))
}

#[utoipa::path(get, path = "/", tag = "site")]
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Masterclass Site API",
        "endpoints": {
            "/content": "Live event details and coach roster",
            "/register": "Register and open a payment checkout",
            "/docs": "API documentation"
        }
    }))
}

#[utoipa::path(get, path = "/healthz/live", tag = "site")]
pub async fn healthz_live() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[utoipa::path(
    get,
    path = "/healthz/ready",
    responses(
        (status = 200, description = "First content snapshot applied"),
        (status = 503, description = "Content still loading")
    ),
    tag = "site"
)]
pub async fn healthz_ready(State(state): State<AppState>) -> impl IntoResponse {
    if state.content.is_loading() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "loading"})),
        );
    }
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

#[utoipa::path(
    get,
    path = "/content",
    params(
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    responses(
        (status = 200, description = "Current content", body = ContentView),
        (status = 401, description = "Invalid authentication token")
    ),
    tag = "content"
)]
pub async fn get_content(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<ContentView>, ApiError> {
    let session = session(&state, auth, &query)?;
    Ok(Json(state.content.view(&session)))
}

#[utoipa::path(
    patch,
    path = "/content/event-details",
    params(
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    request_body = EventDetailsUpdate,
    responses(
        (status = 200, description = "Updated content", body = ContentView),
        (status = 401, description = "Invalid authentication token"),
        (status = 403, description = "Caller may not edit content"),
        (status = 502, description = "Remote store rejected the write")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "content"
)]
pub async fn update_event_details(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<TokenQuery>,
    Json(update): Json<EventDetailsUpdate>,
) -> Result<Json<ContentView>, ApiError> {
    let session = session(&state, auth, &query)?;
    require_admin(&session)?;
    state.content.update_event_details(&session, update).await?;
    Ok(Json(state.content.view(&session)))
}

#[utoipa::path(
    post,
    path = "/content/event-details/edit-mode",
    params(
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    responses(
        (status = 200, description = "Edit mode toggled", body = ContentView),
        (status = 403, description = "Caller may not edit content")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "content"
)]
pub async fn toggle_event_edit_mode(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<ContentView>, ApiError> {
    let session = session(&state, auth, &query)?;
    require_admin(&session)?;
    state.content.toggle_event_edit_mode(&session);
    Ok(Json(state.content.view(&session)))
}

#[utoipa::path(
    put,
    path = "/content/coaches",
    params(
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    request_body = [Coach],
    responses(
        (status = 200, description = "Roster replaced", body = ContentView),
        (status = 403, description = "Caller may not edit content"),
        (status = 502, description = "Remote store rejected the write")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "content"
)]
pub async fn update_coaches(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<TokenQuery>,
    Json(roster): Json<Vec<Coach>>,
) -> Result<Json<ContentView>, ApiError> {
    let session = session(&state, auth, &query)?;
    require_admin(&session)?;
    state.content.update_coaches(&session, roster).await?;
    Ok(Json(state.content.view(&session)))
}

#[utoipa::path(
    post,
    path = "/content/coaches/edit-mode",
    params(
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    responses(
        (status = 200, description = "Edit mode toggled", body = ContentView),
        (status = 403, description = "Caller may not edit content")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "content"
)]
pub async fn toggle_coaches_edit_mode(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<ContentView>, ApiError> {
    let session = session(&state, auth, &query)?;
    require_admin(&session)?;
    state.content.toggle_coaches_edit_mode(&session);
    Ok(Json(state.content.view(&session)))
}

#[utoipa::path(
    put,
    path = "/content/coaches/{index}",
    params(
        ("index" = usize, Path, description = "Zero-based position in the roster"),
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    request_body = Coach,
    responses(
        (status = 200, description = "Coach replaced", body = ContentView),
        (status = 403, description = "Caller may not edit content"),
        (status = 502, description = "Remote store rejected the write")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "content"
)]
pub async fn update_coach(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Path(index): Path<usize>,
    Query(query): Query<TokenQuery>,
    Json(coach): Json<Coach>,
) -> Result<Json<ContentView>, ApiError> {
    let session = session(&state, auth, &query)?;
    require_admin(&session)?;
    state.content.update_coach(&session, index, coach).await?;
    Ok(Json(state.content.view(&session)))
}

#[utoipa::path(
    post,
    path = "/content/coaches/{index}/image",
    params(
        ("index" = usize, Path, description = "Zero-based position in the roster"),
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    request_body(content = ImageUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image stored on the coach", body = ImageUploadResponse),
        (status = 400, description = "Missing, non-image or oversized file"),
        (status = 403, description = "Caller may not edit content"),
        (status = 404, description = "No coach at that index"),
        (status = 502, description = "Upload or store write failed")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "content"
)]
pub async fn upload_coach_image(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Path(index): Path<usize>,
    Query(query): Query<TokenQuery>,
    multipart: Multipart,
) -> Result<Json<ImageUploadResponse>, ApiError> {
    let session = session(&state, auth, &query)?;
    require_admin(&session)?;
    let file = read_image_field(multipart).await?;
    let url = state
        .content
        .upload_coach_image(&session, index, file)
        .await?;
    Ok(Json(ImageUploadResponse {
        url: url.to_string(),
    }))
}

/// Pulls the `file` field out of the form; other fields are ignored.
async fn read_image_field(mut multipart: Multipart) -> Result<Option<ImageFile>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(err.body_text()))?
    {
        if field.name() != Some("file") {
            debug!(name = ?field.name(), "skipping multipart field");
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::BadRequest(err.body_text()))?;
        return Ok(Some(ImageFile {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

#[utoipa::path(
    delete,
    path = "/content/toast",
    responses((status = 204, description = "Toast hidden")),
    tag = "content"
)]
pub async fn hide_toast(State(state): State<AppState>) -> StatusCode {
    state.content.hide_toast();
    StatusCode::NO_CONTENT
}

#[utoipa::path(
    post,
    path = "/register",
    request_body = RegistrationRequest,
    responses(
        (status = 200, description = "Checkout ready to open", body = CheckoutSession),
        (status = 400, description = "Invalid contact details"),
        (status = 502, description = "Registration or payment order failed")
    ),
    tag = "registration"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegistrationRequest>,
) -> Result<Json<CheckoutSession>, ApiError> {
    let session = state.registration.checkout(&request).await?;
    Ok(Json(session))
}

#[utoipa::path(
    post,
    path = "/checkout/outcome",
    request_body = CheckoutOutcomeRequest,
    responses((status = 200, description = "Where to send the visitor", body = CheckoutRedirect)),
    tag = "registration"
)]
pub async fn checkout_outcome(Json(request): Json<CheckoutOutcomeRequest>) -> Json<CheckoutRedirect> {
    Json(CheckoutRedirect {
        redirect: request.outcome.redirect_target().map(str::to_string),
        message: request.outcome.message().map(str::to_string),
    })
}
