pub mod auth;
pub mod content;
pub mod error;
pub mod handlers;
pub mod models;
pub mod openapi;
pub mod registration;
pub mod settings;
pub mod store;
pub mod upload;
pub mod validation;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};
use handlers::{
    checkout_outcome, get_content, healthz_live, healthz_ready, hide_toast, register, root,
    toggle_coaches_edit_mode, toggle_event_edit_mode, update_coach, update_coaches,
    update_event_details, upload_coach_image,
};
use tower_http::LatencyUnit;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::Session;
use crate::content::{ContentOptions, ContentStore};
use crate::openapi::ApiDoc;
use crate::registration::RegistrationClient;
use crate::settings::Settings;
use crate::store::{DocumentStore, RtdbDocumentStore};
use crate::upload::{AssetUploader, CloudinaryUploader};

/// Room for multipart framing around an image at the size limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub content: Arc<ContentStore>,
    pub registration: Arc<RegistrationClient>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        documents: Arc<dyn DocumentStore>,
        uploader: Arc<dyn AssetUploader>,
    ) -> Self {
        let content = ContentStore::new(documents, uploader, ContentOptions::from(&settings));
        let registration = RegistrationClient::new(
            settings.payments_api_url.clone(),
            settings.checkout_sdk_url.clone(),
        );
        Self {
            settings,
            content: Arc::new(content),
            registration: Arc::new(registration),
        }
    }
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;

    let env_filter = if settings.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .without_time()
        .init();

    let documents = Arc::new(RtdbDocumentStore::new(
        settings.rtdb_url.clone(),
        settings.rtdb_auth.clone(),
    ));
    let uploader = Arc::new(CloudinaryUploader::new(
        settings.cloudinary_api_url.clone(),
        settings.cloudinary_cloud_name.clone(),
        settings.cloudinary_upload_preset.clone(),
    ));
    let state = AppState::new(settings.clone(), documents, uploader);

    if let Err(err) = state.content.activate(&Session::service(&settings)) {
        warn!("Content subscription failed to start: {err}");
    }

    let app = build_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], state.settings.port));
    info!("Starting Masterclass Site API on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.content.deactivate();
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );

    let upload_limit = state.settings.max_image_bytes.saturating_mul(2) + MULTIPART_OVERHEAD;

    let mut router = Router::new()
        .route("/", get(root))
        .route("/healthz/live", get(healthz_live))
        .route("/healthz/ready", get(healthz_ready))
        .route("/content", get(get_content))
        .route("/content/event-details", patch(update_event_details))
        .route(
            "/content/event-details/edit-mode",
            post(toggle_event_edit_mode),
        )
        .route("/content/coaches", put(update_coaches))
        .route("/content/coaches/edit-mode", post(toggle_coaches_edit_mode))
        .route("/content/coaches/{index}", put(update_coach))
        .route(
            "/content/coaches/{index}/image",
            post(upload_coach_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/content/toast", delete(hide_toast))
        .route("/register", post(register))
        .route("/checkout/outcome", post(checkout_outcome))
        .with_state(state.clone());

    if state.settings.enable_swagger {
        let openapi = ApiDoc::openapi();
        let swagger = SwaggerUi::new("/docs").url("/openapi.json", openapi);
        router = router.merge(swagger);
    }

    router.layer(trace_layer)
}
