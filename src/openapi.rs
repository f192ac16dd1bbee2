use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::handlers::{
    CheckoutOutcomeRequest, CheckoutRedirect, ImageUploadForm, ImageUploadResponse,
};
use crate::models::{
    CheckoutSession, Coach, ContentView, EventDetails, EventDetailsDraft, EventDetailsPatch,
    EventDetailsUpdate, Notification, RegistrationRequest,
};
use crate::registration::CheckoutOutcome;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
        components.add_security_scheme(
            "query_token",
            SecurityScheme::ApiKey(ApiKey::Query(ApiKeyValue::new("token"))),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz_live,
        crate::handlers::healthz_ready,
        crate::handlers::get_content,
        crate::handlers::update_event_details,
        crate::handlers::toggle_event_edit_mode,
        crate::handlers::update_coaches,
        crate::handlers::toggle_coaches_edit_mode,
        crate::handlers::update_coach,
        crate::handlers::upload_coach_image,
        crate::handlers::hide_toast,
        crate::handlers::register,
        crate::handlers::checkout_outcome
    ),
    components(schemas(
        ContentView,
        EventDetails,
        EventDetailsPatch,
        EventDetailsDraft,
        EventDetailsUpdate,
        Coach,
        Notification,
        RegistrationRequest,
        CheckoutSession,
        CheckoutOutcome,
        CheckoutOutcomeRequest,
        CheckoutRedirect,
        ImageUploadForm,
        ImageUploadResponse
    )),
    tags(
        (name = "site", description = "Service metadata and health"),
        (name = "content", description = "Live-synced site content"),
        (name = "registration", description = "Masterclass registration and checkout")
    ),
    modifiers(&SecurityAddon),
)]
pub struct ApiDoc;
