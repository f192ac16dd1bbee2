use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use httpmock::prelude::*;
use masterclass_site::auth::Session;
use masterclass_site::models::{EventDetails, default_coaches};
use masterclass_site::settings::Settings;
use masterclass_site::store::MemoryDocumentStore;
use masterclass_site::upload::CloudinaryUploader;
use masterclass_site::{AppState, build_router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::Service;
use url::Url;

const ADMIN_TOKEN: &str = "test-token-123";
const BOUNDARY: &str = "masterclass-boundary";

/// Helper function to create test app state with mocked server
fn create_test_state(mock_server_url: Url) -> (AppState, MemoryDocumentStore) {
    let settings = Settings {
        debug: true,
        port: 8080,
        enable_swagger: true,
        admin_token: ADMIN_TOKEN.to_string(),
        admin_user: "admin".to_string(),
        bootstrap_content: true,
        rtdb_url: mock_server_url.clone(),
        rtdb_auth: None,
        cloudinary_api_url: mock_server_url.clone(),
        cloudinary_cloud_name: Some("demo".to_string()),
        cloudinary_upload_preset: "unsigned_lms_uploads".to_string(),
        payments_api_url: mock_server_url.clone(),
        checkout_sdk_url: "https://sdk.example.com/checkout.js".to_string(),
        toast_window_ms: 3000,
        error_window_ms: 5000,
        max_image_bytes: 2 * 1024 * 1024,
    };

    let documents = MemoryDocumentStore::with_root(json!({
        "content": {
            "eventDetails": EventDetails::default(),
            "coaches": default_coaches(),
        }
    }));
    let uploader = CloudinaryUploader::new(
        mock_server_url,
        settings.cloudinary_cloud_name.clone(),
        settings.cloudinary_upload_preset.clone(),
    );
    let state = AppState::new(settings, Arc::new(documents.clone()), Arc::new(uploader));
    (state, documents)
}

/// State with the content subscription already attached.
fn active_state(mock_server_url: Url) -> (AppState, MemoryDocumentStore) {
    let (state, documents) = create_test_state(mock_server_url);
    state.content.activate(&Session::admin("admin")).unwrap();
    (state, documents)
}

fn example_url() -> Url {
    Url::parse("http://example.com").unwrap()
}

/// Helper to extract response body as string
async fn response_body_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn response_json(body: Body) -> Value {
    serde_json::from_str(&response_body_string(body).await).unwrap()
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn multipart_request(uri: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"coach.png\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_root_endpoint() {
    // Arrange
    let (state, _) = create_test_state(example_url());
    let mut app = build_router(state);

    // Act
    let response = app
        .call(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_body_string(response.into_body()).await;
    assert!(body.contains("Masterclass Site API"));
    assert!(body.contains("/content"));
    assert!(body.contains("/register"));
}

#[tokio::test]
async fn test_healthz_live() {
    // Arrange
    let (state, _) = create_test_state(example_url());
    let mut app = build_router(state);

    // Act
    let response = app
        .call(
            Request::builder()
                .uri("/healthz/live")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_body_string(response.into_body()).await;
    assert!(body.contains(r#""status":"ok"#));
}

#[tokio::test]
async fn test_healthz_ready_waits_for_first_snapshot() {
    // Arrange
    let (state, _) = create_test_state(example_url());
    let mut app = build_router(state.clone());
    let ready = || {
        Request::builder()
            .uri("/healthz/ready")
            .body(Body::empty())
            .unwrap()
    };

    // Act
    let loading = app.call(ready()).await.unwrap();
    state.content.activate(&Session::admin("admin")).unwrap();
    let settled = app.call(ready()).await.unwrap();

    // Assert
    assert_eq!(loading.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(settled.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_content_view_depends_on_caller() {
    // Arrange
    let (state, _) = active_state(example_url());
    let mut app = build_router(state);

    // Act
    let anonymous = app
        .call(Request::builder().uri("/content").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let admin = app
        .call(
            Request::builder()
                .uri(format!("/content?token={ADMIN_TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(anonymous.status(), StatusCode::OK);
    let body = response_json(anonymous.into_body()).await;
    assert_eq!(body["canEdit"], json!(false));
    assert_eq!(body["eventDetails"]["date"], json!("APRIL 19TH"));
    assert_eq!(body["coaches"].as_array().unwrap().len(), 2);
    assert_eq!(body["loading"], json!(false));

    let body = response_json(admin.into_body()).await;
    assert_eq!(body["canEdit"], json!(true));
}

#[tokio::test]
async fn test_content_invalid_auth_token() {
    // Arrange
    let (state, _) = active_state(example_url());
    let mut app = build_router(state);

    // Act
    let response = app
        .call(
            Request::builder()
                .uri("/content")
                .header(header::AUTHORIZATION, "Bearer wrong-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_update_event_details_requires_admin() {
    // Arrange
    let (state, documents) = active_state(example_url());
    let mut app = build_router(state);

    // Act
    let response = app
        .call(json_request(
            "PATCH",
            "/content/event-details",
            None,
            json!({ "date": "MAY 1ST", "isEditing": false }),
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = response_json(response.into_body()).await;
    assert_eq!(
        body["error"],
        json!("You don't have permission to update content.")
    );
    assert!(documents.writes().is_empty());
}

#[tokio::test]
async fn test_denied_requests_leave_shared_error_untouched() {
    // Arrange
    let (state, documents) = active_state(example_url());
    let mut app = build_router(state);

    // Act
    let patch = app
        .call(json_request(
            "PATCH",
            "/content/event-details",
            None,
            json!({ "date": "MAY 1ST", "isEditing": false }),
        ))
        .await
        .unwrap();
    let roster = app
        .call(json_request(
            "PUT",
            "/content/coaches",
            None,
            json!([{ "name": "Intruder" }]),
        ))
        .await
        .unwrap();
    let coach = app
        .call(json_request(
            "PUT",
            "/content/coaches/0",
            None,
            json!({ "name": "Intruder" }),
        ))
        .await
        .unwrap();
    let admin_view = app
        .call(
            Request::builder()
                .uri(format!("/content?token={ADMIN_TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(patch.status(), StatusCode::FORBIDDEN);
    assert_eq!(roster.status(), StatusCode::FORBIDDEN);
    assert_eq!(coach.status(), StatusCode::FORBIDDEN);
    let body = response_json(admin_view.into_body()).await;
    assert_eq!(body["error"], Value::Null);
    assert!(documents.writes().is_empty());
}

#[tokio::test]
async fn test_update_event_details_persists_on_close() {
    // Arrange
    let (state, documents) = active_state(example_url());
    let mut app = build_router(state);

    // Act
    let response = app
        .call(json_request(
            "PATCH",
            "/content/event-details",
            Some(ADMIN_TOKEN),
            json!({ "date": "MAY 1ST", "isEditing": false }),
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["eventDetails"]["date"], json!("MAY 1ST"));
    assert_eq!(body["isEditing"], json!(false));
    assert_eq!(body["showToast"], json!(true));
    assert_eq!(
        body["toastMessage"],
        json!("Event details updated successfully!")
    );

    let writes = documents.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].path(), "content/eventDetails");
    assert_eq!(
        documents.root()["content"]["eventDetails"]["date"],
        json!("MAY 1ST")
    );
}

#[tokio::test]
async fn test_toggle_edit_modes() {
    // Arrange
    let (state, _) = active_state(example_url());
    let mut app = build_router(state);

    // Act
    let denied = app
        .call(json_request(
            "POST",
            "/content/coaches/edit-mode",
            None,
            json!({}),
        ))
        .await
        .unwrap();
    let event = app
        .call(json_request(
            "POST",
            "/content/event-details/edit-mode",
            Some(ADMIN_TOKEN),
            json!({}),
        ))
        .await
        .unwrap();
    let coaches = app
        .call(json_request(
            "POST",
            "/content/coaches/edit-mode",
            Some(ADMIN_TOKEN),
            json!({}),
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    assert_eq!(event.status(), StatusCode::OK);
    assert_eq!(response_json(event.into_body()).await["isEditing"], json!(true));
    assert_eq!(coaches.status(), StatusCode::OK);
    assert_eq!(
        response_json(coaches.into_body()).await["isEditingCoaches"],
        json!(true)
    );
}

#[tokio::test]
async fn test_update_single_coach() {
    // Arrange
    let (state, documents) = active_state(example_url());
    let mut app = build_router(state);

    // Act
    let response = app
        .call(json_request(
            "PUT",
            "/content/coaches/1",
            Some(ADMIN_TOKEN),
            json!({
                "name": "Sikander Tuteja",
                "title": "Business Coach",
                "description": "Growth",
                "bio": "Entrepreneur",
                "expertise": ["Strategy"]
            }),
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["coaches"][1]["title"], json!("Business Coach"));
    assert_eq!(body["coaches"][0]["name"], json!("Inspiring Shereen"));
    assert_eq!(documents.writes()[0].path(), "content/coaches/1");
}

#[tokio::test]
async fn test_replace_roster() {
    // Arrange
    let (state, documents) = active_state(example_url());
    let mut app = build_router(state);

    // Act
    let response = app
        .call(json_request(
            "PUT",
            "/content/coaches",
            Some(ADMIN_TOKEN),
            json!([{ "name": "Solo Coach" }]),
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["coaches"].as_array().unwrap().len(), 1);
    assert_eq!(body["toastMessage"], json!("Coaches updated successfully!"));
    assert_eq!(
        documents.root()["content"]["coaches"][0]["name"],
        json!("Solo Coach")
    );
}

#[tokio::test]
async fn test_upload_coach_image() {
    // Arrange
    let mock_server = MockServer::start();
    let (state, documents) = active_state(Url::parse(&mock_server.base_url()).unwrap());
    let mut app = build_router(state);

    let upload = mock_server.mock(|when, then| {
        when.method(POST).path("/v1_1/demo/image/upload");
        then.status(200).json_body(json!({
            "secure_url": "https://res.cloudinary.com/demo/image/upload/coaches/coach.png"
        }));
    });

    // Act
    let response = app
        .call(multipart_request(
            "/content/coaches/0/image",
            "image/png",
            &[137, 80, 78, 71, 13, 10, 26, 10],
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    upload.assert();
    let body = response_json(response.into_body()).await;
    assert_eq!(
        body["url"],
        json!("https://res.cloudinary.com/demo/image/upload/coaches/coach.png")
    );
    assert_eq!(
        documents.root()["content"]["coaches"][0]["image"],
        json!("https://res.cloudinary.com/demo/image/upload/coaches/coach.png")
    );
}

#[tokio::test]
async fn test_upload_rejects_non_image() {
    // Arrange
    let mock_server = MockServer::start();
    let (state, documents) = active_state(Url::parse(&mock_server.base_url()).unwrap());
    let mut app = build_router(state);

    let upload = mock_server.mock(|when, then| {
        when.method(POST);
        then.status(200);
    });

    // Act
    let response = app
        .call(multipart_request(
            "/content/coaches/0/image",
            "text/plain",
            b"not an image",
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["error"], json!("Please select an image file"));
    upload.assert_hits(0);
    assert!(documents.writes().is_empty());
}

#[tokio::test]
async fn test_hide_toast() {
    // Arrange
    let (state, _) = active_state(example_url());
    let mut app = build_router(state.clone());
    app.call(json_request(
        "PUT",
        "/content/coaches",
        Some(ADMIN_TOKEN),
        json!([{ "name": "Solo Coach" }]),
    ))
    .await
    .unwrap();
    assert!(state.content.toast().visible);

    // Act
    let response = app
        .call(
            Request::builder()
                .method("DELETE")
                .uri("/content/toast")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!state.content.toast().visible);
}

#[tokio::test]
async fn test_register_opens_checkout() {
    // Arrange
    let mock_server = MockServer::start();
    let (state, _) = create_test_state(Url::parse(&mock_server.base_url()).unwrap());
    let mut app = build_router(state);

    mock_server.mock(|when, then| {
        when.method(POST).path("/api/register");
        then.status(200)
            .json_body(json!({ "success": true, "referenceId": "REF-42" }));
    });
    mock_server.mock(|when, then| {
        when.method(POST).path("/api/create-payment-order");
        then.status(200).json_body(json!({
            "success": true,
            "paymentSessionId": "session-42",
            "appId": "app-1"
        }));
    });

    // Act
    let response = app
        .call(json_request(
            "POST",
            "/register",
            None,
            json!({
                "fullName": "Asha Rao",
                "email": "asha@example.com",
                "phone": "9876543210"
            }),
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["referenceId"], json!("REF-42"));
    assert_eq!(body["sessionToken"], json!("session-42"));
    assert_eq!(body["sdkUrl"], json!("https://sdk.example.com/checkout.js"));
}

#[tokio::test]
async fn test_register_invalid_email() {
    // Arrange
    let (state, _) = create_test_state(example_url());
    let mut app = build_router(state);

    // Act
    let response = app
        .call(json_request(
            "POST",
            "/register",
            None,
            json!({ "fullName": "Asha Rao", "email": "asha", "phone": "9876543210" }),
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_outcome_routes() {
    // Arrange
    let (state, _) = create_test_state(example_url());
    let mut app = build_router(state);

    // Act
    let success = app
        .call(json_request(
            "POST",
            "/checkout/outcome",
            None,
            json!({ "outcome": "success" }),
        ))
        .await
        .unwrap();
    let failure = app
        .call(json_request(
            "POST",
            "/checkout/outcome",
            None,
            json!({ "outcome": "failure" }),
        ))
        .await
        .unwrap();

    // Assert
    let body = response_json(success.into_body()).await;
    assert_eq!(body["redirect"], json!("/success"));
    let body = response_json(failure.into_body()).await;
    assert_eq!(body["redirect"], Value::Null);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_openapi_document_served() {
    // Arrange
    let (state, _) = create_test_state(example_url());
    let mut app = build_router(state);

    // Act
    let response = app
        .call(
            Request::builder()
                .uri("/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_body_string(response.into_body()).await;
    assert!(body.contains("/content/coaches/{index}/image"));
}
