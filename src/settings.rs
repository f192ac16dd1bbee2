use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    pub debug: bool,
    pub port: u16,
    pub enable_swagger: bool,
    pub admin_token: String,
    pub admin_user: String,
    pub bootstrap_content: bool,
    pub rtdb_url: Url,
    pub rtdb_auth: Option<String>,
    pub cloudinary_api_url: Url,
    pub cloudinary_cloud_name: Option<String>,
    pub cloudinary_upload_preset: String,
    pub payments_api_url: Url,
    pub checkout_sdk_url: String,
    pub toast_window_ms: u64,
    pub error_window_ms: u64,
    pub max_image_bytes: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            // APP_ADMIN_TOKEN -> admin_token
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("debug", false)?
            .set_default("port", 8080)?
            .set_default("enable_swagger", true)?
            .set_default("admin_token", "default-token-change-me")?
            .set_default("admin_user", "admin")?
            .set_default("bootstrap_content", true)?
            .set_default("rtdb_url", "http://localhost:9000/")?
            .set_default("cloudinary_api_url", "https://api.cloudinary.com/")?
            .set_default("cloudinary_upload_preset", "unsigned_lms_uploads")?
            .set_default("payments_api_url", "http://localhost:5000/")?
            .set_default(
                "checkout_sdk_url",
                "https://sdk.cashfree.com/js/v3/cashfree.js",
            )?
            .set_default("toast_window_ms", 3000)?
            .set_default("error_window_ms", 5000)?
            .set_default("max_image_bytes", 2 * 1024 * 1024)?
            .build()?;

        config.try_deserialize()
    }

    pub fn toast_window(&self) -> Duration {
        Duration::from_millis(self.toast_window_ms)
    }

    pub fn error_window(&self) -> Duration {
        Duration::from_millis(self.error_window_ms)
    }
}
