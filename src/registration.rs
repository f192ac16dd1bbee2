use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;
use utoipa::ToSchema;

use crate::models::{CheckoutSession, RegistrationRequest};
use crate::validation::validate_registration;

/// Payment methods offered by the checkout widget.
const CHECKOUT_COMPONENTS: [&str; 6] = ["order-details", "card", "upi", "netbanking", "app", "paylater"];

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("{0}")]
    Invalid(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid payments API URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("{0}")]
    Rejected(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentOrderRequest<'a> {
    reference_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    success: bool,
    reference_id: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentOrderResponse {
    success: bool,
    payment_session_id: Option<String>,
    app_id: Option<String>,
    order_token: Option<String>,
    error: Option<String>,
}

/// How the checkout widget finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutOutcome {
    Success,
    Failure,
    Close,
}

impl CheckoutOutcome {
    /// Client route to navigate to; `None` keeps the visitor on the form.
    pub fn redirect_target(self) -> Option<&'static str> {
        match self {
            CheckoutOutcome::Success => Some("/success"),
            CheckoutOutcome::Failure | CheckoutOutcome::Close => None,
        }
    }

    pub fn message(self) -> Option<&'static str> {
        match self {
            CheckoutOutcome::Failure => Some("Payment failed. Please try again."),
            CheckoutOutcome::Success | CheckoutOutcome::Close => None,
        }
    }
}

/// Two-step flow against the registration backend: register the contact,
/// then open a payment order for the returned reference id.
#[derive(Clone)]
pub struct RegistrationClient {
    client: reqwest::Client,
    api_url: Arc<Url>,
    sdk_url: String,
}

impl RegistrationClient {
    pub fn new(api_url: Url, sdk_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: Arc::new(api_url),
            sdk_url,
        }
    }

    pub async fn register(&self, request: &RegistrationRequest) -> Result<String, RegistrationError> {
        let response: RegisterResponse = self
            .client
            .post(self.api_url.join("api/register")?)
            .json(request)
            .send()
            .await?
            .json()
            .await?;

        match response {
            RegisterResponse {
                success: true,
                reference_id: Some(reference_id),
                ..
            } => Ok(reference_id),
            RegisterResponse { error, .. } => Err(RegistrationError::Rejected(
                error.unwrap_or_else(|| "Registration failed".into()),
            )),
        }
    }

    pub async fn create_payment_order(
        &self,
        reference_id: &str,
    ) -> Result<CheckoutSession, RegistrationError> {
        let response: PaymentOrderResponse = self
            .client
            .post(self.api_url.join("api/create-payment-order")?)
            .json(&PaymentOrderRequest { reference_id })
            .send()
            .await?
            .json()
            .await?;

        if !response.success {
            return Err(RegistrationError::Rejected(
                response
                    .error
                    .unwrap_or_else(|| "Failed to create payment order".into()),
            ));
        }

        let session_token = response
            .order_token
            .or(response.payment_session_id)
            .ok_or_else(|| RegistrationError::Rejected("Payment order carried no session".into()))?;
        let app_id = response
            .app_id
            .ok_or_else(|| RegistrationError::Rejected("Payment order carried no app id".into()))?;

        Ok(CheckoutSession {
            reference_id: reference_id.to_string(),
            app_id,
            session_token,
            sdk_url: self.sdk_url.clone(),
            components: CHECKOUT_COMPONENTS.iter().map(|c| c.to_string()).collect(),
        })
    }

    /// Validates the contact details, registers them and opens the payment order.
    pub async fn checkout(
        &self,
        request: &RegistrationRequest,
    ) -> Result<CheckoutSession, RegistrationError> {
        validate_registration(request).map_err(RegistrationError::Invalid)?;

        let reference_id = self.register(request).await.inspect_err(|err| {
            warn!(error = %err, "registration failed");
        })?;
        info!(%reference_id, "registration accepted, creating payment order");
        self.create_payment_order(&reference_id).await
    }
}
