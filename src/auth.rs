use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use serde::Serialize;

use crate::error::ApiError;
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserIdentity {
    pub id: String,
}

/// Who is calling, as far as the content layer is concerned.
///
/// `is_admin` is the only predicate mutations consult.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub current_user: Option<UserIdentity>,
    pub is_admin: bool,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            current_user: Some(UserIdentity { id: id.into() }),
            is_admin: true,
        }
    }

    /// Session the service itself runs under; privileged only when it is
    /// allowed to bootstrap the remote content.
    pub fn service(settings: &Settings) -> Self {
        if settings.bootstrap_content {
            Self::admin(settings.admin_user.clone())
        } else {
            Self::anonymous()
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.current_user.as_ref().map(|u| u.id.as_str())
    }
}

/// Resolves the caller from a bearer header or `token` query parameter.
///
/// No token at all is an anonymous reader; a token that does not match is
/// rejected.
pub fn resolve_session(
    settings: &Settings,
    auth: Option<Authorization<Bearer>>,
    query_token: Option<&str>,
) -> Result<Session, ApiError> {
    let provided_token = auth
        .map(|a| a.token().to_string())
        .or_else(|| query_token.map(|s| s.to_string()));
    match provided_token {
        None => Ok(Session::anonymous()),
        Some(token) if !settings.admin_token.is_empty() && token == settings.admin_token => {
            Ok(Session::admin(settings.admin_user.clone()))
        }
        Some(_) => Err(ApiError::Unauthorized(
            "Invalid authentication token".into(),
        )),
    }
}
