use axum::{
    extract::FromRequestParts,
    http::{HeaderName, request::Parts},
};
use bulkmail_common::UserId;
use bulkmail_delivery::Dispatcher;
use bulkmail_vault::SettingsStore;

use crate::error::ApiError;

/// Shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub settings: SettingsStore,
    pub user_header: HeaderName,
}

/// The authenticated caller, read from the trusted user header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub UserId);

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(&state.user_header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(|user| Self(UserId::new(user)))
            .ok_or(ApiError::Unauthorized)
    }
}
