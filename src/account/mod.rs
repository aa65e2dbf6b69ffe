/// Account management system
///
/// Handles registration, login and logout, refresh-token exchange, password
/// changes, profile edits, channel pages and watch history.

mod manager;

pub use manager::AccountManager;

use crate::view::AccountView;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

/// Registration form; files are local temporary paths
#[derive(Debug, Default)]
pub struct RegisterAccount {
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub avatar: Option<PathBuf>,
    pub cover_image: Option<PathBuf>,
}

/// Identity fields checked at registration and on profile edits
#[derive(Debug, Validate)]
pub(crate) struct Identity {
    #[validate(length(min = 3, max = 30, message = "Username must be 3-30 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

/// Login request; either identifier may be used
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Login response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: AccountView,
    pub access_token: String,
    pub refresh_token: String,
}

/// Token refresh request, for clients that cannot send cookies
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDetailsRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
}
