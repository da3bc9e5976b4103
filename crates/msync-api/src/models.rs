use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[allow(dead_code)]
    #[serde(default)]
    pub token_type: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginStatus {
    pub logged_in: bool,
}

/// Mutating endpoints answer with a loosely-typed acknowledgement; the
/// HTTP status alone decides success, so every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub started: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct PasswordChangeRequest<'a> {
    pub old_password: &'a str,
    pub new_password: &'a str,
}

/// The complete preference tuple. Both axes are always present so the
/// server never sees a partial patch.
#[derive(Debug, Serialize)]
pub(crate) struct PreferenceRequest<'a> {
    pub uid: &'a str,
    pub video_pref: Option<bool>,
    pub note_pref: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LogsResponse {
    pub logs: Vec<String>,
}
