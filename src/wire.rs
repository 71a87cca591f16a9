use serde::Deserialize;

/// Token endpoint shared by the password and refresh grants.
pub const LOGIN_PATH: &str = "/api/auth/login";

#[derive(Debug)]
pub enum Grant<'a> {
    Password { username: &'a str, password: &'a str },
    RefreshToken { refresh_token: &'a str },
}

impl Grant<'_> {
    pub fn form(&self) -> Vec<(&'static str, String)> {
        match self {
            Grant::Password { username, password } => vec![
                ("grant_type", "password".to_owned()),
                ("username", (*username).to_owned()),
                ("password", (*password).to_owned()),
            ],
            Grant::RefreshToken { refresh_token } => vec![
                ("grant_type", "refresh_token".to_owned()),
                ("refresh_token", (*refresh_token).to_owned()),
            ],
        }
    }

    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    pub fn name(&self) -> &'static str {
        match self {
            Grant::Password { .. } => "password",
            Grant::RefreshToken { .. } => "refresh_token",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(rename = "accessToken", alias = "access_token")]
    pub access_token: String,
    #[serde(rename = "refreshToken", alias = "refresh_token", default)]
    pub refresh_token: Option<String>,
}
