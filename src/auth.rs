use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::Deserialize;
use thiserror::Error;

use crate::config::GoogleOAuthConfig;
use crate::db::operations::users;
use crate::db::DatabaseProxy;

pub const USER_COOKIE_NAME: &str = "user_id";
const USER_COOKIE_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const GOOGLE_SCOPE: &str = "https://www.googleapis.com/auth/userinfo.profile";

/// Caller identity taken from the `user_id` cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
}

pub fn identity_from_headers(headers: &HeaderMap) -> Option<Identity> {
    get_cookie(headers, USER_COOKIE_NAME)
        .filter(|value| !value.is_empty())
        .map(|user_id| Identity { user_id })
}

pub fn session_cookie(user_id: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{USER_COOKIE_NAME}={user_id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        USER_COOKIE_MAX_AGE.as_secs()
    ))
    .ok()
}

pub fn cleared_session_cookie() -> HeaderValue {
    HeaderValue::from_static("user_id=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';')
        .filter_map(|part| part.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminDecision {
    Allowed,
    NotConfigured,
    Anonymous,
    Denied,
}

/// Grants the admin role to the user linked to one Google account.
#[derive(Debug, Clone)]
pub struct AdminPolicy {
    admin_google_id: Option<String>,
}

impl AdminPolicy {
    pub fn new(admin_google_id: Option<String>) -> Self {
        Self { admin_google_id }
    }

    pub fn is_configured(&self) -> bool {
        self.admin_google_id.is_some()
    }

    pub async fn evaluate(
        &self,
        proxy: &DatabaseProxy,
        identity: Option<&Identity>,
    ) -> Result<AdminDecision, sqlx::Error> {
        let Some(admin_google_id) = self.admin_google_id.as_deref() else {
            return Ok(AdminDecision::NotConfigured);
        };
        let Some(identity) = identity else {
            return Ok(AdminDecision::Anonymous);
        };
        match users::get_user(proxy, &identity.user_id).await? {
            Some(user) if user.google_id == admin_google_id => Ok(AdminDecision::Allowed),
            Some(user) => {
                tracing::info!(google_id = %user.google_id, "admin access denied");
                Ok(AdminDecision::Denied)
            }
            None => Ok(AdminDecision::Denied),
        }
    }
}

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Google login is not configured")]
    NotConfigured,
    #[error("invalid oauth state")]
    InvalidState,
    #[error("missing authorization code")]
    MissingCode,
    #[error("oauth request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("oauth provider returned HTTP {0}")]
    HttpStatus(reqwest::StatusCode),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUserInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Google authorization-code flow. The state value is generated per process.
#[derive(Clone)]
pub struct GoogleOAuth {
    config: Option<GoogleOAuthConfig>,
    state: String,
    client: reqwest::Client,
}

impl GoogleOAuth {
    pub fn new(config: Option<GoogleOAuthConfig>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            state: random_state(),
            client,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    pub fn authorize_url(&self) -> Result<String, OAuthError> {
        let config = self.config.as_ref().ok_or(OAuthError::NotConfigured)?;
        Ok(format!(
            "{GOOGLE_AUTH_URL}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&access_type=online",
            urlencoding::encode(&config.client_id),
            urlencoding::encode(&config.redirect_url),
            urlencoding::encode(GOOGLE_SCOPE),
            urlencoding::encode(&self.state),
        ))
    }

    pub fn verify_state(&self, state: &str) -> Result<(), OAuthError> {
        if state == self.state {
            Ok(())
        } else {
            Err(OAuthError::InvalidState)
        }
    }

    /// Exchanges the authorization code and fetches the Google profile.
    pub async fn fetch_user(&self, code: &str) -> Result<GoogleUserInfo, OAuthError> {
        let config = self.config.as_ref().ok_or(OAuthError::NotConfigured)?;
        if code.is_empty() {
            return Err(OAuthError::MissingCode);
        }

        let params = [
            ("code", code),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("redirect_uri", config.redirect_url.as_str()),
            ("grant_type", "authorization_code"),
        ];
        let resp = self.client.post(GOOGLE_TOKEN_URL).form(&params).send().await?;
        if !resp.status().is_success() {
            return Err(OAuthError::HttpStatus(resp.status()));
        }
        let token: TokenResponse = resp.json().await?;

        let resp = self
            .client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(OAuthError::HttpStatus(resp.status()));
        }
        Ok(resp.json().await?)
    }
}

fn random_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_cookie(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_identity_from_cookie() {
        let headers = headers_with_cookie("theme=dark; user_id=abc-123");
        assert_eq!(
            identity_from_headers(&headers),
            Some(Identity { user_id: "abc-123".into() })
        );
    }

    #[test]
    fn test_empty_cookie_is_anonymous() {
        assert!(identity_from_headers(&headers_with_cookie("user_id=")).is_none());
        assert!(identity_from_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_authorize_url_carries_state() {
        let oauth = GoogleOAuth::new(Some(GoogleOAuthConfig {
            client_id: "cid".into(),
            client_secret: "secret".into(),
            redirect_url: "http://localhost:8080/auth/google/callback".into(),
        }));
        let url = oauth.authorize_url().unwrap();
        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("client_id=cid"));
        assert!(
            url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fauth%2Fgoogle%2Fcallback")
        );
        assert!(url.contains(&format!("state={}", oauth.state)));
        assert!(oauth.verify_state(&oauth.state).is_ok());
        assert!(oauth.verify_state("forged").is_err());
    }

    #[test]
    fn test_unconfigured_oauth() {
        let oauth = GoogleOAuth::new(None);
        assert!(matches!(oauth.authorize_url(), Err(OAuthError::NotConfigured)));
    }
}
