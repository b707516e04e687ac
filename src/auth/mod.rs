//! EVE SSO login: OAuth2 authorization code flow with PKCE and a loopback
//! callback server.

pub mod callback_server;
pub mod jwt;
pub mod pkce;
pub mod token;

use std::time::Duration;

use thiserror::Error;

use crate::config::AppConfig;
use callback_server::CallbackRegistry;
use jwt::{JwksCache, ValidatedCharacter};
use token::OAuthToken;

pub const AUTH_URL: &str = "https://login.eveonline.com/v2/oauth/authorize/";
pub const TOKEN_URL: &str = "https://login.eveonline.com/v2/oauth/token";
pub const JWKS_URL: &str = "https://login.eveonline.com/oauth/jwks";

pub const SCOPES: [&str; 5] = [
    "publicData",
    "esi-skills.read_skills.v1",
    "esi-skills.read_skillqueue.v1",
    "esi-clones.read_clones.v1",
    "esi-assets.read_assets.v1",
];

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("SSO returned {status}: {body}")]
    Sso {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("login timed out after {0:?}")]
    Timeout(Duration),
    #[error("login was cancelled")]
    Cancelled,
    #[error("could not open browser: {0}")]
    Browser(String),
    #[error("invalid authorize URL: {0}")]
    Url(String),
    #[error("invalid access token: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("no signing key '{0}' in SSO key set")]
    UnknownKey(String),
    #[error("unexpected token subject '{0}'")]
    InvalidSubject(String),
    #[error("callback server failed: {0}")]
    Server(#[from] std::io::Error),
}

/// Everything needed to talk to the SSO for one client id.
pub struct SsoClient {
    http: reqwest::Client,
    client_id: String,
    redirect_uri: String,
    auth_url: String,
    token_url: String,
    jwks: JwksCache,
}

impl SsoClient {
    pub fn new(http: reqwest::Client, config: &AppConfig) -> Self {
        Self {
            jwks: JwksCache::new(http.clone(), JWKS_URL),
            http,
            client_id: config.esi.client_id.clone(),
            redirect_uri: config.callback_url(),
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Run a full browser login and return the issued token.
    ///
    /// `open_browser` receives the authorize URL. The pending state is removed
    /// from `callbacks` however this returns.
    pub async fn authenticate<F>(
        &self,
        callbacks: &CallbackRegistry,
        open_browser: F,
        timeout: Duration,
    ) -> Result<OAuthToken, AuthError>
    where
        F: FnOnce(&str) -> Result<(), String>,
    {
        let pkce = pkce::Pkce::generate();
        let state = uuid::Uuid::new_v4().to_string();
        let pending = callbacks.expect(&state);

        let url = pkce::authorize_url(
            &self.auth_url,
            &self.client_id,
            &self.redirect_uri,
            &SCOPES,
            &pkce.challenge,
            &state,
        )?;
        log::info!("[authenticate] Waiting for SSO callback (state {})", state);
        open_browser(&url).map_err(AuthError::Browser)?;

        let code = pending.wait(timeout).await?;
        token::exchange_code(
            &self.http,
            &self.token_url,
            &self.client_id,
            &code,
            &pkce.verifier,
        )
        .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<OAuthToken, AuthError> {
        token::refresh(&self.http, &self.token_url, &self.client_id, refresh_token).await
    }

    pub async fn validate_token(&self, access_token: &str) -> Result<ValidatedCharacter, AuthError> {
        self.jwks.validate(access_token, &self.client_id).await
    }
}
