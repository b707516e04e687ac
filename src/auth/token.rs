use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::AuthError;
use crate::types::TokenRow;

/// Tokens this close to expiry are refreshed before use.
pub const EXPIRY_LEEWAY_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    refresh_token: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expiration: DateTime<Utc>,
}

impl OAuthToken {
    fn from_response(resp: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            token_type: resp.token_type,
            expiration: now + Duration::seconds(resp.expires_in),
        }
    }

    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expiration - Duration::seconds(EXPIRY_LEEWAY_SECS) <= now
    }

    pub fn to_row(&self, character_id: i64) -> TokenRow {
        TokenRow {
            character_id,
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            token_type: self.token_type.clone(),
            expiration: self.expiration,
        }
    }

    pub fn from_row(row: TokenRow) -> Self {
        Self {
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            token_type: row.token_type,
            expiration: row.expiration,
        }
    }
}

async fn request_token(
    http: &reqwest::Client,
    token_url: &str,
    form: &[(&str, &str)],
) -> Result<OAuthToken, AuthError> {
    let resp = http
        .post(token_url)
        .header("Accept", "application/json")
        .form(form)
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(AuthError::Sso { status, body });
    }

    let body: TokenResponse = resp.json().await?;
    Ok(OAuthToken::from_response(body, Utc::now()))
}

/// Trade an authorization code (plus PKCE verifier) for a token.
pub async fn exchange_code(
    http: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    code: &str,
    verifier: &str,
) -> Result<OAuthToken, AuthError> {
    log::info!("[exchange_code] Exchanging authorization code");
    request_token(
        http,
        token_url,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", client_id),
            ("code_verifier", verifier),
        ],
    )
    .await
}

pub async fn refresh(
    http: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    refresh_token: &str,
) -> Result<OAuthToken, AuthError> {
    log::debug!("[refresh] Refreshing access token");
    let mut token = request_token(
        http,
        token_url,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
        ],
    )
    .await?;
    // The SSO may omit the refresh token when it is not rotated.
    if token.refresh_token.is_empty() {
        token.refresh_token = refresh_token.to_string();
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn token(expiration: DateTime<Utc>) -> OAuthToken {
        OAuthToken {
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            token_type: "Bearer".to_string(),
            expiration,
        }
    }

    #[test]
    fn test_needs_refresh_inside_leeway() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap();
        assert!(token(now).needs_refresh(now));
        assert!(token(now + Duration::seconds(59)).needs_refresh(now));
        assert!(token(now + Duration::seconds(60)).needs_refresh(now));
        assert!(!token(now + Duration::seconds(61)).needs_refresh(now));
        assert!(token(now - Duration::hours(1)).needs_refresh(now));
    }

    #[test]
    fn test_response_expiry_is_relative_to_now() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap();
        let resp: TokenResponse = serde_json::from_str(
            r#"{"access_token":"a","expires_in":1199,"token_type":"Bearer","refresh_token":"r"}"#,
        )
        .unwrap();
        let token = OAuthToken::from_response(resp, now);
        assert_eq!(token.expiration, now + Duration::seconds(1199));
        assert_eq!(token.refresh_token, "r");
    }

    #[test]
    fn test_row_round_trip() {
        let t = token(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
        let row = t.to_row(42);
        assert_eq!(row.character_id, 42);
        assert_eq!(OAuthToken::from_row(row), t);
    }
}
