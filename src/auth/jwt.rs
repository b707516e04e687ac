//! Access token validation against the SSO's published signing keys.

use std::sync::Arc;

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::AuthError;

pub const ISSUERS: [&str; 2] = ["https://login.eveonline.com", "login.eveonline.com"];
pub const AUDIENCE: &str = "EVE Online";

#[derive(Debug, Deserialize)]
struct EveClaims {
    sub: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedCharacter {
    pub character_id: i64,
    pub name: String,
}

/// `CHARACTER:EVE:<id>` to `<id>`.
pub fn parse_character_subject(sub: &str) -> Result<i64, AuthError> {
    let invalid = || AuthError::InvalidSubject(sub.to_string());
    let mut parts = sub.split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("CHARACTER"), Some("EVE"), Some(id), None) => id.parse().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// Verify signature, issuer, audience and expiry, then pull out the character.
pub fn validate_with_keys(
    token: &str,
    keys: &JwkSet,
    client_id: &str,
) -> Result<ValidatedCharacter, AuthError> {
    let header = decode_header(token)?;
    let jwk = match header.kid.as_deref() {
        Some(kid) => keys
            .find(kid)
            .ok_or_else(|| AuthError::UnknownKey(kid.to_string()))?,
        None => keys
            .keys
            .first()
            .ok_or_else(|| AuthError::UnknownKey(String::new()))?,
    };
    let key = DecodingKey::from_jwk(jwk)?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_issuer(&ISSUERS);
    validation.set_audience(&[client_id, AUDIENCE]);

    let claims = decode::<EveClaims>(token, &key, &validation)?.claims;
    Ok(ValidatedCharacter {
        character_id: parse_character_subject(&claims.sub)?,
        name: claims.name,
    })
}

/// Lazily fetched key set, refetched once when a token names an unknown key.
pub struct JwksCache {
    http: reqwest::Client,
    url: String,
    keys: RwLock<Option<Arc<JwkSet>>>,
}

impl JwksCache {
    pub fn new(http: reqwest::Client, url: &str) -> Self {
        Self {
            http,
            url: url.to_string(),
            keys: RwLock::new(None),
        }
    }

    async fn fetch(&self) -> Result<Arc<JwkSet>, AuthError> {
        let resp = self.http.get(&self.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Sso { status, body });
        }
        let set = Arc::new(resp.json::<JwkSet>().await?);
        log::debug!("[JwksCache::fetch] Loaded {} signing keys", set.keys.len());
        *self.keys.write().await = Some(set.clone());
        Ok(set)
    }

    async fn cached(&self) -> Result<Arc<JwkSet>, AuthError> {
        if let Some(set) = self.keys.read().await.as_ref() {
            return Ok(set.clone());
        }
        self.fetch().await
    }

    pub async fn validate(&self, token: &str, client_id: &str) -> Result<ValidatedCharacter, AuthError> {
        let keys = self.cached().await?;
        match validate_with_keys(token, &keys, client_id) {
            Err(AuthError::UnknownKey(kid)) => {
                log::info!("[JwksCache::validate] Key '{}' not cached, refetching", kid);
                let keys = self.fetch().await?;
                validate_with_keys(token, &keys, client_id)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const TEST_KEY_PEM: &str = include_str!("testdata/sso_test_key.pem");
    const TEST_JWKS: &str = include_str!("testdata/sso_test_jwks.json");

    fn keys() -> JwkSet {
        serde_json::from_str(TEST_JWKS).unwrap()
    }

    fn sign(claims: serde_json::Value, kid: &str) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        let key = EncodingKey::from_rsa_pem(TEST_KEY_PEM.as_bytes()).unwrap();
        encode(&header, &claims, &key).unwrap()
    }

    fn claims(aud: serde_json::Value, iss: &str) -> serde_json::Value {
        json!({
            "sub": "CHARACTER:EVE:2112625428",
            "name": "Alt Pilot",
            "aud": aud,
            "iss": iss,
            "exp": chrono::Utc::now().timestamp() + 600,
        })
    }

    #[test]
    fn test_parse_character_subject() {
        assert_eq!(parse_character_subject("CHARACTER:EVE:2112625428").unwrap(), 2112625428);
        assert!(parse_character_subject("CHARACTER:EVE:").is_err());
        assert!(parse_character_subject("CORPORATION:EVE:1").is_err());
        assert!(parse_character_subject("CHARACTER:EVE:1:2").is_err());
        assert!(parse_character_subject("").is_err());
    }

    #[test]
    fn test_valid_token() {
        let token = sign(
            claims(json!(["client-1", "EVE Online"]), "https://login.eveonline.com"),
            "JWT-Signature-Key",
        );
        let character = validate_with_keys(&token, &keys(), "client-1").unwrap();
        assert_eq!(
            character,
            ValidatedCharacter {
                character_id: 2112625428,
                name: "Alt Pilot".to_string()
            }
        );
    }

    #[test]
    fn test_bare_host_issuer_accepted() {
        let token = sign(claims(json!("EVE Online"), "login.eveonline.com"), "JWT-Signature-Key");
        assert!(validate_with_keys(&token, &keys(), "client-1").is_ok());
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let token = sign(claims(json!("EVE Online"), "https://evil.example"), "JWT-Signature-Key");
        assert!(matches!(
            validate_with_keys(&token, &keys(), "client-1"),
            Err(AuthError::Jwt(_))
        ));
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let token = sign(claims(json!("someone-else"), "login.eveonline.com"), "JWT-Signature-Key");
        assert!(validate_with_keys(&token, &keys(), "client-1").is_err());
    }

    #[test]
    fn test_unknown_kid() {
        let token = sign(claims(json!("EVE Online"), "login.eveonline.com"), "rotated");
        assert!(matches!(
            validate_with_keys(&token, &keys(), "client-1"),
            Err(AuthError::UnknownKey(kid)) if kid == "rotated"
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut c = claims(json!("EVE Online"), "login.eveonline.com");
        c["exp"] = json!(chrono::Utc::now().timestamp() - 3600);
        let token = sign(c, "JWT-Signature-Key");
        assert!(validate_with_keys(&token, &keys(), "client-1").is_err());
    }
}
