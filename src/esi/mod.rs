//! Typed access to the EVE Swagger Interface.

pub mod models;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use models::{
    AllianceData, AllianceIcons, CharacterPublicData, CorporationData, CorporationIcons,
    Portrait, SkillList, UniverseIds, UniverseName,
};

pub const BASE_URL: &str = "https://esi.evetech.net";
pub const USER_AGENT: &str = "eve-alts (eve@evogames.org)";

#[derive(Debug, Error)]
pub enum EsiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{uri} returned {status}: {body}")]
    Status {
        uri: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("could not decode {uri}: {source}")]
    Decode {
        uri: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The ESI calls character sync needs.
#[async_trait]
pub trait EsiApi: Send + Sync {
    async fn character_public_data(&self, token: &str, character_id: i64) -> Result<CharacterPublicData, EsiError>;
    async fn character_portrait(&self, token: &str, character_id: i64) -> Result<Portrait, EsiError>;
    async fn character_skills(&self, token: &str, character_id: i64) -> Result<SkillList, EsiError>;
    async fn corporation_data(&self, token: &str, corporation_id: i64) -> Result<CorporationData, EsiError>;
    async fn corporation_icons(&self, token: &str, corporation_id: i64) -> Result<CorporationIcons, EsiError>;
    async fn alliance_data(&self, token: &str, alliance_id: i64) -> Result<AllianceData, EsiError>;
    async fn alliance_icons(&self, token: &str, alliance_id: i64) -> Result<AllianceIcons, EsiError>;
    /// Resolve ids of any kind to names.
    async fn universe_names(&self, ids: &[i64]) -> Result<Vec<UniverseName>, EsiError>;
    /// Resolve exact names to ids.
    async fn universe_ids(&self, names: &[String]) -> Result<UniverseIds, EsiError>;
}

pub struct EsiClient {
    http: reqwest::Client,
    base_url: String,
}

impl EsiClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_url(http, BASE_URL)
    }

    pub fn with_base_url(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// A `reqwest::Client` with the ESI user agent set.
    pub fn http_client() -> Result<reqwest::Client, EsiError> {
        Ok(reqwest::Client::builder().user_agent(USER_AGENT).build()?)
    }

    async fn read<T: DeserializeOwned>(uri: String, resp: reqwest::Response) -> Result<T, EsiError> {
        let status = resp.status();
        let body = resp.text().await?;
        log::debug!("[esi] {} {} body={}", status.as_u16(), uri, body);

        if status != reqwest::StatusCode::OK {
            return Err(EsiError::Status { uri, status, body });
        }
        serde_json::from_str(&body).map_err(|source| EsiError::Decode { uri, source })
    }

    async fn get<T: DeserializeOwned>(&self, token: &str, path: &str) -> Result<T, EsiError> {
        let uri = format!("{}{}", self.base_url, path);
        let mut req = self.http.get(&uri).header("User-Agent", USER_AGENT);
        if !token.is_empty() {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        Self::read(uri, resp).await
    }

    async fn post<B: Serialize + ?Sized + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, EsiError> {
        let uri = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&uri)
            .header("User-Agent", USER_AGENT)
            .json(body)
            .send()
            .await?;
        Self::read(uri, resp).await
    }
}

#[async_trait]
impl EsiApi for EsiClient {
    async fn character_public_data(&self, token: &str, character_id: i64) -> Result<CharacterPublicData, EsiError> {
        self.get(token, &format!("/latest/characters/{}/", character_id)).await
    }

    async fn character_portrait(&self, token: &str, character_id: i64) -> Result<Portrait, EsiError> {
        self.get(token, &format!("/latest/characters/{}/portrait/", character_id)).await
    }

    async fn character_skills(&self, token: &str, character_id: i64) -> Result<SkillList, EsiError> {
        self.get(token, &format!("/latest/characters/{}/skills/", character_id)).await
    }

    async fn corporation_data(&self, token: &str, corporation_id: i64) -> Result<CorporationData, EsiError> {
        self.get(token, &format!("/latest/corporations/{}/", corporation_id)).await
    }

    async fn corporation_icons(&self, token: &str, corporation_id: i64) -> Result<CorporationIcons, EsiError> {
        self.get(token, &format!("/latest/corporations/{}/icons/", corporation_id)).await
    }

    async fn alliance_data(&self, token: &str, alliance_id: i64) -> Result<AllianceData, EsiError> {
        self.get(token, &format!("/latest/alliances/{}/", alliance_id)).await
    }

    async fn alliance_icons(&self, token: &str, alliance_id: i64) -> Result<AllianceIcons, EsiError> {
        self.get(token, &format!("/latest/alliances/{}/icons/", alliance_id)).await
    }

    async fn universe_names(&self, ids: &[i64]) -> Result<Vec<UniverseName>, EsiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.post("/latest/universe/names/", ids).await
    }

    async fn universe_ids(&self, names: &[String]) -> Result<UniverseIds, EsiError> {
        if names.is_empty() {
            return Ok(UniverseIds::default());
        }
        self.post("/latest/universe/ids/", names).await
    }
}
