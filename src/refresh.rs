//! Character sync: pull a character's public data and skills from ESI and
//! store them in one retried transaction.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use rusqlite::Connection;
use thiserror::Error;

use crate::auth::token::OAuthToken;
use crate::auth::{AuthError, SsoClient};
use crate::db::{Db, DbError};
use crate::esi::models::{
    AllianceData, AllianceIcons, CharacterPublicData, CorporationData, CorporationIcons,
    Portrait, SkillList,
};
use crate::esi::{EsiApi, EsiError};
use crate::repository::{characters, skill_names, tags, tokens};
use crate::transaction::{transact_with_retries, RetryPolicy};
use crate::types::{
    Alliance, Character, CharacterData, CharacterSkill, Corporation, SkillName, TokenRow,
};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("ESI request failed: {0}")]
    Esi(#[from] EsiError),
    #[error("could not save character data: {0}")]
    Db(#[from] DbError),
    #[error("token refresh failed: {0}")]
    Auth(#[from] AuthError),
    #[error("no token stored for character {0}")]
    NoToken(i64),
    #[error("refreshing character {0} timed out after {1:?}")]
    Timeout(i64, Duration),
    #[error("{} character(s) failed to refresh: {}", .0.len(), describe_failures(.0))]
    Multiple(Vec<(i64, RefreshError)>),
}

fn describe_failures(failures: &[(i64, RefreshError)]) -> String {
    failures
        .iter()
        .map(|(id, e)| format!("character {}: {}", id, e))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<OAuthToken, AuthError>;
}

#[async_trait]
impl TokenRefresher for SsoClient {
    async fn refresh(&self, refresh_token: &str) -> Result<OAuthToken, AuthError> {
        SsoClient::refresh(self, refresh_token).await
    }
}

/// Everything ESI reports about one character.
#[derive(Debug, Clone)]
pub struct CharacterSnapshot {
    pub public: CharacterPublicData,
    pub portrait: Portrait,
    pub corporation: CorporationData,
    pub corporation_icons: CorporationIcons,
    pub alliance: Option<(i64, AllianceData, AllianceIcons)>,
    pub skills: SkillList,
}

pub async fn fetch_snapshot(
    api: &dyn EsiApi,
    access_token: &str,
    character_id: i64,
) -> Result<CharacterSnapshot, EsiError> {
    let public = api.character_public_data(access_token, character_id).await?;
    let portrait = api.character_portrait(access_token, character_id).await?;
    let corporation = api
        .corporation_data(access_token, public.corporation_id)
        .await?;
    let corporation_icons = api
        .corporation_icons(access_token, public.corporation_id)
        .await?;
    let skills = api.character_skills(access_token, character_id).await?;

    let alliance = match corporation.alliance_id.filter(|id| *id != 0) {
        Some(id) => {
            let data = api.alliance_data(access_token, id).await?;
            let icons = api.alliance_icons(access_token, id).await?;
            Some((id, data, icons))
        }
        None => None,
    };

    Ok(CharacterSnapshot {
        public,
        portrait,
        corporation,
        corporation_icons,
        alliance,
        skills,
    })
}

/// Write a snapshot and the character's token. Skills ESI no longer reports
/// are deleted.
pub fn store_snapshot(
    conn: &mut Connection,
    character_id: i64,
    snapshot: &CharacterSnapshot,
    token: &TokenRow,
) -> Result<CharacterData, DbError> {
    let corporation_id = snapshot.public.corporation_id;
    let alliance_id = snapshot.alliance.as_ref().map(|(id, _, _)| *id);

    transact_with_retries(conn, &RetryPolicy::default(), |tx| {
        if let Some((id, data, icons)) = &snapshot.alliance {
            characters::upsert_alliance(
                tx,
                &Alliance {
                    id: *id,
                    name: data.name.clone(),
                    ticker: data.ticker.clone(),
                    picture: icons.px64x64.clone(),
                },
            )?;
        }

        characters::upsert_corporation(
            tx,
            &Corporation {
                id: corporation_id,
                alliance_id,
                name: snapshot.corporation.name.clone(),
                ticker: snapshot.corporation.ticker.clone(),
                picture: snapshot.corporation_icons.px64x64.clone(),
            },
        )?;

        characters::upsert_character(
            tx,
            &Character {
                id: character_id,
                name: snapshot.public.name.clone(),
                picture: snapshot.portrait.px128x128.clone(),
                corporation_id,
            },
        )?;

        tokens::upsert_token(tx, token)?;

        let reported: HashSet<i64> = snapshot.skills.skills.iter().map(|s| s.skill_id).collect();
        let stale: Vec<i64> = characters::get_all_character_skills(tx, character_id)?
            .into_iter()
            .map(|s| s.skill_id)
            .filter(|id| !reported.contains(id))
            .collect();

        for skill in &snapshot.skills.skills {
            characters::upsert_character_skill(
                tx,
                &CharacterSkill {
                    character_id,
                    skill_id: skill.skill_id,
                    skill_level: skill.trained_skill_level,
                },
            )?;
        }
        characters::delete_character_skills(tx, character_id, &stale)?;

        characters::get_character(tx, character_id)?.ok_or(DbError::Sqlite(
            rusqlite::Error::QueryReturnedNoRows,
        ))
    })
}

/// Fetches from ESI and writes to the database for stored characters.
pub struct Syncer<'a> {
    pub api: &'a dyn EsiApi,
    pub tokens: &'a dyn TokenRefresher,
    pub db: &'a Db,
    /// Applied to a token row before it is written, to move the refresh
    /// token into the keychain.
    pub seal: fn(&TokenRow) -> TokenRow,
    /// Restores a refresh token moved out by `seal`.
    pub unseal: fn(TokenRow) -> TokenRow,
    pub timeout: Duration,
}

impl<'a> Syncer<'a> {
    /// Fetch everything for `character_id` and store it with `token`, within
    /// the sync timeout. Skill names are cached afterwards on a best-effort
    /// basis and never fail the call.
    pub async fn refresh_character_data(
        &self,
        token: &OAuthToken,
        character_id: i64,
    ) -> Result<CharacterData, RefreshError> {
        let data = tokio::time::timeout(self.timeout, self.fetch_and_store(token, character_id))
            .await
            .map_err(|_| RefreshError::Timeout(character_id, self.timeout))??;
        self.cache_skill_names(&data).await;
        Ok(data)
    }

    async fn fetch_and_store(
        &self,
        token: &OAuthToken,
        character_id: i64,
    ) -> Result<CharacterData, RefreshError> {
        let snapshot = fetch_snapshot(self.api, &token.access_token, character_id).await?;
        let row = (self.seal)(&token.to_row(character_id));

        let data = {
            let mut conn = self.db.lock()?;
            store_snapshot(&mut conn, character_id, &snapshot, &row)?
        };
        log::info!(
            "[refresh_character_data] Stored {} ({}) with {} skills",
            data.character.name,
            character_id,
            data.skills.len()
        );
        Ok(data)
    }

    async fn cache_skill_names(&self, data: &CharacterData) {
        let ids: Vec<i64> = data.skills.iter().map(|s| s.skill_id).collect();
        match tokio::time::timeout(self.timeout, self.resolve_skill_names(&ids)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => log::warn!("[refresh_character_data] Could not resolve skill names: {}", e),
            Err(_) => log::warn!(
                "[refresh_character_data] Resolving skill names for {} timed out after {:?}",
                data.character.id,
                self.timeout
            ),
        }
    }

    /// The stored token for `character_id`, refreshed first if it is about
    /// to expire.
    pub async fn load_token(&self, character_id: i64) -> Result<OAuthToken, RefreshError> {
        let row = {
            let conn = self.db.lock()?;
            tokens::get_token_for_character(&conn, character_id)?
        }
        .ok_or(RefreshError::NoToken(character_id))?;

        let token = OAuthToken::from_row((self.unseal)(row));
        if !token.needs_refresh(Utc::now()) {
            return Ok(token);
        }
        log::debug!("[load_token] Token for {} is expiring, refreshing", character_id);
        Ok(self.tokens.refresh(&token.refresh_token).await?)
    }

    /// Refresh one stored character. Token load, fetch and store share the
    /// sync timeout; skill-name caching runs after it.
    pub async fn refresh_stored_character(&self, character_id: i64) -> Result<CharacterData, RefreshError> {
        let work = async {
            let token = self.load_token(character_id).await?;
            self.fetch_and_store(&token, character_id).await
        };
        let data = tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| RefreshError::Timeout(character_id, self.timeout))??;
        self.cache_skill_names(&data).await;
        Ok(data)
    }

    /// Refresh every stored character concurrently.
    pub async fn refresh_all(&self) -> Result<Vec<CharacterData>, RefreshError> {
        let ids: Vec<i64> = {
            let conn = self.db.lock()?;
            characters::get_all_characters(&conn)?
                .into_iter()
                .map(|c| c.character.id)
                .collect()
        };
        log::info!("[refresh_all] Refreshing {} characters", ids.len());

        let results = join_all(ids.iter().map(|&id| self.refresh_stored_character(id))).await;

        let mut refreshed = Vec::with_capacity(ids.len());
        let mut failures = Vec::new();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(data) => refreshed.push(data),
                Err(e) => {
                    log::error!("[refresh_all] Character {} failed: {}", id, e);
                    failures.push((id, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(refreshed)
        } else {
            Err(RefreshError::Multiple(failures))
        }
    }

    /// Cache display names for skill ids that have none yet.
    pub async fn resolve_skill_names(&self, skill_ids: &[i64]) -> Result<usize, RefreshError> {
        let missing = {
            let conn = self.db.lock()?;
            skill_names::missing_skill_names(&conn, skill_ids)?
        };
        if missing.is_empty() {
            return Ok(0);
        }

        let names: Vec<SkillName> = self
            .api
            .universe_names(&missing)
            .await?
            .into_iter()
            .filter(|n| n.category == "inventory_type")
            .map(|n| SkillName {
                skill_id: n.id,
                name: n.name,
            })
            .collect();

        let conn = self.db.lock()?;
        skill_names::upsert_skill_names(&conn, &names)?;
        log::debug!("[resolve_skill_names] Cached {} skill names", names.len());
        Ok(names.len())
    }

    /// Look up skill names typed by the user that the cache doesn't know yet.
    pub async fn resolve_skill_ids(&self, names: &[String]) -> Result<usize, RefreshError> {
        if names.is_empty() {
            return Ok(0);
        }
        let found: Vec<SkillName> = self
            .api
            .universe_ids(names)
            .await?
            .inventory_types
            .into_iter()
            .map(|t| SkillName {
                skill_id: t.id,
                name: t.name,
            })
            .collect();

        let conn = self.db.lock()?;
        skill_names::upsert_skill_names(&conn, &found)?;
        Ok(found.len())
    }

    /// Cache names for every skill a stored character or tag refers to.
    pub async fn resolve_known_skill_names(&self) -> Result<usize, RefreshError> {
        let ids: Vec<i64> = {
            let conn = self.db.lock()?;
            let mut ids: HashSet<i64> = tags::get_all_tag_skills(&conn)?
                .into_iter()
                .map(|s| s.skill_id)
                .collect();
            for c in characters::get_all_characters(&conn)? {
                ids.extend(c.skills.iter().map(|s| s.skill_id));
            }
            ids.into_iter().collect()
        };
        self.resolve_skill_names(&ids).await
    }
}
