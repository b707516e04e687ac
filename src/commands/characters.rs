use rusqlite::Connection;
use tauri::State;
use tauri_plugin_opener::OpenerExt;

use crate::db::{Db, DbError};
use crate::errors::{public, PublicError};
use crate::keychain;
use crate::refresh::RefreshError;
use crate::repository::characters;
use crate::state::AppState;
use crate::types::CharacterData;

#[tauri::command]
pub fn list_characters(db: State<'_, Db>) -> Result<Vec<CharacterData>, String> {
    log::info!("[list_characters]");
    let conn = db.lock().map_err(public("Could not load characters"))?;
    characters::get_all_characters(&conn).map_err(public("Could not load characters"))
}

/// Log in through the browser and store the character that logged in.
#[tauri::command]
pub async fn add_character(
    app: tauri::AppHandle,
    db: State<'_, Db>,
    state: State<'_, AppState>,
) -> Result<CharacterData, String> {
    log::info!("[add_character]");
    let token = state
        .sso
        .authenticate(
            state.callbacks.registry(),
            |url| {
                app.opener()
                    .open_url(url, None::<&str>)
                    .map_err(|e| e.to_string())
            },
            state.config.auth_timeout(),
        )
        .await
        .map_err(public("Could not log in with EVE Online"))?;

    let who = state
        .sso
        .validate_token(&token.access_token)
        .await
        .map_err(public("EVE Online returned an invalid login"))?;
    log::info!("[add_character] Logged in as {} ({})", who.name, who.character_id);

    state
        .syncer(db.inner())
        .refresh_character_data(&token, who.character_id)
        .await
        .map_err(|e| {
            PublicError::new(format!("Could not load data for {}", who.name))
                .with_cause(e)
                .report()
        })
}

#[tauri::command]
pub async fn refresh_character(
    db: State<'_, Db>,
    state: State<'_, AppState>,
    character_id: i64,
) -> Result<CharacterData, String> {
    log::info!("[refresh_character] character_id={}", character_id);
    state
        .syncer(db.inner())
        .refresh_stored_character(character_id)
        .await
        .map_err(public("Could not refresh character"))
}

#[tauri::command]
pub async fn refresh_all_characters(
    db: State<'_, Db>,
    state: State<'_, AppState>,
) -> Result<Vec<CharacterData>, String> {
    log::info!("[refresh_all_characters]");
    state
        .syncer(db.inner())
        .refresh_all()
        .await
        .map_err(|e| refresh_all_error(&e).with_cause(e).report())
}

fn refresh_all_error(err: &RefreshError) -> PublicError {
    match err {
        RefreshError::Multiple(failures) => {
            PublicError::new(format!("{} character(s) could not be refreshed", failures.len()))
        }
        _ => PublicError::new("Could not refresh characters"),
    }
}

#[tauri::command]
pub fn delete_character(db: State<'_, Db>, character_id: i64) -> Result<bool, String> {
    log::info!("[delete_character] character_id={}", character_id);
    let conn = db.lock().map_err(public("Could not delete character"))?;
    let deleted = delete_character_inner(&conn, character_id)
        .map_err(public("Could not delete character"))?;
    if deleted {
        keychain::forget_refresh_token(character_id);
    }
    Ok(deleted)
}

/// Skills and the token row cascade. Corporation and alliance rows stay since
/// other characters may share them.
fn delete_character_inner(conn: &Connection, character_id: i64) -> Result<bool, DbError> {
    let deleted = characters::delete_character(conn, character_id)?;
    if !deleted {
        log::warn!("[delete_character] Character {} not found", character_id);
    }
    Ok(deleted)
}
