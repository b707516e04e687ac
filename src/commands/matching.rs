use rusqlite::Connection;
use tauri::State;

use crate::db::{self, Db, DbError};
use crate::errors::{public, PublicError};
use crate::matching::{self, CharacterMatches, FilterSelection};
use crate::repository::{characters, roles, tags};

#[tauri::command]
pub fn get_character_matches(db: State<'_, Db>, character_id: i64) -> Result<CharacterMatches, String> {
    log::debug!("[get_character_matches] character_id={}", character_id);
    let conn = db.lock().map_err(public("Could not match character"))?;
    character_matches_inner(&conn, character_id)
        .map_err(public("Could not match character"))?
        .ok_or_else(|| PublicError::new(format!("Character {} not found", character_id)).report())
}

/// Tag and role results for every character, with the saved filter applied.
#[tauri::command]
pub fn character_overview(db: State<'_, Db>) -> Result<Vec<CharacterMatches>, String> {
    log::debug!("[character_overview]");
    let conn = db.lock().map_err(public("Could not match characters"))?;
    overview_inner(&conn).map_err(public("Could not match characters"))
}

fn saved_filter(conn: &Connection) -> Result<FilterSelection, DbError> {
    let settings = db::read_settings(conn)?;
    Ok(FilterSelection::new(
        &settings.selected_tag_ids,
        &settings.selected_role_ids,
    ))
}

fn character_matches_inner(
    conn: &Connection,
    character_id: i64,
) -> Result<Option<CharacterMatches>, DbError> {
    let Some(character) = characters::get_character(conn, character_id)? else {
        return Ok(None);
    };
    let filter = saved_filter(conn)?;
    let tags = tags::get_all_tags(conn)?;
    let roles = roles::get_all_roles(conn)?;
    Ok(Some(matching::character_matches(&character, &tags, &roles, &filter)))
}

fn overview_inner(conn: &Connection) -> Result<Vec<CharacterMatches>, DbError> {
    let filter = saved_filter(conn)?;
    let characters = characters::get_all_characters(conn)?;
    let tags = tags::get_all_tags(conn)?;
    let roles = roles::get_all_roles(conn)?;
    log::debug!(
        "[character_overview] {} characters, {} tags, {} roles",
        characters.len(),
        tags.len(),
        roles.len()
    );
    Ok(matching::character_overview(&characters, &tags, &roles, &filter))
}
