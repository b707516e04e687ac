use std::collections::HashMap;

use rusqlite::Connection;
use tauri::State;

use crate::db::{self, Db, DbError};
use crate::errors::{public, PublicError};
use crate::repository::{skill_names, tags};
use crate::skill_list::{self, SkillListError};
use crate::state::AppState;
use crate::types::{Color, SkillRequirement, Tag, TagData};

#[tauri::command]
pub fn list_tags(db: State<'_, Db>) -> Result<Vec<TagData>, String> {
    log::info!("[list_tags]");
    let conn = db.lock().map_err(public("Could not load tags"))?;
    tags::get_all_tags(&conn).map_err(public("Could not load tags"))
}

/// Create a tag from a pasted skill list. A missing colour gets a random one.
#[tauri::command]
pub async fn create_tag(
    db: State<'_, Db>,
    state: State<'_, AppState>,
    name: String,
    color: Option<Color>,
    skill_list: String,
) -> Result<TagData, String> {
    log::info!("[create_tag] name={}", name);
    let name = validate_name(&name).map_err(PublicError::report)?;
    let skills = resolve_skill_list(db.inner(), state.inner(), &skill_list)
        .await
        .map_err(PublicError::report)?;

    let mut conn = db.lock().map_err(public("Could not create tag"))?;
    tags::create_tag(&mut conn, name, color.unwrap_or_else(Color::random), &skills)
        .map_err(public("Could not create tag"))
}

#[tauri::command]
pub async fn update_tag(
    db: State<'_, Db>,
    state: State<'_, AppState>,
    tag: Tag,
    skill_list: String,
) -> Result<TagData, String> {
    log::info!("[update_tag] id={}", tag.id);
    validate_name(&tag.name).map_err(PublicError::report)?;
    let skills = resolve_skill_list(db.inner(), state.inner(), &skill_list)
        .await
        .map_err(PublicError::report)?;

    let mut conn = db.lock().map_err(public("Could not save tag"))?;
    tags::save_tag(&mut conn, &tag, &skills)
        .map_err(public("Could not save tag"))?
        .ok_or_else(|| PublicError::new(format!("Tag {} no longer exists", tag.id)).report())
}

#[tauri::command]
pub fn delete_tag(db: State<'_, Db>, tag_id: i64) -> Result<bool, String> {
    log::info!("[delete_tag] id={}", tag_id);
    let conn = db.lock().map_err(public("Could not delete tag"))?;
    delete_tag_inner(&conn, tag_id).map_err(public("Could not delete tag"))
}

/// Delete the tag and drop it from the saved filter selection.
fn delete_tag_inner(conn: &Connection, tag_id: i64) -> Result<bool, DbError> {
    let deleted = tags::delete_tag(conn, tag_id)?;
    let mut settings = db::read_settings(conn)?;
    if settings.selected_tag_ids.contains(&tag_id) {
        settings.selected_tag_ids.retain(|id| *id != tag_id);
        db::write_settings(conn, &settings)?;
    }
    Ok(deleted)
}

/// Parse a skill list without saving it, so the UI can show what it resolved to.
#[tauri::command]
pub async fn parse_skill_list(
    db: State<'_, Db>,
    state: State<'_, AppState>,
    text: String,
) -> Result<Vec<SkillRequirement>, String> {
    log::info!("[parse_skill_list] {} line(s)", text.lines().count());
    resolve_skill_list(db.inner(), state.inner(), &text)
        .await
        .map_err(PublicError::report)
}

#[tauri::command]
pub fn get_skill_names(db: State<'_, Db>, skill_ids: Vec<i64>) -> Result<HashMap<i64, String>, String> {
    log::debug!("[get_skill_names] {} id(s)", skill_ids.len());
    let conn = db.lock().map_err(public("Could not load skill names"))?;
    skill_names::batch_get_skill_names(&conn, &skill_ids).map_err(public("Could not load skill names"))
}

fn validate_name(name: &str) -> Result<&str, PublicError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PublicError::new("Tag name cannot be empty"));
    }
    Ok(name)
}

/// Names missing from the local cache are looked up on ESI first. A failed
/// lookup is logged and the parse then reports those names as unknown.
async fn resolve_skill_list(
    db: &Db,
    state: &AppState,
    text: &str,
) -> Result<Vec<SkillRequirement>, PublicError> {
    let unknown = {
        let conn = db.lock().map_err(lookup_error)?;
        skill_list::unresolved_names(text, |name| skill_names::get_skill_id_by_name(&conn, name))
            .map_err(lookup_error)?
    };

    if !unknown.is_empty() {
        log::info!("[resolve_skill_list] Looking up {} skill name(s) on ESI", unknown.len());
        if let Err(e) = state.syncer(db).resolve_skill_ids(&unknown).await {
            log::warn!("[resolve_skill_list] ESI lookup failed: {}", e);
        }
    }

    let conn = db.lock().map_err(lookup_error)?;
    parse_cached(&conn, text)
}

fn parse_cached(conn: &Connection, text: &str) -> Result<Vec<SkillRequirement>, PublicError> {
    skill_list::parse_skill_list(text, |name| skill_names::get_skill_id_by_name(conn, name))
        .map_err(|e| match e {
            SkillListError::Invalid(lines) => PublicError::new(format!(
                "Invalid skill list:\n{}",
                lines
                    .iter()
                    .map(|l| l.to_string())
                    .collect::<Vec<_>>()
                    .join("\n")
            )),
            SkillListError::Lookup(e) => lookup_error(e),
        })
}

fn lookup_error(e: DbError) -> PublicError {
    PublicError::new("Could not look up skill names").with_cause(e)
}
