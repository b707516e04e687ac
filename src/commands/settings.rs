use tauri::State;

use crate::config::AppConfig;
use crate::db::Db;
use crate::errors::public;
use crate::state::AppState;
use crate::types::AppSettings;

#[tauri::command]
pub fn get_settings(db: State<'_, Db>) -> Result<AppSettings, String> {
    let conn = db.lock().map_err(public("Could not load settings"))?;
    crate::db::read_settings(&conn).map_err(public("Could not load settings"))
}

#[tauri::command]
pub fn save_settings(db: State<'_, Db>, settings: AppSettings) -> Result<(), String> {
    let settings = normalize_settings(settings);
    let conn = db.lock().map_err(public("Could not save settings"))?;
    crate::db::write_settings(&conn, &settings).map_err(public("Could not save settings"))?;
    crate::logging::set_log_level(&settings.log_level);
    Ok(())
}

/// Store the canonical level name and drop duplicate filter ids.
fn normalize_settings(mut settings: AppSettings) -> AppSettings {
    settings.log_level = crate::logging::parse_level(&settings.log_level)
        .to_string()
        .to_lowercase();
    dedup_in_order(&mut settings.selected_tag_ids);
    dedup_in_order(&mut settings.selected_role_ids);
    settings
}

fn dedup_in_order(ids: &mut Vec<i64>) {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(*id));
}

/// Change the log level now and remember it for the next start.
#[tauri::command]
pub fn set_log_level(db: State<'_, Db>, level: String) -> Result<(), String> {
    let filter = crate::logging::set_log_level(&level);
    let conn = db.lock().map_err(public("Could not save log level"))?;
    let mut settings = crate::db::read_settings(&conn).map_err(public("Could not save log level"))?;
    settings.log_level = filter.to_string().to_lowercase();
    crate::db::write_settings(&conn, &settings).map_err(public("Could not save log level"))
}

#[tauri::command]
pub fn get_log_file_path(app: tauri::AppHandle) -> Result<String, String> {
    crate::logging::get_log_file_path(&app)
}

#[tauri::command]
pub fn get_config(state: State<'_, AppState>) -> AppConfig {
    state.config.clone()
}
