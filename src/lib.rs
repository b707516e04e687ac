pub mod auth;
#[cfg(feature = "desktop")]
mod commands;
pub mod config;
pub mod db;
pub mod errors;
pub mod esi;
pub mod keychain;
pub mod logging;
pub mod matching;
pub mod refresh;
pub mod repository;
pub mod skill_list;
pub mod state;
pub mod transaction;
pub mod types;

pub use types::*;

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use tauri::Manager;

    let app = tauri::Builder::default()
        .plugin(logging::build_log_plugin().build())
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .setup(|app| {
            logging::truncate_log_file(app.handle());

            let config = config::load()?;
            // The persisted setting overrides this once the database is open.
            logging::set_log_level(&config.logging.level);

            let data_dir = app.path().app_data_dir()?;
            let db_path = config.database_path(&data_dir);
            log::info!("Opening database at {}", db_path.display());
            let db = db::open_db(&db_path)?;
            let settings = {
                let conn = db.lock()?;
                db::read_settings(&conn)?
            };
            logging::set_log_level(&settings.log_level);

            let state = tauri::async_runtime::block_on(state::AppState::start(config))?;
            app.manage(db);
            app.manage(state);

            let handle = app.handle().clone();
            tauri::async_runtime::spawn(async move {
                let db = handle.state::<db::Db>();
                let state = handle.state::<state::AppState>();
                if let Err(e) = state.syncer(db.inner()).resolve_known_skill_names().await {
                    errors::show_error(
                        &handle,
                        &errors::PublicError::new("Could not load skill names from EVE Online")
                            .with_cause(e),
                    );
                }
            });

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::characters::list_characters,
            commands::characters::add_character,
            commands::characters::refresh_character,
            commands::characters::refresh_all_characters,
            commands::characters::delete_character,
            commands::tags::list_tags,
            commands::tags::create_tag,
            commands::tags::update_tag,
            commands::tags::delete_tag,
            commands::tags::parse_skill_list,
            commands::tags::get_skill_names,
            commands::roles::list_roles,
            commands::roles::create_role,
            commands::roles::update_role,
            commands::roles::delete_role,
            commands::matching::get_character_matches,
            commands::matching::character_overview,
            commands::settings::get_settings,
            commands::settings::save_settings,
            commands::settings::set_log_level,
            commands::settings::get_log_file_path,
            commands::settings::get_config,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|handle, event| {
        if let tauri::RunEvent::Exit = event {
            if let Some(state) = handle.try_state::<state::AppState>() {
                state.shutdown();
            }
        }
    });
}
