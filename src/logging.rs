/// The log file name written to the app log directory each session.
#[cfg(feature = "desktop")]
const LOG_FILE_NAME: &str = "eve-alts";

/// Map a level name to a filter, or `None` for an unknown name.
pub fn parse_level_strict(level: &str) -> Option<log::LevelFilter> {
    match level.trim().to_lowercase().as_str() {
        "off" => Some(log::LevelFilter::Off),
        "error" => Some(log::LevelFilter::Error),
        "warn" | "warning" => Some(log::LevelFilter::Warn),
        "info" => Some(log::LevelFilter::Info),
        "debug" => Some(log::LevelFilter::Debug),
        "trace" => Some(log::LevelFilter::Trace),
        _ => None,
    }
}

/// Map a level name to a filter. Unrecognized values fall back to `Info`.
pub fn parse_level(level: &str) -> log::LevelFilter {
    parse_level_strict(level).unwrap_or(log::LevelFilter::Info)
}

/// Set the runtime log level.
///
/// Called during `.setup()` with the level from config (overridden by the
/// persisted setting) and from the `set_log_level` command.
pub fn set_log_level(level: &str) -> log::LevelFilter {
    let filter = parse_level(level);
    log::set_max_level(filter);
    log::info!("Log level set to {}", filter);
    filter
}

/// Truncate the log file so each session starts fresh.
///
/// Called from `.setup()` after the log plugin has already opened the file.
/// The plugin holds an append-mode handle, so later writes land at offset 0.
#[cfg(feature = "desktop")]
pub fn truncate_log_file(app: &tauri::AppHandle) {
    use tauri::Manager;
    match app.path().app_log_dir() {
        Ok(log_dir) => {
            let log_file = log_dir.join(format!("{}.log", LOG_FILE_NAME));
            if log_file.exists() {
                if let Err(e) = std::fs::write(&log_file, "") {
                    eprintln!("Failed to truncate log file {:?}: {}", log_file, e);
                }
            }
        }
        Err(e) => {
            eprintln!("Failed to resolve app log dir for truncation: {}", e);
        }
    }
}

/// Build the `tauri-plugin-log` plugin instance.
///
/// Targets the app log directory and stderr. The plugin filter stays wide
/// open; `set_log_level()` does the actual filtering through
/// `log::set_max_level()`.
#[cfg(feature = "desktop")]
pub fn build_log_plugin() -> tauri_plugin_log::Builder {
    use tauri_plugin_log::{Target, TargetKind};

    tauri_plugin_log::Builder::new()
        .targets([
            Target::new(TargetKind::LogDir {
                file_name: Some(LOG_FILE_NAME.into()),
            }),
            Target::new(TargetKind::Stderr),
        ])
        .level(log::LevelFilter::Trace)
        // reqwest/hyper are chatty at debug
        .level_for("hyper_util", log::LevelFilter::Info)
        .level_for("reqwest", log::LevelFilter::Info)
        .max_file_size(20_000_000)
}

#[cfg(feature = "desktop")]
pub fn get_log_file_path(app: &tauri::AppHandle) -> Result<String, String> {
    use tauri::Manager;
    let log_dir = app.path().app_log_dir().map_err(|e| e.to_string())?;
    let log_file = log_dir.join(format!("{}.log", LOG_FILE_NAME));
    log_file
        .to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| "Log file path contains invalid UTF-8".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("ERROR"), log::LevelFilter::Error);
        assert_eq!(parse_level(" debug "), log::LevelFilter::Debug);
        assert_eq!(parse_level("warning"), log::LevelFilter::Warn);
        assert_eq!(parse_level("verbose"), log::LevelFilter::Info);
    }

    #[test]
    fn test_parse_level_strict_rejects_unknown() {
        assert_eq!(parse_level_strict("Warning"), Some(log::LevelFilter::Warn));
        assert_eq!(parse_level_strict("off"), Some(log::LevelFilter::Off));
        assert_eq!(parse_level_strict("verbose"), None);
    }
}
