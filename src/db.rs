use crate::types::AppSettings;
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub struct Db(pub Mutex<Connection>);

impl Db {
    pub fn new(conn: Connection) -> Self {
        Db(Mutex::new(conn))
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.0.lock().map_err(|_| DbError::Poisoned)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("could not encode value: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid {field} in database: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("{0}")]
    NonRetryable(Box<DbError>),
    #[error("transaction failed after {} attempt(s): {}", .0.len(), join_errors(.0))]
    Exhausted(Vec<DbError>),
    #[error("database lock poisoned")]
    Poisoned,
    #[error("could not open database: {0}")]
    Io(#[from] std::io::Error),
}

fn join_errors(errors: &[DbError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Open (or create) the database file at `path` and bring the schema up to
/// date.
pub fn open_db(path: &Path) -> Result<Db, DbError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    configure(&conn)?;
    run_migrations(&conn)?;
    log::info!("[open_db] Opened database at {}", path.display());
    Ok(Db::new(conn))
}

fn configure(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
}

pub(crate) fn run_migrations(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS alliances (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            ticker TEXT NOT NULL,
            picture TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS corporations (
            id INTEGER PRIMARY KEY,
            alliance_id INTEGER REFERENCES alliances(id) ON DELETE SET NULL,
            name TEXT NOT NULL,
            ticker TEXT NOT NULL,
            picture TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS characters (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            picture TEXT NOT NULL DEFAULT '',
            corporation_id INTEGER NOT NULL REFERENCES corporations(id),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS character_skills (
            character_id INTEGER NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
            skill_id INTEGER NOT NULL,
            skill_level INTEGER NOT NULL,
            PRIMARY KEY (character_id, skill_id)
        );

        CREATE TABLE IF NOT EXISTS tokens (
            character_id INTEGER PRIMARY KEY REFERENCES characters(id) ON DELETE CASCADE,
            access_token TEXT NOT NULL,
            refresh_token TEXT NOT NULL DEFAULT '',
            token_type TEXT NOT NULL,
            expiration TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            color TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tag_skills (
            tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
            skill_id INTEGER NOT NULL,
            skill_level INTEGER NOT NULL,
            PRIMARY KEY (tag_id, skill_id)
        );

        CREATE TABLE IF NOT EXISTS roles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            label TEXT NOT NULL,
            operator TEXT NOT NULL CHECK (operator IN ('all', 'any', 'none')),
            color TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS role_tags (
            role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
            tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
            position INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (role_id, tag_id)
        );

        CREATE TABLE IF NOT EXISTS skill_names (
            skill_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_skill_names_name
            ON skill_names(name COLLATE NOCASE);",
    )
}

pub fn read_settings(conn: &Connection) -> Result<AppSettings, DbError> {
    let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?1")?;

    let result: Result<String, _> = stmt.query_row(["app_settings"], |row| row.get(0));

    match result {
        Ok(json) => Ok(serde_json::from_str(&json)?),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(AppSettings::default()),
        Err(e) => Err(e.into()),
    }
}

pub fn write_settings(conn: &Connection, settings: &AppSettings) -> Result<(), DbError> {
    let json = serde_json::to_string(settings)?;
    conn.execute(
        "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
        ["app_settings", &json],
    )?;
    Ok(())
}

/// In-memory database with the full schema, shared by module tests.
#[cfg(test)]
pub(crate) fn create_test_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    configure(&conn).unwrap();
    run_migrations(&conn).unwrap();
    conn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_default_settings() {
        let conn = create_test_db();
        let settings = read_settings(&conn).unwrap();
        assert_eq!(settings, AppSettings::default());
    }

    #[test]
    fn test_write_and_read_settings() {
        let conn = create_test_db();
        let settings = AppSettings {
            log_level: "debug".to_string(),
            selected_tag_ids: vec![3, 1],
            selected_role_ids: vec![7],
        };
        write_settings(&conn, &settings).unwrap();

        let loaded = read_settings(&conn).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_overwrite_settings() {
        let conn = create_test_db();
        let mut settings = AppSettings::default();
        settings.selected_tag_ids = vec![1];
        write_settings(&conn, &settings).unwrap();

        settings.selected_tag_ids.clear();
        settings.log_level = "warn".to_string();
        write_settings(&conn, &settings).unwrap();

        let loaded = read_settings(&conn).unwrap();
        assert!(loaded.selected_tag_ids.is_empty());
        assert_eq!(loaded.log_level, "warn");
    }

    #[test]
    fn test_migration_is_idempotent() {
        let conn = create_test_db();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let conn = create_test_db();
        let result = conn.execute(
            "INSERT INTO characters (id, name, corporation_id) VALUES (1, 'x', 999)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_open_db_creates_file_and_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("eve-alts.db");
        let db = open_db(&path).unwrap();
        assert!(path.exists());

        let conn = db.lock().unwrap();
        write_settings(&conn, &AppSettings::default()).unwrap();
    }

    #[test]
    fn test_exhausted_error_lists_every_attempt() {
        let err = DbError::Exhausted(vec![
            DbError::InvalidValue {
                field: "color",
                reason: "bad".to_string(),
            },
            DbError::Poisoned,
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("transaction failed after 2 attempt(s)"));
        assert!(msg.contains("invalid color in database: bad"));
        assert!(msg.contains("database lock poisoned"));
    }
}
