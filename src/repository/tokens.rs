use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};

use crate::db::DbError;
use crate::types::TokenRow;

pub fn upsert_token(conn: &Connection, token: &TokenRow) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO tokens (character_id, access_token, refresh_token, token_type, expiration)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(character_id) DO UPDATE SET
             access_token = ?2, refresh_token = ?3, token_type = ?4, expiration = ?5",
        params![
            token.character_id,
            token.access_token,
            token.refresh_token,
            token.token_type,
            token.expiration.to_rfc3339_opts(SecondsFormat::Secs, true),
        ],
    )?;
    Ok(())
}

pub fn get_token_for_character(
    conn: &Connection,
    character_id: i64,
) -> Result<Option<TokenRow>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT character_id, access_token, refresh_token, token_type, expiration
         FROM tokens WHERE character_id = ?1",
    )?;

    let result = stmt.query_row(params![character_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    });

    match result {
        Ok((character_id, access_token, refresh_token, token_type, expiration)) => {
            let expiration = DateTime::parse_from_rfc3339(&expiration)
                .map_err(|e| DbError::InvalidValue {
                    field: "expiration",
                    reason: e.to_string(),
                })?
                .with_timezone(&Utc);
            Ok(Some(TokenRow {
                character_id,
                access_token,
                refresh_token,
                token_type,
                expiration,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_db;
    use crate::repository::characters::fixtures::insert_character;
    use chrono::TimeZone;

    fn token(character_id: i64, access: &str) -> TokenRow {
        TokenRow {
            character_id,
            access_token: access.to_string(),
            refresh_token: "refresh".to_string(),
            token_type: "Bearer".to_string(),
            expiration: Utc.with_ymd_and_hms(2030, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_token_round_trip() {
        let conn = create_test_db();
        insert_character(&conn, 1, "A");
        upsert_token(&conn, &token(1, "first")).unwrap();

        assert_eq!(get_token_for_character(&conn, 1).unwrap(), Some(token(1, "first")));
    }

    #[test]
    fn test_upsert_token_replaces_existing_row() {
        let conn = create_test_db();
        insert_character(&conn, 1, "A");
        upsert_token(&conn, &token(1, "first")).unwrap();
        let mut next = token(1, "second");
        next.refresh_token = String::new();
        upsert_token(&conn, &next).unwrap();

        let loaded = get_token_for_character(&conn, 1).unwrap().unwrap();
        assert_eq!(loaded.access_token, "second");
        assert!(loaded.refresh_token.is_empty());
    }

    #[test]
    fn test_missing_token_is_none() {
        let conn = create_test_db();
        assert!(get_token_for_character(&conn, 1).unwrap().is_none());
    }

    #[test]
    fn test_token_requires_character() {
        let conn = create_test_db();
        assert!(upsert_token(&conn, &token(42, "x")).is_err());
    }
}
