use std::collections::HashMap;

use rusqlite::{params, params_from_iter, Connection, Row};

use super::placeholders;
use crate::db::DbError;
use crate::types::{Alliance, Character, CharacterData, CharacterSkill, Corporation};

pub fn upsert_alliance(conn: &Connection, alliance: &Alliance) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO alliances (id, name, ticker, picture) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET name = ?2, ticker = ?3, picture = ?4",
        params![alliance.id, alliance.name, alliance.ticker, alliance.picture],
    )?;
    Ok(())
}

pub fn upsert_corporation(conn: &Connection, corp: &Corporation) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO corporations (id, alliance_id, name, ticker, picture)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
             alliance_id = ?2, name = ?3, ticker = ?4, picture = ?5",
        params![corp.id, corp.alliance_id, corp.name, corp.ticker, corp.picture],
    )?;
    Ok(())
}

pub fn upsert_character(conn: &Connection, character: &Character) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO characters (id, name, picture, corporation_id, updated_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET
             name = ?2, picture = ?3, corporation_id = ?4, updated_at = datetime('now')",
        params![
            character.id,
            character.name,
            character.picture,
            character.corporation_id
        ],
    )?;
    Ok(())
}

const CHARACTER_SELECT: &str = "
    SELECT c.id, c.name, c.picture, c.corporation_id,
           corp.alliance_id, corp.name, corp.ticker, corp.picture,
           a.id, a.name, a.ticker, a.picture
    FROM characters c
    JOIN corporations corp ON corp.id = c.corporation_id
    LEFT JOIN alliances a ON a.id = corp.alliance_id";

fn row_to_character(row: &Row<'_>) -> rusqlite::Result<CharacterData> {
    let corporation_id: i64 = row.get(3)?;
    let alliance_id: Option<i64> = row.get(8)?;
    let alliance = match alliance_id {
        Some(id) => Some(Alliance {
            id,
            name: row.get(9)?,
            ticker: row.get(10)?,
            picture: row.get(11)?,
        }),
        None => None,
    };

    Ok(CharacterData {
        character: Character {
            id: row.get(0)?,
            name: row.get(1)?,
            picture: row.get(2)?,
            corporation_id,
        },
        corporation: Corporation {
            id: corporation_id,
            alliance_id: row.get(4)?,
            name: row.get(5)?,
            ticker: row.get(6)?,
            picture: row.get(7)?,
        },
        alliance,
        skills: Vec::new(),
    })
}

pub fn get_character(conn: &Connection, id: i64) -> Result<Option<CharacterData>, DbError> {
    let mut stmt = conn.prepare(&format!("{} WHERE c.id = ?1", CHARACTER_SELECT))?;
    let result = stmt.query_row(params![id], row_to_character);

    match result {
        Ok(mut data) => {
            data.skills = get_all_character_skills(conn, id)?;
            Ok(Some(data))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Every character with its affiliation and skills, ordered by name.
pub fn get_all_characters(conn: &Connection) -> Result<Vec<CharacterData>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "{} ORDER BY c.name COLLATE NOCASE, c.id",
        CHARACTER_SELECT
    ))?;
    let mut characters = stmt
        .query_map([], row_to_character)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut skills: HashMap<i64, Vec<CharacterSkill>> = HashMap::new();
    let mut stmt = conn.prepare(
        "SELECT character_id, skill_id, skill_level FROM character_skills
         ORDER BY character_id, skill_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(CharacterSkill {
            character_id: row.get(0)?,
            skill_id: row.get(1)?,
            skill_level: row.get(2)?,
        })
    })?;
    for row in rows {
        let skill = row?;
        skills.entry(skill.character_id).or_default().push(skill);
    }

    for data in &mut characters {
        data.skills = skills.remove(&data.character.id).unwrap_or_default();
    }
    Ok(characters)
}

pub fn get_all_character_skills(
    conn: &Connection,
    character_id: i64,
) -> Result<Vec<CharacterSkill>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT character_id, skill_id, skill_level FROM character_skills
         WHERE character_id = ?1 ORDER BY skill_id",
    )?;
    let skills = stmt
        .query_map(params![character_id], |row| {
            Ok(CharacterSkill {
                character_id: row.get(0)?,
                skill_id: row.get(1)?,
                skill_level: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(skills)
}

pub fn upsert_character_skill(conn: &Connection, skill: &CharacterSkill) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO character_skills (character_id, skill_id, skill_level) VALUES (?1, ?2, ?3)
         ON CONFLICT(character_id, skill_id) DO UPDATE SET skill_level = ?3",
        params![skill.character_id, skill.skill_id, skill.skill_level],
    )?;
    Ok(())
}

/// Remove the given skills from a character. Returns the number of rows deleted.
pub fn delete_character_skills(
    conn: &Connection,
    character_id: i64,
    skill_ids: &[i64],
) -> Result<usize, DbError> {
    if skill_ids.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "DELETE FROM character_skills WHERE character_id = ?1 AND skill_id IN ({})",
        placeholders(skill_ids.len(), 1)
    );
    let values = std::iter::once(character_id).chain(skill_ids.iter().copied());
    Ok(conn.execute(&sql, params_from_iter(values))?)
}

/// Delete a character. Skills and the stored token go with it.
/// Returns `false` when no such character exists.
pub fn delete_character(conn: &Connection, id: i64) -> Result<bool, DbError> {
    let deleted = conn.execute("DELETE FROM characters WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::db::create_test_db;

    fn skill(character_id: i64, skill_id: i64, skill_level: i64) -> CharacterSkill {
        CharacterSkill {
            character_id,
            skill_id,
            skill_level,
        }
    }

    #[test]
    fn test_character_with_alliance_round_trip() {
        let conn = create_test_db();
        upsert_alliance(&conn, &alliance(99)).unwrap();
        upsert_corporation(&conn, &corporation(10, Some(99))).unwrap();
        upsert_character(&conn, &character(1, "Pilot", 10)).unwrap();
        upsert_character_skill(&conn, &skill(1, 3300, 4)).unwrap();

        let data = get_character(&conn, 1).unwrap().unwrap();
        assert_eq!(data.character.name, "Pilot");
        assert_eq!(data.corporation.alliance_id, Some(99));
        assert_eq!(data.alliance.unwrap().ticker, "A99");
        assert_eq!(data.skills, vec![skill(1, 3300, 4)]);
    }

    #[test]
    fn test_get_missing_character_is_none() {
        let conn = create_test_db();
        assert!(get_character(&conn, 5).unwrap().is_none());
    }

    #[test]
    fn test_upserts_overwrite() {
        let conn = create_test_db();
        insert_character(&conn, 1, "Before");
        upsert_character(&conn, &character(1, "After", 1001)).unwrap();
        upsert_character_skill(&conn, &skill(1, 3300, 1)).unwrap();
        upsert_character_skill(&conn, &skill(1, 3300, 5)).unwrap();

        let data = get_character(&conn, 1).unwrap().unwrap();
        assert_eq!(data.character.name, "After");
        assert_eq!(data.skills, vec![skill(1, 3300, 5)]);
    }

    #[test]
    fn test_get_all_characters_orders_by_name_and_groups_skills() {
        let conn = create_test_db();
        insert_character(&conn, 1, "zed");
        insert_character(&conn, 2, "Alpha");
        upsert_character_skill(&conn, &skill(1, 10, 1)).unwrap();
        upsert_character_skill(&conn, &skill(2, 20, 2)).unwrap();
        upsert_character_skill(&conn, &skill(2, 11, 3)).unwrap();

        let all = get_all_characters(&conn).unwrap();
        let names: Vec<&str> = all.iter().map(|c| c.character.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "zed"]);
        assert_eq!(all[0].skills, vec![skill(2, 11, 3), skill(2, 20, 2)]);
        assert_eq!(all[1].skills, vec![skill(1, 10, 1)]);
        assert!(all[0].alliance.is_none());
    }

    #[test]
    fn test_delete_character_skills_only_touches_listed_ids() {
        let conn = create_test_db();
        insert_character(&conn, 1, "A");
        insert_character(&conn, 2, "B");
        for id in [10, 11, 12] {
            upsert_character_skill(&conn, &skill(1, id, 1)).unwrap();
        }
        upsert_character_skill(&conn, &skill(2, 10, 1)).unwrap();

        assert_eq!(delete_character_skills(&conn, 1, &[10, 12]).unwrap(), 2);
        assert_eq!(delete_character_skills(&conn, 1, &[]).unwrap(), 0);

        assert_eq!(get_all_character_skills(&conn, 1).unwrap(), vec![skill(1, 11, 1)]);
        assert_eq!(get_all_character_skills(&conn, 2).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_character_cascades() {
        let conn = create_test_db();
        insert_character(&conn, 1, "A");
        upsert_character_skill(&conn, &skill(1, 10, 1)).unwrap();
        conn.execute(
            "INSERT INTO tokens (character_id, access_token, token_type, expiration)
             VALUES (1, 'at', 'Bearer', '2030-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        assert!(delete_character(&conn, 1).unwrap());
        assert!(!delete_character(&conn, 1).unwrap());

        let skills: i64 = conn
            .query_row("SELECT COUNT(*) FROM character_skills", [], |r| r.get(0))
            .unwrap();
        let tokens: i64 = conn
            .query_row("SELECT COUNT(*) FROM tokens", [], |r| r.get(0))
            .unwrap();
        assert_eq!((skills, tokens), (0, 0));
    }
}
