use std::collections::{BTreeSet, HashMap};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::placeholders;
use crate::db::DbError;
use crate::types::SkillName;

pub fn upsert_skill_names(conn: &Connection, names: &[SkillName]) -> Result<(), DbError> {
    let mut stmt = conn.prepare(
        "INSERT INTO skill_names (skill_id, name) VALUES (?1, ?2)
         ON CONFLICT(skill_id) DO UPDATE SET name = ?2",
    )?;
    for n in names {
        stmt.execute(params![n.skill_id, n.name])?;
    }
    Ok(())
}

pub fn get_skill_name(conn: &Connection, skill_id: i64) -> Result<Option<String>, DbError> {
    Ok(conn
        .query_row(
            "SELECT name FROM skill_names WHERE skill_id = ?1",
            params![skill_id],
            |row| row.get(0),
        )
        .optional()?)
}

/// Case-insensitive lookup of a skill id by its display name.
pub fn get_skill_id_by_name(conn: &Connection, name: &str) -> Result<Option<i64>, DbError> {
    Ok(conn
        .query_row(
            "SELECT skill_id FROM skill_names WHERE name = ?1 COLLATE NOCASE
             ORDER BY skill_id LIMIT 1",
            params![name.trim()],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn batch_get_skill_names(
    conn: &Connection,
    skill_ids: &[i64],
) -> Result<HashMap<i64, String>, DbError> {
    let unique: BTreeSet<i64> = skill_ids.iter().copied().collect();
    if unique.is_empty() {
        return Ok(HashMap::new());
    }
    let sql = format!(
        "SELECT skill_id, name FROM skill_names WHERE skill_id IN ({})",
        placeholders(unique.len(), 0)
    );
    let mut stmt = conn.prepare(&sql)?;
    let names = stmt
        .query_map(params_from_iter(unique.iter()), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(names)
}

/// Skill ids from `skill_ids` with no cached name, sorted and de-duplicated.
pub fn missing_skill_names(conn: &Connection, skill_ids: &[i64]) -> Result<Vec<i64>, DbError> {
    let known = batch_get_skill_names(conn, skill_ids)?;
    let missing: BTreeSet<i64> = skill_ids
        .iter()
        .copied()
        .filter(|id| !known.contains_key(id))
        .collect();
    Ok(missing.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_db;

    fn seed(conn: &Connection) {
        upsert_skill_names(
            conn,
            &[
                SkillName {
                    skill_id: 3300,
                    name: "Gunnery".to_string(),
                },
                SkillName {
                    skill_id: 3327,
                    name: "Spaceship Command".to_string(),
                },
            ],
        )
        .unwrap();
    }

    #[test]
    fn test_lookup_by_id_and_name() {
        let conn = create_test_db();
        seed(&conn);

        assert_eq!(get_skill_name(&conn, 3300).unwrap().as_deref(), Some("Gunnery"));
        assert_eq!(get_skill_name(&conn, 1).unwrap(), None);
        assert_eq!(get_skill_id_by_name(&conn, "spaceship COMMAND").unwrap(), Some(3327));
        assert_eq!(get_skill_id_by_name(&conn, "  Gunnery ").unwrap(), Some(3300));
        assert_eq!(get_skill_id_by_name(&conn, "Mining").unwrap(), None);
    }

    #[test]
    fn test_upsert_renames() {
        let conn = create_test_db();
        seed(&conn);
        upsert_skill_names(
            &conn,
            &[SkillName {
                skill_id: 3300,
                name: "Gunnery II".to_string(),
            }],
        )
        .unwrap();
        assert_eq!(get_skill_name(&conn, 3300).unwrap().as_deref(), Some("Gunnery II"));
    }

    #[test]
    fn test_batch_and_missing() {
        let conn = create_test_db();
        seed(&conn);

        let names = batch_get_skill_names(&conn, &[3300, 3327, 9, 3300]).unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names[&3327], "Spaceship Command");

        assert_eq!(missing_skill_names(&conn, &[12, 3300, 9, 12]).unwrap(), vec![9, 12]);
        assert!(missing_skill_names(&conn, &[]).unwrap().is_empty());
    }
}
