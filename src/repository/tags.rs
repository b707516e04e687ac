use std::collections::HashMap;

use rusqlite::{params, params_from_iter, Connection};

use super::{parse_color, placeholders};
use crate::db::DbError;
use crate::transaction::{transact_with_retries, RetryPolicy};
use crate::types::{Color, SkillRequirement, Tag, TagData, TagSkill};

pub fn insert_tag(conn: &Connection, name: &str, color: Color) -> Result<Tag, DbError> {
    conn.execute(
        "INSERT INTO tags (name, color) VALUES (?1, ?2)",
        params![name, color.to_hex()],
    )?;
    Ok(Tag {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        color,
    })
}

/// Returns `false` when the tag does not exist.
pub fn update_tag(conn: &Connection, tag: &Tag) -> Result<bool, DbError> {
    let updated = conn.execute(
        "UPDATE tags SET name = ?2, color = ?3 WHERE id = ?1",
        params![tag.id, tag.name, tag.color.to_hex()],
    )?;
    Ok(updated > 0)
}

/// Delete a tag together with its requirements and every role reference.
pub fn delete_tag(conn: &Connection, id: i64) -> Result<bool, DbError> {
    let deleted = conn.execute("DELETE FROM tags WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

pub fn get_tag(conn: &Connection, id: i64) -> Result<Option<Tag>, DbError> {
    let result = conn.query_row(
        "SELECT id, name, color FROM tags WHERE id = ?1",
        params![id],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        },
    );

    match result {
        Ok((id, name, color)) => Ok(Some(Tag {
            id,
            name,
            color: parse_color(&color)?,
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Every tag with its requirements. Tags are ordered by name, requirements by
/// skill id.
pub fn get_all_tags(conn: &Connection) -> Result<Vec<TagData>, DbError> {
    let mut stmt = conn.prepare("SELECT id, name, color FROM tags ORDER BY name COLLATE NOCASE, id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut skills: HashMap<i64, Vec<TagSkill>> = HashMap::new();
    for skill in get_all_tag_skills(conn)? {
        skills.entry(skill.tag_id).or_default().push(skill);
    }

    rows.into_iter()
        .map(|(id, name, color)| {
            Ok(TagData {
                tag: Tag {
                    id,
                    name,
                    color: parse_color(&color)?,
                },
                skills: skills.remove(&id).unwrap_or_default(),
            })
        })
        .collect()
}

pub fn get_all_tag_skills(conn: &Connection) -> Result<Vec<TagSkill>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT tag_id, skill_id, skill_level FROM tag_skills ORDER BY tag_id, skill_id",
    )?;
    let skills = stmt
        .query_map([], |row| {
            Ok(TagSkill {
                tag_id: row.get(0)?,
                skill_id: row.get(1)?,
                skill_level: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(skills)
}

pub fn upsert_tag_skill(conn: &Connection, skill: &TagSkill) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO tag_skills (tag_id, skill_id, skill_level) VALUES (?1, ?2, ?3)
         ON CONFLICT(tag_id, skill_id) DO UPDATE SET skill_level = ?3",
        params![skill.tag_id, skill.skill_id, skill.skill_level],
    )?;
    Ok(())
}

pub fn delete_tag_skills(conn: &Connection, tag_id: i64, skill_ids: &[i64]) -> Result<usize, DbError> {
    if skill_ids.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "DELETE FROM tag_skills WHERE tag_id = ?1 AND skill_id IN ({})",
        placeholders(skill_ids.len(), 1)
    );
    let values = std::iter::once(tag_id).chain(skill_ids.iter().copied());
    Ok(conn.execute(&sql, params_from_iter(values))?)
}

/// Make `tag_id`'s requirement set exactly `skills`.
fn replace_tag_skills(
    conn: &Connection,
    tag_id: i64,
    skills: &[SkillRequirement],
) -> Result<Vec<TagSkill>, DbError> {
    let mut stmt = conn.prepare("SELECT skill_id FROM tag_skills WHERE tag_id = ?1")?;
    let existing = stmt
        .query_map(params![tag_id], |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut written = Vec::with_capacity(skills.len());
    for req in skills {
        let skill = TagSkill {
            tag_id,
            skill_id: req.skill_id,
            skill_level: req.skill_level,
        };
        upsert_tag_skill(conn, &skill)?;
        written.push(skill);
    }

    let stale: Vec<i64> = existing
        .into_iter()
        .filter(|id| !skills.iter().any(|s| s.skill_id == *id))
        .collect();
    delete_tag_skills(conn, tag_id, &stale)?;

    written.sort_by_key(|s| s.skill_id);
    Ok(written)
}

/// Insert a tag and its requirements in one retried transaction.
pub fn create_tag(
    conn: &mut Connection,
    name: &str,
    color: Color,
    skills: &[SkillRequirement],
) -> Result<TagData, DbError> {
    transact_with_retries(conn, &RetryPolicy::default(), |tx| {
        let tag = insert_tag(tx, name, color)?;
        let skills = replace_tag_skills(tx, tag.id, skills)?;
        log::info!("[create_tag] Created tag {} '{}' with {} skills", tag.id, name, skills.len());
        Ok(TagData { tag, skills })
    })
}

/// Update a tag and replace its requirement set in one retried transaction.
/// Returns `None` when the tag no longer exists.
pub fn save_tag(
    conn: &mut Connection,
    tag: &Tag,
    skills: &[SkillRequirement],
) -> Result<Option<TagData>, DbError> {
    transact_with_retries(conn, &RetryPolicy::default(), |tx| {
        if !update_tag(tx, tag)? {
            return Ok(None);
        }
        let skills = replace_tag_skills(tx, tag.id, skills)?;
        log::info!("[save_tag] Saved tag {} with {} skills", tag.id, skills.len());
        Ok(Some(TagData {
            tag: tag.clone(),
            skills,
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_db;

    fn req(skill_id: i64, skill_level: i64) -> SkillRequirement {
        SkillRequirement {
            skill_id,
            skill_level,
        }
    }

    #[test]
    fn test_create_tag_writes_requirements() {
        let mut conn = create_test_db();
        let data = create_tag(&mut conn, "Logi", Color::rgb(0, 200, 0), &[req(20, 4), req(10, 5)]).unwrap();

        assert_eq!(data.tag.name, "Logi");
        let ids: Vec<i64> = data.skills.iter().map(|s| s.skill_id).collect();
        assert_eq!(ids, vec![10, 20]);

        let all = get_all_tags(&conn).unwrap();
        assert_eq!(all, vec![data]);
    }

    #[test]
    fn test_save_tag_replaces_requirement_set() {
        let mut conn = create_test_db();
        let created = create_tag(&mut conn, "Dps", Color::rgb(1, 1, 1), &[req(1, 1), req(2, 2)]).unwrap();

        let mut tag = created.tag.clone();
        tag.name = "DPS".to_string();
        tag.color = Color::rgb(9, 9, 9);
        let saved = save_tag(&mut conn, &tag, &[req(2, 5), req(3, 1)]).unwrap().unwrap();

        let levels: Vec<(i64, i64)> = saved.skills.iter().map(|s| (s.skill_id, s.skill_level)).collect();
        assert_eq!(levels, vec![(2, 5), (3, 1)]);

        let stored = get_all_tags(&conn).unwrap();
        assert_eq!(stored[0].tag, tag);
        assert_eq!(stored[0].skills, saved.skills);
    }

    #[test]
    fn test_save_missing_tag_is_none() {
        let mut conn = create_test_db();
        let tag = Tag {
            id: 77,
            name: "Ghost".to_string(),
            color: Color::rgb(0, 0, 0),
        };
        assert!(save_tag(&mut conn, &tag, &[req(1, 1)]).unwrap().is_none());
        assert!(get_all_tag_skills(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_get_all_tags_orders_by_name() {
        let conn = create_test_db();
        insert_tag(&conn, "beta", Color::rgb(0, 0, 0)).unwrap();
        insert_tag(&conn, "Alpha", Color::rgb(0, 0, 0)).unwrap();
        let names: Vec<String> = get_all_tags(&conn).unwrap().into_iter().map(|t| t.tag.name).collect();
        assert_eq!(names, vec!["Alpha", "beta"]);
    }

    #[test]
    fn test_delete_tag_cascades_requirements_and_role_refs() {
        let mut conn = create_test_db();
        let data = create_tag(&mut conn, "Cyno", Color::rgb(0, 0, 0), &[req(1, 5)]).unwrap();
        conn.execute(
            "INSERT INTO roles (name, label, operator, color) VALUES ('r', 'R', 'all', '#000000')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO role_tags (role_id, tag_id, position) VALUES (1, ?1, 0)",
            params![data.tag.id],
        )
        .unwrap();

        assert!(delete_tag(&conn, data.tag.id).unwrap());
        assert!(get_tag(&conn, data.tag.id).unwrap().is_none());
        assert!(get_all_tag_skills(&conn).unwrap().is_empty());
        let refs: i64 = conn.query_row("SELECT COUNT(*) FROM role_tags", [], |r| r.get(0)).unwrap();
        assert_eq!(refs, 0);
    }

    #[test]
    fn test_corrupt_color_is_an_error() {
        let conn = create_test_db();
        conn.execute("INSERT INTO tags (name, color) VALUES ('bad', 'purple')", [])
            .unwrap();
        assert!(matches!(
            get_all_tags(&conn),
            Err(DbError::InvalidValue { field: "color", .. })
        ));
    }
}
