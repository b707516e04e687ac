use std::collections::HashMap;

use rusqlite::{params, params_from_iter, Connection};

use super::{parse_color, parse_operator, placeholders};
use crate::db::DbError;
use crate::transaction::{non_retryable, transact_with_retries, RetryPolicy};
use crate::types::{Color, Operator, Role, RoleData, Tag};

/// Link between a role and one of its tags. `position` keeps the user's order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleTag {
    pub role_id: i64,
    pub tag_id: i64,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRole {
    pub name: String,
    pub label: String,
    pub operator: Operator,
    pub color: Color,
}

pub fn insert_role(conn: &Connection, role: &NewRole) -> Result<Role, DbError> {
    conn.execute(
        "INSERT INTO roles (name, label, operator, color) VALUES (?1, ?2, ?3, ?4)",
        params![role.name, role.label, role.operator.as_str(), role.color.to_hex()],
    )?;
    Ok(Role {
        id: conn.last_insert_rowid(),
        name: role.name.clone(),
        label: role.label.clone(),
        operator: role.operator,
        color: role.color,
    })
}

pub fn update_role(conn: &Connection, role: &Role) -> Result<bool, DbError> {
    let updated = conn.execute(
        "UPDATE roles SET name = ?2, label = ?3, operator = ?4, color = ?5 WHERE id = ?1",
        params![
            role.id,
            role.name,
            role.label,
            role.operator.as_str(),
            role.color.to_hex()
        ],
    )?;
    Ok(updated > 0)
}

pub fn delete_role(conn: &Connection, id: i64) -> Result<bool, DbError> {
    let deleted = conn.execute("DELETE FROM roles WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

pub fn get_all_role_tags(conn: &Connection) -> Result<Vec<RoleTag>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT role_id, tag_id, position FROM role_tags ORDER BY role_id, position, tag_id",
    )?;
    let links = stmt
        .query_map([], |row| {
            Ok(RoleTag {
                role_id: row.get(0)?,
                tag_id: row.get(1)?,
                position: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(links)
}

pub fn upsert_role_tag(conn: &Connection, link: &RoleTag) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO role_tags (role_id, tag_id, position) VALUES (?1, ?2, ?3)
         ON CONFLICT(role_id, tag_id) DO UPDATE SET position = ?3",
        params![link.role_id, link.tag_id, link.position],
    )?;
    Ok(())
}

pub fn delete_role_tags(conn: &Connection, role_id: i64, tag_ids: &[i64]) -> Result<usize, DbError> {
    if tag_ids.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "DELETE FROM role_tags WHERE role_id = ?1 AND tag_id IN ({})",
        placeholders(tag_ids.len(), 1)
    );
    let values = std::iter::once(role_id).chain(tag_ids.iter().copied());
    Ok(conn.execute(&sql, params_from_iter(values))?)
}

/// Every role with its tags in role order, roles ordered by name.
pub fn get_all_roles(conn: &Connection) -> Result<Vec<RoleData>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, label, operator, color FROM roles ORDER BY name COLLATE NOCASE, id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT rt.role_id, t.id, t.name, t.color
         FROM role_tags rt JOIN tags t ON t.id = rt.tag_id
         ORDER BY rt.role_id, rt.position, rt.tag_id",
    )?;
    let links = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut tags: HashMap<i64, Vec<Tag>> = HashMap::new();
    for (role_id, id, name, color) in links {
        tags.entry(role_id).or_default().push(Tag {
            id,
            name,
            color: parse_color(&color)?,
        });
    }

    rows.into_iter()
        .map(|(id, name, label, operator, color)| {
            Ok(RoleData {
                role: Role {
                    id,
                    name,
                    label,
                    operator: parse_operator(&operator)?,
                    color: parse_color(&color)?,
                },
                tags: tags.remove(&id).unwrap_or_default(),
            })
        })
        .collect()
}

/// Make the role reference exactly `tag_ids`, in that order.
fn replace_role_tags(conn: &Connection, role_id: i64, tag_ids: &[i64]) -> Result<(), DbError> {
    let mut stmt = conn.prepare("SELECT tag_id FROM role_tags WHERE role_id = ?1")?;
    let existing = stmt
        .query_map(params![role_id], |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    for (position, &tag_id) in tag_ids.iter().enumerate() {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tags WHERE id = ?1)",
            params![tag_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(non_retryable(DbError::InvalidValue {
                field: "tag_id",
                reason: format!("tag {} does not exist", tag_id),
            }));
        }
        upsert_role_tag(
            conn,
            &RoleTag {
                role_id,
                tag_id,
                position: position as i64,
            },
        )?;
    }

    let stale: Vec<i64> = existing
        .into_iter()
        .filter(|id| !tag_ids.contains(id))
        .collect();
    delete_role_tags(conn, role_id, &stale)?;
    Ok(())
}

fn load_role(conn: &Connection, role: Role) -> Result<RoleData, DbError> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.color
         FROM role_tags rt JOIN tags t ON t.id = rt.tag_id
         WHERE rt.role_id = ?1 ORDER BY rt.position, rt.tag_id",
    )?;
    let rows = stmt
        .query_map(params![role.id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let tags = rows
        .into_iter()
        .map(|(id, name, color)| {
            Ok(Tag {
                id,
                name,
                color: parse_color(&color)?,
            })
        })
        .collect::<Result<Vec<_>, DbError>>()?;
    Ok(RoleData { role, tags })
}

/// Insert a role and its ordered tag list in one retried transaction.
/// Unknown tag ids abort without retrying.
pub fn create_role(conn: &mut Connection, role: &NewRole, tag_ids: &[i64]) -> Result<RoleData, DbError> {
    transact_with_retries(conn, &RetryPolicy::default(), |tx| {
        let created = insert_role(tx, role)?;
        replace_role_tags(tx, created.id, tag_ids)?;
        log::info!(
            "[create_role] Created role {} '{}' ({}) with {} tags",
            created.id,
            created.name,
            created.operator,
            tag_ids.len()
        );
        load_role(tx, created)
    })
}

/// Update a role and replace its tag list in one retried transaction.
/// Returns `None` when the role no longer exists.
pub fn save_role(conn: &mut Connection, role: &Role, tag_ids: &[i64]) -> Result<Option<RoleData>, DbError> {
    transact_with_retries(conn, &RetryPolicy::default(), |tx| {
        if !update_role(tx, role)? {
            return Ok(None);
        }
        replace_role_tags(tx, role.id, tag_ids)?;
        log::info!("[save_role] Saved role {} with {} tags", role.id, tag_ids.len());
        load_role(tx, role.clone()).map(Some)
    })
}
