use rusqlite::Connection;
use tauri::State;

use crate::db::{self, Db, DbError};
use crate::errors::{public, PublicError};
use crate::repository::roles::{self, NewRole};
use crate::types::{Color, Operator, Role, RoleData};

#[tauri::command]
pub fn list_roles(db: State<'_, Db>) -> Result<Vec<RoleData>, String> {
    log::info!("[list_roles]");
    let conn = db.lock().map_err(public("Could not load roles"))?;
    roles::get_all_roles(&conn).map_err(public("Could not load roles"))
}

/// `tag_ids` are kept in the order given; ANY roles check them in that order.
#[tauri::command]
pub fn create_role(
    db: State<'_, Db>,
    name: String,
    label: String,
    operator: Operator,
    color: Option<Color>,
    tag_ids: Vec<i64>,
) -> Result<RoleData, String> {
    log::info!("[create_role] name={} operator={}", name, operator);
    let role = NewRole {
        name: required("Role name", &name).map_err(PublicError::report)?,
        label: label.trim().to_string(),
        operator,
        color: color.unwrap_or_else(Color::random),
    };
    let mut conn = db.lock().map_err(public("Could not create role"))?;
    roles::create_role(&mut conn, &role, &tag_ids).map_err(public("Could not create role"))
}

#[tauri::command]
pub fn update_role(db: State<'_, Db>, role: Role, tag_ids: Vec<i64>) -> Result<RoleData, String> {
    log::info!("[update_role] id={}", role.id);
    let role = Role {
        name: required("Role name", &role.name).map_err(PublicError::report)?,
        label: role.label.trim().to_string(),
        ..role
    };
    let mut conn = db.lock().map_err(public("Could not save role"))?;
    roles::save_role(&mut conn, &role, &tag_ids)
        .map_err(public("Could not save role"))?
        .ok_or_else(|| PublicError::new(format!("Role {} no longer exists", role.id)).report())
}

#[tauri::command]
pub fn delete_role(db: State<'_, Db>, role_id: i64) -> Result<bool, String> {
    log::info!("[delete_role] id={}", role_id);
    let conn = db.lock().map_err(public("Could not delete role"))?;
    delete_role_inner(&conn, role_id).map_err(public("Could not delete role"))
}

/// Delete the role and drop it from the saved filter selection.
fn delete_role_inner(conn: &Connection, role_id: i64) -> Result<bool, DbError> {
    let deleted = roles::delete_role(conn, role_id)?;
    let mut settings = db::read_settings(conn)?;
    if settings.selected_role_ids.contains(&role_id) {
        settings.selected_role_ids.retain(|id| *id != role_id);
        db::write_settings(conn, &settings)?;
    }
    Ok(deleted)
}

fn required(field: &str, value: &str) -> Result<String, PublicError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PublicError::new(format!("{} cannot be empty", field)));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_db;
    use crate::types::AppSettings;

    fn new_role(name: &str) -> NewRole {
        NewRole {
            name: name.to_string(),
            label: "L".to_string(),
            operator: Operator::All,
            color: Color::rgb(9, 9, 9),
        }
    }

    #[test]
    fn test_delete_role_clears_selection() {
        let conn = create_test_db();
        let role = roles::insert_role(&conn, &new_role("Scout")).unwrap();
        db::write_settings(
            &conn,
            &AppSettings {
                selected_role_ids: vec![role.id],
                ..AppSettings::default()
            },
        )
        .unwrap();

        assert!(delete_role_inner(&conn, role.id).unwrap());
        assert!(db::read_settings(&conn).unwrap().selected_role_ids.is_empty());
    }

    #[test]
    fn test_delete_missing_role_leaves_settings() {
        let conn = create_test_db();
        db::write_settings(
            &conn,
            &AppSettings {
                selected_role_ids: vec![42],
                ..AppSettings::default()
            },
        )
        .unwrap();

        assert!(!delete_role_inner(&conn, 7).unwrap());
        assert_eq!(db::read_settings(&conn).unwrap().selected_role_ids, vec![42]);
    }

    #[test]
    fn test_required_trims_and_rejects_blank() {
        assert_eq!(required("Role name", " Tackle ").unwrap(), "Tackle");
        assert_eq!(
            required("Role name", "").unwrap_err().message(),
            "Role name cannot be empty"
        );
    }
}
