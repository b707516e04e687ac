//! SQLite access for every table. Functions take a plain `&Connection` so they
//! can run directly or inside `transact_with_retries` (a `Transaction` derefs
//! to a `Connection`).

pub mod characters;
pub mod roles;
pub mod skill_names;
pub mod tags;
pub mod tokens;

use crate::db::DbError;
use crate::types::{Color, Operator};

pub(crate) fn parse_color(raw: &str) -> Result<Color, DbError> {
    Color::from_hex(raw).map_err(|reason| DbError::InvalidValue {
        field: "color",
        reason,
    })
}

pub(crate) fn parse_operator(raw: &str) -> Result<Operator, DbError> {
    raw.parse().map_err(|reason| DbError::InvalidValue {
        field: "operator",
        reason,
    })
}

/// `?1, ?2, ...` placeholders for an `IN (...)` clause, starting at `offset + 1`.
pub(crate) fn placeholders(count: usize, offset: usize) -> String {
    (1..=count)
        .map(|i| format!("?{}", i + offset))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(3, 0), "?1, ?2, ?3");
        assert_eq!(placeholders(2, 1), "?2, ?3");
        assert_eq!(placeholders(0, 0), "");
    }

    #[test]
    fn test_parse_color_reports_field() {
        let err = parse_color("nope").unwrap_err();
        assert!(err.to_string().starts_with("invalid color in database"));
    }
}
