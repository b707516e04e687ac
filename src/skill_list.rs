//! Parsing of pasted skill lists such as:
//!
//! ```text
//! # Fitting for a Drake
//! Caldari Battlecruiser 4
//! Heavy Missiles 5
//! Shield Management
//! ```
//!
//! A line without a level means level 1.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::db::DbError;
use crate::types::SkillRequirement;

pub const MAX_SKILL_LEVEL: i64 = 5;

static SKILL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*\D)(\s\d)?$").expect("skill line pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    Malformed { line: String },
    InvalidLevel { line: String, level: i64 },
    UnknownSkill { name: String },
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineError::Malformed { line } => write!(f, "could not parse line '{}'", line),
            LineError::InvalidLevel { line, level } => write!(
                f,
                "level {} is out of range 0-{} in '{}'",
                level, MAX_SKILL_LEVEL, line
            ),
            LineError::UnknownSkill { name } => write!(f, "unknown skill '{}'", name),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SkillListError {
    #[error("invalid skill list: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", "))]
    Invalid(Vec<LineError>),
    #[error("skill name lookup failed: {0}")]
    Lookup(#[from] DbError),
}

/// Split a line into `(name, level)`. Blank lines and `#` comments yield `None`.
fn parse_line(raw: &str) -> Option<Result<(String, i64), LineError>> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let Some(caps) = SKILL_LINE.captures(line) else {
        return Some(Err(LineError::Malformed {
            line: line.to_string(),
        }));
    };
    let name = caps[1].trim().to_string();
    let level = match caps.get(2) {
        Some(m) => match m.as_str().trim().parse::<i64>() {
            Ok(level) => level,
            Err(_) => {
                return Some(Err(LineError::Malformed {
                    line: line.to_string(),
                }))
            }
        },
        None => 1,
    };

    if !(0..=MAX_SKILL_LEVEL).contains(&level) {
        return Some(Err(LineError::InvalidLevel {
            line: line.to_string(),
            level,
        }));
    }
    Some(Ok((name, level)))
}

/// Parse `text` into requirements, resolving names through `lookup`.
///
/// Every bad line is reported together. Duplicate skills keep the highest
/// level. The result is sorted by skill id.
pub fn parse_skill_list<F>(text: &str, mut lookup: F) -> Result<Vec<SkillRequirement>, SkillListError>
where
    F: FnMut(&str) -> Result<Option<i64>, DbError>,
{
    let mut errors = Vec::new();
    let mut levels: BTreeMap<i64, i64> = BTreeMap::new();

    for raw in text.lines() {
        let (name, level) = match parse_line(raw) {
            None => continue,
            Some(Ok(parsed)) => parsed,
            Some(Err(e)) => {
                errors.push(e);
                continue;
            }
        };

        match lookup(&name)? {
            Some(skill_id) => {
                let entry = levels.entry(skill_id).or_insert(level);
                *entry = (*entry).max(level);
            }
            None => errors.push(LineError::UnknownSkill { name }),
        }
    }

    if !errors.is_empty() {
        log::debug!("[parse_skill_list] {} bad lines", errors.len());
        return Err(SkillListError::Invalid(errors));
    }

    Ok(levels
        .into_iter()
        .map(|(skill_id, skill_level)| SkillRequirement {
            skill_id,
            skill_level,
        })
        .collect())
}

/// Names in `text` that `lookup` cannot resolve, in order of first appearance.
pub fn unresolved_names<F>(text: &str, mut lookup: F) -> Result<Vec<String>, DbError>
where
    F: FnMut(&str) -> Result<Option<i64>, DbError>,
{
    let mut missing: Vec<String> = Vec::new();
    for raw in text.lines() {
        let Some(Ok((name, _))) = parse_line(raw) else {
            continue;
        };
        if lookup(&name)?.is_none() && !missing.iter().any(|m| m.eq_ignore_ascii_case(&name)) {
            missing.push(name);
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Result<Option<i64>, DbError> {
        Ok(match name.to_ascii_lowercase().as_str() {
            "gunnery" => Some(3300),
            "caldari battlecruiser" => Some(33096),
            "heavy missiles" => Some(3324),
            "cpu management" => Some(3426),
            _ => None,
        })
    }

    fn req(skill_id: i64, skill_level: i64) -> SkillRequirement {
        SkillRequirement {
            skill_id,
            skill_level,
        }
    }

    #[test]
    fn test_parses_levels_defaults_and_comments() {
        let text = "# drake\n\n  Caldari Battlecruiser 4  \nHeavy Missiles 5\nGunnery\n";
        let skills = parse_skill_list(text, lookup).unwrap();
        assert_eq!(skills, vec![req(3300, 1), req(3324, 5), req(33096, 4)]);
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let skills = parse_skill_list("GUNNERY 3", lookup).unwrap();
        assert_eq!(skills, vec![req(3300, 3)]);
    }

    #[test]
    fn test_duplicate_skill_keeps_max_level() {
        let skills = parse_skill_list("Gunnery 2\ngunnery 4\nGunnery 3", lookup).unwrap();
        assert_eq!(skills, vec![req(3300, 4)]);
    }

    #[test]
    fn test_level_zero_is_allowed() {
        assert_eq!(parse_skill_list("Gunnery 0", lookup).unwrap(), vec![req(3300, 0)]);
    }

    #[test]
    fn test_errors_are_aggregated() {
        let text = "Gunnery 9\nWarp Drive Operation 3\nGunnery5\nCPU Management 4";
        let err = parse_skill_list(text, lookup).unwrap_err();
        match err {
            SkillListError::Invalid(errors) => {
                assert_eq!(
                    errors,
                    vec![
                        LineError::InvalidLevel {
                            line: "Gunnery 9".to_string(),
                            level: 9
                        },
                        LineError::UnknownSkill {
                            name: "Warp Drive Operation".to_string()
                        },
                        LineError::Malformed {
                            line: "Gunnery5".to_string()
                        },
                    ]
                );
            }
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_error_message_lists_every_line() {
        let err = parse_skill_list("Nope 1\nAlso Nope", lookup).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown skill 'Nope'"));
        assert!(msg.contains("unknown skill 'Also Nope'"));
    }

    #[test]
    fn test_lookup_failure_propagates() {
        let err = parse_skill_list("Gunnery", |_| Err(DbError::Poisoned)).unwrap_err();
        assert!(matches!(err, SkillListError::Lookup(DbError::Poisoned)));
    }

    #[test]
    fn test_empty_text_is_empty_list() {
        assert!(parse_skill_list("\n# nothing\n", lookup).unwrap().is_empty());
    }

    #[test]
    fn test_unresolved_names_dedupes_in_order() {
        let text = "Mining 2\nGunnery\nmining 4\nSalvaging";
        assert_eq!(
            unresolved_names(text, lookup).unwrap(),
            vec!["Mining".to_string(), "Salvaging".to_string()]
        );
    }
}
