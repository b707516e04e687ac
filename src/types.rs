use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: i64,
    pub name: String,
    pub picture: String,
    pub corporation_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corporation {
    pub id: i64,
    pub alliance_id: Option<i64>,
    pub name: String,
    pub ticker: String,
    pub picture: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alliance {
    pub id: i64,
    pub name: String,
    pub ticker: String,
    pub picture: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSkill {
    pub character_id: i64,
    pub skill_id: i64,
    pub skill_level: i64,
}

/// A character together with its affiliation and trained skills, as shown
/// on a character card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterData {
    pub character: Character,
    pub corporation: Corporation,
    pub alliance: Option<Alliance>,
    pub skills: Vec<CharacterSkill>,
}

/// Stored OAuth token for a character. `refresh_token` is empty when the
/// secret lives in the OS keychain instead of SQLite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRow {
    pub character_id: i64,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expiration: chrono::DateTime<chrono::Utc>,
}

/// RGBA display colour, 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// A random opaque colour, used when a tag or role is created without one.
    pub fn random() -> Self {
        let [r, g, b]: [u8; 3] = rand::random();
        Self::rgb(r, g, b)
    }

    /// Parse `#rrggbb` or `#rrggbbaa` (the leading `#` is optional).
    pub fn from_hex(raw: &str) -> Result<Self, String> {
        let hex = raw.trim().trim_start_matches('#');
        if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
            return Err(format!("Invalid colour '{}': expected #rrggbb or #rrggbbaa", raw));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| format!("Invalid colour '{}': not hexadecimal", raw))
        };
        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
            a: if hex.len() == 8 { channel(6)? } else { 255 },
        })
    }

    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSkill {
    pub tag_id: i64,
    pub skill_id: i64,
    pub skill_level: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagData {
    pub tag: Tag,
    pub skills: Vec<TagSkill>,
}

/// Boolean composition applied to the tags referenced by a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    All,
    Any,
    None,
}

impl Operator {
    pub const VALUES: [Operator; 3] = [Operator::All, Operator::Any, Operator::None];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::All => "all",
            Operator::Any => "any",
            Operator::None => "none",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Operator::All),
            "any" => Ok(Operator::Any),
            "none" => Ok(Operator::None),
            other => Err(format!(
                "{} is not a valid operator, try [all, any, none]",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub label: String,
    pub operator: Operator,
    pub color: Color,
}

/// A role and the tags it references, in the user's chosen order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleData {
    pub role: Role,
    pub tags: Vec<Tag>,
}

impl RoleData {
    pub fn tag_ids(&self) -> Vec<i64> {
        self.tags.iter().map(|t| t.id).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillName {
    pub skill_id: i64,
    pub name: String,
}

/// A single `(skill, level)` requirement before it is attached to a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillRequirement {
    pub skill_id: i64,
    pub skill_level: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    /// One of "error", "warn", "info", "debug". Defaults to "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub selected_tag_ids: Vec<i64>,
    #[serde(default)]
    pub selected_role_ids: Vec<i64>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            selected_tag_ids: Vec::new(),
            selected_role_ids: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
