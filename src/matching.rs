//! Tag and role matching.
//!
//! Everything here is pure: callers hand in the character's skills, the
//! tag requirements and the role compositions loaded from the database and
//! get back match results for rendering (dimmed or highlighted chips) and
//! for filtering the character list.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::types::{CharacterData, CharacterSkill, Operator, RoleData, Tag, TagData, TagSkill};

/// Skill id to trained level.
pub type SkillLevels = HashMap<i64, i64>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagMatch {
    pub matches: bool,
    /// Requirements the character does not meet, in the tag's order.
    pub missing: Vec<TagSkill>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleMatch {
    pub matches: bool,
    /// Tags responsible for the mismatch. For `none` roles these are the
    /// tags that *did* match.
    pub mismatched: Vec<Tag>,
}

pub fn skill_levels(skills: &[CharacterSkill]) -> SkillLevels {
    skills.iter().map(|s| (s.skill_id, s.skill_level)).collect()
}

/// A skill the character has not trained counts as level 0.
pub fn skills_match_tag(levels: &SkillLevels, tag: &TagData) -> TagMatch {
    let missing: Vec<TagSkill> = tag
        .skills
        .iter()
        .filter(|req| levels.get(&req.skill_id).copied().unwrap_or(0) < req.skill_level)
        .copied()
        .collect();

    TagMatch {
        matches: missing.is_empty(),
        missing,
    }
}

pub fn character_matches_tag(character: &CharacterData, tag: &TagData) -> TagMatch {
    skills_match_tag(&skill_levels(&character.skills), tag)
}

pub fn skills_match_role(levels: &SkillLevels, role: &RoleData, tags: &[TagData]) -> RoleMatch {
    let lookup: HashMap<i64, &TagData> = tags.iter().map(|t| (t.tag.id, t)).collect();
    let mut mismatched = Vec::with_capacity(role.tags.len());

    for tag_id in role.tags.iter().map(|t| t.id) {
        // Roles can outlive a tag briefly while the UI catches up.
        let Some(tag) = lookup.get(&tag_id) else {
            continue;
        };

        let matched = skills_match_tag(levels, tag).matches;
        match role.role.operator {
            Operator::Any => {
                if matched {
                    return RoleMatch {
                        matches: true,
                        mismatched: Vec::new(),
                    };
                }
                mismatched.push(tag.tag.clone());
            }
            Operator::All => {
                if !matched {
                    mismatched.push(tag.tag.clone());
                }
            }
            Operator::None => {
                if matched {
                    mismatched.push(tag.tag.clone());
                }
            }
        }
    }

    // An `any` role that reaches this point found no matching tag, even when
    // it referenced nothing at all.
    let matches = match role.role.operator {
        Operator::Any => false,
        Operator::All | Operator::None => mismatched.is_empty(),
    };

    RoleMatch {
        matches,
        mismatched,
    }
}

pub fn character_matches_role(
    character: &CharacterData,
    role: &RoleData,
    tags: &[TagData],
) -> RoleMatch {
    skills_match_role(&skill_levels(&character.skills), role, tags)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagResult {
    pub tag_id: i64,
    #[serde(flatten)]
    pub result: TagMatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleResult {
    pub role_id: i64,
    #[serde(flatten)]
    pub result: RoleMatch,
}

/// Every tag and role result for one character, plus whether the character
/// passes the current filter selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharacterMatches {
    pub character_id: i64,
    pub tags: Vec<TagResult>,
    pub roles: Vec<RoleResult>,
    pub visible: bool,
}

/// The set of tags and roles the user has toggled on in the filter bar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSelection {
    pub tag_ids: HashSet<i64>,
    pub role_ids: HashSet<i64>,
}

impl FilterSelection {
    pub fn new(tag_ids: &[i64], role_ids: &[i64]) -> Self {
        Self {
            tag_ids: tag_ids.iter().copied().collect(),
            role_ids: role_ids.iter().copied().collect(),
        }
    }

    /// A character is shown only if it matches every selected tag and every
    /// selected role. Selected ids without a result count as unmatched.
    pub fn admits(&self, tags: &[TagResult], roles: &[RoleResult]) -> bool {
        let matched_tags: HashSet<i64> = tags
            .iter()
            .filter(|t| t.result.matches)
            .map(|t| t.tag_id)
            .collect();
        let matched_roles: HashSet<i64> = roles
            .iter()
            .filter(|r| r.result.matches)
            .map(|r| r.role_id)
            .collect();

        self.tag_ids.is_subset(&matched_tags) && self.role_ids.is_subset(&matched_roles)
    }
}

pub fn character_matches(
    character: &CharacterData,
    tags: &[TagData],
    roles: &[RoleData],
    filter: &FilterSelection,
) -> CharacterMatches {
    let levels = skill_levels(&character.skills);

    let tag_results: Vec<TagResult> = tags
        .iter()
        .map(|t| TagResult {
            tag_id: t.tag.id,
            result: skills_match_tag(&levels, t),
        })
        .collect();
    let role_results: Vec<RoleResult> = roles
        .iter()
        .map(|r| RoleResult {
            role_id: r.role.id,
            result: skills_match_role(&levels, r, tags),
        })
        .collect();

    let visible = filter.admits(&tag_results, &role_results);

    CharacterMatches {
        character_id: character.character.id,
        tags: tag_results,
        roles: role_results,
        visible,
    }
}

/// Match results for the whole roster, in roster order.
pub fn character_overview(
    characters: &[CharacterData],
    tags: &[TagData],
    roles: &[RoleData],
    filter: &FilterSelection,
) -> Vec<CharacterMatches> {
    characters
        .iter()
        .map(|c| character_matches(c, tags, roles, filter))
        .collect()
}
