use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CharacterPublicData {
    pub name: String,
    pub corporation_id: i64,
    #[serde(default)]
    pub alliance_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Portrait {
    #[serde(default)]
    pub px64x64: String,
    #[serde(default)]
    pub px128x128: String,
    #[serde(default)]
    pub px256x256: String,
    #[serde(default)]
    pub px512x512: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CorporationData {
    pub name: String,
    pub ticker: String,
    #[serde(default)]
    pub alliance_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CorporationIcons {
    #[serde(default)]
    pub px64x64: String,
    #[serde(default)]
    pub px128x128: String,
    #[serde(default)]
    pub px256x256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AllianceData {
    pub name: String,
    pub ticker: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AllianceIcons {
    #[serde(default)]
    pub px64x64: String,
    #[serde(default)]
    pub px128x128: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Skill {
    pub skill_id: i64,
    pub trained_skill_level: i64,
    #[serde(default)]
    pub active_skill_level: i64,
    #[serde(default)]
    pub skillpoints_in_skill: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SkillList {
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub total_sp: i64,
}

/// One entry of `POST /universe/names/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseName {
    pub id: i64,
    pub name: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdName {
    pub id: i64,
    pub name: String,
}

/// Response of `POST /universe/ids/`. Only inventory types matter here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseIds {
    #[serde(default)]
    pub inventory_types: Vec<IdName>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_without_alliance() {
        let data: CharacterPublicData = serde_json::from_str(
            r#"{"birthday":"2015-03-24T11:37:00Z","corporation_id":109299958,"name":"CCP Bartender","security_status":0}"#,
        )
        .unwrap();
        assert_eq!(data.corporation_id, 109299958);
        assert_eq!(data.alliance_id, None);
    }

    #[test]
    fn test_skill_list_ignores_extra_fields() {
        let list: SkillList = serde_json::from_str(
            r#"{"skills":[{"active_skill_level":3,"skill_id":3300,"skillpoints_in_skill":8000,"trained_skill_level":4}],"total_sp":8000,"unallocated_sp":0}"#,
        )
        .unwrap();
        assert_eq!(list.skills[0].skill_id, 3300);
        assert_eq!(list.skills[0].trained_skill_level, 4);
    }

    #[test]
    fn test_universe_ids_without_types() {
        let ids: UniverseIds = serde_json::from_str(r#"{"characters":[{"id":1,"name":"x"}]}"#).unwrap();
        assert!(ids.inventory_types.is_empty());
    }
}
