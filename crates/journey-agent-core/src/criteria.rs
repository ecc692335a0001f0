//! Typed search criteria for the remote strategy backend.
//!
//! The backend is a Java REST service: field names go over the wire in
//! camelCase and unset filters are omitted entirely, while the paging
//! triplet (`page`, `size`, `sort`) is always present. These models are
//! what the chat model fills in when it calls the `search_strategies`
//! tool, so everything is `#[serde(default)]`-tolerant on input.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Sort order for a single sort property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One entry of a multi-property sort specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub property: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Inclusive timestamp window used by the audit filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// Strategy categories understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyType {
    AdvancePurchase,
    AuSetting,
    ClassNonReopening,
    CompetitionMatching,
    FinalAuSetting,
    InitialGrouping,
    JourneyScoring,
    LinkedClosure,
    LinkedDeparture,
    LinkedDepartureClosure,
    LinkedRelation,
    OdLinkedRelation,
    PriceConsistency,
    SpillControl,
    SpoilageAllocation,
}

/// Criteria for `POST /api/strategies/search`.
///
/// Paging defaults mirror the backend contract (`page = 0`, `size = 25`,
/// empty sort). All filters are optional and dropped from the request body
/// when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrategyCriteria {
    pub page: i64,
    pub size: i64,
    pub sort: Vec<Sort>,

    // Audit filters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creators: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<TimestampRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<TimestampRange>,

    // Strategy filters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codes: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<BTreeSet<StrategyType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journey_groups: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_demand_strategy_list_owners: Option<BTreeSet<String>>,
}

impl Default for StrategyCriteria {
    fn default() -> Self {
        Self {
            page: 0,
            size: 25,
            sort: Vec::new(),
            creators: None,
            modifiers: None,
            created_at: None,
            modified_at: None,
            codes: None,
            code_match: None,
            name: None,
            description: None,
            valid: None,
            types: None,
            journey_groups: None,
            on_demand_strategy_list_owners: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paging_always_serialized() {
        let json = serde_json::to_value(StrategyCriteria::default()).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj["page"], 0);
        assert_eq!(obj["size"], 25);
        assert_eq!(obj["sort"], serde_json::json!([]));
        // Unset filters are omitted, not null.
        assert!(!obj.contains_key("codes"));
        assert!(!obj.contains_key("createdAt"));
    }

    #[test]
    fn test_camel_case_wire_names() {
        let criteria = StrategyCriteria {
            code_match: Some("JRN*".to_string()),
            journey_groups: Some(BTreeSet::from(["north".to_string()])),
            ..Default::default()
        };
        let json = serde_json::to_string(&criteria).unwrap();
        assert!(json.contains("\"codeMatch\":\"JRN*\""));
        assert!(json.contains("\"journeyGroups\":[\"north\"]"));
    }

    #[test]
    fn test_strategy_type_wire_names() {
        let types = BTreeSet::from([StrategyType::JourneyScoring, StrategyType::FinalAuSetting]);
        let json = serde_json::to_string(&types).unwrap();
        assert!(json.contains("\"JOURNEY_SCORING\""));
        assert!(json.contains("\"FINAL_AU_SETTING\""));
    }

    #[test]
    fn test_partial_input_parses_with_defaults() {
        let criteria: StrategyCriteria =
            serde_json::from_str(r#"{"valid": true, "types": ["AU_SETTING"]}"#).unwrap();
        assert_eq!(criteria.page, 0);
        assert_eq!(criteria.size, 25);
        assert_eq!(criteria.valid, Some(true));
        assert!(criteria
            .types
            .unwrap()
            .contains(&StrategyType::AuSetting));
    }

    #[test]
    fn test_sort_direction_defaults_to_asc() {
        let sort: Sort = serde_json::from_str(r#"{"property": "score"}"#).unwrap();
        assert_eq!(sort.direction, SortDirection::Asc);
        assert!(serde_json::to_string(&sort).unwrap().contains("\"ASC\""));
    }
}
