use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use super::investigation::InvestigationTool;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryDetailLevel {
    Summary,
    #[default]
    Detailed,
    Comprehensive,
}

impl MemoryDetailLevel {
    /// Maximum number of items kept per working memory list
    pub fn item_limit(&self) -> Option<usize> {
        match self {
            MemoryDetailLevel::Summary => Some(5),
            MemoryDetailLevel::Detailed => Some(15),
            MemoryDetailLevel::Comprehensive => None,
        }
    }
}

impl FromStr for MemoryDetailLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(MemoryDetailLevel::Summary),
            "detailed" => Ok(MemoryDetailLevel::Detailed),
            "comprehensive" => Ok(MemoryDetailLevel::Comprehensive),
            _ => Err(()),
        }
    }
}

/// Element the agent has located before, as stored by the context store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRecord {
    pub selector: String,
    #[serde(default = "default_element_type")]
    pub element_type: String,
    #[serde(default)]
    pub reliability: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_validated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_element_type() -> String {
    "unknown".to_string()
}

/// Raw working memory as held by the context store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingMemoryRecord {
    #[serde(default)]
    pub elements: Vec<ElementRecord>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub successful_patterns: Vec<String>,
    #[serde(default)]
    pub failure_patterns: Vec<String>,
    /// Tool names as recorded; unknown names are ignored when mapped
    #[serde(default)]
    pub preferred_tool_order: Vec<String>,
    #[serde(default)]
    pub quality_thresholds: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownElement {
    pub selector: String,
    pub element_type: String,
    pub reliability: f64,
    pub last_validated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedVariable {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigationPreferences {
    pub preferred_tool_order: Vec<InvestigationTool>,
    pub quality_thresholds: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingMemorySection {
    pub known_elements: Vec<KnownElement>,
    pub extracted_variables: Vec<ExtractedVariable>,
    pub successful_patterns: Vec<String>,
    pub failure_patterns: Vec<String>,
    pub investigation_preferences: InvestigationPreferences,
}

impl WorkingMemorySection {
    pub fn is_empty(&self) -> bool {
        self.known_elements.is_empty()
            && self.extracted_variables.is_empty()
            && self.successful_patterns.is_empty()
            && self.failure_patterns.is_empty()
    }
}
