use super::{
    community::root_aware_parent, deserialize_flexible_id, deserialize_flexible_int,
    deserialize_flexible_list, deserialize_optional_float, deserialize_optional_id,
    deserialize_text,
};
use crate::storage::dataset::TableName;

graph_record!(CommunityReport, TableName::CommunityReports, {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    community: String,
    #[serde(deserialize_with = "deserialize_flexible_int")]
    level: i64,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    parent: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_list")]
    children: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    title: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    summary: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    full_content: String,
    #[serde(default, deserialize_with = "deserialize_optional_float")]
    rank: Option<f64>,
});

impl CommunityReport {
    pub fn parent_community(&self) -> Option<&str> {
        root_aware_parent(self.parent.as_deref())
    }

    pub fn rank_or_zero(&self) -> f64 {
        self.rank.unwrap_or(0.0)
    }

    /// The text handed to the model: the full report when present, else the summary.
    pub fn content(&self) -> &str {
        if self.full_content.is_empty() {
            &self.summary
        } else {
            &self.full_content
        }
    }
}
