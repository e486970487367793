use super::{deserialize_flexible_list, deserialize_optional_float, deserialize_optional_int, deserialize_text};
use crate::storage::dataset::TableName;

// `source` and `target` hold entity titles, not entity ids.
graph_record!(Relationship, TableName::Relationships, {
    source: String,
    target: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    description: String,
    #[serde(default, deserialize_with = "deserialize_optional_float")]
    weight: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_int")]
    combined_degree: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_flexible_list")]
    text_unit_ids: Vec<String>,
});

impl Relationship {
    pub fn touches(&self, title: &str) -> bool {
        self.source == title || self.target == title
    }

    pub fn weight_or_default(&self) -> f64 {
        self.weight.unwrap_or(1.0)
    }
}
