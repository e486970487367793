use super::{deserialize_flexible_list, deserialize_optional_int, deserialize_text};
use crate::storage::dataset::TableName;

graph_record!(TextUnit, TableName::TextUnits, {
    #[serde(default, deserialize_with = "deserialize_text")]
    text: String,
    #[serde(default, deserialize_with = "deserialize_optional_int")]
    n_tokens: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_flexible_list")]
    document_ids: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_list")]
    entity_ids: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_list")]
    relationship_ids: Vec<String>,
});
