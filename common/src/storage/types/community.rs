use super::{
    deserialize_flexible_id, deserialize_flexible_int, deserialize_flexible_list,
    deserialize_optional_id, deserialize_optional_int, deserialize_text,
};
use crate::storage::dataset::TableName;

graph_record!(Community, TableName::Communities, {
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
    #[serde(default, deserialize_with = "deserialize_flexible_list")]
    entity_ids: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_list")]
    relationship_ids: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_list")]
    text_unit_ids: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_optional_int")]
    size: Option<i64>,
});

impl Community {
    /// The parent community number, `None` for roots (stored as -1).
    pub fn parent_community(&self) -> Option<&str> {
        root_aware_parent(self.parent.as_deref())
    }
}

pub(crate) fn root_aware_parent(parent: Option<&str>) -> Option<&str> {
    parent.filter(|parent| !parent.is_empty() && *parent != "-1")
}
