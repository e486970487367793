use super::{deserialize_flexible_list, deserialize_optional_int, deserialize_optional_text, deserialize_text};
use crate::storage::dataset::TableName;

graph_record!(Entity, TableName::Entities, {
    title: String,
    #[serde(rename = "type", default, deserialize_with = "deserialize_optional_text")]
    entity_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    description: String,
    #[serde(default, deserialize_with = "deserialize_flexible_list")]
    text_unit_ids: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_optional_int")]
    frequency: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_optional_int")]
    degree: Option<i64>,
});

impl Entity {
    pub fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            human_readable_id: None,
            title: title.into(),
            entity_type: None,
            description: description.into(),
            text_unit_ids: Vec::new(),
            frequency: None,
            degree: None,
        }
    }

    pub fn degree_or_zero(&self) -> i64 {
        self.degree.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::GraphRecord;
    use serde_json::json;

    #[test]
    fn parses_graph_output_row() {
        let entity: Entity = serde_json::from_value(json!({
            "id": "4b1c",
            "human_readable_id": 3,
            "title": "GRAPH ENGINE",
            "type": "COMPONENT",
            "description": null,
            "text_unit_ids": ["t1", "t2"],
            "degree": 4
        }))
        .unwrap();

        assert_eq!(entity.get_id(), "4b1c");
        assert_eq!(entity.entity_type.as_deref(), Some("COMPONENT"));
        assert_eq!(entity.description, "");
        assert_eq!(entity.text_unit_ids.len(), 2);
        assert_eq!(entity.degree_or_zero(), 4);
        assert_eq!(Entity::table_name(), TableName::Entities);
    }

    #[test]
    fn title_is_required() {
        assert!(serde_json::from_value::<Entity>(json!({"id": "a"})).is_err());
    }
}
