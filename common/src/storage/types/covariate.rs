use super::{deserialize_flexible_id, deserialize_optional_id, deserialize_optional_text, deserialize_text};
use crate::storage::dataset::TableName;

// Claims extracted during indexing. `subject_id` is an entity title.
graph_record!(Covariate, TableName::Covariates, {
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    covariate_type: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "deserialize_optional_text")]
    claim_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    description: String,
    #[serde(deserialize_with = "deserialize_flexible_id")]
    subject_id: String,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    object_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    status: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    text_unit_id: Option<String>,
});
