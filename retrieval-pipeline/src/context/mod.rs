//! Deterministic context assembly for each search strategy.

mod basic;
mod drift;
mod global;
mod local;

pub use basic::build_basic_context;
pub use drift::build_drift_context;
pub use global::build_global_context;
pub use local::build_local_context;

use common::{
    error::AppError,
    storage::types::{
        community::Community, community_report::CommunityReport, covariate::Covariate,
        entity::Entity, relationship::Relationship, text_unit::TextUnit, GraphRecord,
    },
};
use serde_json::{json, Map, Value};

use crate::engine::IndexedDataset;

/// Typed records of one index, parsed from its tables.
#[derive(Debug, Clone)]
pub struct GraphView {
    pub name: String,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub communities: Vec<Community>,
    pub reports: Vec<CommunityReport>,
    pub text_units: Vec<TextUnit>,
    pub covariates: Vec<Covariate>,
}

impl GraphView {
    pub fn from_index(index: &IndexedDataset) -> Result<Self, AppError> {
        let dataset = &index.dataset;
        Ok(Self {
            name: index.name.clone(),
            entities: Entity::from_table(&dataset.entities)?,
            relationships: Relationship::from_table(&dataset.relationships)?,
            communities: Community::from_table(&dataset.communities)?,
            reports: CommunityReport::from_table(&dataset.community_reports)?,
            text_units: TextUnit::from_table(&dataset.text_units)?,
            covariates: Covariate::from_table(&dataset.covariates)?,
        })
    }

    /// Communities at level `max_level` or shallower that list `entity_id`.
    pub fn communities_of(&self, entity_id: &str, max_level: i64) -> Vec<&Community> {
        self.communities
            .iter()
            .filter(|community| community.level <= max_level)
            .filter(|community| community.entity_ids.iter().any(|id| id == entity_id))
            .collect()
    }

    pub fn report_for(&self, community: &str) -> Option<&CommunityReport> {
        self.reports.iter().find(|report| report.community == community)
    }
}

/// Context text for the prompt plus the records it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltContext {
    pub text: String,
    pub records: Value,
}

/// Accumulates context sections across one or more indexes.
#[derive(Debug, Default)]
pub(crate) struct ContextWriter {
    text: String,
    records: Map<String, Value>,
    multi_index: bool,
}

impl ContextWriter {
    pub(crate) fn new(index_count: usize) -> Self {
        Self {
            multi_index: index_count > 1,
            ..Self::default()
        }
    }

    pub(crate) fn begin_index(&mut self, name: &str) {
        if self.multi_index {
            self.text.push_str(&format!("=====Index: {name}=====\n\n"));
        }
    }

    /// Appends a `|`-separated table section. Empty sections still record their key.
    pub(crate) fn section(
        &mut self,
        key: &str,
        title: &str,
        header: &[&str],
        rows: Vec<(Vec<String>, Value)>,
    ) {
        let entry = self
            .records
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));

        if rows.is_empty() {
            return;
        }

        self.text.push_str(&format!("-----{title}-----\n"));
        self.text.push_str(&header.join("|"));
        self.text.push('\n');
        for (cells, record) in rows {
            let cells: Vec<String> = cells.iter().map(|cell| sanitize_cell(cell)).collect();
            self.text.push_str(&cells.join("|"));
            self.text.push('\n');
            if let Value::Array(items) = entry {
                items.push(record);
            }
        }
        self.text.push('\n');
    }

    pub(crate) fn finish(self, max_context_tokens: usize) -> BuiltContext {
        BuiltContext {
            text: truncate_chars(&self.text, max_context_tokens.saturating_mul(4)).to_string(),
            records: Value::Object(self.records),
        }
    }
}

pub(crate) fn entity_record(index: &str, entity: &Entity, score: f32) -> (Vec<String>, Value) {
    (
        vec![
            entity.human_readable_id.map_or_else(|| entity.id.clone(), |id| id.to_string()),
            entity.title.clone(),
            entity.description.clone(),
            entity.degree_or_zero().to_string(),
        ],
        json!({
            "index": index,
            "id": entity.id,
            "title": entity.title,
            "type": entity.entity_type,
            "score": score,
        }),
    )
}

pub(crate) fn report_record(index: &str, report: &CommunityReport, relevance: f32) -> (Vec<String>, Value) {
    (
        vec![
            report.community.clone(),
            report.title.clone(),
            report.content().to_string(),
        ],
        json!({
            "index": index,
            "id": report.id,
            "community": report.community,
            "level": report.level,
            "title": report.title,
            "rank": report.rank,
            "relevance": relevance,
        }),
    )
}

pub(crate) fn relationship_record(index: &str, relationship: &Relationship) -> (Vec<String>, Value) {
    (
        vec![
            relationship
                .human_readable_id
                .map_or_else(|| relationship.id.clone(), |id| id.to_string()),
            relationship.source.clone(),
            relationship.target.clone(),
            relationship.description.clone(),
            relationship.weight_or_default().to_string(),
        ],
        json!({
            "index": index,
            "id": relationship.id,
            "source": relationship.source,
            "target": relationship.target,
            "weight": relationship.weight,
        }),
    )
}

pub(crate) fn text_unit_record(index: &str, unit: &TextUnit) -> (Vec<String>, Value) {
    (
        vec![
            unit.human_readable_id.map_or_else(|| unit.id.clone(), |id| id.to_string()),
            unit.text.clone(),
        ],
        json!({ "index": index, "id": unit.id }),
    )
}

pub(crate) fn claim_record(index: &str, claim: &Covariate) -> (Vec<String>, Value) {
    (
        vec![
            claim.human_readable_id.map_or_else(|| claim.id.clone(), |id| id.to_string()),
            claim.subject_id.clone(),
            claim.claim_type.clone().unwrap_or_default(),
            claim.status.clone().unwrap_or_default(),
            claim.description.clone(),
        ],
        json!({
            "index": index,
            "id": claim.id,
            "subject_id": claim.subject_id,
            "status": claim.status,
        }),
    )
}

// Pipes and newlines would break the table layout.
fn sanitize_cell(cell: &str) -> String {
    cell.replace(['|', '\n', '\r'], " ")
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text.get(..byte_index).unwrap_or(text),
        None => text,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use common::storage::{dataset::load_dataset, fixtures::SampleGraph};
    use tempfile::TempDir;

    use crate::engine::IndexedDataset;

    pub(crate) fn sample_index(communities: usize, entities: usize) -> (TempDir, IndexedDataset) {
        let dir = TempDir::new().unwrap();
        SampleGraph::new(communities, entities).write(dir.path()).unwrap();
        let dataset = load_dataset(dir.path()).unwrap();
        let index = IndexedDataset::new(dir.path(), Arc::new(dataset));
        (dir, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 50), "short");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn writer_renders_tables_and_records() {
        let mut writer = ContextWriter::new(1);
        writer.begin_index("ignored");
        writer.section(
            "entities",
            "Entities",
            &["id", "entity"],
            vec![(vec!["1".into(), "A|B\nC".into()], json!({"id": "e-1"}))],
        );
        writer.section("claims", "Claims", &["id"], Vec::new());
        let built = writer.finish(100);

        assert_eq!(built.text, "-----Entities-----\nid|entity\n1|A B C\n\n");
        assert_eq!(built.records, json!({"entities": [{"id": "e-1"}], "claims": []}));
    }

    #[test]
    fn multi_index_output_is_labelled() {
        let mut writer = ContextWriter::new(2);
        writer.begin_index("first");
        let built = writer.finish(100);
        assert!(built.text.starts_with("=====Index: first====="));
    }

    #[test]
    fn graph_view_parses_fixture_tables() {
        let (_dir, index) = test_support::sample_index(3, 10);
        let view = GraphView::from_index(&index).unwrap();
        assert_eq!(view.entities.len(), 10);
        assert_eq!(view.reports.len(), 3);
        assert_eq!(view.communities_of("e-1", 1).len(), 2);
        assert_eq!(view.communities_of("e-1", 0).len(), 1);
        assert!(view.report_for("2").is_some());
    }
}
