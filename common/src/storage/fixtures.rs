//! Small, deterministic knowledge graphs written as parquet tables for tests.

use std::{fs, io, path::Path, sync::Arc};

use arrow_array::{
    builder::{Int64Builder, ListBuilder, StringBuilder},
    ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray,
};
use parquet::arrow::ArrowWriter;

use super::dataset::TableName;

const TOPICS: [&str; 5] = [
    "main function of the project",
    "storage engine",
    "network protocol",
    "query planner",
    "release process",
];

const ENTITIES_PER_TEXT_UNIT: usize = 5;

/// A graph with one root community and `communities - 1` children at level 1.
/// Entities are spread round-robin over the leaf communities and chained
/// together by one relationship per consecutive pair.
#[derive(Debug, Clone, Copy)]
pub struct SampleGraph {
    communities: usize,
    entities: usize,
}

impl SampleGraph {
    pub fn new(communities: usize, entities: usize) -> Self {
        Self {
            communities: communities.max(1),
            entities,
        }
    }

    pub fn entity_id(index: usize) -> String {
        format!("e-{index}")
    }

    pub fn entity_title(index: usize) -> String {
        format!("ENTITY_{index}")
    }

    pub fn topic(index: usize) -> &'static str {
        TOPICS[index % TOPICS.len()]
    }

    fn text_unit_count(&self) -> usize {
        self.entities.div_ceil(ENTITIES_PER_TEXT_UNIT).max(1)
    }

    fn leaf_community_of(&self, entity: usize) -> usize {
        if self.communities == 1 {
            0
        } else {
            1 + entity % (self.communities - 1)
        }
    }

    fn members_of(&self, community: usize) -> Vec<usize> {
        (0..self.entities)
            .filter(|entity| community == 0 || self.leaf_community_of(*entity) == community)
            .collect()
    }

    pub fn write(&self, root: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(root)?;
        self.write_entities(root)?;
        self.write_relationships(root)?;
        self.write_text_units(root)?;
        self.write_communities(root)?;
        self.write_community_reports(root)?;
        self.write_covariates(root)?;
        Ok(())
    }

    fn write_entities(&self, root: &Path) -> anyhow::Result<()> {
        let range = 0..self.entities;
        write_table(
            root,
            TableName::Entities,
            vec![
                ("id", strings(range.clone().map(Self::entity_id))),
                ("human_readable_id", ints(range.clone().map(as_i64))),
                ("title", strings(range.clone().map(Self::entity_title))),
                ("type", strings(range.clone().map(|_| "COMPONENT".to_string()))),
                (
                    "description",
                    strings(range.clone().map(|i| {
                        format!("Component {i} implements the {}.", Self::topic(i))
                    })),
                ),
                (
                    "text_unit_ids",
                    string_lists(
                        range
                            .clone()
                            .map(|i| vec![format!("t-{}", i / ENTITIES_PER_TEXT_UNIT)]),
                    ),
                ),
                ("frequency", ints(range.clone().map(|_| 1))),
                ("degree", ints(range.map(|i| as_i64(i % 7 + 1)))),
            ],
        )
    }

    fn write_relationships(&self, root: &Path) -> anyhow::Result<()> {
        let range = 0..self.entities.saturating_sub(1);
        write_table(
            root,
            TableName::Relationships,
            vec![
                ("id", strings(range.clone().map(|i| format!("r-{i}")))),
                ("human_readable_id", ints(range.clone().map(as_i64))),
                ("source", strings(range.clone().map(Self::entity_title))),
                ("target", strings(range.clone().map(|i| Self::entity_title(i + 1)))),
                (
                    "description",
                    strings(range.clone().map(|i| {
                        format!(
                            "{} hands work for the {} to {}",
                            Self::entity_title(i),
                            Self::topic(i),
                            Self::entity_title(i + 1)
                        )
                    })),
                ),
                (
                    "weight",
                    Arc::new(Float64Array::from_iter_values(
                        range.clone().map(|i| 1.0 + (i % 3) as f64),
                    )),
                ),
                ("combined_degree", ints(range.clone().map(|i| as_i64(i % 5 + 2)))),
                (
                    "text_unit_ids",
                    string_lists(
                        range.map(|i| vec![format!("t-{}", i / ENTITIES_PER_TEXT_UNIT)]),
                    ),
                ),
            ],
        )
    }

    fn write_text_units(&self, root: &Path) -> anyhow::Result<()> {
        let range = 0..self.text_unit_count();
        let members = |unit: usize| {
            (unit * ENTITIES_PER_TEXT_UNIT..((unit + 1) * ENTITIES_PER_TEXT_UNIT).min(self.entities))
                .collect::<Vec<_>>()
        };
        write_table(
            root,
            TableName::TextUnits,
            vec![
                ("id", strings(range.clone().map(|j| format!("t-{j}")))),
                ("human_readable_id", ints(range.clone().map(as_i64))),
                (
                    "text",
                    strings(range.clone().map(|j| {
                        let titles: Vec<String> =
                            members(j).into_iter().map(Self::entity_title).collect();
                        format!(
                            "Section {j} explains how {} cooperate on the {}.",
                            titles.join(", "),
                            Self::topic(j)
                        )
                    })),
                ),
                ("n_tokens", ints(range.clone().map(|_| 40))),
                (
                    "document_ids",
                    string_lists(range.clone().map(|_| vec!["doc-0".to_string()])),
                ),
                (
                    "entity_ids",
                    string_lists(
                        range
                            .map(|j| members(j).into_iter().map(Self::entity_id).collect()),
                    ),
                ),
            ],
        )
    }

    fn community_columns(&self) -> Vec<(&'static str, ArrayRef)> {
        let range = 0..self.communities;
        let level = |c: usize| i64::from(c != 0);
        let parent = |c: usize| if c == 0 { -1 } else { 0 };
        let children = |c: usize| -> Vec<i64> {
            if c == 0 {
                (1..self.communities).map(as_i64).collect()
            } else {
                Vec::new()
            }
        };
        vec![
            ("community", ints(range.clone().map(as_i64))),
            ("level", ints(range.clone().map(level))),
            ("parent", ints(range.clone().map(parent))),
            ("children", int_lists(range.map(children))),
        ]
    }

    fn write_communities(&self, root: &Path) -> anyhow::Result<()> {
        let range = 0..self.communities;
        let mut columns = vec![
            ("id", strings(range.clone().map(|c| format!("c-{c}")))),
            ("human_readable_id", ints(range.clone().map(as_i64))),
        ];
        columns.extend(self.community_columns());
        columns.extend([
            ("title", strings(range.clone().map(|c| format!("Community {c}")))),
            (
                "entity_ids",
                string_lists(
                    range
                        .clone()
                        .map(|c| self.members_of(c).into_iter().map(Self::entity_id).collect()),
                ),
            ),
            ("size", ints(range.map(|c| as_i64(self.members_of(c).len())))),
        ]);
        write_table(root, TableName::Communities, columns)
    }

    fn write_community_reports(&self, root: &Path) -> anyhow::Result<()> {
        let range = 0..self.communities;
        let summary = |c: usize| {
            if c == 0 {
                "The project as a whole. Its main function is serving graph queries.".to_string()
            } else {
                format!(
                    "Community {c} groups the components around the {}.",
                    Self::topic(c)
                )
            }
        };
        let mut columns = vec![
            ("id", strings(range.clone().map(|c| format!("report-{c}")))),
            ("human_readable_id", ints(range.clone().map(as_i64))),
        ];
        columns.extend(self.community_columns());
        columns.extend([
            ("title", strings(range.clone().map(|c| format!("Community {c} report")))),
            ("summary", strings(range.clone().map(summary))),
            (
                "full_content",
                strings(range.clone().map(|c| {
                    format!("# Community {c}\n\n{}\n\nMembers: {}", summary(c), self.members_of(c).len())
                })),
            ),
            (
                "rank",
                Arc::new(Float64Array::from_iter_values(
                    range.map(|c| 10.0 - c as f64),
                )),
            ),
        ]);
        write_table(root, TableName::CommunityReports, columns)
    }

    fn write_covariates(&self, root: &Path) -> anyhow::Result<()> {
        let claimed: Vec<usize> = (0..self.entities).step_by(10).collect();
        write_table(
            root,
            TableName::Covariates,
            vec![
                ("id", strings(claimed.iter().map(|i| format!("claim-{i}")))),
                ("human_readable_id", ints(claimed.iter().map(|i| as_i64(*i)))),
                ("covariate_type", strings(claimed.iter().map(|_| "claim".to_string()))),
                ("type", strings(claimed.iter().map(|_| "FACT".to_string()))),
                (
                    "description",
                    strings(claimed.iter().map(|i| {
                        format!("{} is responsible for the {}", Self::entity_title(*i), Self::topic(*i))
                    })),
                ),
                ("subject_id", strings(claimed.iter().map(|i| Self::entity_title(*i)))),
                ("object_id", strings(claimed.iter().map(|_| "NONE".to_string()))),
                ("status", strings(claimed.iter().map(|_| "TRUE".to_string()))),
                (
                    "text_unit_id",
                    strings(claimed.iter().map(|i| format!("t-{}", i / ENTITIES_PER_TEXT_UNIT))),
                ),
            ],
        )
    }
}

/// Deletes one table file, leaving the rest of the dataset in place.
pub fn remove_table(root: &Path, table: TableName) -> io::Result<()> {
    fs::remove_file(root.join(table.file_name()))
}

fn write_table(
    root: &Path,
    table: TableName,
    columns: Vec<(&'static str, ArrayRef)>,
) -> anyhow::Result<()> {
    let batch = RecordBatch::try_from_iter(columns)?;
    let file = fs::File::create(root.join(table.file_name()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn as_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn strings(values: impl Iterator<Item = String>) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(values))
}

fn ints(values: impl Iterator<Item = i64>) -> ArrayRef {
    Arc::new(Int64Array::from_iter_values(values))
}

fn string_lists(values: impl Iterator<Item = Vec<String>>) -> ArrayRef {
    let mut builder = ListBuilder::new(StringBuilder::new());
    for list in values {
        for value in list {
            builder.values().append_value(value);
        }
        builder.append(true);
    }
    Arc::new(builder.finish())
}

fn int_lists(values: impl Iterator<Item = Vec<i64>>) -> ArrayRef {
    let mut builder = ListBuilder::new(Int64Builder::new());
    for list in values {
        for value in list {
            builder.values().append_value(value);
        }
        builder.append(true);
    }
    Arc::new(builder.finish())
}
