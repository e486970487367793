use std::{
    fmt,
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use parquet::file::reader::{FileReader, SerializedFileReader};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::error::AppError;

/// The six tables every dataset root must provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableName {
    Entities,
    Communities,
    CommunityReports,
    TextUnits,
    Relationships,
    Covariates,
}

impl TableName {
    pub const ALL: [Self; 6] = [
        Self::Entities,
        Self::Communities,
        Self::CommunityReports,
        Self::TextUnits,
        Self::Relationships,
        Self::Covariates,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entities => "entities",
            Self::Communities => "communities",
            Self::CommunityReports => "community_reports",
            Self::TextUnits => "text_units",
            Self::Relationships => "relationships",
            Self::Covariates => "covariates",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.parquet", self.as_str())
    }

    /// Columns the retrieval strategies cannot work without.
    pub const fn required_columns(self) -> &'static [&'static str] {
        match self {
            Self::Entities => &["id", "title"],
            Self::Communities | Self::CommunityReports => &["id", "community", "level"],
            Self::TextUnits => &["id", "text"],
            Self::Relationships => &["id", "source", "target"],
            Self::Covariates => &["id", "subject_id"],
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("dataset table '{table}' is missing or invalid: {cause}")]
pub struct DatasetLoadError {
    pub table: TableName,
    pub cause: String,
}

pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: TableName,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(name: TableName, columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            name,
            columns,
            rows,
        }
    }

    pub const fn name(&self) -> TableName {
        self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A complete table set read from one dataset root.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    root: PathBuf,
    pub entities: Arc<Table>,
    pub communities: Arc<Table>,
    pub community_reports: Arc<Table>,
    pub text_units: Arc<Table>,
    pub relationships: Arc<Table>,
    pub covariates: Arc<Table>,
}

impl Dataset {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub const fn table(&self, name: TableName) -> &Arc<Table> {
        match name {
            TableName::Entities => &self.entities,
            TableName::Communities => &self.communities,
            TableName::CommunityReports => &self.community_reports,
            TableName::TextUnits => &self.text_units,
            TableName::Relationships => &self.relationships,
            TableName::Covariates => &self.covariates,
        }
    }
}

/// Reads all six tables below `root`. Any failing table fails the whole load.
pub fn load_dataset(root: &Path) -> Result<Dataset, DatasetLoadError> {
    let dataset = Dataset {
        root: root.to_path_buf(),
        entities: Arc::new(read_table(root, TableName::Entities)?),
        communities: Arc::new(read_table(root, TableName::Communities)?),
        community_reports: Arc::new(read_table(root, TableName::CommunityReports)?),
        text_units: Arc::new(read_table(root, TableName::TextUnits)?),
        relationships: Arc::new(read_table(root, TableName::Relationships)?),
        covariates: Arc::new(read_table(root, TableName::Covariates)?),
    };

    debug!(
        root = %root.display(),
        entities = dataset.entities.len(),
        communities = dataset.communities.len(),
        text_units = dataset.text_units.len(),
        "Loaded dataset"
    );

    Ok(dataset)
}

/// Same as [`load_dataset`], on tokio's blocking pool.
pub async fn load_dataset_async(root: &Path) -> Result<Dataset, AppError> {
    let root = root.to_path_buf();
    let dataset = tokio::task::spawn_blocking(move || load_dataset(&root)).await??;
    Ok(dataset)
}

/// True when every table file exists below `root`. Does not parse anything.
pub fn tables_present(root: &Path) -> Result<(), TableName> {
    match TableName::ALL
        .into_iter()
        .find(|table| !root.join(table.file_name()).is_file())
    {
        Some(missing) => Err(missing),
        None => Ok(()),
    }
}

fn read_table(root: &Path, name: TableName) -> Result<Table, DatasetLoadError> {
    let fail = |cause: String| DatasetLoadError { table: name, cause };
    let path = root.join(name.file_name());
    if !path.is_file() {
        return Err(fail(format!("file not found at {}", path.display())));
    }

    let file = File::open(&path).map_err(|e| fail(e.to_string()))?;
    let reader = SerializedFileReader::new(file).map_err(|e| fail(e.to_string()))?;

    let columns: Vec<String> = reader
        .metadata()
        .file_metadata()
        .schema()
        .get_fields()
        .iter()
        .map(|field| field.name().to_string())
        .collect();

    if let Some(missing) = name
        .required_columns()
        .iter()
        .find(|required| !columns.iter().any(|column| column == *required))
    {
        return Err(fail(format!("required column '{missing}' is absent")));
    }

    let mut rows = Vec::new();
    for row in reader.get_row_iter(None).map_err(|e| fail(e.to_string()))? {
        let row = row.map_err(|e| fail(e.to_string()))?;
        match row.to_json_value() {
            Value::Object(map) => rows.push(map),
            other => return Err(fail(format!("unexpected row shape: {other}"))),
        }
    }

    Ok(Table::new(name, columns, rows))
}
