use crate::store::{ColumnTypes, DEFAULT_COLUMN_TYPE};
use std::collections::HashMap;
use std::path::PathBuf;

/// Where the archive lives and how its tables are laid out.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveConfig {
    pub data_dir: PathBuf,
    pub schema_file: PathBuf,
    pub database: PathBuf,
    pub compute_hash: bool,
    pub truncate_columns: bool,
    pub column_type: String,
    pub column_type_exceptions: HashMap<String, String>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            schema_file: PathBuf::from("dicom.sql"),
            database: PathBuf::from("conquest.db"),
            compute_hash: false,
            truncate_columns: true,
            column_type: DEFAULT_COLUMN_TYPE.to_string(),
            column_type_exceptions: HashMap::new(),
        }
    }
}

impl ArchiveConfig {
    /// Defaults overridden by `PACS_INDEX_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("PACS_INDEX_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            schema_file: std::env::var("PACS_INDEX_SCHEMA")
                .map(PathBuf::from)
                .unwrap_or(defaults.schema_file),
            database: std::env::var("PACS_INDEX_DATABASE")
                .map(PathBuf::from)
                .unwrap_or(defaults.database),
            compute_hash: env_flag("PACS_INDEX_COMPUTE_HASH").unwrap_or(defaults.compute_hash),
            truncate_columns: env_flag("PACS_INDEX_TRUNCATE_COLUMNS")
                .unwrap_or(defaults.truncate_columns),
            ..defaults
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_schema_file(mut self, schema_file: impl Into<PathBuf>) -> Self {
        self.schema_file = schema_file.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<PathBuf>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_compute_hash(mut self, compute_hash: bool) -> Self {
        self.compute_hash = compute_hash;
        self
    }

    pub fn with_truncate_columns(mut self, truncate_columns: bool) -> Self {
        self.truncate_columns = truncate_columns;
        self
    }

    pub fn with_column_type(mut self, column: impl Into<String>, kind: impl Into<String>) -> Self {
        self.column_type_exceptions.insert(column.into(), kind.into());
        self
    }

    pub fn column_types(&self) -> ColumnTypes {
        ColumnTypes {
            default: self.column_type.clone(),
            exceptions: self.column_type_exceptions.clone(),
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            log::warn!("Ignoring {name}={other}, expected a boolean");
            None
        }
    }
}
