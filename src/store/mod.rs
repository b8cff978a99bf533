//! SQLite tables mirroring the archive hierarchy.
//!
//! One table per level, laid out by the [`SchemaRegistry`]; the image table
//! also carries the derived columns. Every column is textual unless a type
//! exception names it.

pub mod delete;
pub mod summary;
pub mod sync;

pub use delete::DeleteReport;
pub use summary::PatientSummary;
pub use sync::{IngestSession, LevelAction, SyncOutcome};

use crate::error::{ArchiveError, Result};
use crate::model::row::{is_extra_column, DATABASE_TIMESTAMP, EXTRA_IMAGE_COLUMNS, OBJECT_FILE};
use crate::model::schema::sql_column_name;
use crate::model::{tags, AttributeMapping, ExtractedRow, Level, SchemaRegistry};
use dicom::core::Tag;
use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Params};
use std::cell::Cell;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_COLUMN_TYPE: &str = "character varying(128)";

const SERIES_VIEW: &str = "
CREATE VIEW v_series AS
SELECT DICOMseries.*, DICOMstudies.*
FROM DICOMseries
INNER JOIN DICOMstudies ON DICOMseries.{series_study} = DICOMstudies.{study_id}";

const RT_SERIES_VIEW: &str = "
CREATE VIEW v_seriesRT AS
SELECT DICOMseries.*, DICOMstudies.*, DICOMimages.*
FROM DICOMseries
INNER JOIN DICOMstudies ON DICOMseries.{series_study} = DICOMstudies.{study_id}
INNER JOIN DICOMimages ON DICOMimages.{image_series} = DICOMseries.{series_id}
WHERE DICOMseries.{modality} IN ('RTSTRUCT', 'RTDOSE', 'RTPLAN')";

/// Which series, or whose series, an operation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Patient(String),
    Series(Vec<String>),
    /// SQL returning the series identity column.
    Query(String),
}

impl Selection {
    pub fn series(uid: impl Into<String>) -> Self {
        Selection::Series(vec![uid.into()])
    }
}

/// Column types used when creating tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnTypes {
    pub default: String,
    pub exceptions: HashMap<String, String>,
}

impl Default for ColumnTypes {
    fn default() -> Self {
        Self {
            default: DEFAULT_COLUMN_TYPE.to_string(),
            exceptions: HashMap::new(),
        }
    }
}

impl ColumnTypes {
    fn type_of(&self, column: &str) -> &str {
        self.exceptions
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, kind)| kind.as_str())
            .unwrap_or(&self.default)
    }
}

/// One result row of an ad-hoc query, NULL columns left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRow {
    values: Vec<(String, Option<String>)>,
}

impl QueryRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }
}

/// File reference of one stored image together with its patient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub object_file: String,
    pub patient_id: String,
}

pub struct Store {
    conn: Connection,
    schema: SchemaRegistry,
    column_types: ColumnTypes,
    /// Bumped whenever rows are removed, so ingestion sessions know their
    /// memo of present identities may be stale.
    generation: Cell<u64>,
}

impl Store {
    /// Opens the database file, creating the standard tables when it has none.
    pub fn open(path: &Path, schema: SchemaRegistry, column_types: ColumnTypes) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        log::info!("Connected to {}", path.display());
        Self::init(conn, schema, column_types)
    }

    pub fn open_in_memory(schema: SchemaRegistry) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, schema, ColumnTypes::default())
    }

    fn init(conn: Connection, schema: SchemaRegistry, column_types: ColumnTypes) -> Result<Self> {
        let store = Self {
            conn,
            schema,
            column_types,
            generation: Cell::new(0),
        };
        if !store.table_exists(Level::Series.table_name())? {
            log::info!("Creating tables because the database is empty");
            store.create_standard_tables()?;
        }
        Ok(store)
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.get()
    }

    pub(crate) fn bump_generation(&self) {
        self.generation.set(self.generation.get().wrapping_add(1));
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, err)| err.into())
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    /// Drops and recreates every table of the schema, then the views and indexes.
    pub fn create_standard_tables(&self) -> Result<()> {
        self.bump_generation();
        for table in self.schema.tables() {
            let mut columns: Vec<String> = table
                .mappings()
                .iter()
                .map(|mapping| sql_column_name(&mapping.column))
                .collect();
            if table.level() == Level::Image {
                for extra in EXTRA_IMAGE_COLUMNS {
                    if columns.iter().any(|column| column.eq_ignore_ascii_case(extra)) {
                        return Err(ArchiveError::DuplicateColumn {
                            level: Level::Image,
                            column: extra.to_string(),
                        });
                    }
                    columns.push(extra.to_string());
                }
            }

            self.conn
                .execute_batch(&format!("DROP TABLE IF EXISTS {}", quote(table.table_name())))?;
            self.conn
                .execute_batch(&self.create_table_sql(table.table_name(), &columns))?;
            log::info!("Created table {}", table.table_name());
        }

        self.create_views()?;
        self.create_indexes()?;
        Ok(())
    }

    fn create_table_sql(&self, table: &str, columns: &[String]) -> String {
        let definitions = columns
            .iter()
            .map(|column| format!("{} {}", quote(column), self.column_types.type_of(column)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE {} ({definitions})", quote(table))
    }

    fn create_views(&self) -> Result<()> {
        let replacements = [
            ("{series_study}", self.column(Level::Series, tags::STUDY_INSTANCE_UID)?),
            ("{study_id}", self.identity_column(Level::Study)?),
            ("{image_series}", self.column(Level::Image, tags::SERIES_INSTANCE_UID)?),
            ("{series_id}", self.identity_column(Level::Series)?),
            ("{modality}", self.column(Level::Series, tags::MODALITY)?),
        ];
        let render = |template: &str| {
            replacements
                .iter()
                .fold(template.to_string(), |sql, (marker, column)| {
                    sql.replace(marker, &quote(column))
                })
        };

        self.conn.execute_batch("DROP VIEW IF EXISTS v_series")?;
        self.conn.execute_batch(&render(SERIES_VIEW))?;
        self.conn.execute_batch("DROP VIEW IF EXISTS v_seriesRT")?;
        self.conn.execute_batch(&render(RT_SERIES_VIEW))?;
        log::info!("Created views v_series and v_seriesRT");
        Ok(())
    }

    fn create_indexes(&self) -> Result<()> {
        for (index, level) in [
            ("index_dicomimages", Level::Image),
            ("index_dicomseries", Level::Series),
        ] {
            self.conn.execute_batch(&format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote(index),
                quote(level.table_name()),
                quote(&self.identity_column(level)?)
            ))?;
        }
        log::info!("Created index_dicomimages and index_dicomseries");
        Ok(())
    }

    /// SQL column of `level` holding attribute `tag`.
    pub fn column(&self, level: Level, tag: Tag) -> Result<String> {
        self.schema.column_for(level, tag)
    }

    pub fn identity_column(&self, level: Level) -> Result<String> {
        let tag = level.identity_tag().ok_or(ArchiveError::MissingColumn {
            level,
            tag: "identity".to_string(),
        })?;
        self.column(level, tag)
    }

    pub fn contains(&self, level: Level, identity: &str) -> Result<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ?1 LIMIT 1",
            quote(level.table_name()),
            quote(&self.identity_column(level)?)
        );
        Ok(self
            .conn
            .query_row(&sql, [identity.trim()], |_| Ok(()))
            .optional()?
            .is_some())
    }

    /// Inserts one row into the table of `level`.
    pub fn insert(&self, level: Level, row: &ExtractedRow) -> Result<()> {
        let (sql, values) = insert_statement(level.table_name(), row)?;
        self.conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(())
    }

    /// Inserts into an arbitrary table, creating it from the row's columns if
    /// it does not exist yet.
    pub fn insert_row(
        &self,
        table: &str,
        row: &ExtractedRow,
        exceptions: &HashMap<String, String>,
    ) -> Result<()> {
        let (sql, values) = insert_statement(table, row)?;
        match self.conn.execute(&sql, params_from_iter(values.iter())) {
            Ok(_) => Ok(()),
            Err(err) if err.to_string().contains("no such table") => {
                log::info!("Now creating table {table} to insert the row in");
                let types = ColumnTypes {
                    default: self.column_types.default.clone(),
                    exceptions: exceptions.clone(),
                };
                let columns: Vec<String> = row.column_names().map(sql_column_name).collect();
                let definitions = columns
                    .iter()
                    .map(|column| format!("{} {}", quote(column), types.type_of(column)))
                    .collect::<Vec<_>>()
                    .join(", ");
                self.conn
                    .execute_batch(&format!("CREATE TABLE {} ({definitions})", quote(table)))?;
                self.conn.execute(&sql, params_from_iter(values.iter()))?;
                Ok(())
            }
            Err(err) => {
                log::error!("Error {err} when inserting a row into {table}");
                Err(err.into())
            }
        }
    }

    /// Refreshes the bookkeeping timestamp of an image already in the store.
    pub fn touch_image(&self, identity: &str, timestamp: f64) -> Result<usize> {
        let sql = format!(
            "UPDATE {} SET {} = ?1 WHERE {} = ?2",
            quote(Level::Image.table_name()),
            quote(DATABASE_TIMESTAMP),
            quote(&self.identity_column(Level::Image)?)
        );
        Ok(self
            .conn
            .execute(&sql, params![timestamp.to_string(), identity.trim()])?)
    }

    /// Runs caller supplied SQL. Failures are logged and give `None`, which
    /// means "unknown", not "no rows".
    pub fn execute_query(&self, sql: &str) -> Option<Vec<QueryRow>> {
        match self.query(sql, []) {
            Ok(rows) => {
                log::debug!("Query: {sql} returned {} rows", rows.len());
                Some(rows)
            }
            Err(err) => {
                log::error!("Exception {err} encountered in execution of db query: {sql}");
                None
            }
        }
    }

    /// Values of one column of a caller supplied query.
    pub fn query_column(&self, sql: &str, column: &str) -> Option<Vec<String>> {
        self.execute_query(sql).map(|rows| {
            rows.iter()
                .filter_map(|row| row.get(column).map(str::to_string))
                .collect()
        })
    }

    pub(crate) fn query<P: Params>(&self, sql: &str, args: P) -> Result<Vec<QueryRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let mut rows = stmt.query(args)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(names.len());
            for (index, name) in names.iter().enumerate() {
                values.push((name.clone(), value_text(row.get_ref(index)?)));
            }
            result.push(QueryRow { values });
        }
        Ok(result)
    }

    pub(crate) fn count(&self, sql: &str, arg: &str) -> Result<i64> {
        Ok(self.conn.query_row(sql, [arg], |row| row.get(0))?)
    }

    /// Series identities named by a selection. A failing selection query is
    /// an error, never an empty selection.
    pub fn series_of(&self, selection: &Selection) -> Result<Vec<String>> {
        match selection {
            Selection::Series(uids) => Ok(uids.clone()),
            Selection::Query(sql) => {
                log::info!("Selecting series following query: {sql}");
                let column = self.identity_column(Level::Series)?;
                let rows = self
                    .query(sql, [])
                    .inspect_err(|err| log::error!("Selection query failed: {err}"))?;
                Ok(rows
                    .iter()
                    .filter_map(|row| row.get(&column).map(str::to_string))
                    .collect())
            }
            Selection::Patient(patient) => {
                let sql = format!(
                    "SELECT {} FROM {} WHERE {} = ?1",
                    quote(&self.identity_column(Level::Series)?),
                    quote(Level::Series.table_name()),
                    quote(&self.column(Level::Series, tags::PATIENT_ID)?)
                );
                let column = self.identity_column(Level::Series)?;
                Ok(self
                    .query(&sql, [patient])?
                    .iter()
                    .filter_map(|row| row.get(&column).map(str::to_string))
                    .collect())
            }
        }
    }

    /// Backing files of a selection, in store order.
    pub fn files_of(&self, selection: &Selection) -> Result<Vec<ImageFile>> {
        let image_patient = self.column(Level::Image, tags::PATIENT_ID)?;
        let select = |filter_column: &str, value: &str| -> Result<Vec<ImageFile>> {
            let sql = format!(
                "SELECT {}, {} FROM {} WHERE {} = ?1",
                quote(OBJECT_FILE),
                quote(&image_patient),
                quote(Level::Image.table_name()),
                quote(filter_column)
            );
            Ok(self
                .query(&sql, [value])?
                .iter()
                .filter_map(|row| {
                    Some(ImageFile {
                        object_file: row.get(OBJECT_FILE)?.to_string(),
                        patient_id: row.get(&image_patient).unwrap_or_default().to_string(),
                    })
                })
                .collect())
        };

        match selection {
            Selection::Patient(patient) => select(image_patient.as_str(), patient.as_str()),
            other => {
                let image_series = self.column(Level::Image, tags::SERIES_INSTANCE_UID)?;
                let mut files = Vec::new();
                for series in self.series_of(other)? {
                    files.extend(select(image_series.as_str(), series.as_str())?);
                }
                Ok(files)
            }
        }
    }

    /// Adds a column mapping, and the column itself when the table of `level`
    /// already exists. Rows stored earlier hold NULL in it.
    pub fn add_column(&mut self, level: Level, mapping: AttributeMapping) -> Result<()> {
        let column = sql_column_name(&mapping.column);
        self.schema.add_column(level, mapping)?;
        if self.table_exists(level.table_name())? {
            self.conn.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quote(level.table_name()),
                quote(&column),
                self.column_types.type_of(&column)
            ))?;
            log::info!("Added column {column} to {}", level.table_name());
        }
        Ok(())
    }
}

fn insert_statement(table: &str, row: &ExtractedRow) -> Result<(String, Vec<String>)> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (column, value) in row.iter() {
        columns.push(quote(&sql_column_name(column)));
        values.push(value.to_storage(is_extra_column(column))?);
    }
    let placeholders = (1..=values.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        quote(table),
        columns.join(", ")
    );
    Ok((sql, values))
}

fn value_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(number) => Some(number.to_string()),
        ValueRef::Real(number) => Some(number.to_string()),
        ValueRef::Text(text) => Some(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => Some(format!("<{} bytes>", bytes.len())),
    }
}

/// Quotes an SQL identifier.
pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
