use crate::error::Result;
use serde::Serialize;

pub const OBJECT_FILE: &str = "ObjectFile";
pub const ELEMENT_COUNT: &str = "ElementCount";
pub const ELEMENT_LIST: &str = "ElementList";
pub const NFRACTIONS: &str = "Nfractions";
pub const UNIQUE_FOR_UID: &str = "UniqueFOR_UID";
pub const REFERENCED_SERIES_UID: &str = "ReferencedSeriesUID";
pub const DATABASE_TIMESTAMP: &str = "DatabaseTimeStamp";
pub const HASH: &str = "hash";

/// Columns the image table carries beyond its schema mapping. List values in
/// these columns keep their structure; everywhere else they are flattened.
pub const EXTRA_IMAGE_COLUMNS: [&str; 8] = [
    OBJECT_FILE,
    ELEMENT_COUNT,
    ELEMENT_LIST,
    NFRACTIONS,
    UNIQUE_FOR_UID,
    REFERENCED_SERIES_UID,
    DATABASE_TIMESTAMP,
    HASH,
];

pub fn is_extra_column(column: &str) -> bool {
    EXTRA_IMAGE_COLUMNS
        .iter()
        .any(|extra| extra.eq_ignore_ascii_case(column))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Text(String),
    Integer(i64),
    Real(f64),
    List(Vec<ColumnValue>),
}

impl ColumnValue {
    pub fn empty() -> Self {
        ColumnValue::Text(String::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ColumnValue::Text(text) => text.is_empty(),
            ColumnValue::List(items) => items.is_empty(),
            ColumnValue::Integer(_) | ColumnValue::Real(_) => false,
        }
    }

    /// Text stored in the database. Lists in structured columns are written as
    /// JSON arrays, all other lists as backslash separated values.
    pub fn to_storage(&self, structured: bool) -> Result<String> {
        match self {
            ColumnValue::List(_) if structured => Ok(serde_json::to_string(self)?),
            other => Ok(other.render()),
        }
    }

    fn render(&self) -> String {
        match self {
            ColumnValue::Text(text) => text.clone(),
            ColumnValue::Integer(value) => value.to_string(),
            ColumnValue::Real(value) => value.to_string(),
            ColumnValue::List(items) => items
                .iter()
                .map(ColumnValue::render)
                .collect::<Vec<_>>()
                .join("\\"),
        }
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::Text(value.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        ColumnValue::Text(value)
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        ColumnValue::Integer(value)
    }
}

impl From<f64> for ColumnValue {
    fn from(value: f64) -> Self {
        ColumnValue::Real(value)
    }
}

impl<T: Into<ColumnValue>> From<Vec<T>> for ColumnValue {
    fn from(values: Vec<T>) -> Self {
        ColumnValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Column name to value mapping for one hierarchy level of one record.
/// Columns keep the order in which they were first inserted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedRow {
    columns: Vec<(String, ColumnValue)>,
}

impl ExtractedRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column, replacing the value in place if the column exists.
    /// Column names compare case-insensitively, as they do in SQL.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<ColumnValue>) {
        let column = column.into();
        let value = value.into();
        match self
            .columns
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(&column))
        {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn extend(&mut self, other: ExtractedRow) {
        for (column, value) in other.columns {
            self.insert(column, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnValue)> {
        self.columns
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>, V: Into<ColumnValue>> FromIterator<(K, V)> for ExtractedRow {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut row = ExtractedRow::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}
