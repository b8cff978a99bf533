use crate::model::Level;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("schema parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("column `{column}` defined twice in {level} table")]
    DuplicateColumn { level: Level, column: String },

    #[error("record has no {level} identity ({tag})")]
    MissingIdentity { level: Level, tag: String },

    #[error("{level} table has no column for {tag}")]
    MissingColumn { level: Level, tag: String },

    #[error("conflicting options: {0}")]
    ConflictingOptions(&'static str),

    #[error("invalid filter pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("cannot order summary by `{0}`")]
    InvalidOrdering(String),

    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read DICOM file: {0}")]
    Read(#[from] dicom::object::ReadError),

    #[error("failed to serialize column value: {0}")]
    Json(#[from] serde_json::Error),
}
