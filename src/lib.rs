//! Index a directory tree of DICOM files in a relational store laid out by
//! a patient / study / series / image schema.

pub mod app;
pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod model;
pub mod store;
pub mod transfer;
pub mod utils;

pub use archive::Archive;
pub use config::ArchiveConfig;
pub use error::{ArchiveError, Result};
pub use filter::{FilterFlags, NameFilter};
pub use model::{ColumnValue, ExtractedRow, Level, SchemaRegistry};
pub use store::{DeleteReport, IngestSession, Selection, Store, SyncOutcome};
pub use transfer::{PeerAddress, ReceivedRecordHandler, RecordSender};
