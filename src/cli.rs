use crate::config::ArchiveConfig;
use crate::error::{ArchiveError, Result};
use crate::store::Selection;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pacs-index", version, about = "Index a directory of DICOM files in SQLite")]
pub struct Cli {
    /// Directory holding one subdirectory of files per patient
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Table layout file; the built-in layout is used when it does not exist
    #[arg(long, global = true)]
    pub schema: Option<PathBuf>,

    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Store content hashes of RT structure sets, plans and doses
    #[arg(long, global = true)]
    pub hash: bool,

    /// Keep schema column names longer than 10 characters
    #[arg(long, global = true)]
    pub no_truncate: bool,

    /// Overrides RUST_LOG (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<log::LevelFilter>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn config(&self) -> ArchiveConfig {
        let mut config = ArchiveConfig::from_env();
        if let Some(data_dir) = &self.data_dir {
            config = config.with_data_dir(data_dir);
        }
        if let Some(schema) = &self.schema {
            config = config.with_schema_file(schema);
        }
        if let Some(database) = &self.database {
            config = config.with_database(database);
        }
        if self.hash {
            config = config.with_compute_hash(true);
        }
        if self.no_truncate {
            config = config.with_truncate_columns(false);
        }
        config
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Drop and recreate all tables
    Init,
    /// Index the files already in the data directory
    Rebuild {
        /// Only this patient's directory
        #[arg(long)]
        patient: Option<String>,
        /// Also rescan patients that are already indexed
        #[arg(long)]
        all: bool,
        /// Insert without checking for existing images
        #[arg(long)]
        no_check: bool,
    },
    /// Copy a file, or every file below a directory, into the archive
    Store {
        path: PathBuf,
        /// Delete the source after copying
        #[arg(long)]
        remove: bool,
    },
    /// Delete series and the studies and patients they leave empty
    Delete {
        #[command(flatten)]
        selection: SelectionArgs,
        /// Also delete the backing files
        #[arg(long)]
        files: bool,
    },
    /// Copy the files of the selected series to a directory
    Copy {
        #[command(flatten)]
        selection: SelectionArgs,
        #[arg(long)]
        dest: PathBuf,
        /// One subdirectory per patient
        #[arg(long)]
        by_patient: bool,
    },
    /// Series counts per patient and modality
    Summary {
        #[arg(long, default_value = "nrCT")]
        order_by: String,
    },
    /// Run SQL against the database and print the rows
    Query { sql: String },
    /// Apply a name filter to the given names
    Filter {
        names: Vec<String>,
        #[arg(long)]
        include: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
        #[arg(long)]
        case_sensitive: bool,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct SelectionArgs {
    #[arg(long, num_args = 1..)]
    pub series: Vec<String>,
    /// SQL returning a SeriesInst column
    #[arg(long)]
    pub query: Option<String>,
    #[arg(long)]
    pub patient: Option<String>,
}

impl SelectionArgs {
    pub fn selection(&self) -> Result<Selection> {
        match (&self.patient, &self.query, self.series.is_empty()) {
            (Some(patient), None, true) => Ok(Selection::Patient(patient.clone())),
            (None, Some(query), true) => Ok(Selection::Query(query.clone())),
            (None, None, false) => Ok(Selection::Series(self.series.clone())),
            (None, None, true) => Err(ArchiveError::ConflictingOptions(
                "select series with --series, --query or --patient",
            )),
            _ => Err(ArchiveError::ConflictingOptions(
                "--series, --query and --patient are mutually exclusive",
            )),
        }
    }
}
