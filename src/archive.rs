use crate::config::ArchiveConfig;
use crate::error::{ArchiveError, Result};
use crate::filter::{FilterFlags, NameFilter};
use crate::model::extractor::attribute_text;
use crate::model::loader::{archive_location, collect_files, load_record, object_file_ref};
use crate::model::{tags, AttributeMapping, DerivedAttributes, Level, SchemaRegistry};
use crate::store::{
    quote, DeleteReport, IngestSession, PatientSummary, QueryRow, Selection, Store, SyncOutcome,
};
use crate::transfer::{PeerAddress, RecordSender, SendReport};
use dicom::object::InMemDicomObject;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// A data directory of record files plus the database indexing them.
pub struct Archive {
    config: ArchiveConfig,
    store: Store,
    filter: NameFilter,
    opened_at: Instant,
}

impl Archive {
    /// Loads the schema file (or the built-in layout when there is none) and
    /// opens the database.
    pub fn open(config: ArchiveConfig) -> Result<Self> {
        let schema = SchemaRegistry::load(&config.schema_file, config.truncate_columns)?;
        Self::open_with_schema(config, schema)
    }

    pub fn open_with_schema(config: ArchiveConfig, schema: SchemaRegistry) -> Result<Self> {
        let store = Store::open(&config.database, schema, config.column_types())?;
        Ok(Self {
            config,
            store,
            filter: NameFilter::default(),
            opened_at: Instant::now(),
        })
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Drops and recreates all tables, views and indexes.
    pub fn recreate_tables(&self) -> Result<()> {
        self.store.create_standard_tables()
    }

    /// Starts an ingestion pass. Its memo of recently seen identities lives
    /// as long as the session.
    pub fn session(&self) -> IngestSession<'_> {
        IngestSession::new(&self.store, DerivedAttributes::new(self.config.compute_hash))
    }

    pub fn write_record(
        &self,
        record: &InMemDicomObject,
        file_ref: &str,
        check_existing: bool,
    ) -> Result<SyncOutcome> {
        self.session().sync(record, file_ref, check_existing)
    }

    /// Copies a record file to `<data>/<PatientID>/` and indexes it.
    pub fn store_file(&self, path: &Path, remove_after_store: bool) -> Result<SyncOutcome> {
        self.store_file_with(&mut self.session(), path, remove_after_store)
    }

    fn store_file_with(
        &self,
        session: &mut IngestSession<'_>,
        path: &Path,
        remove_after_store: bool,
    ) -> Result<SyncOutcome> {
        let record = load_record(path)?;
        let patient = attribute_text(&record, tags::PATIENT_ID).ok_or_else(|| {
            ArchiveError::MissingIdentity {
                level: Level::Patient,
                tag: crate::utils::format_tag(tags::PATIENT_ID),
            }
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (target, file_ref) = archive_location(&self.config.data_dir, &patient, &file_name);

        if let Some(directory) = target.parent() {
            if !directory.exists() {
                std::fs::create_dir_all(directory)?;
                log::info!("Directory {} created", directory.display());
            }
        }
        if same_file(path, &target) {
            log::debug!("{} already in place", path.display());
        } else {
            std::fs::copy(path, &target)?;
            log::info!("Stored file {} at {}", path.display(), target.display());
            if remove_after_store {
                std::fs::remove_file(path)?;
                log::info!("Removed file {}", path.display());
            }
        }
        session.sync(&record, &file_ref, true)
    }

    /// Stores every file below `directory`. Files that fail are logged and
    /// skipped; returns how many were stored.
    pub fn store_directory(&self, directory: &Path, remove_after_store: bool) -> Result<usize> {
        if !directory.exists() {
            log::error!("Directory {} does not exist", directory.display());
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", directory.display()),
            )
            .into());
        }
        let mut session = self.session();
        let mut stored = 0;
        for path in collect_files(directory)? {
            log::info!("Processing {}", path.display());
            match self.store_file_with(&mut session, &path, remove_after_store) {
                Ok(_) => stored += 1,
                Err(err) => log::error!("Could not store {}: {err}", path.display()),
            }
        }
        log::info!("Processed {stored} files");
        Ok(stored)
    }

    /// Indexes the files already in the data directory, or in one patient's
    /// subdirectory. With `only_missing`, patient directories whose patient is
    /// already indexed are skipped. Returns the number of files scanned.
    pub fn rebuild_from_files(
        &self,
        patient: Option<&str>,
        only_missing: bool,
        check_existing: bool,
    ) -> Result<usize> {
        let data_dir = &self.config.data_dir;
        let directory = match patient {
            Some(patient) => data_dir.join(patient),
            None => data_dir.clone(),
        };
        if !directory.exists() {
            log::warn!("Directory {} does not exist, nothing to scan", directory.display());
            return Ok(0);
        }
        let patient_column = self.store.identity_column(Level::Patient)?;
        let present: HashSet<String> = self
            .store
            .query_column(
                &format!(
                    "SELECT {} FROM {}",
                    quote(&patient_column),
                    quote(Level::Patient.table_name())
                ),
                &patient_column,
            )
            .unwrap_or_default()
            .into_iter()
            .collect();

        let mut session = self.session();
        let mut skipped = HashSet::new();
        let mut counter = 0;
        for path in collect_files(&directory)? {
            let file_ref = object_file_ref(data_dir, &path);
            let patient_dir = patient_directory(&file_ref);
            if only_missing && present.contains(patient_dir) {
                if skipped.insert(patient_dir.to_string()) {
                    log::info!("Skipping directory, PatientID already in database: {patient_dir}");
                }
                continue;
            }
            log::info!("Processing {}", path.display());
            counter += 1;
            let result = load_record(&path)
                .and_then(|record| session.sync(&record, &file_ref, check_existing));
            if let Err(err) = result {
                log::error!("{}: {err}", path.display());
            }
        }
        Ok(counter)
    }

    /// Adds a column to a level. An existing table gets the column at once.
    pub fn add_column(&mut self, level: Level, mapping: AttributeMapping) -> Result<()> {
        self.store.add_column(level, mapping)
    }

    pub fn delete(&self, selection: &Selection, remove_files: bool) -> Result<DeleteReport> {
        self.store.delete(selection, &self.config.data_dir, remove_files)
    }

    /// Copies the selected files to `destination`, optionally into one
    /// subdirectory per patient. Returns the number of files copied.
    pub fn copy_files(
        &self,
        selection: &Selection,
        destination: &Path,
        create_dir: bool,
        by_patient: bool,
    ) -> Result<usize> {
        let files = self.store.files_of(selection)?;
        if !files.is_empty() && create_dir && !destination.exists() {
            std::fs::create_dir_all(destination)?;
            log::info!("Directory {} created", destination.display());
        }

        for file in &files {
            let source = self.config.data_dir.join(&file.object_file);
            let mut target = destination.to_path_buf();
            if by_patient {
                target.push(&file.patient_id);
                std::fs::create_dir_all(&target)?;
            }
            if let Some(name) = source.file_name() {
                target.push(name);
            }
            log::info!("Copying {} to {}", source.display(), target.display());
            std::fs::copy(&source, &target)?;
        }
        Ok(files.len())
    }

    /// Hands the selected files to `sender`. Failures are logged, not retried;
    /// a file the transport reports nothing for counts as failed.
    pub fn send(
        &self,
        selection: &Selection,
        peer: &PeerAddress,
        sender: &mut dyn RecordSender,
    ) -> Result<SendReport> {
        let files: Vec<PathBuf> = self
            .store
            .files_of(selection)?
            .into_iter()
            .map(|file| self.config.data_dir.join(file.object_file))
            .collect();
        log::info!("Sending {} files to {peer}", files.len());

        let statuses = sender.send(peer, &files);
        if statuses.len() != files.len() {
            log::warn!(
                "Transport reported {} statuses for {} files",
                statuses.len(),
                files.len()
            );
        }
        let mut statuses = statuses.into_iter();
        let mut report = SendReport::default();
        for path in &files {
            match statuses.next() {
                Some(Ok(())) => report.sent += 1,
                Some(Err(err)) => {
                    log::error!("Sending {} failed: {err}", path.display());
                    report.failed += 1;
                }
                None => {
                    log::error!("No status reported for {}, counted as failed", path.display());
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    pub fn series_summary(&self, order_by: &str) -> Result<Vec<PatientSummary>> {
        self.store.series_summary(order_by)
    }

    pub fn execute_query(&self, sql: &str) -> Option<Vec<QueryRow>> {
        self.store.execute_query(sql)
    }

    pub fn set_name_filter<E, I>(&mut self, exclude: &[E], include: &[I], flags: FilterFlags) -> Result<()>
    where
        E: AsRef<str>,
        I: AsRef<str>,
    {
        self.filter.configure(exclude, include, flags)?;
        log::info!(
            "Name filter set: {} exclude, {} include patterns",
            exclude.len(),
            include.len()
        );
        Ok(())
    }

    pub fn filter_names<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        self.filter.filter(names)
    }

    pub fn close(self) -> Result<()> {
        let elapsed = self.opened_at.elapsed();
        self.store.close()?;
        log::info!(
            "Closed connection to {} after {:.1?}",
            self.config.database.display(),
            elapsed
        );
        Ok(())
    }
}

fn patient_directory(file_ref: &str) -> &str {
    file_ref.split('/').next().unwrap_or_default()
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
