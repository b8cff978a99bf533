use super::Store;
use crate::error::{ArchiveError, Result};
use crate::model::derived::timestamp_now;
use crate::model::extractor::{extract, hierarchy_key};
use crate::model::row::{OBJECT_FILE, REFERENCED_SERIES_UID, UNIQUE_FOR_UID};
use crate::model::{tags, DerivedAttributes, ExtractedRow, HierarchyKey, Level};
use crate::utils::format_tag;
use dicom::object::InMemDicomObject;

/// What happened to one level while syncing a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelAction {
    Inserted,
    /// Image row already present, only its timestamp was refreshed.
    Refreshed,
    Present,
    /// Not looked at because the previous record had the same identity.
    #[default]
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncOutcome {
    pub image: LevelAction,
    pub series: LevelAction,
    pub study: LevelAction,
    pub patient: LevelAction,
}

/// Identities known to be present from the previous record. A series entry
/// implies its study and patient are present as well.
#[derive(Debug, Default)]
struct LevelMemo {
    series: Option<String>,
    study: Option<String>,
    patient: Option<String>,
}

/// One ingestion pass over the store.
///
/// Consecutive records of the same series skip the ancestor lookups, so
/// feeding records grouped by series keeps the pass cheap. Ungrouped input is
/// still correct, only slower.
pub struct IngestSession<'a> {
    store: &'a Store,
    derived: DerivedAttributes,
    memo: LevelMemo,
    generation: u64,
}

impl<'a> IngestSession<'a> {
    pub fn new(store: &'a Store, derived: DerivedAttributes) -> Self {
        Self {
            store,
            derived,
            memo: LevelMemo::default(),
            generation: store.generation(),
        }
    }

    pub fn reset_memo(&mut self) {
        self.memo = LevelMemo::default();
    }

    /// Writes the record at every level that does not hold it yet.
    ///
    /// With `check_existing` an image already in the store only has its
    /// timestamp refreshed; without it the image row is always inserted.
    pub fn sync(
        &mut self,
        record: &InMemDicomObject,
        file_ref: &str,
        check_existing: bool,
    ) -> Result<SyncOutcome> {
        let result = self.sync_levels(record, file_ref, check_existing);
        if result.is_err() {
            self.reset_memo();
        }
        result
    }

    fn sync_levels(
        &mut self,
        record: &InMemDicomObject,
        file_ref: &str,
        check_existing: bool,
    ) -> Result<SyncOutcome> {
        let key = hierarchy_key(record);
        let image = required(&key, Level::Image)?;
        let series = required(&key, Level::Series)?;
        let study = required(&key, Level::Study)?;
        let patient = required(&key, Level::Patient)?;

        if self.generation != self.store.generation() {
            log::debug!("Rows were removed since the last record, forgetting known identities");
            self.reset_memo();
            self.generation = self.store.generation();
        }

        let mut outcome = SyncOutcome::default();
        let mut image_row = None;
        if check_existing && self.store.contains(Level::Image, image)? {
            self.store.touch_image(image, timestamp_now())?;
            outcome.image = LevelAction::Refreshed;
        } else {
            let row = self.image_row(record, file_ref)?;
            self.store.insert(Level::Image, &row)?;
            log::debug!("Inserted image {image}");
            outcome.image = LevelAction::Inserted;
            image_row = Some(row);
        }

        if self.memo.series.as_deref() == Some(series) {
            return Ok(outcome);
        }
        outcome.series = self.ensure(Level::Series, series, record, |row| {
            if let Some(image_row) = &image_row {
                propagate_image_columns(self.store, image_row, row);
            }
        })?;

        if self.memo.study.as_deref() != Some(study) {
            outcome.study = self.ensure(Level::Study, study, record, |_| {})?;
            if self.memo.patient.as_deref() != Some(patient) {
                outcome.patient = self.ensure(Level::Patient, patient, record, |_| {})?;
                self.memo.patient = Some(patient.to_string());
            }
            self.memo.study = Some(study.to_string());
        }
        self.memo.series = Some(series.to_string());
        Ok(outcome)
    }

    fn image_row(&self, record: &InMemDicomObject, file_ref: &str) -> Result<ExtractedRow> {
        let table = self.table(Level::Image)?;
        let mut row = extract(table, record);
        row.insert(OBJECT_FILE, file_ref);
        row.extend(self.derived.derive(record));
        Ok(row)
    }

    fn ensure(
        &self,
        level: Level,
        identity: &str,
        record: &InMemDicomObject,
        adjust: impl FnOnce(&mut ExtractedRow),
    ) -> Result<LevelAction> {
        if self.store.contains(level, identity)? {
            return Ok(LevelAction::Present);
        }
        let mut row = extract(self.table(level)?, record);
        adjust(&mut row);
        self.store.insert(level, &row)?;
        log::info!("Inserted {level} {identity}");
        Ok(LevelAction::Inserted)
    }

    fn table(&self, level: Level) -> Result<&'a crate::model::TableDefinition> {
        self.store
            .schema()
            .table(level)
            .ok_or_else(|| ArchiveError::MissingColumn {
                level,
                tag: identity_tag_text(level),
            })
    }
}

/// Copies RT-derived values onto the series row, into whatever columns hold
/// the frame of reference and the referenced instance.
fn propagate_image_columns(store: &Store, image_row: &ExtractedRow, series_row: &mut ExtractedRow) {
    let targets = [
        (UNIQUE_FOR_UID, tags::FRAME_OF_REFERENCE_UID),
        (REFERENCED_SERIES_UID, tags::REFERENCED_SOP_INSTANCE_UID),
    ];
    let Some(series_table) = store.schema().table(Level::Series) else {
        return;
    };
    for (source, tag) in targets {
        let Some(value) = image_row.get(source) else {
            continue;
        };
        match series_table.column_for(tag) {
            Some(column) => series_row.insert(column.replace('"', ""), value.clone()),
            None => log::debug!("Series table has no column for {}", format_tag(tag)),
        }
    }
}

fn required(key: &HierarchyKey, level: Level) -> Result<&str> {
    key.get(level).ok_or_else(|| ArchiveError::MissingIdentity {
        level,
        tag: identity_tag_text(level),
    })
}

fn identity_tag_text(level: Level) -> String {
    level
        .identity_tag()
        .map(format_tag)
        .unwrap_or_else(|| "none".to_string())
}
