use super::{quote, Selection, Store};
use crate::error::{ArchiveError, Result};
use crate::model::row::OBJECT_FILE;
use crate::model::{tags, Level};
use std::collections::BTreeSet;
use std::path::Path;

/// Rows and files removed by a delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub images: usize,
    pub series: usize,
    pub studies: usize,
    pub patients: usize,
    pub files: usize,
}

impl DeleteReport {
    fn merge(&mut self, other: DeleteReport) {
        self.images += other.images;
        self.series += other.series;
        self.studies += other.studies;
        self.patients += other.patients;
        self.files += other.files;
    }
}

impl Store {
    /// Deletes the selected series, cascading to studies and patients left
    /// without children. A patient selection takes the fast path, which
    /// cannot remove files.
    pub fn delete(&self, selection: &Selection, data_dir: &Path, remove_files: bool) -> Result<DeleteReport> {
        if let Selection::Patient(patient) = selection {
            return self.delete_patient(patient, remove_files);
        }
        let mut report = DeleteReport::default();
        for series in self.series_of(selection)? {
            report.merge(self.delete_series(&series, data_dir, remove_files)?);
        }
        Ok(report)
    }

    pub fn delete_series(&self, series: &str, data_dir: &Path, remove_files: bool) -> Result<DeleteReport> {
        let image_id = self.identity_column(Level::Image)?;
        let image_series = self.column(Level::Image, tags::SERIES_INSTANCE_UID)?;
        let image_patient = self.column(Level::Image, tags::PATIENT_ID)?;
        let series_id = self.identity_column(Level::Series)?;
        let series_study = self.column(Level::Series, tags::STUDY_INSTANCE_UID)?;

        let sql = format!(
            "SELECT i.{image_id}, i.{file}, i.{image_patient}, s.{series_study} \
             FROM {images} i INNER JOIN {series_table} s ON s.{series_id} = i.{image_series} \
             WHERE i.{image_series} = ?1",
            image_id = quote(&image_id),
            file = quote(OBJECT_FILE),
            image_patient = quote(&image_patient),
            series_study = quote(&series_study),
            images = quote(Level::Image.table_name()),
            series_table = quote(Level::Series.table_name()),
            series_id = quote(&series_id),
            image_series = quote(&image_series),
        );
        let rows = self.query(&sql, [series])?;
        let mut report = DeleteReport::default();
        if rows.is_empty() {
            log::info!("No images found for series {series}, nothing deleted");
            return Ok(report);
        }
        self.bump_generation();

        let delete_image = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote(Level::Image.table_name()),
            quote(&image_id)
        );
        let mut parents = BTreeSet::new();
        for row in &rows {
            if let Some(object_file) = row.get(OBJECT_FILE) {
                let path = data_dir.join(object_file);
                if !path.exists() {
                    log::error!("File {} not found", path.display());
                } else if remove_files {
                    match std::fs::remove_file(&path) {
                        Ok(()) => report.files += 1,
                        Err(err) => log::error!("Could not remove {}: {err}", path.display()),
                    }
                }
            }
            if let Some(image) = row.get(&image_id) {
                report.images += self.connection().execute(&delete_image, [image])?;
            }
            parents.insert((
                row.get(&series_study).unwrap_or_default().to_string(),
                row.get(&image_patient).unwrap_or_default().to_string(),
            ));
        }

        report.series += self.connection().execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1",
                quote(Level::Series.table_name()),
                quote(&series_id)
            ),
            [series],
        )?;
        log::info!("Deleted series {series} with {} images", report.images);

        for (study, patient) in parents {
            report.merge(self.prune_study(&study, &patient)?);
        }
        Ok(report)
    }

    /// Removes the study if no series refer to it, then the patient if no
    /// studies refer to it.
    fn prune_study(&self, study: &str, patient: &str) -> Result<DeleteReport> {
        let mut report = DeleteReport::default();
        let series_study = self.column(Level::Series, tags::STUDY_INSTANCE_UID)?;
        let remaining = self.count(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {} = ?1",
                quote(Level::Series.table_name()),
                quote(&series_study)
            ),
            study,
        )?;
        if remaining > 0 {
            return Ok(report);
        }
        report.studies += self.connection().execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1",
                quote(Level::Study.table_name()),
                quote(&self.identity_column(Level::Study)?)
            ),
            [study],
        )?;
        log::info!("Deleted study {study}, no series left");

        let study_patient = self.column(Level::Study, tags::PATIENT_ID)?;
        let remaining = self.count(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {} = ?1",
                quote(Level::Study.table_name()),
                quote(&study_patient)
            ),
            patient,
        )?;
        if remaining == 0 {
            report.patients += self.connection().execute(
                &format!(
                    "DELETE FROM {} WHERE {} = ?1",
                    quote(Level::Patient.table_name()),
                    quote(&self.identity_column(Level::Patient)?)
                ),
                [patient],
            )?;
            log::info!("Deleted patient {patient}, no studies left");
        }
        Ok(report)
    }

    /// Deletes every row of a patient with one statement per level.
    pub fn delete_patient(&self, patient: &str, remove_files: bool) -> Result<DeleteReport> {
        if remove_files {
            return Err(ArchiveError::ConflictingOptions(
                "removing files is not supported when deleting a whole patient",
            ));
        }
        self.bump_generation();
        let targets = [
            (Level::Image, self.column(Level::Image, tags::PATIENT_ID)?),
            (Level::Series, self.column(Level::Series, tags::PATIENT_ID)?),
            (Level::Study, self.column(Level::Study, tags::PATIENT_ID)?),
            (Level::Patient, self.identity_column(Level::Patient)?),
        ];
        let mut report = DeleteReport::default();
        for (level, column) in targets {
            let deleted = self.connection().execute(
                &format!(
                    "DELETE FROM {} WHERE {} = ?1",
                    quote(level.table_name()),
                    quote(&column)
                ),
                [patient],
            )?;
            match level {
                Level::Image => report.images = deleted,
                Level::Series => report.series = deleted,
                Level::Study => report.studies = deleted,
                _ => report.patients = deleted,
            }
        }
        log::info!("Deleted patient {patient}: {report:?}");
        Ok(report)
    }
}
