use super::{quote, Store};
use crate::error::{ArchiveError, Result};
use crate::model::{tags, Level};

pub const SUMMARY_MODALITIES: [&str; 6] = ["CT", "MR", "PT", "RTSTRUCT", "RTDOSE", "RTPLAN"];

/// Series counts per modality for one patient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientSummary {
    pub patient_id: String,
    pub counts: Vec<(&'static str, i64)>,
}

impl PatientSummary {
    pub fn count(&self, modality: &str) -> i64 {
        self.counts
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(modality))
            .map_or(0, |(_, count)| *count)
    }
}

/// Column alias of a modality count, e.g. `nrCT`.
pub fn count_column(modality: &str) -> String {
    format!("nr{modality}")
}

impl Store {
    /// Counts each patient's series per modality. `order_by` must name the
    /// patient column or one of the count columns.
    pub fn series_summary(&self, order_by: &str) -> Result<Vec<PatientSummary>> {
        let patient_id = self.identity_column(Level::Patient)?;
        let series_patient = self.column(Level::Series, tags::PATIENT_ID)?;
        let modality = self.column(Level::Series, tags::MODALITY)?;

        let ordering = std::iter::once(patient_id.clone())
            .chain(SUMMARY_MODALITIES.iter().map(|name| count_column(name)))
            .find(|column| column.eq_ignore_ascii_case(order_by))
            .ok_or_else(|| ArchiveError::InvalidOrdering(order_by.to_string()))?;

        let counts = SUMMARY_MODALITIES
            .iter()
            .map(|name| {
                format!(
                    "(SELECT COUNT(*) FROM {series} s WHERE s.{series_patient} = p.{patient_id} \
                     AND s.{modality} = '{name}') AS {alias}",
                    series = quote(Level::Series.table_name()),
                    series_patient = quote(&series_patient),
                    patient_id = quote(&patient_id),
                    modality = quote(&modality),
                    alias = quote(&count_column(name)),
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT p.{patient} AS {patient}, {counts} FROM {patients} p ORDER BY {ordering}",
            patient = quote(&patient_id),
            patients = quote(Level::Patient.table_name()),
            ordering = quote(&ordering),
        );

        let rows = self.query(&sql, [])?;
        Ok(rows
            .iter()
            .map(|row| PatientSummary {
                patient_id: row.get(&patient_id).unwrap_or_default().to_string(),
                counts: SUMMARY_MODALITIES
                    .iter()
                    .map(|&name| {
                        let count = row
                            .get(&count_column(name))
                            .and_then(|value| value.parse().ok())
                            .unwrap_or(0);
                        (name, count)
                    })
                    .collect(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnValue, ExtractedRow, SchemaRegistry};

    fn insert(store: &Store, level: Level, pairs: &[(&str, &str)]) {
        let row: ExtractedRow = pairs
            .iter()
            .map(|&(column, value)| (column, ColumnValue::from(value)))
            .collect();
        store.insert(level, &row).unwrap();
    }

    #[test]
    fn counts_series_per_modality() {
        let store = Store::open_in_memory(SchemaRegistry::default_schema()).unwrap();
        insert(&store, Level::Patient, &[("PatientID", "B")]);
        insert(&store, Level::Patient, &[("PatientID", "A")]);
        for (uid, patient, modality) in [
            ("1", "A", "CT"),
            ("2", "A", "RTSTRUCT"),
            ("3", "A", "CT"),
            ("4", "B", "MR"),
        ] {
            insert(
                &store,
                Level::Series,
                &[("SeriesInst", uid), ("SeriesPat", patient), ("Modality", modality)],
            );
        }

        let by_patient = store.series_summary("PatientID").unwrap();
        assert_eq!(by_patient[0].patient_id, "A");
        assert_eq!(by_patient[0].count("CT"), 2);
        assert_eq!(by_patient[0].count("RTSTRUCT"), 1);
        assert_eq!(by_patient[1].count("MR"), 1);
        assert_eq!(by_patient[1].count("CT"), 0);

        let by_mr = store.series_summary("nrMR").unwrap();
        assert_eq!(by_mr[0].patient_id, "A");
    }

    #[test]
    fn unknown_ordering_is_rejected() {
        let store = Store::open_in_memory(SchemaRegistry::default_schema()).unwrap();
        let err = store.series_summary("PatientID; DROP TABLE x").unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidOrdering(_)));
    }
}
