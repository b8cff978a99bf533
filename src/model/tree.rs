use crate::model::tags;
use dicom::core::Tag;
use std::fmt;
use std::str::FromStr;

/// One tier of the archive hierarchy, plus the worklist table which shares the
/// schema format but takes no part in the containment chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Patient,
    Study,
    Series,
    Image,
    WorkList,
}

impl Level {
    pub const ALL: [Level; 5] = [
        Level::Patient,
        Level::Study,
        Level::Series,
        Level::Image,
        Level::WorkList,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Level::Patient => "Patient",
            Level::Study => "Study",
            Level::Series => "Series",
            Level::Image => "Image",
            Level::WorkList => "WorkList",
        }
    }

    pub fn table_name(self) -> &'static str {
        match self {
            Level::Patient => "DICOMpatients",
            Level::Study => "DICOMstudies",
            Level::Series => "DICOMseries",
            Level::Image => "DICOMimages",
            Level::WorkList => "DICOMworklist",
        }
    }

    /// Tag whose value uniquely identifies a row at this level.
    pub fn identity_tag(self) -> Option<Tag> {
        match self {
            Level::Patient => Some(tags::PATIENT_ID),
            Level::Study => Some(tags::STUDY_INSTANCE_UID),
            Level::Series => Some(tags::SERIES_INSTANCE_UID),
            Level::Image => Some(tags::SOP_INSTANCE_UID),
            Level::WorkList => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|level| level.name() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Identity values of one record along the containment chain, read up front so
/// that a missing ancestor is detected before the level that needs it is touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyKey {
    pub patient: Option<String>,
    pub study: Option<String>,
    pub series: Option<String>,
    pub image: Option<String>,
}

impl HierarchyKey {
    pub fn get(&self, level: Level) -> Option<&str> {
        match level {
            Level::Patient => self.patient.as_deref(),
            Level::Study => self.study.as_deref(),
            Level::Series => self.series.as_deref(),
            Level::Image => self.image.as_deref(),
            Level::WorkList => None,
        }
    }
}
