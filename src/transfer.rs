//! Seams to the network transport: sending stored files to a peer, and
//! indexing records a peer sends us. The transport itself lives outside this
//! crate.

use crate::archive::Archive;
use crate::config::ArchiveConfig;
use crate::error::{ArchiveError, Result};
use crate::model::extractor::hierarchy_key;
use crate::model::Level;
use crate::store::SyncOutcome;
use crate::utils::format_tag;
use dicom::object::InMemDicomObject;
use std::fmt;
use std::path::{Path, PathBuf};

pub const STATUS_SUCCESS: u16 = 0x0000;
pub const STATUS_PROCESSING_FAILURE: u16 = 0xC000;

pub const DEFAULT_PORT: u16 = 5678;
pub const DEFAULT_CALLED_AE_TITLE: &str = "pyconquest";
pub const DEFAULT_CALLING_AE_TITLE: &str = "PYNETDICOM";

/// Remote application entity to send to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
    pub called_ae_title: String,
    pub calling_ae_title: String,
}

impl Default for PeerAddress {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            called_ae_title: DEFAULT_CALLED_AE_TITLE.to_string(),
            calling_ae_title: DEFAULT_CALLING_AE_TITLE.to_string(),
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.called_ae_title, self.host, self.port)
    }
}

/// Transport that delivers files to a peer, reporting one status per file in
/// the order given.
pub trait RecordSender {
    fn send(&mut self, peer: &PeerAddress, files: &[PathBuf]) -> Vec<std::result::Result<(), String>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    pub sent: usize,
    pub failed: usize,
}

/// Files and indexes records received from a peer. Each record gets its own
/// short-lived connection to the database.
#[derive(Debug, Clone)]
pub struct ReceivedRecordHandler {
    config: ArchiveConfig,
}

impl ReceivedRecordHandler {
    pub fn new(config: ArchiveConfig) -> Self {
        Self { config }
    }

    /// Where the transport should write a received record:
    /// `<data>/<PatientID>/<SOPInstanceUID>.dcm`. Creates the patient directory.
    pub fn received_path(&self, record: &InMemDicomObject) -> Result<PathBuf> {
        let patient = required_text(record, Level::Patient)?;
        let instance = required_text(record, Level::Image)?;
        let directory = self.config.data_dir.join(&patient);
        if !directory.exists() {
            std::fs::create_dir_all(&directory)?;
            log::info!("Directory {} created", directory.display());
        }
        Ok(directory.join(format!("{instance}.dcm")))
    }

    /// Indexes a record the transport has written to `path` and returns the
    /// status to acknowledge the peer with.
    pub fn on_record_received(&self, record: &InMemDicomObject, path: &Path) -> u16 {
        match self.index(record, path) {
            Ok(outcome) => {
                log::info!("Received {}: {outcome:?}", path.display());
                STATUS_SUCCESS
            }
            Err(err) => {
                log::error!("Could not index received {}: {err}", path.display());
                STATUS_PROCESSING_FAILURE
            }
        }
    }

    fn index(&self, record: &InMemDicomObject, path: &Path) -> Result<SyncOutcome> {
        let patient = required_text(record, Level::Patient)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let archive = Archive::open(self.config.clone())?;
        let outcome = archive.write_record(record, &format!("{patient}/{file_name}"), true)?;
        archive.close()?;
        Ok(outcome)
    }
}

fn required_text(record: &InMemDicomObject, level: Level) -> Result<String> {
    hierarchy_key(record)
        .get(level)
        .map(str::to_string)
        .ok_or_else(|| ArchiveError::MissingIdentity {
            level,
            tag: level.identity_tag().map(format_tag).unwrap_or_default(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tags;
    use dicom::core::{DataElement, PrimitiveValue, VR};

    #[test]
    fn received_path_uses_patient_and_instance() {
        let dir = tempfile::tempdir().unwrap();
        let handler = ReceivedRecordHandler::new(ArchiveConfig::default().with_data_dir(dir.path()));
        let record = InMemDicomObject::from_element_iter([
            DataElement::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::from("MRN7")),
            DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from("1.2.3")),
        ]);

        let path = handler.received_path(&record).unwrap();
        assert_eq!(path, dir.path().join("MRN7").join("1.2.3.dcm"));
        assert!(dir.path().join("MRN7").is_dir());
    }

    #[test]
    fn peer_defaults() {
        let peer = PeerAddress::default();
        assert_eq!(peer.to_string(), "pyconquest@127.0.0.1:5678");
        assert_eq!(peer.calling_ae_title, "PYNETDICOM");
    }
}
