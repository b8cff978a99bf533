use crate::error::Result;
use dicom::object::{open_file, DefaultDicomObject};
use std::fs;
use std::path::{Path, PathBuf};

pub fn load_record(path: &Path) -> Result<DefaultDicomObject> {
    log::debug!("Loading DICOM file: {}", path.display());
    open_file(path).map_err(|err| {
        log::error!("{}: failed to open DICOM file ({err})", path.display());
        err.into()
    })
}

/// Every regular file below `root`, depth first, directories in name order.
pub fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk(root, &mut files)?;
    Ok(files)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    let (dirs, plain): (Vec<_>, Vec<_>) = entries.into_iter().partition(|path| path.is_dir());
    files.extend(plain);
    for sub in dirs {
        walk(&sub, files)?;
    }
    Ok(())
}

/// Reference stored in `ObjectFile`: the path relative to the data directory,
/// always with forward slashes.
pub fn object_file_ref(data_dir: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(data_dir).unwrap_or(path);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Location of a stored record: `<data>/<patient>/<file name>`.
pub fn archive_location(data_dir: &Path, patient_id: &str, file_name: &str) -> (PathBuf, String) {
    (
        data_dir.join(patient_id).join(file_name),
        format!("{patient_id}/{file_name}"),
    )
}
