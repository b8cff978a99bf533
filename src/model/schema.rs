//! Declarative table layout: which attribute tag lands in which column, per level.
//!
//! The source format is the line oriented `dicom.sql` layout used by deployed
//! archives:
//!
//! ```text
//! # comment
//! *Series
//! {
//!     { 0x0020, 0x000e, "SeriesInstanceUID", 64, SQL_C_CHAR, DT_UI },
//!     { 0x0008, 0x0060, "Modality", 16, SQL_C_CHAR, DT_STR }
//! }
//! ```
//!
//! Only the first three fields of an attribute line are used.

use crate::error::{ArchiveError, Result};
use crate::model::Level;
use dicom::core::Tag;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Column width of legacy stores.
pub const LEGACY_COLUMN_WIDTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMapping {
    pub tag: Tag,
    pub column: String,
}

impl AttributeMapping {
    pub fn new(group: u16, element: u16, column: impl Into<String>) -> Self {
        Self {
            tag: Tag(group, element),
            column: column.into(),
        }
    }
}

/// Name under which a column is created in SQL. Legacy layouts contain
/// placeholder columns made of dashes.
pub fn sql_column_name(column: &str) -> String {
    column.replace('"', "").replace('-', "_")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    level: Level,
    mappings: Vec<AttributeMapping>,
}

impl TableDefinition {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            mappings: Vec::new(),
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn table_name(&self) -> &'static str {
        self.level.table_name()
    }

    pub fn mappings(&self) -> &[AttributeMapping] {
        &self.mappings
    }

    /// Appends a mapping, refusing a column whose SQL name is already taken.
    pub fn push(&mut self, mapping: AttributeMapping) -> Result<()> {
        let wanted = sql_column_name(&mapping.column);
        if self
            .mappings
            .iter()
            .any(|existing| sql_column_name(&existing.column).eq_ignore_ascii_case(&wanted))
        {
            return Err(ArchiveError::DuplicateColumn {
                level: self.level,
                column: mapping.column,
            });
        }
        self.mappings.push(mapping);
        Ok(())
    }

    /// Column the first mapping of `tag` writes to.
    pub fn column_for(&self, tag: Tag) -> Option<&str> {
        self.mappings
            .iter()
            .find(|mapping| mapping.tag == tag)
            .map(|mapping| mapping.column.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRegistry {
    tables: BTreeMap<Level, TableDefinition>,
}

impl SchemaRegistry {
    /// Loads the layout from `path`, falling back to the built-in layout only
    /// when the file does not exist. A malformed file is an error.
    pub fn load(path: &Path, truncate_columns: bool) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "Schema file {} not found, using default database layout",
                path.display()
            );
            return Ok(Self::default_schema());
        }
        let source = fs::read_to_string(path)?;
        log::info!("Reading database layout from {}", path.display());
        Self::parse(&source, truncate_columns)
    }

    pub fn parse(source: &str, truncate_columns: bool) -> Result<Self> {
        let mut tables = BTreeMap::new();
        let mut current: Option<(usize, TableDefinition)> = None;

        for (index, raw) in source.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim_end();

            if line.starts_with('#') || line.starts_with("/*") || line.starts_with("*/") {
                continue;
            }

            if let Some(name) = line.strip_prefix('*') {
                if let Some((opened_at, open)) = &current {
                    return Err(parse_error(
                        line_no,
                        format!(
                            "table {} opened at line {opened_at} is not closed",
                            open.level()
                        ),
                    ));
                }
                let name = name.replace('*', "");
                let level = name
                    .trim()
                    .parse::<Level>()
                    .map_err(|name| parse_error(line_no, format!("unknown level `{name}`")))?;
                current = Some((line_no, TableDefinition::new(level)));
                continue;
            }

            if line.starts_with('}') {
                let (_, table) = current.take().ok_or_else(|| {
                    parse_error(line_no, "table end without table start".to_string())
                })?;
                log::info!(
                    "Read table {} ({} columns)",
                    table.table_name(),
                    table.mappings().len()
                );
                if tables.insert(table.level(), table).is_some() {
                    log::warn!("Table defined twice, keeping the definition ending at line {line_no}");
                }
                continue;
            }

            let normalized = line.split_whitespace().collect::<Vec<_>>().join(" ");
            if !normalized.starts_with('{') || !normalized.contains(',') {
                continue;
            }
            let Some((_, table)) = current.as_mut() else {
                return Err(parse_error(
                    line_no,
                    "attribute line outside of a table".to_string(),
                ));
            };
            let mapping = parse_mapping(&normalized, truncate_columns)
                .map_err(|message| parse_error(line_no, message))?;
            table.push(mapping)?;
        }

        if let Some((opened_at, open)) = current {
            return Err(parse_error(
                opened_at,
                format!("table {} is never closed", open.level()),
            ));
        }

        Ok(Self { tables })
    }

    pub fn table(&self, level: Level) -> Option<&TableDefinition> {
        self.tables.get(&level)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDefinition> {
        self.tables.values()
    }

    /// Adds a column to a level's layout.
    pub fn add_column(&mut self, level: Level, mapping: AttributeMapping) -> Result<()> {
        log::info!(
            "Adding column {} ({}) to {}",
            mapping.column,
            crate::utils::format_tag(mapping.tag),
            level.table_name()
        );
        self.tables
            .entry(level)
            .or_insert_with(|| TableDefinition::new(level))
            .push(mapping)
    }

    /// SQL column of `level` that holds attribute `tag`.
    pub fn column_for(&self, level: Level, tag: Tag) -> Result<String> {
        self.table(level)
            .and_then(|table| table.column_for(tag))
            .map(sql_column_name)
            .ok_or_else(|| ArchiveError::MissingColumn {
                level,
                tag: crate::utils::format_tag(tag),
            })
    }

    /// Built-in layout matching the databases deployed without a schema file.
    pub fn default_schema() -> Self {
        let tables = DEFAULT_LAYOUT
            .iter()
            .map(|(level, columns)| {
                let mappings = columns
                    .iter()
                    .map(|&(group, element, column)| AttributeMapping::new(group, element, column))
                    .collect();
                (
                    *level,
                    TableDefinition {
                        level: *level,
                        mappings,
                    },
                )
            })
            .collect();
        Self { tables }
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::default_schema()
    }
}

fn parse_error(line: usize, message: String) -> ArchiveError {
    ArchiveError::Parse { line, message }
}

fn parse_mapping(normalized: &str, truncate_columns: bool) -> std::result::Result<AttributeMapping, String> {
    let stripped: String = normalized
        .chars()
        .filter(|c| !matches!(c, '{' | '}') && !c.is_whitespace())
        .collect();
    let fields: Vec<&str> = stripped.split(',').collect();
    let [group, element, column, ..] = fields.as_slice() else {
        return Err(format!("expected group, element and column in `{normalized}`"));
    };

    let group = parse_tag_part(group)?;
    let element = parse_tag_part(element)?;
    let mut column = column.replace('"', "");
    if truncate_columns {
        column = column.chars().take(LEGACY_COLUMN_WIDTH).collect();
    }
    if column.is_empty() {
        return Err(format!("empty column name in `{normalized}`"));
    }
    Ok(AttributeMapping {
        tag: Tag(group, element),
        column,
    })
}

fn parse_tag_part(text: &str) -> std::result::Result<u16, String> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u16::from_str_radix(digits, 16).map_err(|err| format!("bad tag number `{text}`: {err}"))
}

type LayoutTable = (Level, &'static [(u16, u16, &'static str)]);

const DEFAULT_LAYOUT: [LayoutTable; 5] = [
    (
        Level::Patient,
        &[
            (0x0010, 0x0020, "PatientID"),
            (0x0010, 0x0010, "PatientNam"),
            (0x0010, 0x0030, "PatientBir"),
            (0x0010, 0x0040, "PatientSex"),
        ],
    ),
    (
        Level::Study,
        &[
            (0x0020, 0x000d, "StudyInsta"),
            (0x0008, 0x0020, "StudyDate"),
            (0x0008, 0x0030, "StudyTime"),
            (0x0020, 0x0010, "StudyID"),
            (0x0008, 0x1030, "StudyDescr"),
            (0x0008, 0x0050, "AccessionN"),
            (0x0008, 0x0090, "ReferPhysi"),
            (0x0010, 0x1010, "PatientsAg"),
            (0x0010, 0x1030, "PatientsWe"),
            (0x0008, 0x0061, "StudyModal"),
            (0x0010, 0x0010, "PatientNam"),
            (0x0010, 0x0030, "PatientBir"),
            (0x0010, 0x0040, "PatientSex"),
            (0x0008, 0x1070, "OperatorsN"),
            (0x0010, 0x0020, "PatientID"),
        ],
    ),
    (
        Level::Series,
        &[
            (0x0020, 0x000e, "SeriesInst"),
            (0x0020, 0x0011, "SeriesNumb"),
            (0x0008, 0x0021, "SeriesDate"),
            (0x0008, 0x0031, "SeriesTime"),
            (0x0008, 0x103e, "SeriesDesc"),
            (0x0008, 0x0060, "Modality"),
            (0x0008, 0x1090, "ManModelNa"),
            (0x0008, 0x1155, "Referenced"),
            (0x0018, 0x5100, "PatientPos"),
            (0x0018, 0x0010, "ContrastBo"),
            (0x0008, 0x0070, "Manufactur"),
            (0x0018, 0x0015, "BodyPartEx"),
            (0x0018, 0x1030, "ProtocolNa"),
            (0x0008, 0x1010, "StationNam"),
            (0x0008, 0x0080, "Institutio"),
            (0x0020, 0x0052, "FrameOfRef"),
            (0x0028, 0x0008, "NumberOfFr"),
            (0x3004, 0x000A, "DoseSummat"),
            (0x3006, 0x0002, "StructureS"),
            (0x0010, 0x0020, "SeriesPat"),
            (0x0008, 0x1070, "OperatorsN"),
            (0x0020, 0x000d, "StudyInsta"),
        ],
    ),
    (
        Level::Image,
        &[
            (0x0008, 0x0018, "SOPInstanc"),
            (0x0008, 0x0016, "SOPClassUI"),
            (0x0020, 0x0013, "ImageNumbe"),
            (0x0008, 0x0023, "ImageDate"),
            (0x0008, 0x0033, "ImageTime"),
            (0x0008, 0x1155, "Referenced"),
            (0x0018, 0x0086, "EchoNumber"),
            (0x0028, 0x0008, "NumberOfFr"),
            (0x0008, 0x0022, "AcqDate"),
            (0x0008, 0x0032, "AcqTime"),
            (0x0018, 0x1250, "ReceivingC"),
            (0x0020, 0x0012, "AcqNumber"),
            (0x0020, 0x1041, "SliceLocat"),
            (0x0028, 0x0002, "SamplesPer"),
            (0x0028, 0x0004, "PhotoMetri"),
            (0x0028, 0x0010, "Rows"),
            (0x0028, 0x0011, "Colums"),
            (0x0028, 0x0030, "PixelSpaci"),
            (0x0028, 0x0101, "BitsStored"),
            (0x0028, 0x1052, "RescaleInt"),
            (0x0028, 0x1053, "RescaleSlo"),
            (0x0008, 0x0008, "ImageType"),
            (0x0054, 0x0400, "ImageID"),
            (0x0010, 0x0020, "ImagePat"),
            (0x0018, 0x0060, "KVP"),
            (0x0018, 0x1150, "ExposureTi"),
            (0x0018, 0x1151, "TubeCurren"),
            (0x0018, 0x1152, "Exposure"),
            (0x0018, 0x9345, "CTDIvol"),
            (0x01F1, 0x1026, "Pitch"),
            (0x01F1, 0x1027, "RotationTi"),
            (0x01F1, 0x104A, "DoseRight"),
            (0x01F1, 0x104B, "Collimatio"),
            (0x0018, 0x0050, "SliceThick"),
            (0x0020, 0x0037, "ImageOrien"),
            (0x0008, 0x0060, "Modality"),
            (0x0008, 0x103e, "SeriesDesc"),
            (0x0020, 0x0032, "ImagePosit"),
            (0x0020, 0x000e, "SeriesInst"),
        ],
    ),
    (
        Level::WorkList,
        &[
            (0x0008, 0x0050, "AccessionN"),
            (0x0010, 0x0020, "PatientID"),
            (0x0010, 0x0010, "PatientNam"),
            (0x0010, 0x0030, "PatientBir"),
            (0x0010, 0x0040, "PatientSex"),
            (0x0010, 0x2000, "MedicalAle"),
            (0x0010, 0x2110, "ContrastAl"),
            (0x0020, 0x000d, "StudyInsta"),
            (0x0032, 0x1032, "ReqPhysici"),
            (0x0032, 0x1060, "ReqProcDes"),
            (0x0040, 0x0100, "--------"),
            (0x0008, 0x0060, "Modality"),
            (0x0032, 0x1070, "ReqContras"),
            (0x0040, 0x0001, "ScheduledA"),
            (0x0040, 0x0002, "StartDate"),
            (0x0040, 0x0003, "StartTime"),
            (0x0040, 0x0006, "PerfPhysic"),
            (0x0040, 0x0007, "SchedPSDes"),
            (0x0040, 0x0009, "SchedPSID"),
            (0x0040, 0x0010, "SchedStati"),
            (0x0040, 0x0011, "SchedPSLoc"),
            (0x0040, 0x0012, "PreMedicat"),
            (0x0040, 0x0400, "SchedPSCom"),
            (0x0040, 0x0100, "---------"),
            (0x0040, 0x1001, "ReqProcID"),
            (0x0040, 0x1003, "ReqProcPri"),
        ],
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tags;

    const LAYOUT: &str = "\
# DICOM database layout
/*
*/
*Patient
{
\t{ 0x0010, 0x0020, \"PatientID\", 64, SQL_C_CHAR, DT_STR },
\t{ 0x0010, 0x0010, \"PatientName\", 64, SQL_C_CHAR, DT_STR }
}

*Series
{
\t{ 0x0020,   0x000e, \"SeriesInstanceUID\", 64, SQL_C_CHAR, DT_UI },
\t{ 0x0008, 0x0060, \"Modality\", 16, SQL_C_CHAR, DT_STR }
}
";

    #[test]
    fn parses_levels_and_truncates_legacy_names() {
        let schema = SchemaRegistry::parse(LAYOUT, true).unwrap();

        let patient = schema.table(Level::Patient).unwrap();
        assert_eq!(
            patient.mappings(),
            &[
                AttributeMapping::new(0x0010, 0x0020, "PatientID"),
                AttributeMapping::new(0x0010, 0x0010, "PatientNam"),
            ]
        );
        assert_eq!(
            schema.column_for(Level::Series, tags::SERIES_INSTANCE_UID).unwrap(),
            "SeriesInst"
        );
        assert!(schema.table(Level::Image).is_none());
    }

    #[test]
    fn truncation_can_be_switched_off() {
        let schema = SchemaRegistry::parse(LAYOUT, false).unwrap();
        assert_eq!(
            schema.column_for(Level::Series, tags::SERIES_INSTANCE_UID).unwrap(),
            "SeriesInstanceUID"
        );
    }

    #[test]
    fn table_end_without_start_is_rejected() {
        let err = SchemaRegistry::parse("# nothing\n}\n", true).unwrap_err();
        assert!(matches!(err, ArchiveError::Parse { line: 2, .. }));
    }

    #[test]
    fn unknown_level_is_rejected() {
        let err = SchemaRegistry::parse("*UIDMODS\n{\n}\n", true).unwrap_err();
        assert!(matches!(err, ArchiveError::Parse { line: 1, .. }));
    }

    #[test]
    fn truncation_collisions_are_reported() {
        let source = "*Image\n{\n\t{ 0x0008, 0x0018, \"SOPInstanceUID\" },\n\t{ 0x0008, 0x0016, \"SOPInstanceClass\" }\n}\n";
        let err = SchemaRegistry::parse(source, true).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::DuplicateColumn { level: Level::Image, .. }
        ));
        assert!(SchemaRegistry::parse(source, false).is_ok());
    }

    #[test]
    fn missing_file_falls_back_to_default_layout() {
        let dir = tempfile::tempdir().unwrap();
        let schema = SchemaRegistry::load(&dir.path().join("dicom.sql"), true).unwrap();
        assert_eq!(schema, SchemaRegistry::default_schema());
    }

    #[test]
    fn malformed_file_does_not_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dicom.sql");
        fs::write(&path, "*Patient\n{\n\t{ 0xZZZZ, 0x0020, \"PatientID\" }\n}\n").unwrap();
        assert!(SchemaRegistry::load(&path, true).is_err());
    }

    #[test]
    fn default_layout_covers_all_levels_with_unique_columns() {
        let schema = SchemaRegistry::default_schema();
        for level in Level::ALL {
            let table = schema.table(level).unwrap();
            let mut rebuilt = TableDefinition::new(level);
            for mapping in table.mappings() {
                rebuilt.push(mapping.clone()).unwrap();
            }
        }
        assert_eq!(schema.table(Level::Image).unwrap().mappings().len(), 39);
        assert_eq!(
            schema.column_for(Level::Study, tags::PATIENT_ID).unwrap(),
            "PatientID"
        );
    }

    #[test]
    fn added_columns_must_not_collide() {
        let mut schema = SchemaRegistry::default_schema();
        schema
            .add_column(Level::Series, AttributeMapping::new(0x0018, 0x0088, "SpacingBet"))
            .unwrap();
        assert!(schema
            .add_column(Level::Series, AttributeMapping::new(0x0018, 0x0089, "modality"))
            .is_err());
    }
}
