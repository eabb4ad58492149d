//! Per-file metadata extraction and the capability trait behind it.
//!
//! The grouping engine never touches file formats directly. Everything it
//! needs from disk comes through [`FileMetadataReader`], so the analysis and
//! grouping logic can be exercised against an in-memory implementation.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::enums::ScalarType;
use crate::tag_index::TagSets;

/// Spacing, origin, direction cosines and extent of one decoded volume.
///
/// `direction` is stored row-major; column `i` holds the direction cosine of
/// index axis `i` in the LPS physical frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeHeader {
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
    pub direction: [[f64; 3]; 3],
    /// Inclusive index bounds, `[x0, x1, y0, y1, z0, z1]`.
    pub extent: [i64; 6],
    pub scalar_type: ScalarType,
    pub component_count: usize,
}

impl Default for VolumeHeader {
    fn default() -> Self {
        VolumeHeader {
            spacing: [1.0; 3],
            origin: [0.0; 3],
            direction: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            extent: [0, 0, 0, 0, 0, 0],
            scalar_type: ScalarType::default(),
            component_count: 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("missing required attribute {name} in {path}")]
    MissingAttribute { name: &'static str, path: PathBuf },

    #[error("no files selected for geometry resolution")]
    EmptySelection,
}

/// The six metadata attributes the grouping engine indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeTag {
    SeriesInstanceUid,
    ContentTime,
    TriggerTime,
    DiffusionGradientOrientation,
    SliceLocation,
    ImageOrientationPatient,
}

/// Format access capability used by the discovery pipeline.
///
/// Implementations decode headers and expose the tag values the grouping
/// engine indexes; pixel data never crosses this boundary.
pub trait FileMetadataReader {
    /// Whether the format family of `path` exposes the grouping tags.
    fn is_tag_capable(&self, path: &Path) -> bool;

    /// Whether the format family of `path` carries a spatial origin.
    ///
    /// Raster formats without one get their slice location synthesized from
    /// the file's ordinal position instead of the decoded origin.
    fn supports_spatial_origin(&self, path: &Path) -> bool;

    fn read_header(&self, path: &Path) -> Result<VolumeHeader, HeaderError>;

    /// Reads `paths` as one ordered series; slice order is the path order.
    fn read_series_header(&self, paths: &[PathBuf]) -> Result<VolumeHeader, HeaderError>;

    /// Distinct acquisition-series identifiers found in `directory`.
    fn enumerate_series(&self, directory: &Path) -> Vec<String>;

    fn files_for_series(&self, directory: &Path, series_id: &str) -> Vec<PathBuf>;

    /// Pattern-based slice filename expansion for single-slice archetypes.
    fn generate_series_filenames(&self, archetype: &Path) -> Vec<PathBuf>;

    /// Raw string value of `tag`, or `None` when absent or unreadable.
    fn read_tag(&self, path: &Path, tag: VolumeTag) -> Option<String>;

    /// Every (key, value) metadata pair of `path`, in the format's order.
    fn read_dictionary(&self, path: &Path) -> Vec<(String, String)>;
}

/// Positions into the six tag indices for one candidate file.
///
/// `None` means the attribute is absent or not applicable for this file's
/// format, and acts as a wildcard during grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeRecord {
    pub series_uid: Option<usize>,
    pub content_time: Option<usize>,
    pub trigger_time: Option<usize>,
    pub diffusion_gradient: Option<usize>,
    pub slice_location: Option<usize>,
    pub image_orientation: Option<usize>,
}

/// Result of one metadata analysis run: one record per candidate file plus
/// the tag indices the records point into. Rebuilt from empty on every run.
#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    pub records: Vec<AttributeRecord>,
    pub tags: TagSets,
}

/// Series identifier assigned to every file of a non-tagged format family.
pub const NON_TAGGED_SERIES: &str = "Non-Dicom Series";

/// Extracts the six grouping attributes for every candidate file.
///
/// A single capability probe on the archetype decides the code path for the
/// whole run. Unreadable per-file metadata degrades that file's attributes to
/// absent; it is never fatal here.
pub fn analyze_files(
    reader: &dyn FileMetadataReader,
    files: &[PathBuf],
    archetype: &Path,
) -> MetadataTable {
    let mut table = MetadataTable::default();

    if reader.is_tag_capable(archetype) {
        for path in files {
            table.records.push(analyze_tagged(reader, path, &mut table.tags));
        }
    } else {
        let ordinal_slices = !reader.supports_spatial_origin(archetype);
        for (ordinal, path) in files.iter().enumerate() {
            table
                .records
                .push(analyze_untagged(reader, path, ordinal, ordinal_slices, &mut table.tags));
        }
    }

    table
}

fn analyze_tagged(
    reader: &dyn FileMetadataReader,
    path: &Path,
    tags: &mut TagSets,
) -> AttributeRecord {
    let mut record = AttributeRecord::default();

    if let Some(value) = non_empty(reader.read_tag(path, VolumeTag::SeriesInstanceUid)) {
        record.series_uid = Some(tags.series_instance_uids.insert(value));
    }
    if let Some(value) = non_empty(reader.read_tag(path, VolumeTag::ContentTime)) {
        record.content_time = Some(tags.content_times.insert(value));
    }
    if let Some(value) = non_empty(reader.read_tag(path, VolumeTag::TriggerTime)) {
        record.trigger_time = Some(tags.trigger_times.insert(value));
    }
    if let Some(value) = reader
        .read_tag(path, VolumeTag::DiffusionGradientOrientation)
        .as_deref()
        .and_then(parse_backslash_floats::<3>)
    {
        record.diffusion_gradient = Some(tags.diffusion_gradient_orientations.insert(value));
    }
    if let Some(value) = reader
        .read_tag(path, VolumeTag::SliceLocation)
        .and_then(|raw| raw.trim().parse::<f32>().ok())
    {
        record.slice_location = Some(tags.slice_locations.insert(value));
    }
    if let Some(value) = reader
        .read_tag(path, VolumeTag::ImageOrientationPatient)
        .as_deref()
        .and_then(parse_backslash_floats::<6>)
    {
        record.image_orientation = Some(tags.image_orientations.insert(value));
    }

    record
}

fn analyze_untagged(
    reader: &dyn FileMetadataReader,
    path: &Path,
    ordinal: usize,
    ordinal_slices: bool,
    tags: &mut TagSets,
) -> AttributeRecord {
    let header = match reader.read_header(path) {
        Ok(header) => header,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "skipping unreadable file metadata");
            return AttributeRecord::default();
        }
    };

    let mut record = AttributeRecord::default();

    // All files of a non-tagged format fall into one synthetic series;
    // content time, trigger time and gradient orientation do not exist.
    record.series_uid = Some(tags.series_instance_uids.insert(NON_TAGGED_SERIES.to_string()));

    let location = if ordinal_slices {
        ordinal as f32
    } else {
        header.origin[2] as f32
    };
    record.slice_location = Some(tags.slice_locations.insert(location));

    let mut orientation = [0.0f32; 6];
    for k in 0..3 {
        orientation[k] = header.direction[0][k] as f32;
        orientation[k + 3] = header.direction[1][k] as f32;
    }
    record.image_orientation = Some(tags.image_orientations.insert(orientation));

    record
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parses exactly `N` backslash-delimited floats, e.g. `"1.0\\0.0\\0.0"`.
fn parse_backslash_floats<const N: usize>(raw: &str) -> Option<[f32; N]> {
    let mut out = [0.0f32; N];
    let mut parts = raw.split('\\');
    for slot in out.iter_mut() {
        *slot = parts.next()?.trim().parse::<f32>().ok()?;
    }
    Some(out)
}

/// Ordered (key, value) snapshot from the single file that supplied geometry.
///
/// Keys are duplicate-free; the first occurrence wins.
#[derive(Debug, Clone, Default)]
pub struct MetadataDictionary {
    entries: Vec<(String, String)>,
}

impl MetadataDictionary {
    pub fn from_entries(raw: Vec<(String, String)>) -> Self {
        let mut entries: Vec<(String, String)> = Vec::with_capacity(raw.len());
        for (key, value) in raw {
            if !entries.iter().any(|(k, _)| *k == key) {
                entries.push((key, value));
            }
        }
        MetadataDictionary { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn nth_key(&self, n: usize) -> Option<&str> {
        self.entries.get(n).map(|(k, _)| k.as_str())
    }

    pub fn nth_value(&self, n: usize) -> Option<&str> {
        self.entries.get(n).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockMetadataReader;

    #[test]
    fn parses_backslash_delimited_vectors() {
        assert_eq!(
            parse_backslash_floats::<3>("0.1\\0.2\\0.3"),
            Some([0.1, 0.2, 0.3])
        );
        assert_eq!(
            parse_backslash_floats::<6>("1\\0\\0\\0\\1\\0"),
            Some([1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
        );
        assert_eq!(parse_backslash_floats::<3>("0.1\\0.2"), None);
        assert_eq!(parse_backslash_floats::<3>("a\\b\\c"), None);
        assert_eq!(parse_backslash_floats::<3>(""), None);
    }

    #[test]
    fn tagged_files_index_all_six_attributes() {
        let mut reader = MockMetadataReader::new();
        reader.add_tagged_file(
            "/d/a.dcm",
            "S1",
            Some("120000"),
            Some("10"),
            Some("0.5\\0.5\\0.7"),
            Some("-12.5"),
            Some("1\\0\\0\\0\\1\\0"),
        );
        reader.add_tagged_file(
            "/d/b.dcm",
            "S1",
            Some("120001"),
            None,
            None,
            Some("-10.0"),
            Some("1\\0\\0\\0\\1\\0"),
        );

        let files = reader.paths();
        let table = analyze_files(&reader, &files, files[0].as_path());

        assert_eq!(table.records.len(), 2);
        let a = &table.records[0];
        assert_eq!(a.series_uid, Some(0));
        assert_eq!(a.content_time, Some(0));
        assert_eq!(a.trigger_time, Some(0));
        assert_eq!(a.diffusion_gradient, Some(0));
        assert_eq!(a.slice_location, Some(0));
        assert_eq!(a.image_orientation, Some(0));

        let b = &table.records[1];
        assert_eq!(b.series_uid, Some(0));
        assert_eq!(b.content_time, Some(1));
        assert_eq!(b.trigger_time, None);
        assert_eq!(b.diffusion_gradient, None);
        assert_eq!(b.slice_location, Some(1));
        assert_eq!(b.image_orientation, Some(0));

        assert_eq!(table.tags.series_instance_uids.len(), 1);
        assert_eq!(table.tags.content_times.len(), 2);
        assert_eq!(table.tags.image_orientations.len(), 1);
    }

    #[test]
    fn untagged_files_fall_into_synthetic_series() {
        let mut reader = MockMetadataReader::new();
        reader.add_untagged_file("/d/img_1.png", VolumeHeader::default());
        reader.add_untagged_file("/d/img_2.png", VolumeHeader::default());
        reader.supports_spatial_origin = false;

        let files = reader.paths();
        let table = analyze_files(&reader, &files, files[0].as_path());

        assert_eq!(
            table.tags.series_instance_uids.values(),
            &[NON_TAGGED_SERIES.to_string()]
        );
        // ordinal slice locations, one per file
        assert_eq!(table.records[0].slice_location, Some(0));
        assert_eq!(table.records[1].slice_location, Some(1));
        assert_eq!(table.tags.slice_locations.values(), &[0.0, 1.0]);
        assert_eq!(table.records[0].content_time, None);
        assert_eq!(table.records[0].trigger_time, None);
        assert_eq!(table.records[0].diffusion_gradient, None);
    }

    #[test]
    fn untagged_origin_capable_reader_uses_third_axis_origin() {
        let mut reader = MockMetadataReader::new();
        let mut header = VolumeHeader::default();
        header.origin = [0.0, 0.0, 42.5];
        reader.add_untagged_file("/d/vol_1.mha", header);
        reader.supports_spatial_origin = true;

        let files = reader.paths();
        let table = analyze_files(&reader, &files, files[0].as_path());
        assert_eq!(table.tags.slice_locations.values(), &[42.5]);
    }

    #[test]
    fn unreadable_untagged_file_degrades_to_absent() {
        let mut reader = MockMetadataReader::new();
        reader.add_untagged_file("/d/ok.mha", VolumeHeader::default());
        reader.add_failing_file("/d/broken.mha");

        let files = reader.paths();
        let table = analyze_files(&reader, &files, files[0].as_path());
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[1], AttributeRecord::default());
    }

    #[test]
    fn dictionary_deduplicates_per_key_keeping_first() {
        let dict = MetadataDictionary::from_entries(vec![
            ("0008,0033".into(), "120000".into()),
            ("0020,000e".into(), "S1".into()),
            ("0008,0033".into(), "999999".into()),
        ]);
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.value("0008,0033"), Some("120000"));
        assert_eq!(dict.nth_key(1), Some("0020,000e"));
        assert_eq!(dict.nth_value(1), Some("S1"));
        assert!(dict.has_key("0020,000e"));
        assert!(!dict.has_key("0010,0010"));
    }
}
