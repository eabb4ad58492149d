//! DICOM-backed [`FileMetadataReader`] built on the dicom-rs ecosystem.

use std::cell::RefCell;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Once;

use dicom::core::header::Header;
use dicom::object::{FileDicomObject, InMemDicomObject, OpenFileOptions};
use dicom_dictionary_std::tags;
use tracing::{debug, warn};

use crate::enums::ScalarType;
use crate::metadata::{FileMetadataReader, HeaderError, VolumeHeader, VolumeTag};

type DicomObject = FileDicomObject<InMemDicomObject>;

static REGISTER_DECODERS: Once = Once::new();

/// Warms the lazily built transfer-syntax machinery so the first file open
/// does not pay for it. Idempotent; the composing application calls this once
/// at startup.
pub fn ensure_decoders_registered() {
    REGISTER_DECODERS.call_once(|| {
        use dicom::transfer_syntax::TransferSyntaxIndex;
        let explicit_vr_le = dicom::transfer_syntax::TransferSyntaxRegistry
            .get("1.2.840.10008.1.2.1")
            .is_some();
        debug!(explicit_vr_le, "decoder registry initialized");
    });
}

/// Reads grouping tags and geometry headers from DICOM files.
///
/// Caches the most recently opened object so that reading the six grouping
/// tags of one file costs a single parse. Pixel data is never read.
#[derive(Default)]
pub struct DicomMetadataReader {
    last_opened: RefCell<Option<(PathBuf, DicomObject)>>,
}

impl DicomMetadataReader {
    pub fn new() -> Self {
        DicomMetadataReader::default()
    }

    fn open(&self, path: &Path) -> Result<DicomObject, dicom::object::ReadError> {
        OpenFileOptions::new()
            .read_until(tags::PIXEL_DATA)
            .open_file(path)
    }

    fn with_object<T>(&self, path: &Path, f: impl FnOnce(&DicomObject) -> T) -> Option<T> {
        let mut cache = self.last_opened.borrow_mut();
        if let Some((cached_path, object)) = cache.as_ref() {
            if cached_path == path {
                return Some(f(object));
            }
        }
        match self.open(path) {
            Ok(object) => {
                let result = f(&object);
                *cache = Some((path.to_path_buf(), object));
                Some(result)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to open file");
                None
            }
        }
    }

    /// Sorted directory listing of files bearing the DICOM magic code.
    fn dicom_files_in(&self, directory: &Path) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = match fs::read_dir(directory) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && has_dicom_magic(path))
                .collect(),
            Err(err) => {
                warn!(directory = %directory.display(), error = %err, "cannot scan directory");
                return Vec::new();
            }
        };
        paths.sort();
        paths
    }

    fn series_uid_of(&self, path: &Path) -> Option<String> {
        self.with_object(path, |obj| string_value(obj, tags::SERIES_INSTANCE_UID))
            .flatten()
    }

    /// Slice position along the acquisition normal, for in-series ordering.
    fn slice_position(&self, obj: &DicomObject) -> Option<f64> {
        let position = obj
            .element(tags::IMAGE_POSITION_PATIENT)
            .ok()?
            .to_multi_float64()
            .ok()?;
        let orientation = obj
            .element(tags::IMAGE_ORIENTATION_PATIENT)
            .ok()?
            .to_multi_float64()
            .ok()?;
        if position.len() < 3 || orientation.len() < 6 {
            return None;
        }
        let normal = cross(
            [orientation[0], orientation[1], orientation[2]],
            [orientation[3], orientation[4], orientation[5]],
        );
        Some(normal[0] * position[0] + normal[1] * position[1] + normal[2] * position[2])
    }
}

impl FileMetadataReader for DicomMetadataReader {
    fn is_tag_capable(&self, path: &Path) -> bool {
        has_dicom_magic(path)
    }

    fn supports_spatial_origin(&self, path: &Path) -> bool {
        // Raster formats carry no origin; only DICOM does here.
        has_dicom_magic(path)
    }

    fn read_header(&self, path: &Path) -> Result<VolumeHeader, HeaderError> {
        let object = self.open(path)?;
        header_from_object(&object, path)
    }

    fn read_series_header(&self, paths: &[PathBuf]) -> Result<VolumeHeader, HeaderError> {
        let first = paths.first().ok_or(HeaderError::EmptySelection)?;
        let object = self.open(first)?;
        let mut header = header_from_object(&object, first)?;

        // stack the slices along the third axis
        header.extent[4] = 0;
        header.extent[5] = paths.len() as i64 - 1;

        // slice spacing from the physical distance between the first two
        // slices, when both carry a position
        if paths.len() > 1 {
            let second = self.open(&paths[1])?;
            let first_origin = image_position(&object);
            let second_origin = image_position(&second);
            if let (Some(a), Some(b)) = (first_origin, second_origin) {
                let distance =
                    ((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2) + (b[2] - a[2]).powi(2)).sqrt();
                if distance > 0.0 {
                    header.spacing[2] = distance;
                }
            }
        }

        Ok(header)
    }

    fn enumerate_series(&self, directory: &Path) -> Vec<String> {
        let mut series: Vec<String> = Vec::new();
        for path in self.dicom_files_in(directory) {
            if let Some(uid) = self.series_uid_of(&path) {
                if !series.contains(&uid) {
                    series.push(uid);
                }
            }
        }
        debug!(directory = %directory.display(), count = series.len(), "enumerated series");
        series
    }

    fn files_for_series(&self, directory: &Path, series_id: &str) -> Vec<PathBuf> {
        let mut members: Vec<(PathBuf, Option<f64>, Option<i64>)> = Vec::new();
        for path in self.dicom_files_in(directory) {
            let keys = self.with_object(&path, |obj| {
                let uid = string_value(obj, tags::SERIES_INSTANCE_UID);
                let position = self.slice_position(obj);
                let instance = obj
                    .element(tags::INSTANCE_NUMBER)
                    .ok()
                    .and_then(|e| e.to_int::<i64>().ok());
                (uid, position, instance)
            });
            if let Some((Some(uid), position, instance)) = keys {
                if uid == series_id {
                    members.push((path, position, instance));
                }
            }
        }
        // spatial order when positions exist, instance number otherwise;
        // the sorted directory listing already breaks remaining ties
        members.sort_by(|a, b| match (a.1, b.1) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
            _ => a.2.cmp(&b.2),
        });
        members.into_iter().map(|(path, _, _)| path).collect()
    }

    fn generate_series_filenames(&self, archetype: &Path) -> Vec<PathBuf> {
        expand_numeric_pattern(archetype)
    }

    fn read_tag(&self, path: &Path, tag: VolumeTag) -> Option<String> {
        let dicom_tag = match tag {
            VolumeTag::SeriesInstanceUid => tags::SERIES_INSTANCE_UID,
            VolumeTag::ContentTime => tags::CONTENT_TIME,
            VolumeTag::TriggerTime => tags::TRIGGER_TIME,
            VolumeTag::DiffusionGradientOrientation => tags::DIFFUSION_GRADIENT_ORIENTATION,
            VolumeTag::SliceLocation => tags::SLICE_LOCATION,
            VolumeTag::ImageOrientationPatient => tags::IMAGE_ORIENTATION_PATIENT,
        };
        self.with_object(path, |obj| string_value(obj, dicom_tag))
            .flatten()
    }

    fn read_dictionary(&self, path: &Path) -> Vec<(String, String)> {
        self.with_object(path, |obj| {
            obj.iter()
                .filter_map(|element| {
                    let tag = element.tag();
                    let value = element.to_str().ok()?;
                    Some((
                        format!("{:04x},{:04x}", tag.group(), tag.element()),
                        clean_string(&value),
                    ))
                })
                .collect()
        })
        .unwrap_or_default()
    }
}

/// Checks for the "DICM" magic code at offset 128.
fn has_dicom_magic(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let mut preamble = [0u8; 132];
    if file.read_exact(&mut preamble).is_err() {
        return false;
    }
    preamble[128..] == *b"DICM"
}

fn string_value(obj: &DicomObject, tag: dicom::core::Tag) -> Option<String> {
    obj.element_opt(tag)
        .ok()
        .flatten()
        .and_then(|element| element.to_str().ok())
        .map(|value| clean_string(&value))
}

/// Strips the trailing NUL and space padding DICOM string values carry.
fn clean_string(raw: &str) -> String {
    raw.trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

fn image_position(obj: &DicomObject) -> Option<[f64; 3]> {
    let values = obj
        .element(tags::IMAGE_POSITION_PATIENT)
        .ok()?
        .to_multi_float64()
        .ok()?;
    if values.len() < 3 {
        return None;
    }
    Some([values[0], values[1], values[2]])
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn header_from_object(obj: &DicomObject, path: &Path) -> Result<VolumeHeader, HeaderError> {
    let mut header = VolumeHeader::default();

    let rows = obj
        .element(tags::ROWS)
        .ok()
        .and_then(|e| e.to_int::<i64>().ok())
        .ok_or_else(|| HeaderError::MissingAttribute {
            name: "Rows",
            path: path.to_path_buf(),
        })?;
    let columns = obj
        .element(tags::COLUMNS)
        .ok()
        .and_then(|e| e.to_int::<i64>().ok())
        .ok_or_else(|| HeaderError::MissingAttribute {
            name: "Columns",
            path: path.to_path_buf(),
        })?;
    let frames = obj
        .element_opt(tags::NUMBER_OF_FRAMES)
        .ok()
        .flatten()
        .and_then(|e| e.to_int::<i64>().ok())
        .unwrap_or(1)
        .max(1);
    header.extent = [0, columns - 1, 0, rows - 1, 0, frames - 1];

    // PixelSpacing is (row spacing, column spacing), i.e. (y, x)
    if let Some(spacing) = obj
        .element_opt(tags::PIXEL_SPACING)
        .ok()
        .flatten()
        .and_then(|e| e.to_multi_float64().ok())
    {
        if spacing.len() >= 2 {
            header.spacing[0] = spacing[1];
            header.spacing[1] = spacing[0];
        }
    }
    if let Some(between) = obj
        .element_opt(tags::SPACING_BETWEEN_SLICES)
        .ok()
        .flatten()
        .and_then(|e| e.to_float64().ok())
    {
        header.spacing[2] = between;
    } else if let Some(thickness) = obj
        .element_opt(tags::SLICE_THICKNESS)
        .ok()
        .flatten()
        .and_then(|e| e.to_float64().ok())
    {
        header.spacing[2] = thickness;
    }

    if let Some(origin) = image_position(obj) {
        header.origin = origin;
    }

    if let Some(orientation) = obj
        .element_opt(tags::IMAGE_ORIENTATION_PATIENT)
        .ok()
        .flatten()
        .and_then(|e| e.to_multi_float64().ok())
    {
        if orientation.len() >= 6 {
            let row = [orientation[0], orientation[1], orientation[2]];
            let column = [orientation[3], orientation[4], orientation[5]];
            let normal = cross(row, column);
            for j in 0..3 {
                header.direction[j][0] = row[j];
                header.direction[j][1] = column[j];
                header.direction[j][2] = normal[j];
            }
        }
    }

    let bits_allocated = obj
        .element_opt(tags::BITS_ALLOCATED)
        .ok()
        .flatten()
        .and_then(|e| e.to_int::<u16>().ok())
        .unwrap_or(16);
    let signed = obj
        .element_opt(tags::PIXEL_REPRESENTATION)
        .ok()
        .flatten()
        .and_then(|e| e.to_int::<u16>().ok())
        .unwrap_or(0)
        == 1;
    header.scalar_type = match (bits_allocated, signed) {
        (8, false) => ScalarType::UInt8,
        (8, true) => ScalarType::Int8,
        (16, false) => ScalarType::UInt16,
        (16, true) => ScalarType::Int16,
        (32, false) => ScalarType::UInt32,
        (32, true) => ScalarType::Int32,
        (64, false) => ScalarType::UInt64,
        (64, true) => ScalarType::Int64,
        _ => ScalarType::UInt16,
    };

    header.component_count = obj
        .element_opt(tags::SAMPLES_PER_PIXEL)
        .ok()
        .flatten()
        .and_then(|e| e.to_int::<u16>().ok())
        .unwrap_or(1) as usize;

    Ok(header)
}

/// Expands the rightmost digit run of the archetype's filename into the set
/// of sibling files matching the same prefix and suffix, ordered numerically.
///
/// `img003.png` next to `img001.png` and `img002.png` yields all three. A
/// filename without digits yields just the archetype.
fn expand_numeric_pattern(archetype: &Path) -> Vec<PathBuf> {
    let Some(file_name) = archetype.file_name().and_then(|n| n.to_str()) else {
        return vec![archetype.to_path_buf()];
    };
    let Some((prefix, suffix)) = split_at_rightmost_digit_run(file_name) else {
        return vec![archetype.to_path_buf()];
    };
    let directory = match archetype.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut matched: Vec<(u64, PathBuf)> = Vec::new();
    let Ok(entries) = fs::read_dir(&directory) else {
        return vec![archetype.to_path_buf()];
    };
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(middle) = name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(suffix))
        else {
            continue;
        };
        if !middle.is_empty() && middle.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(number) = middle.parse::<u64>() {
                matched.push((number, path));
            }
        }
    }

    if matched.is_empty() {
        return vec![archetype.to_path_buf()];
    }
    matched.sort();
    matched.into_iter().map(|(_, path)| path).collect()
}

/// Splits `name` around its rightmost maximal run of ASCII digits.
fn split_at_rightmost_digit_run(name: &str) -> Option<(&str, &str)> {
    let bytes = name.as_bytes();
    let end = bytes.iter().rposition(|b| b.is_ascii_digit())? + 1;
    let start = bytes[..end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map_or(0, |p| p + 1);
    Some((&name[..start], &name[end..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn splits_rightmost_digit_run() {
        assert_eq!(split_at_rightmost_digit_run("img003.png"), Some(("img", ".png")));
        assert_eq!(
            split_at_rightmost_digit_run("t2_slice_12_of_30.tif"),
            Some(("t2_slice_12_of_", ".tif"))
        );
        assert_eq!(split_at_rightmost_digit_run("noslice.png"), None);
        assert_eq!(split_at_rightmost_digit_run("42"), Some(("", "")));
    }

    #[test]
    fn numeric_pattern_expands_and_orders_siblings() {
        let dir = TempDir::new().unwrap();
        for name in ["img010.png", "img002.png", "img001.png", "other.txt", "img_a.png"] {
            File::create(dir.path().join(name)).unwrap();
        }
        let archetype = dir.path().join("img002.png");
        let expanded = expand_numeric_pattern(&archetype);
        let names: Vec<_> = expanded
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["img001.png", "img002.png", "img010.png"]);
    }

    #[test]
    fn pattern_expansion_without_digits_returns_archetype() {
        let dir = TempDir::new().unwrap();
        let archetype = dir.path().join("volume.raw");
        File::create(&archetype).unwrap();
        assert_eq!(expand_numeric_pattern(&archetype), vec![archetype]);
    }

    #[test]
    fn magic_check_rejects_non_dicom_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.txt");
        let mut file = File::create(&path).unwrap();
        file.write_all(&[0u8; 200]).unwrap();
        assert!(!has_dicom_magic(&path));

        let dicom_path = dir.path().join("real.dcm");
        let mut dicom_file = File::create(&dicom_path).unwrap();
        let mut contents = vec![0u8; 128];
        contents.extend_from_slice(b"DICM");
        dicom_file.write_all(&contents).unwrap();
        assert!(has_dicom_magic(&dicom_path));

        let short_path = dir.path().join("short.dcm");
        File::create(&short_path).unwrap();
        assert!(!has_dicom_magic(&short_path));
    }

    #[test]
    fn decoder_registration_is_idempotent() {
        ensure_decoders_registered();
        ensure_decoders_registered();
    }
}
