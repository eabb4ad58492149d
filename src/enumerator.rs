//! Candidate file enumeration from a single archetype path.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::metadata::FileMetadataReader;
use crate::reader::ArchetypeReaderError;

/// The full candidate file list plus the archetype's position within it.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub all_file_names: Vec<PathBuf>,
    /// First exact-path match of the archetype in `all_file_names`. `None`
    /// when path canonicalization kept the archetype from matching any entry;
    /// downstream grouping treats that as "select nothing".
    pub index_archetype: Option<usize>,
    pub is_only_file: bool,
}

/// Whether `path` is a pointer into an in-memory scene rather than a file,
/// e.g. `scene:0x7f3a90#volume`. Such archetypes skip the existence check.
pub fn is_memory_reference(path: &Path) -> bool {
    let Some(text) = path.to_str() else {
        return false;
    };
    text.contains(":0x") && text.contains('#')
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Produces the candidate file list for `archetype`.
///
/// Decision order: an explicit file list bypasses discovery entirely;
/// a tag-capable archetype in multi-file mode triggers a directory-wide
/// series scan; a non-tagged single-slice archetype gets filename-pattern
/// expansion; otherwise the archetype stands alone.
///
/// A missing archetype (that is not an in-memory reference) is fatal and is
/// reported before any other work.
pub fn enumerate_candidates(
    reader: &dyn FileMetadataReader,
    archetype: &Path,
    single_file: bool,
    explicit_files: &[PathBuf],
) -> Result<CandidateSet, ArchetypeReaderError> {
    if !is_memory_reference(archetype) && !archetype.exists() {
        return Err(ArchetypeReaderError::ArchetypeNotFound(
            archetype.to_path_buf(),
        ));
    }

    let mut set = CandidateSet::default();

    if !explicit_files.is_empty() {
        set.all_file_names = explicit_files.to_vec();
        set.is_only_file = explicit_files.len() == 1;
    } else if reader.is_tag_capable(archetype) && !single_file {
        enumerate_from_series(reader, archetype, &mut set);
    } else if !single_file {
        enumerate_from_pattern(reader, archetype, &mut set)?;
    } else {
        set.all_file_names.push(archetype.to_path_buf());
        set.is_only_file = true;
    }

    set.index_archetype = set.all_file_names.iter().position(|p| p == archetype);
    debug!(
        candidates = set.all_file_names.len(),
        index_archetype = ?set.index_archetype,
        is_only_file = set.is_only_file,
        "enumerated candidate files"
    );

    Ok(set)
}

/// Collects every file of every series found in the archetype's directory,
/// then checks whether the series holding the archetype has a single file.
fn enumerate_from_series(reader: &dyn FileMetadataReader, archetype: &Path, set: &mut CandidateSet) {
    let directory = match archetype.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
        Some(parent) => parent,
        None => Path::new("."),
    };

    let series_ids = reader.enumerate_series(directory);
    for id in &series_ids {
        set.all_file_names
            .extend(reader.files_for_series(directory, id));
    }

    let archetype_canonical = canonical(archetype);
    for id in &series_ids {
        let series_files = reader.files_for_series(directory, id);
        if series_files
            .iter()
            .any(|f| canonical(f) == archetype_canonical)
        {
            set.is_only_file = series_files.len() == 1;
            break;
        }
    }
}

/// Non-tagged formats: a multi-slice archetype is taken as the sole file;
/// a single-slice archetype is expanded via its filename's numeric pattern.
fn enumerate_from_pattern(
    reader: &dyn FileMetadataReader,
    archetype: &Path,
    set: &mut CandidateSet,
) -> Result<(), ArchetypeReaderError> {
    let header = reader
        .read_header(archetype)
        .map_err(|source| ArchetypeReaderError::Geometry {
            path: archetype.to_path_buf(),
            source,
        })?;

    let third_axis_size = header.extent[5] - header.extent[4] + 1;
    if third_axis_size > 1 {
        set.all_file_names.push(archetype.to_path_buf());
        set.is_only_file = true;
    } else {
        set.all_file_names = reader.generate_series_filenames(archetype);
        set.is_only_file = set.all_file_names.len() == 1;
    }
    Ok(())
}
