//! Multi-key partial-match grouping over analyzed candidate files.
//!
//! A file and a key are compared slot by slot; a slot only discriminates when
//! both sides carry a concrete index. An absent attribute on either side acts
//! as a wildcard, which is what makes heterogeneous acquisitions (files with
//! different tag coverage) group naturally.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::metadata::AttributeRecord;

/// A six-slot selection query. `None` slots do not filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionKey {
    pub series_uid: Option<usize>,
    pub content_time: Option<usize>,
    pub trigger_time: Option<usize>,
    pub diffusion_gradient: Option<usize>,
    pub slice_location: Option<usize>,
    pub image_orientation: Option<usize>,
}

impl SelectionKey {
    /// The all-wildcard key; selects every file.
    pub fn any() -> Self {
        SelectionKey::default()
    }

    /// A key fixing every attribute the record has a concrete value for.
    pub fn from_record(record: &AttributeRecord) -> Self {
        SelectionKey {
            series_uid: record.series_uid,
            content_time: record.content_time,
            trigger_time: record.trigger_time,
            diffusion_gradient: record.diffusion_gradient,
            slice_location: record.slice_location,
            image_orientation: record.image_orientation,
        }
    }
}

fn slot_matches(file: Option<usize>, key: Option<usize>) -> bool {
    match (file, key) {
        (Some(f), Some(k)) => f == k,
        _ => true,
    }
}

/// Whether `record` satisfies `key` on every slot where both are concrete.
pub fn matches(record: &AttributeRecord, key: &SelectionKey) -> bool {
    slot_matches(record.series_uid, key.series_uid)
        && slot_matches(record.content_time, key.content_time)
        && slot_matches(record.trigger_time, key.trigger_time)
        && slot_matches(record.diffusion_gradient, key.diffusion_gradient)
        && slot_matches(record.slice_location, key.slice_location)
        && slot_matches(record.image_orientation, key.image_orientation)
}

/// Filters `files` by `key`, preserving enumeration order.
///
/// Order is significant: consumers interpret the result as slice order.
pub fn select_by_key(
    files: &[PathBuf],
    records: &[AttributeRecord],
    key: &SelectionKey,
) -> Vec<PathBuf> {
    let selected: Vec<PathBuf> = files
        .iter()
        .zip(records)
        .filter(|(_, record)| matches(record, key))
        .map(|(path, _)| path.clone())
        .collect();
    debug!(total = files.len(), selected = selected.len(), "selected files by key");
    selected
}

/// Selects every file agreeing with the archetype on its concrete attributes.
///
/// The key is the archetype's own record with the slice-location slot left
/// unconstrained, so the whole slice stack of the volume survives. An
/// unresolved archetype position selects nothing.
pub fn assemble_containing_archetype(
    files: &[PathBuf],
    records: &[AttributeRecord],
    index_archetype: Option<usize>,
) -> Vec<PathBuf> {
    let Some(index) = index_archetype else {
        debug!("archetype position unresolved, selecting nothing");
        return Vec::new();
    };
    let mut key = SelectionKey::from_record(&records[index]);
    key.slice_location = None;
    select_by_key(files, records, &key)
}

/// The n-th (0-indexed) file matching `key`, in enumeration order.
///
/// Callers routinely probe past the end of a series, so running out of
/// matches is an ordinary `None`, not an error.
pub fn find_nth<'a>(
    files: &'a [PathBuf],
    records: &[AttributeRecord],
    key: &SelectionKey,
    n: usize,
) -> Option<&'a Path> {
    files
        .iter()
        .zip(records)
        .filter(|(_, record)| matches(record, key))
        .nth(n)
        .map(|(path, _)| path.as_path())
}
