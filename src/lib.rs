//! # archetype-volume library
//!
//! This crate discovers, groups and orders the 2D slice files that make up
//! one 3D (or time-resolved) medical image volume, starting from a single
//! representative file path — the archetype.
//!
//! Given the archetype, the reader enumerates sibling candidates (a DICOM
//! series scan, a filename-pattern expansion, or an explicit list), indexes
//! six metadata attributes per file (series identifier, content time,
//! trigger time, diffusion gradient orientation, slice location, image
//! orientation), and reduces the candidates to the volume the caller wants:
//! either everything agreeing with the archetype, or an explicit selection
//! key where any attribute may be wildcarded. From the selected files it
//! derives the 4x4 RAS index-to-physical transform together with per-axis
//! spacing, origin, extent, scalar type and component count.
//!
//! Pixel data is never decoded here; file formats are reached only through
//! the [`FileMetadataReader`] capability trait, with a DICOM implementation
//! built on the dicom-rs ecosystem.
//!
//! # Examples
//!
//! Assemble the volume containing one DICOM slice and fetch its transform:
//!
//! ```no_run
//! # use archetype_volume::{ArchetypeVolumeReader, DicomMetadataReader};
//! archetype_volume::ensure_decoders_registered();
//! let mut reader = ArchetypeVolumeReader::new(
//!     DicomMetadataReader::new(),
//!     "dicom/slice_042.dcm",
//! );
//! reader.set_single_file(false);
//! reader.update_information().expect("should have resolved the volume");
//! let files = reader.file_names();
//! let transform = reader.ras_to_ijk_matrix().expect("geometry resolved");
//! println!("{} slices, transform {transform}", files.len());
//! ```

pub mod enums;
pub mod enumerator;
pub mod geometry;
pub mod grouping;
pub mod metadata;
pub mod reader;
pub mod tag_index;

mod dicom_reader;

#[cfg(test)]
pub(crate) mod testutil;

pub use dicom_reader::{DicomMetadataReader, ensure_decoders_registered};
pub use enums::{GroupingMode, OrientationPolicy, OriginPolicy, ScalarType};
pub use grouping::SelectionKey;
pub use metadata::{FileMetadataReader, MetadataDictionary, VolumeHeader, VolumeTag};
pub use reader::{ArchetypeReaderError, ArchetypeVolumeReader};
