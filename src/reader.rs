//! The archetype volume reader: discovery, grouping and geometry in one
//! synchronous pipeline.

use std::path::{Path, PathBuf};

use nalgebra::Matrix4;
use thiserror::Error;
use tracing::{debug, warn};

use crate::enums::{GroupingMode, OrientationPolicy, OriginPolicy, ScalarType};
use crate::enumerator::enumerate_candidates;
use crate::geometry::{GeometryOptions, ResolvedGeometry, resolve_geometry};
use crate::grouping::{self, SelectionKey};
use crate::metadata::{
    FileMetadataReader, HeaderError, MetadataDictionary, MetadataTable, analyze_files,
};

#[derive(Debug, Error)]
pub enum ArchetypeReaderError {
    #[error("archetype file {0} does not exist")]
    ArchetypeNotFound(PathBuf),

    #[error("cannot resolve geometry from {path}")]
    Geometry {
        path: PathBuf,
        #[source]
        source: HeaderError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Discovers, groups and orders the slice files of the volume identified by
/// one archetype path, and derives the volume's RAS index-to-physical
/// transform.
///
/// The whole pipeline runs to completion inside [`update_information`]; all
/// derived state is recomputed from scratch on each call. One instance is not
/// meant to be driven from multiple threads at once.
///
/// [`update_information`]: ArchetypeVolumeReader::update_information
pub struct ArchetypeVolumeReader<R> {
    metadata_reader: R,
    archetype: PathBuf,

    single_file: bool,
    orientation_policy: OrientationPolicy,
    use_orientation_from_file: bool,
    origin_policy: OriginPolicy,
    use_native_scalar_type: bool,
    output_scalar_type: ScalarType,
    default_spacing: [f64; 3],
    default_origin: [f64; 3],
    grouping: GroupingMode,
    explicit_files: Vec<PathBuf>,

    all_file_names: Vec<PathBuf>,
    index_archetype: Option<usize>,
    is_only_file: bool,
    file_names: Vec<PathBuf>,
    table: MetadataTable,
    geometry: Option<ResolvedGeometry>,
    scalar_type: ScalarType,
    component_count: usize,
    dictionary: MetadataDictionary,
}

impl<R: FileMetadataReader> ArchetypeVolumeReader<R> {
    /// Creates a reader for `archetype`, taking an already-configured
    /// metadata reader. Defaults: single-file mode, axial reorientation,
    /// centered origin, float output scalars.
    pub fn new(metadata_reader: R, archetype: impl Into<PathBuf>) -> Self {
        ArchetypeVolumeReader {
            metadata_reader,
            archetype: archetype.into(),
            single_file: true,
            orientation_policy: OrientationPolicy::default(),
            use_orientation_from_file: true,
            origin_policy: OriginPolicy::default(),
            use_native_scalar_type: false,
            output_scalar_type: ScalarType::Float32,
            default_spacing: [1.0; 3],
            default_origin: [0.0; 3],
            grouping: GroupingMode::default(),
            explicit_files: Vec::new(),
            all_file_names: Vec::new(),
            index_archetype: None,
            is_only_file: false,
            file_names: Vec::new(),
            table: MetadataTable::default(),
            geometry: None,
            scalar_type: ScalarType::Float32,
            component_count: 0,
            dictionary: MetadataDictionary::default(),
        }
    }

    pub fn set_single_file(&mut self, single_file: bool) {
        self.single_file = single_file;
    }

    pub fn set_orientation_policy(&mut self, policy: OrientationPolicy) {
        self.orientation_policy = policy;
    }

    pub fn set_use_orientation_from_file(&mut self, use_it: bool) {
        self.use_orientation_from_file = use_it;
    }

    pub fn set_origin_policy(&mut self, policy: OriginPolicy) {
        self.origin_policy = policy;
    }

    pub fn set_use_native_scalar_type(&mut self, use_it: bool) {
        self.use_native_scalar_type = use_it;
    }

    pub fn set_output_scalar_type(&mut self, scalar_type: ScalarType) {
        self.output_scalar_type = scalar_type;
    }

    pub fn set_default_spacing(&mut self, spacing: [f64; 3]) {
        self.default_spacing = spacing;
    }

    pub fn set_default_origin(&mut self, origin: [f64; 3]) {
        self.default_origin = origin;
    }

    pub fn set_grouping_mode(&mut self, grouping: GroupingMode) {
        self.grouping = grouping;
    }

    /// Bypasses candidate discovery with an explicit file list.
    pub fn set_file_names(&mut self, files: Vec<PathBuf>) {
        self.explicit_files = files;
    }

    pub fn add_file_name(&mut self, file: impl Into<PathBuf>) {
        self.explicit_files.push(file.into());
    }

    pub fn reset_file_names(&mut self) {
        self.explicit_files.clear();
    }

    /// Runs the full discovery, analysis, grouping and geometry pipeline.
    ///
    /// An empty final selection (for instance when the archetype's position
    /// could not be resolved against the candidate list) is not an error:
    /// the file list comes back empty and the geometry stays unresolved.
    pub fn update_information(&mut self) -> Result<(), ArchetypeReaderError> {
        let candidates = enumerate_candidates(
            &self.metadata_reader,
            &self.archetype,
            self.single_file,
            &self.explicit_files,
        )?;
        self.all_file_names = candidates.all_file_names;
        self.index_archetype = candidates.index_archetype;
        self.is_only_file = candidates.is_only_file;

        let analyze = !self.single_file
            && (self.metadata_reader.is_tag_capable(&self.archetype)
                || self.all_file_names.len() > 1);
        self.table = if analyze {
            analyze_files(&self.metadata_reader, &self.all_file_names, &self.archetype)
        } else {
            MetadataTable::default()
        };

        self.file_names = if self.is_only_file || self.single_file {
            vec![self.archetype.clone()]
        } else {
            match self.grouping {
                GroupingMode::ContainingArchetype => grouping::assemble_containing_archetype(
                    &self.all_file_names,
                    &self.table.records,
                    self.index_archetype,
                ),
                GroupingMode::ByKey(key) => {
                    grouping::select_by_key(&self.all_file_names, &self.table.records, &key)
                }
            }
        };
        debug!(selected = self.file_names.len(), "reduced file selection");

        if self.file_names.is_empty() {
            warn!("file selection is empty, leaving geometry unresolved");
            self.geometry = None;
            self.dictionary = MetadataDictionary::default();
            self.component_count = 0;
            return Ok(());
        }

        let header = if self.file_names.len() == 1 {
            self.metadata_reader.read_header(&self.file_names[0])
        } else {
            self.metadata_reader.read_series_header(&self.file_names)
        }
        .map_err(|source| ArchetypeReaderError::Geometry {
            path: self.file_names[0].clone(),
            source,
        })?;

        let options = GeometryOptions {
            orientation_policy: self.orientation_policy,
            origin_policy: self.origin_policy,
            use_orientation_from_file: self.use_orientation_from_file,
            default_spacing: self.default_spacing,
            default_origin: self.default_origin,
        };
        self.geometry = Some(resolve_geometry(&header, &options));

        self.scalar_type = if self.use_native_scalar_type {
            header.scalar_type
        } else {
            self.output_scalar_type
        };
        self.component_count = header.component_count;
        self.dictionary = MetadataDictionary::from_entries(
            self.metadata_reader.read_dictionary(&self.file_names[0]),
        );

        Ok(())
    }

    /// Replaces the current selection with the n-th volume of a time or
    /// gradient series: one file per slice location, scanning matches of the
    /// first series, gradient and orientation.
    pub fn assemble_nth_volume(&mut self, n: usize) {
        let mut selection = Vec::new();
        for slice in 0..self.table.tags.slice_locations.len() {
            let key = SelectionKey {
                series_uid: Some(0),
                diffusion_gradient: Some(0),
                slice_location: Some(slice),
                image_orientation: Some(0),
                ..SelectionKey::any()
            };
            if let Some(name) =
                grouping::find_nth(&self.all_file_names, &self.table.records, &key, n)
            {
                selection.push(name.to_path_buf());
            }
        }
        self.file_names = selection;
    }

    /// The n-th file matching `key`, or `None` when fewer matches exist.
    pub fn nth_file_name(&self, key: &SelectionKey, n: usize) -> Option<&Path> {
        grouping::find_nth(&self.all_file_names, &self.table.records, key, n)
    }

    pub fn archetype(&self) -> &Path {
        &self.archetype
    }

    /// The ordered file list of the current selection, ready for decoding.
    pub fn file_names(&self) -> &[PathBuf] {
        &self.file_names
    }

    pub fn all_file_names(&self) -> &[PathBuf] {
        &self.all_file_names
    }

    pub fn is_only_file(&self) -> bool {
        self.is_only_file
    }

    pub fn index_archetype(&self) -> Option<usize> {
        self.index_archetype
    }

    /// The RAS-to-IJK transform, once geometry has been resolved.
    pub fn ras_to_ijk_matrix(&self) -> Option<&Matrix4<f64>> {
        self.geometry.as_ref().map(|g| &g.ras_to_ijk)
    }

    pub fn spacing(&self) -> Option<[f64; 3]> {
        self.geometry.as_ref().map(|g| g.spacing)
    }

    pub fn origin(&self) -> Option<[f64; 3]> {
        self.geometry.as_ref().map(|g| g.origin)
    }

    pub fn extent(&self) -> Option<[i64; 6]> {
        self.geometry.as_ref().map(|g| g.extent)
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.scalar_type
    }

    pub fn component_count(&self) -> usize {
        self.component_count
    }

    pub fn metadata_dictionary(&self) -> &MetadataDictionary {
        &self.dictionary
    }

    /// Per-file attribute records of the last analysis run, in candidate
    /// order.
    pub fn attribute_records(&self) -> &[crate::metadata::AttributeRecord] {
        &self.table.records
    }

    pub fn series_instance_uids(&self) -> &[String] {
        self.table.tags.series_instance_uids.values()
    }

    pub fn content_times(&self) -> &[String] {
        self.table.tags.content_times.values()
    }

    pub fn trigger_times(&self) -> &[String] {
        self.table.tags.trigger_times.values()
    }

    pub fn diffusion_gradient_orientations(&self) -> &[[f32; 3]] {
        self.table.tags.diffusion_gradient_orientations.values()
    }

    pub fn slice_locations(&self) -> &[f32] {
        self.table.tags.slice_locations.values()
    }

    pub fn image_orientations(&self) -> &[[f32; 6]] {
        self.table.tags.image_orientations.values()
    }
}
