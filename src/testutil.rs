//! In-memory [`FileMetadataReader`] for unit tests.

use std::path::{Path, PathBuf};

use crate::metadata::{FileMetadataReader, HeaderError, VolumeHeader, VolumeTag};

#[derive(Debug, Clone)]
pub struct MockFile {
    pub path: PathBuf,
    pub tag_capable: bool,
    pub series_uid: Option<String>,
    pub content_time: Option<String>,
    pub trigger_time: Option<String>,
    pub diffusion: Option<String>,
    pub slice_location: Option<String>,
    pub orientation: Option<String>,
    /// `None` simulates a file whose header cannot be read.
    pub header: Option<VolumeHeader>,
}

#[derive(Debug, Default)]
pub struct MockMetadataReader {
    pub files: Vec<MockFile>,
    pub supports_spatial_origin: bool,
    pub pattern_files: Vec<PathBuf>,
    pub dictionary: Vec<(String, String)>,
}

impl MockMetadataReader {
    pub fn new() -> Self {
        MockMetadataReader::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_tagged_file(
        &mut self,
        path: &str,
        series_uid: &str,
        content_time: Option<&str>,
        trigger_time: Option<&str>,
        diffusion: Option<&str>,
        slice_location: Option<&str>,
        orientation: Option<&str>,
    ) {
        self.files.push(MockFile {
            path: PathBuf::from(path),
            tag_capable: true,
            series_uid: Some(series_uid.to_string()),
            content_time: content_time.map(str::to_string),
            trigger_time: trigger_time.map(str::to_string),
            diffusion: diffusion.map(str::to_string),
            slice_location: slice_location.map(str::to_string),
            orientation: orientation.map(str::to_string),
            header: Some(VolumeHeader::default()),
        });
    }

    pub fn add_untagged_file(&mut self, path: &str, header: VolumeHeader) {
        self.files.push(MockFile {
            path: PathBuf::from(path),
            tag_capable: false,
            series_uid: None,
            content_time: None,
            trigger_time: None,
            diffusion: None,
            slice_location: None,
            orientation: None,
            header: Some(header),
        });
    }

    pub fn add_failing_file(&mut self, path: &str) {
        self.files.push(MockFile {
            path: PathBuf::from(path),
            tag_capable: false,
            series_uid: None,
            content_time: None,
            trigger_time: None,
            diffusion: None,
            slice_location: None,
            orientation: None,
            header: None,
        });
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    fn find(&self, path: &Path) -> Option<&MockFile> {
        self.files.iter().find(|f| f.path == path)
    }
}

impl FileMetadataReader for MockMetadataReader {
    fn is_tag_capable(&self, path: &Path) -> bool {
        self.find(path).is_some_and(|f| f.tag_capable)
    }

    fn supports_spatial_origin(&self, _path: &Path) -> bool {
        self.supports_spatial_origin
    }

    fn read_header(&self, path: &Path) -> Result<VolumeHeader, HeaderError> {
        self.find(path)
            .and_then(|f| f.header.clone())
            .ok_or_else(|| HeaderError::MissingAttribute {
                name: "header",
                path: path.to_path_buf(),
            })
    }

    fn read_series_header(&self, paths: &[PathBuf]) -> Result<VolumeHeader, HeaderError> {
        let first = paths.first().ok_or(HeaderError::EmptySelection)?;
        let mut header = self.read_header(first)?;
        header.extent[4] = 0;
        header.extent[5] = paths.len() as i64 - 1;
        Ok(header)
    }

    fn enumerate_series(&self, _directory: &Path) -> Vec<String> {
        let mut series = Vec::new();
        for file in &self.files {
            if let Some(uid) = file.series_uid.as_ref().filter(|_| file.tag_capable) {
                if !series.contains(uid) {
                    series.push(uid.clone());
                }
            }
        }
        series
    }

    fn files_for_series(&self, _directory: &Path, series_id: &str) -> Vec<PathBuf> {
        self.files
            .iter()
            .filter(|f| f.series_uid.as_deref() == Some(series_id))
            .map(|f| f.path.clone())
            .collect()
    }

    fn generate_series_filenames(&self, archetype: &Path) -> Vec<PathBuf> {
        if self.pattern_files.is_empty() {
            vec![archetype.to_path_buf()]
        } else {
            self.pattern_files.clone()
        }
    }

    fn read_tag(&self, path: &Path, tag: VolumeTag) -> Option<String> {
        let file = self.find(path)?;
        match tag {
            VolumeTag::SeriesInstanceUid => file.series_uid.clone(),
            VolumeTag::ContentTime => file.content_time.clone(),
            VolumeTag::TriggerTime => file.trigger_time.clone(),
            VolumeTag::DiffusionGradientOrientation => file.diffusion.clone(),
            VolumeTag::SliceLocation => file.slice_location.clone(),
            VolumeTag::ImageOrientationPatient => file.orientation.clone(),
        }
    }

    fn read_dictionary(&self, _path: &Path) -> Vec<(String, String)> {
        self.dictionary.clone()
    }
}
