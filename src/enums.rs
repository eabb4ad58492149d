use crate::grouping::SelectionKey;

/// Whether the decoded volume is reoriented before geometry resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrientationPolicy {
    /// Permute and flip axes to the closest axial ordering.
    #[default]
    Axial,
    /// Keep the file's native axis ordering.
    Native,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Center the volume on the extent midpoint, ignoring the decoded origin.
    #[default]
    Centered,
    /// Place the decoded origin into the transform's translation column.
    Native,
}

/// How the final file selection is reduced from the candidate list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GroupingMode {
    /// Keep every file agreeing with the archetype on its concrete attributes.
    #[default]
    ContainingArchetype,
    /// Keep every file matching an explicit, possibly wildcarded key.
    ByKey(SelectionKey),
}

/// Voxel component type of the decoded volume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScalarType {
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    UInt64,
    Int64,
    #[default]
    Float32,
    Float64,
}
