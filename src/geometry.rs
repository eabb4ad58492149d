//! Index-to-physical transform derivation.
//!
//! Builds the RAS-to-IJK matrix from the decoded spacing, origin and
//! direction cosines. Decoded geometry lives in the LPS frame; the published
//! transform is RAS, so the first two physical axes are negated on the way
//! out.

use nalgebra::Matrix4;
use tracing::warn;

use crate::enums::{OrientationPolicy, OriginPolicy};
use crate::metadata::VolumeHeader;

/// Caller policies applied while building the transform.
#[derive(Debug, Clone)]
pub struct GeometryOptions {
    pub orientation_policy: OrientationPolicy,
    pub origin_policy: OriginPolicy,
    /// When false, direction cosines are discarded and the transform is a
    /// pure diagonal of reciprocal spacings.
    pub use_orientation_from_file: bool,
    /// Substituted per axis when the decoded spacing is exactly 1.0.
    pub default_spacing: [f64; 3],
    /// Substituted per axis when the decoded origin is exactly 0.0.
    pub default_origin: [f64; 3],
}

impl Default for GeometryOptions {
    fn default() -> Self {
        GeometryOptions {
            orientation_policy: OrientationPolicy::default(),
            origin_policy: OriginPolicy::default(),
            use_orientation_from_file: true,
            default_spacing: [1.0; 3],
            default_origin: [0.0; 3],
        }
    }
}

/// The resolved transform plus the spacing and origin used to build it.
#[derive(Debug, Clone)]
pub struct ResolvedGeometry {
    pub ras_to_ijk: Matrix4<f64>,
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
    pub extent: [i64; 6],
}

/// Derives the RAS-to-IJK transform from one decoded header.
pub fn resolve_geometry(header: &VolumeHeader, options: &GeometryOptions) -> ResolvedGeometry {
    let header = match options.orientation_policy {
        OrientationPolicy::Axial => orient_to_axial(header),
        OrientationPolicy::Native => header.clone(),
    };

    // Column i of IJK->LPS is the i-th direction cosine scaled by spacing.
    let mut ijk_to_lps = Matrix4::<f64>::identity();
    for i in 0..3 {
        for j in 0..3 {
            ijk_to_lps[(j, i)] = header.spacing[i] * header.direction[j][i];
        }
    }

    let mut lps_to_ras = Matrix4::<f64>::identity();
    lps_to_ras[(0, 0)] = -1.0;
    lps_to_ras[(1, 1)] = -1.0;

    let mut matrix = lps_to_ras * ijk_to_lps;

    // A decoded value sitting exactly at the unset sentinel is replaced by
    // the caller's default. This cannot tell legitimate unit spacing from
    // "unset"; the substitution is kept for behavioral compatibility.
    let mut spacing = header.spacing;
    let mut origin = header.origin;
    for j in 0..3 {
        if spacing[j] == 1.0 {
            spacing[j] = options.default_spacing[j];
        }
        if origin[j] == 0.0 {
            origin[j] = options.default_origin[j];
        }
    }

    // L -> R, P -> A
    origin[0] = -origin[0];
    origin[1] = -origin[1];

    let extent = header.extent;
    match options.origin_policy {
        OriginPolicy::Native => {
            for j in 0..3 {
                matrix[(j, 3)] = origin[j];
            }
            matrix = invert(matrix);
        }
        OriginPolicy::Centered => {
            matrix = invert(matrix);
            for j in 0..3 {
                matrix[(j, 3)] = (extent[2 * j + 1] - extent[2 * j]) as f64 / 2.0;
            }
        }
    }
    matrix[(3, 3)] = 1.0;

    if !options.use_orientation_from_file {
        matrix = Matrix4::identity();
        for j in 0..3 {
            matrix[(j, j)] = 1.0 / spacing[j];
        }
    }

    ResolvedGeometry {
        ras_to_ijk: matrix,
        spacing,
        origin,
        extent,
    }
}

fn invert(matrix: Matrix4<f64>) -> Matrix4<f64> {
    matrix.try_inverse().unwrap_or_else(|| {
        warn!("index-to-physical matrix is singular, substituting identity");
        Matrix4::identity()
    })
}

/// Permutes and flips the header's axes so its direction matrix is as close
/// to the identity (axial LPS ordering) as possible.
///
/// Each index axis is assigned the physical axis its direction cosine is
/// dominant in; a flipped axis moves the origin to the opposite corner. A
/// degenerate direction matrix where two axes claim the same physical axis is
/// left untouched.
fn orient_to_axial(header: &VolumeHeader) -> VolumeHeader {
    let mut source = [usize::MAX; 3];
    let mut sign = [1.0f64; 3];

    for col in 0..3 {
        let mut dominant = 0;
        let mut dominant_abs = -1.0;
        for row in 0..3 {
            let value = header.direction[row][col].abs();
            if value > dominant_abs {
                dominant_abs = value;
                dominant = row;
            }
        }
        if source[dominant] != usize::MAX {
            warn!("direction cosines are too oblique to reorient, keeping native axes");
            return header.clone();
        }
        source[dominant] = col;
        sign[dominant] = if header.direction[dominant][col] < 0.0 {
            -1.0
        } else {
            1.0
        };
    }

    let mut out = header.clone();
    for axis in 0..3 {
        let src = source[axis];
        out.spacing[axis] = header.spacing[src];
        out.extent[2 * axis] = header.extent[2 * src];
        out.extent[2 * axis + 1] = header.extent[2 * src + 1];
        for row in 0..3 {
            out.direction[row][axis] = sign[axis] * header.direction[row][src];
        }
    }

    for axis in 0..3 {
        if sign[axis] < 0.0 {
            let src = source[axis];
            let steps = (header.extent[2 * src + 1] - header.extent[2 * src]) as f64;
            for row in 0..3 {
                out.origin[row] += header.direction[row][src] * header.spacing[src] * steps;
            }
        }
    }

    out
}
