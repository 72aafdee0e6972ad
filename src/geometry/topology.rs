//! Conversion of glTF draw modes into face-vertex arrays.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};

/// Draw convention mapping an index list to faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TopologyMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl TopologyMode {
    /// Number of vertices in each face produced by this mode.
    pub fn face_size(&self) -> u32 {
        match self {
            TopologyMode::Points => 1,
            TopologyMode::Lines | TopologyMode::LineLoop | TopologyMode::LineStrip => 2,
            TopologyMode::Triangles | TopologyMode::TriangleStrip | TopologyMode::TriangleFan => 3,
        }
    }

    /// Whether faces produced by this mode are triangles.
    pub fn is_triangulated(&self) -> bool {
        self.face_size() == 3
    }
}

/// Face arrays produced by [`normalize_topology`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceTopology {
    /// Vertex count of each face.
    pub face_vertex_counts: Vec<u32>,
    /// Vertex indices, face after face.
    pub face_vertex_indices: Vec<u32>,
}

impl FaceTopology {
    pub fn face_count(&self) -> usize {
        self.face_vertex_counts.len()
    }
}

/// Identity index list for primitives without indices.
pub fn identity_indices(count: usize) -> Vec<u32> {
    (0..count as u32).collect()
}

/// Convert an index list in the given draw mode into face arrays.
///
/// Winding is preserved; strips alternate the order of the last two corners
/// on odd faces so every triangle keeps the orientation of the first.
pub fn normalize_topology(mode: TopologyMode, indices: &[u32]) -> Result<FaceTopology> {
    let n = indices.len();
    let mismatch = || BridgeError::TopologyMismatch {
        mode,
        index_count: n,
    };

    let face_vertex_indices: Vec<u32> = match mode {
        TopologyMode::Points => indices.to_vec(),
        TopologyMode::Lines => {
            if n % 2 != 0 {
                return Err(mismatch());
            }
            indices.to_vec()
        }
        TopologyMode::LineStrip => {
            if n < 2 {
                return Err(mismatch());
            }
            indices.windows(2).flat_map(|w| [w[0], w[1]]).collect()
        }
        TopologyMode::LineLoop => {
            if n < 2 {
                return Err(mismatch());
            }
            let mut out = Vec::with_capacity(n * 2);
            for i in 0..n {
                out.push(indices[i]);
                out.push(indices[(i + 1) % n]);
            }
            out
        }
        TopologyMode::Triangles => {
            if n % 3 != 0 {
                return Err(mismatch());
            }
            indices.to_vec()
        }
        TopologyMode::TriangleStrip => {
            if n < 3 {
                return Err(mismatch());
            }
            let mut out = Vec::with_capacity((n - 2) * 3);
            for i in 0..n - 2 {
                if i % 2 == 0 {
                    out.extend_from_slice(&[indices[i], indices[i + 1], indices[i + 2]]);
                } else {
                    out.extend_from_slice(&[indices[i], indices[i + 2], indices[i + 1]]);
                }
            }
            out
        }
        TopologyMode::TriangleFan => {
            if n < 3 {
                return Err(mismatch());
            }
            let mut out = Vec::with_capacity((n - 2) * 3);
            for i in 0..n - 2 {
                out.extend_from_slice(&[indices[0], indices[i + 1], indices[i + 2]]);
            }
            out
        }
    };

    let face_size = mode.face_size();
    let face_count = face_vertex_indices.len() / face_size as usize;

    Ok(FaceTopology {
        face_vertex_counts: vec![face_size; face_count],
        face_vertex_indices,
    })
}

/// Check every index against the vertex count.
pub fn validate_indices(indices: &[u32], vertex_count: usize) -> Result<()> {
    match indices.iter().find(|&&i| i as usize >= vertex_count) {
        Some(&index) => Err(BridgeError::IndexOutOfRange {
            index,
            vertex_count,
        }),
        None => Ok(()),
    }
}
