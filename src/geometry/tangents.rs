//! Per-corner tangent frame generation for normal mapping.
//!
//! Tangents are accumulated per triangle from edge vectors and UV deltas,
//! shared between corners whose position, normal and UV are bit-identical,
//! then orthogonalized against each corner's normal. The result is always
//! per-corner since the same vertex may carry different bases on
//! different faces. Corners without a usable normal (zero-area faces with
//! generated flat normals) get +X with sign +1.

use glam::{Vec2, Vec3};
use std::collections::HashMap;
use thiserror::Error;

/// Reasons tangent frames cannot be built for a primitive.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TangentError {
    /// Tangent frames are only defined for triangles.
    #[error("primitive is not triangulated")]
    NotTriangulated,

    /// The referenced UV set does not exist or is too short.
    #[error("texture coordinates missing or too short")]
    MissingTexCoords,

    /// Normal array length does not match the lookup mode.
    #[error("expected {expected} normals, found {actual}")]
    NormalCount { expected: usize, actual: usize },

    /// No triangle has usable UV and position deltas.
    #[error("all triangles have degenerate UVs or positions")]
    Degenerate,
}

/// Access to triangle corners for tangent generation.
///
/// Implemented once per mesh representation; `set_tangent` is called once
/// per corner after every frame has been computed successfully.
pub trait VertexDataProvider {
    fn face_count(&self) -> usize;
    fn position(&self, face: usize, corner: usize) -> Vec3;
    fn normal(&self, face: usize, corner: usize) -> Vec3;
    fn tex_coord(&self, face: usize, corner: usize) -> Vec2;
    fn set_tangent(&mut self, face: usize, corner: usize, tangent: Vec3, sign: f32);
}

const DET_EPSILON: f32 = 1e-12;

#[derive(Clone, Copy)]
struct FaceBasis {
    tangent: Vec3,
    bitangent: Vec3,
}

fn face_basis<P: VertexDataProvider + ?Sized>(provider: &P, face: usize) -> Option<FaceBasis> {
    let p0 = provider.position(face, 0);
    let dp1 = provider.position(face, 1) - p0;
    let dp2 = provider.position(face, 2) - p0;
    let uv0 = provider.tex_coord(face, 0);
    let duv1 = provider.tex_coord(face, 1) - uv0;
    let duv2 = provider.tex_coord(face, 2) - uv0;

    if dp1.cross(dp2).length_squared() <= 0.0 {
        return None;
    }
    let det = duv1.x * duv2.y - duv1.y * duv2.x;
    if !det.is_finite() || det.abs() < DET_EPSILON {
        return None;
    }
    let r = 1.0 / det;
    let tangent = (dp1 * duv2.y - dp2 * duv1.y) * r;
    let bitangent = (dp2 * duv1.x - dp1 * duv2.x) * r;
    if !tangent.is_finite() || !bitangent.is_finite() {
        return None;
    }
    Some(FaceBasis { tangent, bitangent })
}

fn corner_angle<P: VertexDataProvider + ?Sized>(provider: &P, face: usize, corner: usize) -> f32 {
    let p = provider.position(face, corner);
    let a = (provider.position(face, (corner + 1) % 3) - p).normalize_or_zero();
    let b = (provider.position(face, (corner + 2) % 3) - p).normalize_or_zero();
    if a == Vec3::ZERO || b == Vec3::ZERO {
        return 0.0;
    }
    a.dot(b).clamp(-1.0, 1.0).acos()
}

fn corner_key(p: Vec3, n: Vec3, uv: Vec2) -> [u32; 8] {
    [
        p.x.to_bits(),
        p.y.to_bits(),
        p.z.to_bits(),
        n.x.to_bits(),
        n.y.to_bits(),
        n.z.to_bits(),
        uv.x.to_bits(),
        uv.y.to_bits(),
    ]
}

/// Compute a tangent and handedness sign for every corner of `provider`.
///
/// Nothing is written to the provider unless every corner succeeds.
pub fn generate_tangents<P: VertexDataProvider + ?Sized>(provider: &mut P) -> Result<(), TangentError> {
    let face_count = provider.face_count();
    if face_count == 0 {
        return Ok(());
    }

    let bases: Vec<Option<FaceBasis>> = (0..face_count).map(|f| face_basis(&*provider, f)).collect();
    if bases.iter().all(Option::is_none) {
        return Err(TangentError::Degenerate);
    }

    // Group corners sharing identical inputs; ids follow corner order.
    let mut groups: HashMap<[u32; 8], usize> = HashMap::new();
    let mut corner_group = Vec::with_capacity(face_count * 3);
    let mut normals = Vec::with_capacity(face_count * 3);
    for face in 0..face_count {
        for corner in 0..3 {
            let n = provider.normal(face, corner);
            let key = corner_key(provider.position(face, corner), n, provider.tex_coord(face, corner));
            let next_id = groups.len();
            let id = *groups.entry(key).or_insert(next_id);
            corner_group.push(id);
            let usable = n.is_finite() && n.length_squared() > 0.0;
            normals.push(if usable { n.normalize() } else { Vec3::ZERO });
        }
    }

    let mut accum_t = vec![Vec3::ZERO; groups.len()];
    let mut accum_b = vec![Vec3::ZERO; groups.len()];
    for (face, basis) in bases.iter().enumerate() {
        let Some(basis) = basis else { continue };
        for corner in 0..3 {
            let weight = corner_angle(&*provider, face, corner);
            let g = corner_group[face * 3 + corner];
            accum_t[g] += basis.tangent * weight;
            accum_b[g] += basis.bitangent * weight;
        }
    }

    let mut frames = Vec::with_capacity(face_count * 3);
    for (i, &g) in corner_group.iter().enumerate() {
        let n = normals[i];
        if n == Vec3::ZERO {
            frames.push((Vec3::X, 1.0));
            continue;
        }
        let raw = accum_t[g];
        let projected = raw - n * n.dot(raw);
        let tangent = if projected.length_squared() > DET_EPSILON {
            projected.normalize()
        } else {
            n.any_orthonormal_vector()
        };
        let sign = if n.cross(tangent).dot(accum_b[g]) < 0.0 { -1.0 } else { 1.0 };
        frames.push((tangent, sign));
    }

    for (i, (tangent, sign)) in frames.into_iter().enumerate() {
        provider.set_tangent(i / 3, i % 3, tangent, sign);
    }
    Ok(())
}

/// Where corner normals are looked up.
#[derive(Debug, Clone, Copy)]
pub enum NormalLookup<'a> {
    /// One normal per vertex, addressed through the index list.
    PerVertex(&'a [[f32; 3]]),
    /// One normal per triangle (flat normals generated upstream).
    PerFace(&'a [[f32; 3]]),
}

/// Indexed triangle list adapter collecting per-corner output.
pub struct IndexedTriangles<'a> {
    positions: &'a [[f32; 3]],
    normals: NormalLookup<'a>,
    tex_coords: &'a [[f32; 2]],
    indices: &'a [u32],
    /// Per-corner tangents, filled by [`generate_tangents`].
    pub tangents: Vec<[f32; 3]>,
    /// Per-corner handedness, +1 or -1.
    pub signs: Vec<f32>,
}

impl<'a> IndexedTriangles<'a> {
    /// Validate inputs. Indices must already be range-checked against
    /// `positions`.
    pub fn new(
        positions: &'a [[f32; 3]],
        normals: NormalLookup<'a>,
        tex_coords: &'a [[f32; 2]],
        indices: &'a [u32],
    ) -> Result<Self, TangentError> {
        if indices.len() % 3 != 0 {
            return Err(TangentError::NotTriangulated);
        }
        if tex_coords.len() < positions.len() {
            return Err(TangentError::MissingTexCoords);
        }
        let face_count = indices.len() / 3;
        match normals {
            NormalLookup::PerVertex(n) if n.len() < positions.len() => {
                return Err(TangentError::NormalCount {
                    expected: positions.len(),
                    actual: n.len(),
                });
            }
            NormalLookup::PerFace(n) if n.len() != face_count => {
                return Err(TangentError::NormalCount {
                    expected: face_count,
                    actual: n.len(),
                });
            }
            _ => {}
        }
        Ok(Self {
            positions,
            normals,
            tex_coords,
            indices,
            tangents: vec![[0.0; 3]; indices.len()],
            signs: vec![1.0; indices.len()],
        })
    }

    fn vertex(&self, face: usize, corner: usize) -> usize {
        self.indices[face * 3 + corner] as usize
    }
}

impl VertexDataProvider for IndexedTriangles<'_> {
    fn face_count(&self) -> usize {
        self.indices.len() / 3
    }

    fn position(&self, face: usize, corner: usize) -> Vec3 {
        Vec3::from(self.positions[self.vertex(face, corner)])
    }

    fn normal(&self, face: usize, corner: usize) -> Vec3 {
        match self.normals {
            NormalLookup::PerVertex(n) => Vec3::from(n[self.vertex(face, corner)]),
            NormalLookup::PerFace(n) => Vec3::from(n[face]),
        }
    }

    fn tex_coord(&self, face: usize, corner: usize) -> Vec2 {
        Vec2::from(self.tex_coords[self.vertex(face, corner)])
    }

    fn set_tangent(&mut self, face: usize, corner: usize, tangent: Vec3, sign: f32) {
        let i = face * 3 + corner;
        self.tangents[i] = tangent.to_array();
        self.signs[i] = sign;
    }
}
