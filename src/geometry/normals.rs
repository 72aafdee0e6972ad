//! Flat normal generation for primitives without authored normals.

use glam::Vec3;

/// Compute one normal per triangle.
///
/// `face_vertex_indices` must describe triangles. Degenerate triangles
/// produce a zero vector; tangent generation gives their corners a fixed frame.
pub fn flat_normals(positions: &[[f32; 3]], face_vertex_indices: &[u32]) -> Vec<[f32; 3]> {
    face_vertex_indices
        .chunks_exact(3)
        .map(|tri| {
            let p0 = Vec3::from(positions[tri[0] as usize]);
            let p1 = Vec3::from(positions[tri[1] as usize]);
            let p2 = Vec3::from(positions[tri[2] as usize]);
            let e1 = (p1 - p0).normalize_or_zero();
            let e2 = (p2 - p0).normalize_or_zero();
            e1.cross(e2).normalize_or_zero().to_array()
        })
        .collect()
}

/// Repeat each face value for every corner of its face.
pub fn expand_per_face<T: Copy>(per_face: &[T], face_vertex_counts: &[u32]) -> Vec<T> {
    let mut out = Vec::with_capacity(face_vertex_counts.iter().sum::<u32>() as usize);
    for (value, &count) in per_face.iter().zip(face_vertex_counts) {
        out.extend(std::iter::repeat(*value).take(count as usize));
    }
    out
}
