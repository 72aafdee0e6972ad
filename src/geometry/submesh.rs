//! Canonical submesh construction from a source primitive.

use super::attribute::{Attribute, AttributeData, Interpolation};
use super::deindex::deindex;
use super::normals::{expand_per_face, flat_normals};
use super::primitive::{Primitive, VertexColors};
use super::tangents::{generate_tangents, IndexedTriangles, NormalLookup, TangentError};
use super::topology::{identity_indices, normalize_topology, validate_indices, TopologyMode};
use crate::error::{BridgeError, Result};
use crate::naming;
use serde::Serialize;

/// Face arrays plus tagged attribute arrays, ready for a Mesh prim.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalSubmesh {
    /// Draw mode of the source primitive.
    pub topology: TopologyMode,
    /// Vertex count of each face.
    pub face_vertex_counts: Vec<u32>,
    /// Point indices, face after face.
    pub face_vertex_indices: Vec<u32>,
    /// Point positions (vertex interpolation).
    pub points: Attribute,
    /// Authored or generated normals.
    pub normals: Option<Attribute>,
    /// UV sets, colors, opacities and tangent frames.
    pub primvars: Vec<Attribute>,
    /// Whether back faces are rendered.
    pub double_sided: bool,
}

impl CanonicalSubmesh {
    pub fn vertex_count(&self) -> usize {
        self.points.len()
    }

    pub fn face_count(&self) -> usize {
        self.face_vertex_counts.len()
    }

    pub fn primvar(&self, name: &str) -> Option<&Attribute> {
        self.primvars.iter().find(|p| p.name == name)
    }

    pub fn has_tangents(&self) -> bool {
        self.primvar(naming::TANGENTS).is_some()
    }

    /// Check face arrays and every attribute length against its interpolation.
    pub fn validate(&self) -> Result<()> {
        let corner_count = self.face_vertex_indices.len();
        let counted: usize = self.face_vertex_counts.iter().map(|&c| c as usize).sum();
        if counted != corner_count {
            return Err(BridgeError::AttributeLength {
                name: "faceVertexIndices".to_string(),
                expected: counted,
                actual: corner_count,
            });
        }
        validate_indices(&self.face_vertex_indices, self.vertex_count())?;

        let all = std::iter::once(&self.points)
            .chain(self.normals.iter())
            .chain(self.primvars.iter());
        for attr in all {
            let expected = match attr.interpolation {
                Interpolation::Constant => 1,
                Interpolation::Vertex => self.vertex_count(),
                Interpolation::PerCorner => corner_count,
            };
            if attr.len() != expected {
                return Err(BridgeError::AttributeLength {
                    name: attr.name.clone(),
                    expected,
                    actual: attr.len(),
                });
            }
        }
        Ok(())
    }
}

/// Per-primitive choices made by the caller from material and options.
#[derive(Debug, Clone, Default)]
pub struct SubmeshRequest {
    /// UV set of the bound material's normal texture, when tangents should
    /// be generated for it.
    pub tangent_uv_set: Option<usize>,
    /// Add constant white color and opaque opacity when no set is authored.
    pub fill_color_defaults: bool,
    /// Copied from the bound material.
    pub double_sided: bool,
}

/// A built submesh and the reason normal mapping was dropped, if it was.
#[derive(Debug, Clone)]
pub struct SubmeshOutcome {
    pub submesh: CanonicalSubmesh,
    pub tangent_error: Option<TangentError>,
}

/// Vertex attributes must have exactly one element per vertex.
fn check_len(name: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(BridgeError::AttributeLength {
            name: name.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Build the canonical submesh of a primitive.
///
/// Input errors (missing positions, bad index counts, mis-sized arrays) fail
/// the whole primitive. A tangent failure only drops the tangent primvars
/// and is reported in the outcome.
pub fn build_submesh(primitive: &Primitive, request: &SubmeshRequest) -> Result<SubmeshOutcome> {
    if primitive.positions.is_empty() {
        return Err(BridgeError::MissingAttribute("POSITION"));
    }
    let vertex_count = primitive.vertex_count();
    let indices = if primitive.indices.is_empty() {
        identity_indices(vertex_count)
    } else {
        primitive.indices.clone()
    };
    validate_indices(&indices, vertex_count)?;
    let faces = normalize_topology(primitive.mode, &indices)?;

    let mut points = Attribute::new(
        "points",
        AttributeData::Vec3(primitive.positions.clone()),
        Interpolation::Vertex,
    );

    let mut authored_normals = None;
    let mut face_normals = None;
    match &primitive.normals {
        Some(normals) => {
            check_len(naming::NORMALS, normals.len(), vertex_count)?;
            authored_normals = Some(Attribute::new(
                naming::NORMALS,
                AttributeData::Vec3(normals.clone()),
                Interpolation::Vertex,
            ));
        }
        None if primitive.mode.is_triangulated() => {
            log::debug!("generating flat normals for {} faces", faces.face_count());
            face_normals = Some(flat_normals(&primitive.positions, &faces.face_vertex_indices));
        }
        None => {}
    }

    let mut vertex_attrs = Vec::new();
    let mut flipped_uvs: Vec<Vec<[f32; 2]>> = Vec::with_capacity(primitive.tex_coords.len());
    for (i, set) in primitive.tex_coords.iter().enumerate() {
        let name = naming::st_set_name(i);
        check_len(&name, set.len(), vertex_count)?;
        let flipped: Vec<[f32; 2]> = set.iter().map(|uv| [uv[0], 1.0 - uv[1]]).collect();
        vertex_attrs.push(Attribute::new(name, AttributeData::Vec2(flipped.clone()), Interpolation::Vertex));
        flipped_uvs.push(flipped);
    }

    let mut has_opacity = false;
    for (i, set) in primitive.colors.iter().enumerate() {
        let color_name = naming::color_set_name(i);
        check_len(&color_name, set.len(), vertex_count)?;
        match set {
            VertexColors::Rgb(colors) => {
                vertex_attrs.push(Attribute::new(color_name, AttributeData::Vec3(colors.clone()), Interpolation::Vertex));
            }
            VertexColors::Rgba(colors) => {
                let rgb = colors.iter().map(|c| [c[0], c[1], c[2]]).collect();
                let alpha = colors.iter().map(|c| c[3]).collect();
                vertex_attrs.push(Attribute::new(color_name, AttributeData::Vec3(rgb), Interpolation::Vertex));
                vertex_attrs.push(Attribute::new(
                    naming::opacity_set_name(i),
                    AttributeData::Float(alpha),
                    Interpolation::Vertex,
                ));
                has_opacity |= i == 0;
            }
        }
    }

    // Authored tangents are only meaningful alongside authored normals.
    let mut authored_tangents = false;
    if let (Some(tangents), Some(_)) = (&primitive.tangents, &authored_normals) {
        check_len(naming::TANGENTS, tangents.len(), vertex_count)?;
        let xyz = tangents.iter().map(|t| [t[0], t[1], t[2]]).collect();
        let signs = tangents.iter().map(|t| if t[3] < 0.0 { -1.0 } else { 1.0 }).collect();
        vertex_attrs.push(Attribute::new(naming::TANGENTS, AttributeData::Vec3(xyz), Interpolation::Vertex));
        vertex_attrs.push(Attribute::new(naming::TANGENT_SIGNS, AttributeData::Float(signs), Interpolation::Vertex));
        authored_tangents = true;
    }

    let mut tangent_error = None;
    let mut corner_tangents = None;
    if let (Some(uv_set), false) = (request.tangent_uv_set, authored_tangents) {
        match tangent_frames(primitive, &faces.face_vertex_indices, &authored_normals, &face_normals, flipped_uvs.get(uv_set)) {
            Ok(frames) => corner_tangents = Some(frames),
            Err(e) => {
                log::warn!("normal mapping disabled for primitive: {}", e);
                tangent_error = Some(e);
            }
        }
    }

    let mut face_vertex_indices = faces.face_vertex_indices;
    let mut normals = authored_normals;
    let mut primvars = Vec::new();

    if face_normals.is_some() || corner_tangents.is_some() {
        {
            let mut arrays: Vec<&mut Attribute> = vec![&mut points];
            arrays.extend(normals.iter_mut());
            arrays.extend(vertex_attrs.iter_mut());
            deindex(&face_vertex_indices, &mut arrays)?;
        }
        face_vertex_indices = identity_indices(face_vertex_indices.len());

        if let Some(per_face) = face_normals {
            normals = Some(
                Attribute::new(
                    naming::NORMALS,
                    AttributeData::Vec3(expand_per_face(&per_face, &faces.face_vertex_counts)),
                    Interpolation::PerCorner,
                )
                .generated(),
            );
        }
        primvars.append(&mut vertex_attrs);
        if let Some((tangents, signs)) = corner_tangents {
            primvars.push(Attribute::new(naming::TANGENTS, AttributeData::Vec3(tangents), Interpolation::PerCorner).generated());
            primvars.push(
                Attribute::new(naming::TANGENT_SIGNS, AttributeData::Float(signs), Interpolation::PerCorner).generated(),
            );
        }
    } else {
        primvars.append(&mut vertex_attrs);
    }

    if request.fill_color_defaults {
        if primitive.colors.is_empty() {
            primvars.push(
                Attribute::new(naming::color_set_name(0), AttributeData::Vec3(vec![[1.0; 3]]), Interpolation::Constant)
                    .generated(),
            );
        }
        if !has_opacity {
            primvars.push(
                Attribute::new(naming::opacity_set_name(0), AttributeData::Float(vec![1.0]), Interpolation::Constant)
                    .generated(),
            );
        }
    }

    let submesh = CanonicalSubmesh {
        topology: primitive.mode,
        face_vertex_counts: faces.face_vertex_counts,
        face_vertex_indices,
        points,
        normals,
        primvars,
        double_sided: request.double_sided,
    };
    Ok(SubmeshOutcome {
        submesh,
        tangent_error,
    })
}

fn tangent_frames(
    primitive: &Primitive,
    corner_indices: &[u32],
    authored_normals: &Option<Attribute>,
    face_normals: &Option<Vec<[f32; 3]>>,
    uvs: Option<&Vec<[f32; 2]>>,
) -> std::result::Result<(Vec<[f32; 3]>, Vec<f32>), TangentError> {
    if !primitive.mode.is_triangulated() {
        return Err(TangentError::NotTriangulated);
    }
    let uvs = uvs.ok_or(TangentError::MissingTexCoords)?;
    let lookup = match (authored_normals, face_normals) {
        (Some(Attribute { data: AttributeData::Vec3(n), .. }), _) => NormalLookup::PerVertex(n),
        (_, Some(n)) => NormalLookup::PerFace(n),
        _ => {
            return Err(TangentError::NormalCount {
                expected: primitive.vertex_count(),
                actual: 0,
            })
        }
    };
    let mut mesh = IndexedTriangles::new(&primitive.positions, lookup, uvs, corner_indices)?;
    generate_tangents(&mut mesh)?;
    Ok((mesh.tangents, mesh.signs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Primitive {
        Primitive::new(
            TopologyMode::Triangles,
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
        )
        .with_indices(vec![0, 1, 2, 0, 2, 3])
        .with_tex_coords(vec![[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]])
    }

    #[test]
    fn test_authored_normals_keep_indexing() {
        let prim = quad().with_normals(vec![[0.0, 0.0, 1.0]; 4]);
        let out = build_submesh(&prim, &SubmeshRequest::default()).unwrap();
        let mesh = &out.submesh;
        mesh.validate().unwrap();
        assert_eq!(mesh.face_vertex_indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.vertex_count(), 4);
        assert!(!mesh.normals.as_ref().unwrap().is_generated());
    }

    #[test]
    fn test_uvs_are_flipped() {
        let prim = quad().with_normals(vec![[0.0, 0.0, 1.0]; 4]);
        let out = build_submesh(&prim, &SubmeshRequest::default()).unwrap();
        let st = out.submesh.primvar("st").unwrap();
        assert_eq!(
            st.data,
            AttributeData::Vec2(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]])
        );
    }

    #[test]
    fn test_flat_normals_deindex_everything() {
        let out = build_submesh(&quad(), &SubmeshRequest::default()).unwrap();
        let mesh = &out.submesh;
        mesh.validate().unwrap();
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.face_vertex_indices, identity_indices(6));
        let normals = mesh.normals.as_ref().unwrap();
        assert!(normals.is_generated());
        assert_eq!(normals.interpolation, Interpolation::PerCorner);
        let AttributeData::Vec3(n) = &normals.data else { panic!() };
        assert_eq!(n.len(), 6);
        assert!(n.iter().all(|v| v[0] == 0.0 && v[1] == 0.0 && (v[2] - 1.0).abs() < 1e-6));
        // corner 4 was vertex 2
        let AttributeData::Vec2(st) = &mesh.primvar("st").unwrap().data else { panic!() };
        assert_eq!(st[4], [1.0, 1.0]);
    }

    #[test]
    fn test_generated_tangents() {
        let prim = quad().with_normals(vec![[0.0, 0.0, 1.0]; 4]);
        let request = SubmeshRequest {
            tangent_uv_set: Some(0),
            ..Default::default()
        };
        let out = build_submesh(&prim, &request).unwrap();
        assert!(out.tangent_error.is_none());
        let mesh = &out.submesh;
        mesh.validate().unwrap();
        assert!(mesh.has_tangents());
        let tangents = mesh.primvar(naming::TANGENTS).unwrap();
        assert_eq!(tangents.len(), 6);
        assert!(tangents.is_generated());
        assert_eq!(mesh.primvar(naming::TANGENT_SIGNS).unwrap().interpolation, Interpolation::PerCorner);
        assert_eq!(mesh.normals.as_ref().unwrap().interpolation, Interpolation::Vertex);
    }

    #[test]
    fn test_tangent_failure_is_not_fatal() {
        let prim = quad().with_normals(vec![[0.0, 0.0, 1.0]; 4]);
        let request = SubmeshRequest {
            tangent_uv_set: Some(3),
            ..Default::default()
        };
        let out = build_submesh(&prim, &request).unwrap();
        assert_eq!(out.tangent_error, Some(TangentError::MissingTexCoords));
        assert!(!out.submesh.has_tangents());
        assert_eq!(out.submesh.vertex_count(), 4);
    }

    #[test]
    fn test_zero_area_face_keeps_tangents() {
        let prim = Primitive::new(
            TopologyMode::Triangles,
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
                [2.0, 0.0, 0.0],
            ],
        )
        .with_indices(vec![0, 1, 2, 0, 2, 3, 0, 1, 4])
        .with_tex_coords(vec![[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0], [2.0, 0.5]]);
        let request = SubmeshRequest {
            tangent_uv_set: Some(0),
            ..Default::default()
        };
        let out = build_submesh(&prim, &request).unwrap();
        assert_eq!(out.tangent_error, None);
        out.submesh.validate().unwrap();
        let AttributeData::Vec3(tangents) = &out.submesh.primvar(naming::TANGENTS).unwrap().data else { panic!() };
        assert_eq!(tangents.len(), 9);
        assert!(tangents.iter().all(|t| (t[0] - 1.0).abs() < 1e-5 && t[1].abs() < 1e-5));
    }

    #[test]
    fn test_authored_tangents_need_authored_normals() {
        let prim = quad().with_tangents(vec![[1.0, 0.0, 0.0, -1.0]; 4]);
        let out = build_submesh(&prim, &SubmeshRequest::default()).unwrap();
        assert!(!out.submesh.has_tangents());

        let prim = quad()
            .with_normals(vec![[0.0, 0.0, 1.0]; 4])
            .with_tangents(vec![[1.0, 0.0, 0.0, -1.0]; 4]);
        let out = build_submesh(&prim, &SubmeshRequest::default()).unwrap();
        let signs = out.submesh.primvar(naming::TANGENT_SIGNS).unwrap();
        assert_eq!(signs.data, AttributeData::Float(vec![-1.0; 4]));
        assert!(!signs.is_generated());
    }

    #[test]
    fn test_rgba_colors_split() {
        let prim = quad()
            .with_normals(vec![[0.0, 0.0, 1.0]; 4])
            .with_colors(VertexColors::Rgba(vec![[1.0, 0.5, 0.25, 0.75]; 4]));
        let out = build_submesh(&prim, &SubmeshRequest::default()).unwrap();
        let color = out.submesh.primvar("color").unwrap();
        let opacity = out.submesh.primvar("opacity").unwrap();
        assert_eq!(color.data, AttributeData::Vec3(vec![[1.0, 0.5, 0.25]; 4]));
        assert_eq!(opacity.data, AttributeData::Float(vec![0.75; 4]));
    }

    #[test]
    fn test_color_defaults_are_constant() {
        let prim = quad().with_colors(VertexColors::Rgb(vec![[0.2; 3]; 4]));
        let request = SubmeshRequest {
            fill_color_defaults: true,
            ..Default::default()
        };
        let out = build_submesh(&prim, &request).unwrap();
        out.submesh.validate().unwrap();
        assert_eq!(out.submesh.primvar("color").unwrap().interpolation, Interpolation::Vertex);
        let opacity = out.submesh.primvar("opacity").unwrap();
        assert_eq!(opacity.interpolation, Interpolation::Constant);
        assert_eq!(opacity.data, AttributeData::Float(vec![1.0]));
    }

    #[test]
    fn test_line_primitive_has_no_normals() {
        let prim = Primitive::new(TopologyMode::LineLoop, vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        let out = build_submesh(&prim, &SubmeshRequest::default()).unwrap();
        assert!(out.submesh.normals.is_none());
        assert_eq!(out.submesh.face_vertex_indices, vec![0, 1, 1, 2, 2, 0]);
        out.submesh.validate().unwrap();
    }

    #[test]
    fn test_input_errors() {
        let prim = Primitive::new(TopologyMode::Triangles, Vec::new());
        assert!(matches!(
            build_submesh(&prim, &SubmeshRequest::default()),
            Err(BridgeError::MissingAttribute("POSITION"))
        ));

        let prim = quad().with_indices(vec![0, 1, 2, 3]);
        assert!(matches!(
            build_submesh(&prim, &SubmeshRequest::default()),
            Err(BridgeError::TopologyMismatch { .. })
        ));

        let prim = Primitive::new(TopologyMode::Triangles, vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
            .with_normals(vec![[0.0, 0.0, 1.0]; 5]);
        assert!(matches!(
            build_submesh(&prim, &SubmeshRequest::default()),
            Err(BridgeError::AttributeLength { expected: 3, actual: 5, .. })
        ));

        let prim = quad().with_tex_coords(vec![[0.0, 0.0]; 3]);
        assert!(matches!(
            build_submesh(&prim, &SubmeshRequest::default()),
            Err(BridgeError::AttributeLength { expected: 4, actual: 3, .. })
        ));

        let prim = quad().with_indices(vec![0, 1, 9]);
        assert!(matches!(
            build_submesh(&prim, &SubmeshRequest::default()),
            Err(BridgeError::IndexOutOfRange { index: 9, .. })
        ));
    }
}
