//! Tagged attribute arrays carried by a canonical submesh.

use serde::{Deserialize, Serialize};

/// How an attribute array maps onto the submesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Interpolation {
    /// One value for the whole submesh.
    Constant,
    /// One value per point, addressed through the face-vertex indices.
    Vertex,
    /// One value per face-vertex occurrence.
    PerCorner,
}

impl Interpolation {
    /// USD interpolation token.
    pub fn usd_token(&self) -> &'static str {
        match self {
            Interpolation::Constant => "constant",
            Interpolation::Vertex => "vertex",
            Interpolation::PerCorner => "faceVarying",
        }
    }
}

/// Whether an array came from the source asset or was computed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Provenance {
    Authored,
    Generated,
}

/// Typed element storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "camelCase")]
pub enum AttributeData {
    Float(Vec<f32>),
    Vec2(Vec<[f32; 2]>),
    Vec3(Vec<[f32; 3]>),
    Vec4(Vec<[f32; 4]>),
}

impl AttributeData {
    pub fn len(&self) -> usize {
        match self {
            AttributeData::Float(v) => v.len(),
            AttributeData::Vec2(v) => v.len(),
            AttributeData::Vec3(v) => v.len(),
            AttributeData::Vec4(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build a new array with `out[i] = self[indices[i]]`.
    ///
    /// Indices must already be validated against `len()`.
    pub fn gather(&self, indices: &[u32]) -> AttributeData {
        fn pick<T: Copy>(values: &[T], indices: &[u32]) -> Vec<T> {
            indices.iter().map(|&i| values[i as usize]).collect()
        }
        match self {
            AttributeData::Float(v) => AttributeData::Float(pick(v, indices)),
            AttributeData::Vec2(v) => AttributeData::Vec2(pick(v, indices)),
            AttributeData::Vec3(v) => AttributeData::Vec3(pick(v, indices)),
            AttributeData::Vec4(v) => AttributeData::Vec4(pick(v, indices)),
        }
    }

    /// USD value type name for the array.
    pub fn usd_type(&self) -> &'static str {
        match self {
            AttributeData::Float(_) => "float[]",
            AttributeData::Vec2(_) => "float2[]",
            AttributeData::Vec3(_) => "float3[]",
            AttributeData::Vec4(_) => "float4[]",
        }
    }
}

/// A named attribute array with interpolation and provenance tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    /// Primvar name (e.g. "st", "color1", "tangents").
    pub name: String,
    /// Element values.
    pub data: AttributeData,
    pub interpolation: Interpolation,
    pub provenance: Provenance,
}

impl Attribute {
    pub fn new(name: impl Into<String>, data: AttributeData, interpolation: Interpolation) -> Self {
        Self {
            name: name.into(),
            data,
            interpolation,
            provenance: Provenance::Authored,
        }
    }

    /// Mark the attribute as computed by the pipeline.
    pub fn generated(mut self) -> Self {
        self.provenance = Provenance::Generated;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_generated(&self) -> bool {
        self.provenance == Provenance::Generated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather() {
        let data = AttributeData::Vec2(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        let gathered = data.gather(&[2, 2, 0]);
        assert_eq!(
            gathered,
            AttributeData::Vec2(vec![[0.0, 1.0], [0.0, 1.0], [0.0, 0.0]])
        );
    }

    #[test]
    fn test_generated_flag() {
        let attr = Attribute::new("normals", AttributeData::Vec3(vec![]), Interpolation::PerCorner);
        assert!(!attr.is_generated());
        assert!(attr.generated().is_generated());
    }

    #[test]
    fn test_usd_tokens() {
        assert_eq!(Interpolation::PerCorner.usd_token(), "faceVarying");
        assert_eq!(Interpolation::Vertex.usd_token(), "vertex");
        assert_eq!(Interpolation::Constant.usd_token(), "constant");
    }
}
