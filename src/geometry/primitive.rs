//! Source primitive description with decoded vertex arrays.

use super::topology::TopologyMode;

/// One vertex color set as authored.
#[derive(Debug, Clone, PartialEq)]
pub enum VertexColors {
    Rgb(Vec<[f32; 3]>),
    /// RGBA colors; alpha is emitted as a separate opacity primvar.
    Rgba(Vec<[f32; 4]>),
}

impl VertexColors {
    pub fn len(&self) -> usize {
        match self {
            VertexColors::Rgb(c) => c.len(),
            VertexColors::Rgba(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A drawable primitive with decoded accessor data.
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    /// Draw mode.
    pub mode: TopologyMode,
    /// Index list; empty means `0..positions.len()`.
    pub indices: Vec<u32>,
    /// Vertex positions (required).
    pub positions: Vec<[f32; 3]>,
    /// Vertex normals.
    pub normals: Option<Vec<[f32; 3]>>,
    /// UV sets in TEXCOORD_n order, with glTF's top-left origin.
    pub tex_coords: Vec<Vec<[f32; 2]>>,
    /// Color sets in COLOR_n order.
    pub colors: Vec<VertexColors>,
    /// Tangents with handedness in w.
    pub tangents: Option<Vec<[f32; 4]>>,
    /// Index into the asset's material list.
    pub material: Option<usize>,
}

impl Primitive {
    pub fn new(mode: TopologyMode, positions: Vec<[f32; 3]>) -> Self {
        Self {
            mode,
            indices: Vec::new(),
            positions,
            normals: None,
            tex_coords: Vec::new(),
            colors: Vec::new(),
            tangents: None,
            material: None,
        }
    }

    pub fn with_indices(mut self, indices: Vec<u32>) -> Self {
        self.indices = indices;
        self
    }

    pub fn with_normals(mut self, normals: Vec<[f32; 3]>) -> Self {
        self.normals = Some(normals);
        self
    }

    pub fn with_tex_coords(mut self, uvs: Vec<[f32; 2]>) -> Self {
        self.tex_coords.push(uvs);
        self
    }

    pub fn with_colors(mut self, colors: VertexColors) -> Self {
        self.colors.push(colors);
        self
    }

    pub fn with_tangents(mut self, tangents: Vec<[f32; 4]>) -> Self {
        self.tangents = Some(tangents);
        self
    }

    pub fn with_material(mut self, material: usize) -> Self {
        self.material = Some(material);
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

/// A named mesh holding one or more primitives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
}
