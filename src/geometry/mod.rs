//! Geometry normalization.
//!
//! Converts source primitives into canonical submeshes: face arrays from
//! draw modes, flat normals where none are authored, per-corner tangent
//! frames for normal mapping, and the deindexing that keeps every
//! attribute aligned when per-face data is introduced.

pub mod attribute;
pub mod deindex;
pub mod normals;
pub mod primitive;
pub mod submesh;
pub mod tangents;
pub mod topology;

pub use attribute::{Attribute, AttributeData, Interpolation, Provenance};
pub use deindex::deindex;
pub use primitive::{Primitive, SourceMesh, VertexColors};
pub use submesh::{build_submesh, CanonicalSubmesh, SubmeshOutcome, SubmeshRequest};
pub use tangents::{generate_tangents, IndexedTriangles, NormalLookup, TangentError, VertexDataProvider};
pub use topology::{normalize_topology, FaceTopology, TopologyMode};
