//! Conversion output formats.
//!
//! USDA/USDZ layers for meshes and preview materials, and the MaterialX
//! document holding the node-graph materials they reference.

pub mod mtlx;
pub mod usda;

pub use mtlx::export_mtlx;
pub use usda::{export_usda, export_usdz, UsdzFile};
