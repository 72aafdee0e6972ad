//! # glTF USD Bridge
//!
//! A Rust library for converting glTF 2.0 assets into USD geometry and
//! materials.
//!
//! ## Overview
//!
//! Source primitives are normalized into canonical submeshes: every draw
//! mode becomes explicit face arrays, missing normals are generated flat and
//! tangent frames are built for normal-mapped geometry. Each material is
//! turned into a UsdPreviewSurface network and a MaterialX `gltf_pbr` node
//! graph, with channel selection and color space handling that survive the
//! quirks of common USD renderers.
//!
//! ## Quick Start
//!
//! ```ignore
//! use gltf_usd_bridge::{export_mtlx, export_usda, ConvertOptions, Converter, GltfDocument};
//!
//! let doc = GltfDocument::load(&std::fs::read("model.glb")?, |uri| Ok(std::fs::read(uri)?))?;
//! let images = doc.embedded_image_metadata();
//! let (asset, _) = doc.to_asset();
//!
//! let output = Converter::new(ConvertOptions::default(), &images).convert(&asset);
//! let usda = export_usda(&output, "model.mtlx")?;
//! let mtlx = export_mtlx(&output.networks);
//! ```
//!
//! ## Library Integration
//!
//! Callers with their own glTF loader can skip [`import`] and build an
//! [`Asset`] from decoded arrays directly, filling the [`ImageMetadataMap`]
//! through [`probe_image`] or by hand.

pub mod config;
pub mod converter;
pub mod error;
pub mod export;
pub mod geometry;
pub mod image_info;
pub mod import;
pub mod material;
pub mod naming;
pub mod shading;
pub mod texture;

// Re-export main types for convenience
pub use config::{CompatMode, ConvertOptions, GraphLayout, TangentTrigger};
pub use converter::{Asset, ConversionOutput, ConversionReport, Converter};
pub use error::{BridgeError, Diagnostic, DiagnosticKind, Result};
pub use export::{export_mtlx, export_usda, export_usdz, UsdzFile};
pub use geometry::{build_submesh, CanonicalSubmesh, Primitive, SourceMesh, SubmeshRequest, TopologyMode};
pub use image_info::{probe_image, ImageMetadata, ImageMetadataMap};
pub use import::GltfDocument;
pub use material::Material;
pub use shading::{build_network, build_preview, PreviewMaterial, ShadingNetwork};
pub use texture::{ImageHandle, TextureRef};
