//! Conversion orchestration.
//!
//! Walks an asset's materials and primitives, builds the shading networks
//! and canonical submeshes, and collects every recovered failure into a
//! [`ConversionReport`]. A failure only ever drops the unit it occurred in.

use crate::config::ConvertOptions;
use crate::error::{BridgeError, Diagnostic, DiagnosticKind};
use crate::geometry::{build_submesh, CanonicalSubmesh, Primitive, SourceMesh, SubmeshRequest};
use crate::image_info::ImageMetadataMap;
use crate::material::Material;
use crate::naming::{self, NameRegistry};
use crate::shading::{build_network, build_preview, PreviewMaterial, ShadingNetwork, SkippedInput};
use crate::texture::TextureRef;
use serde::Serialize;
use std::collections::HashMap;

/// Decoded meshes and materials of a source asset.
#[derive(Debug, Clone, Default)]
pub struct Asset {
    pub meshes: Vec<SourceMesh>,
    pub materials: Vec<Material>,
}

/// A canonical submesh and the material bound to it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundSubmesh {
    /// Prim name, unique within its mesh.
    pub name: String,
    pub submesh: CanonicalSubmesh,
    /// Unique name of the bound material.
    pub material: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedMesh {
    /// Unique prim name.
    pub name: String,
    pub submeshes: Vec<BoundSubmesh>,
}

/// Failures recovered from during a conversion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl ConversionReport {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Whether any failure points at a gap in this crate rather than at the
    /// input data.
    pub fn has_internal_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.kind == DiagnosticKind::Internal)
    }

    fn push(&mut self, subject: impl Into<String>, error: &BridgeError) {
        self.diagnostics.push(Diagnostic::from_error(subject, error));
    }
}

/// Everything produced for one asset.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOutput {
    pub meshes: Vec<ConvertedMesh>,
    pub previews: Vec<PreviewMaterial>,
    pub networks: Vec<ShadingNetwork>,
    /// Unique name of each source material, by material index.
    pub material_names: Vec<String>,
    pub report: ConversionReport,
}

/// Single-threaded conversion pass over one asset.
pub struct Converter<'a> {
    options: ConvertOptions,
    images: &'a ImageMetadataMap,
    /// Mesh prims and materials live under different scopes, so their
    /// names never collide with each other.
    mesh_names: NameRegistry,
    material_names: NameRegistry,
    /// Whether each material's network reads tangent frames, by material index.
    reads_tangents: Vec<bool>,
    /// Tangent-free variants built so far, by material index.
    tangent_free: HashMap<usize, String>,
}

impl<'a> Converter<'a> {
    pub fn new(options: ConvertOptions, images: &'a ImageMetadataMap) -> Self {
        Self {
            options,
            images,
            mesh_names: NameRegistry::new(),
            material_names: NameRegistry::new(),
            reads_tangents: Vec::new(),
            tangent_free: HashMap::new(),
        }
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    pub fn convert(mut self, asset: &Asset) -> ConversionOutput {
        let mut output = ConversionOutput::default();
        for material in &asset.materials {
            self.convert_material(material, &mut output);
        }
        for mesh in &asset.meshes {
            let converted = self.convert_mesh(mesh, asset, &mut output);
            output.meshes.push(converted);
        }
        log::debug!(
            "converted {} meshes and {} materials with {} diagnostics",
            output.meshes.len(),
            output.material_names.len(),
            output.report.diagnostics.len()
        );
        output
    }

    fn record_skipped(report: &mut ConversionReport, material: &str, skipped: Vec<SkippedInput>) {
        for s in skipped {
            report.push(format!("material {} input {}", material, s.input), &s.error);
        }
    }

    /// Emit the enabled material forms of `material` under `name`. Returns
    /// whether the emitted network reads tangent frames.
    fn emit_material(&self, material: &Material, name: &str, output: &mut ConversionOutput) -> bool {
        if self.options.emit_preview_surface {
            let built = build_preview(material, name, self.images);
            Self::record_skipped(&mut output.report, name, built.skipped);
            output.previews.push(built.material);
        }

        if !self.options.emit_node_graph {
            return false;
        }
        let built = build_network(material, name, self.images, &self.options);
        Self::record_skipped(&mut output.report, name, built.skipped);
        match built.network.validate() {
            Ok(()) => {
                let reads_tangents = built.network.reads_geomprop(naming::TANGENTS);
                output.networks.push(built.network);
                reads_tangents
            }
            Err(e) => {
                output.report.push(format!("material {}", name), &e);
                false
            }
        }
    }

    fn convert_material(&mut self, material: &Material, output: &mut ConversionOutput) {
        let name = self.material_names.make_unique_material_name(material.name.as_deref());
        let reads_tangents = self.emit_material(material, &name, output);
        self.reads_tangents.push(reads_tangents);
        output.material_names.push(name);
    }

    /// Variant of material `index` without normal maps or anisotropy, for
    /// submeshes that ended up without tangents. Built on first use.
    fn tangent_free_material(
        &mut self,
        index: usize,
        material: &Material,
        name: &str,
        output: &mut ConversionOutput,
    ) -> String {
        if let Some(existing) = self.tangent_free.get(&index) {
            return existing.clone();
        }
        let variant = self
            .material_names
            .make_unique_material_name(Some(&format!("{}_no_tangents", name)));
        self.emit_material(&material.without_tangent_inputs(), &variant, output);
        self.tangent_free.insert(index, variant.clone());
        variant
    }

    /// UV set to generate tangents on. The first normal texture with image
    /// metadata decides it; anisotropy alone falls back to its texture's set.
    fn tangent_uv_set(&self, primitive: &Primitive, material: Option<&Material>) -> Option<usize> {
        if !self.options.wants_tangents() {
            return None;
        }
        let material = material?;
        let clearcoat_normal = material.clearcoat.as_ref().and_then(|c| c.normal.as_ref());
        let normal = material
            .normal_texture()
            .into_iter()
            .chain(clearcoat_normal.map(|n| &n.texture))
            .find(|t| t.resolve(self.images).is_some());
        let uv_set = match (normal, &material.anisotropy) {
            (Some(texture), _) => texture.uv_set(),
            (None, Some(anisotropy)) => anisotropy.texture.as_ref().map_or(0, TextureRef::uv_set),
            (None, None) => return None,
        };
        if uv_set >= primitive.tex_coords.len() {
            log::warn!("tangent frames need UV set {} which the primitive lacks", uv_set);
            return None;
        }
        Some(uv_set)
    }

    fn convert_mesh(&mut self, mesh: &SourceMesh, asset: &Asset, output: &mut ConversionOutput) -> ConvertedMesh {
        let name = self.mesh_names.make_unique(mesh.name.as_deref().unwrap_or("mesh"));
        let mut submeshes = Vec::with_capacity(mesh.primitives.len());

        for (index, primitive) in mesh.primitives.iter().enumerate() {
            let subject = format!("mesh {} primitive {}", name, index);
            let material_index = primitive.material.filter(|&m| {
                let exists = m < asset.materials.len();
                if !exists {
                    log::warn!("{}: material {} does not exist", subject, m);
                }
                exists
            });
            let material = material_index.map(|m| &asset.materials[m]);

            let request = SubmeshRequest {
                tangent_uv_set: self.tangent_uv_set(primitive, material),
                fill_color_defaults: self.options.emit_node_graph,
                double_sided: material.is_some_and(|m| m.double_sided),
            };
            match build_submesh(primitive, &request) {
                Ok(outcome) => {
                    if let Err(e) = outcome.submesh.validate() {
                        output.report.push(subject, &e);
                        continue;
                    }
                    if let Some(e) = outcome.tangent_error {
                        output.report.diagnostics.push(Diagnostic {
                            kind: DiagnosticKind::InputData,
                            subject: subject.clone(),
                            message: BridgeError::Tangent(e).to_string(),
                        });
                    }
                    let mut bound = material_index.and_then(|m| Some((m, output.material_names.get(m)?.clone())));
                    if let Some((m, material_name)) = &mut bound {
                        let reads_tangents = self.reads_tangents.get(*m).copied().unwrap_or(false);
                        if reads_tangents && !outcome.submesh.has_tangents() {
                            let variant = self.tangent_free_material(*m, &asset.materials[*m], material_name, output);
                            log::warn!("{}: no tangents for material {}, binding {}", subject, material_name, variant);
                            *material_name = variant;
                        }
                    }
                    submeshes.push(BoundSubmesh {
                        name: format!("prim_{}", index),
                        submesh: outcome.submesh,
                        material: bound.map(|(_, name)| name),
                    });
                }
                Err(e) => output.report.push(subject, &e),
            }
        }

        ConvertedMesh { name, submeshes }
    }
}
