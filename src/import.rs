//! glTF JSON import.
//!
//! The document structure (meshes, accessors, buffer views, textures and
//! samplers) is read through `gltf-json`. Material blocks, including the KHR
//! extensions, are parsed from the raw JSON with local serde structs so that
//! every extension is available regardless of which `gltf-json` features are
//! enabled.

use crate::converter::Asset;
use crate::error::{BridgeError, Diagnostic, Result};
use crate::geometry::{Primitive, SourceMesh, TopologyMode, VertexColors};
use crate::image_info::{guess_extension, probe_image, ImageMetadataMap};
use crate::material::{
    AlphaMode, Anisotropy, Clearcoat, ColorParam, Iridescence, Material, NormalTexture, OcclusionTexture,
    PbrMetallicRoughness, ScalarParam, Sheen, Specular, Volume, DEFAULT_ALPHA_CUTOFF, DEFAULT_IOR,
};
use crate::texture::{FilterMode, ImageHandle, Sampler, TextureRef, TextureTransform, WrapMode};
use gltf_json as json;
use json::accessor::{ComponentType, GenericComponentType, Type};
use json::mesh::{Mode, Semantic};
use json::validation::Checked;
use serde::Deserialize;
use std::collections::BTreeMap;

/// A parsed glTF document plus the binary buffers it references.
pub struct GltfDocument {
    root: json::Root,
    raw: serde_json::Value,
    buffers: Vec<Vec<u8>>,
}

fn valid<T: Copy>(checked: &Checked<T>) -> Option<T> {
    match checked {
        Checked::Valid(value) => Some(*value),
        Checked::Invalid => None,
    }
}

fn to_usize(value: u64, what: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| BridgeError::InvalidGltf(format!("{} does not fit in memory", what)))
}

fn component_size(component: ComponentType) -> usize {
    match component {
        ComponentType::I8 | ComponentType::U8 => 1,
        ComponentType::I16 | ComponentType::U16 => 2,
        ComponentType::U32 | ComponentType::F32 => 4,
    }
}

fn type_components(ty: Type) -> usize {
    match ty {
        Type::Scalar => 1,
        Type::Vec2 => 2,
        Type::Vec3 => 3,
        Type::Vec4 | Type::Mat2 => 4,
        Type::Mat3 => 9,
        Type::Mat4 => 16,
    }
}

fn topology_mode(mode: Mode) -> TopologyMode {
    match mode {
        Mode::Points => TopologyMode::Points,
        Mode::Lines => TopologyMode::Lines,
        Mode::LineLoop => TopologyMode::LineLoop,
        Mode::LineStrip => TopologyMode::LineStrip,
        Mode::Triangles => TopologyMode::Triangles,
        Mode::TriangleStrip => TopologyMode::TriangleStrip,
        Mode::TriangleFan => TopologyMode::TriangleFan,
    }
}

/// Byte layout of one accessor inside its buffer view.
struct AccessorData<'a> {
    /// The buffer view's bytes; `None` for accessors without a view,
    /// which read as zeros.
    bytes: Option<&'a [u8]>,
    offset: usize,
    stride: usize,
    count: usize,
    component: ComponentType,
    components: usize,
    normalized: bool,
}

impl AccessorData<'_> {
    fn component_bytes(&self, element: usize, component: usize) -> Option<&[u8]> {
        let size = component_size(self.component);
        let start = self.offset + element * self.stride + component * size;
        self.bytes.map(|b| &b[start..start + size])
    }

    fn read_uint(&self, element: usize, component: usize) -> u32 {
        match self.component_bytes(element, component) {
            None => 0,
            Some(b) => match self.component {
                ComponentType::U8 | ComponentType::I8 => u32::from(b[0]),
                ComponentType::U16 | ComponentType::I16 => u32::from(u16::from_le_bytes([b[0], b[1]])),
                ComponentType::U32 | ComponentType::F32 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            },
        }
    }

    fn read_float(&self, element: usize, component: usize) -> f32 {
        let Some(b) = self.component_bytes(element, component) else {
            return 0.0;
        };
        match self.component {
            ComponentType::F32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            ComponentType::U8 => f32::from(b[0]) / 255.0,
            ComponentType::U16 => f32::from(u16::from_le_bytes([b[0], b[1]])) / 65535.0,
            ComponentType::I8 => (f32::from(b[0] as i8) / 127.0).max(-1.0),
            ComponentType::I16 => (f32::from(i16::from_le_bytes([b[0], b[1]])) / 32767.0).max(-1.0),
            ComponentType::U32 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32,
        }
    }

    fn floats<const N: usize>(&self) -> Vec<[f32; N]> {
        (0..self.count)
            .map(|e| {
                let mut out = [0.0; N];
                for (c, x) in out.iter_mut().enumerate() {
                    *x = self.read_float(e, c);
                }
                out
            })
            .collect()
    }
}

impl GltfDocument {
    /// Parse glTF JSON. `buffers[i]` holds the bytes of buffer `i`.
    pub fn from_json(text: &str, buffers: Vec<Vec<u8>>) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(text)?;
        let root: json::Root = serde_json::from_value(raw.clone())?;
        if buffers.len() < root.buffers.len() {
            return Err(BridgeError::InvalidGltf(format!(
                "document declares {} buffers but {} were supplied",
                root.buffers.len(),
                buffers.len()
            )));
        }
        Ok(Self { root, raw, buffers })
    }

    /// Parse a `.gltf` or `.glb` file. Buffers with a URI are fetched
    /// through `load_uri`; the buffer without one is the GLB BIN chunk.
    pub fn load(data: &[u8], mut load_uri: impl FnMut(&str) -> Result<Vec<u8>>) -> Result<Self> {
        let (text, mut bin) = if data.starts_with(GLB_MAGIC) {
            split_glb(data)?
        } else {
            let text = std::str::from_utf8(data).map_err(|e| BridgeError::InvalidGltf(format!("glTF JSON: {}", e)))?;
            (text, None)
        };
        let raw: serde_json::Value = serde_json::from_str(text)?;
        let root: json::Root = serde_json::from_value(raw.clone())?;

        let mut buffers = Vec::with_capacity(root.buffers.len());
        for (i, buffer) in root.buffers.iter().enumerate() {
            let data = match buffer.uri.as_deref() {
                Some(uri) if uri.starts_with("data:") => {
                    return Err(BridgeError::InvalidGltf(format!("buffer {} uses a data URI, which is not supported", i)));
                }
                Some(uri) => load_uri(uri)?,
                None => bin
                    .take()
                    .ok_or_else(|| BridgeError::InvalidGltf(format!("buffer {} has no data", i)))?
                    .to_vec(),
            };
            buffers.push(data);
        }
        Ok(Self { root, raw, buffers })
    }

    pub fn image_count(&self) -> usize {
        self.root.images.len()
    }

    pub fn mesh_count(&self) -> usize {
        self.root.meshes.len()
    }

    pub fn primitive_count(&self, mesh: usize) -> usize {
        self.root.meshes.get(mesh).map_or(0, |m| m.primitives.len())
    }

    pub fn mesh_name(&self, mesh: usize) -> Option<&str> {
        self.raw["meshes"][mesh]["name"].as_str()
    }

    fn accessor_data(&self, index: usize) -> Result<AccessorData<'_>> {
        let accessor = self
            .root
            .accessors
            .get(index)
            .ok_or_else(|| BridgeError::InvalidGltf(format!("accessor {} does not exist", index)))?;
        if accessor.sparse.is_some() {
            return Err(BridgeError::InvalidGltf(format!("accessor {} is sparse, which is not supported", index)));
        }
        let GenericComponentType(component) = valid(&accessor.component_type)
            .ok_or_else(|| BridgeError::InvalidGltf(format!("accessor {} has an invalid component type", index)))?;
        let ty = valid(&accessor.type_)
            .ok_or_else(|| BridgeError::InvalidGltf(format!("accessor {} has an invalid type", index)))?;
        let components = type_components(ty);
        let count = to_usize(accessor.count.0, "accessor count")?;
        let element_size = component_size(component) * components;

        let Some(view_index) = accessor.buffer_view else {
            return Ok(AccessorData {
                bytes: None,
                offset: 0,
                stride: element_size,
                count,
                component,
                components,
                normalized: accessor.normalized,
            });
        };
        let view = self
            .root
            .buffer_views
            .get(view_index.value())
            .ok_or_else(|| BridgeError::InvalidGltf(format!("buffer view {} does not exist", view_index.value())))?;
        let buffer = self
            .buffers
            .get(view.buffer.value())
            .ok_or_else(|| BridgeError::InvalidGltf(format!("buffer {} does not exist", view.buffer.value())))?;

        let view_offset = to_usize(view.byte_offset.map_or(0, |o| o.0), "buffer view offset")?;
        let view_length = to_usize(view.byte_length.0, "buffer view length")?;
        let offset = to_usize(accessor.byte_offset.map_or(0, |o| o.0), "accessor offset")?;
        let stride = match view.byte_stride {
            Some(stride) => usize::try_from(stride.0)
                .map_err(|_| BridgeError::InvalidGltf("byte stride does not fit in memory".into()))?,
            None => element_size,
        };
        if stride < element_size {
            return Err(BridgeError::InvalidGltf(format!(
                "accessor {} has stride {} smaller than its element size {}",
                index, stride, element_size
            )));
        }

        let view_end = view_offset
            .checked_add(view_length)
            .filter(|end| *end <= buffer.len())
            .ok_or_else(|| BridgeError::InvalidGltf(format!("buffer view {} exceeds its buffer", view_index.value())))?;
        let needed = match count {
            0 => Some(offset),
            n => stride
                .checked_mul(n - 1)
                .and_then(|s| s.checked_add(offset))
                .and_then(|s| s.checked_add(element_size)),
        };
        if needed.map_or(true, |n| n > view_length) {
            return Err(BridgeError::InvalidGltf(format!("accessor {} reads past its buffer view", index)));
        }

        Ok(AccessorData {
            bytes: Some(&buffer[view_offset..view_end]),
            offset,
            stride,
            count,
            component,
            components,
            normalized: accessor.normalized,
        })
    }

    /// Read a float attribute, accepting normalized integers when
    /// `allow_normalized` is set.
    fn float_accessor(&self, index: usize, name: &str, components: &[usize], allow_normalized: bool) -> Result<AccessorData<'_>> {
        let data = self.accessor_data(index)?;
        if !components.contains(&data.components) {
            return Err(BridgeError::InvalidGltf(format!(
                "{} accessor has {} components",
                name, data.components
            )));
        }
        let ok = match data.component {
            ComponentType::F32 => true,
            ComponentType::U8 | ComponentType::U16 => allow_normalized && data.normalized,
            _ => false,
        };
        if !ok {
            return Err(BridgeError::InvalidGltf(format!(
                "{} accessor has unsupported component type {:?}",
                name, data.component
            )));
        }
        Ok(data)
    }

    fn read_indices(&self, index: usize) -> Result<Vec<u32>> {
        let data = self.accessor_data(index)?;
        if data.components != 1 || data.normalized {
            return Err(BridgeError::InvalidGltf("index accessor must hold plain scalars".into()));
        }
        match data.component {
            ComponentType::U8 | ComponentType::U16 | ComponentType::U32 => {}
            other => {
                return Err(BridgeError::InvalidGltf(format!("unsupported index component type {:?}", other)));
            }
        }
        Ok((0..data.count).map(|e| data.read_uint(e, 0)).collect())
    }

    /// Decode one primitive of a mesh.
    pub fn primitive(&self, mesh: usize, index: usize) -> Result<Primitive> {
        let source = self
            .root
            .meshes
            .get(mesh)
            .and_then(|m| m.primitives.get(index))
            .ok_or_else(|| BridgeError::InvalidGltf(format!("mesh {} has no primitive {}", mesh, index)))?;
        let mode = valid(&source.mode)
            .map(topology_mode)
            .ok_or_else(|| BridgeError::InvalidGltf("invalid primitive mode".into()))?;

        let mut positions = None;
        let mut normals = None;
        let mut tangents = None;
        let mut tex_coords = BTreeMap::new();
        let mut colors = BTreeMap::new();
        for (semantic, accessor) in &source.attributes {
            let accessor = accessor.value();
            match semantic {
                Checked::Valid(Semantic::Positions) => {
                    positions = Some(self.float_accessor(accessor, "POSITION", &[3], false)?.floats::<3>());
                }
                Checked::Valid(Semantic::Normals) => {
                    normals = Some(self.float_accessor(accessor, "NORMAL", &[3], false)?.floats::<3>());
                }
                Checked::Valid(Semantic::Tangents) => {
                    tangents = Some(self.float_accessor(accessor, "TANGENT", &[4], false)?.floats::<4>());
                }
                Checked::Valid(Semantic::TexCoords(set)) => {
                    let data = self.float_accessor(accessor, "TEXCOORD", &[2], true)?;
                    tex_coords.insert(*set, data.floats::<2>());
                }
                Checked::Valid(Semantic::Colors(set)) => {
                    let data = self.float_accessor(accessor, "COLOR", &[3, 4], true)?;
                    let set_colors = if data.components == 3 {
                        VertexColors::Rgb(data.floats::<3>())
                    } else {
                        VertexColors::Rgba(data.floats::<4>())
                    };
                    colors.insert(*set, set_colors);
                }
                _ => {}
            }
        }

        let positions = positions.ok_or(BridgeError::MissingAttribute("POSITION"))?;
        let mut primitive = Primitive::new(mode, positions);
        if let Some(indices) = source.indices {
            primitive.indices = self.read_indices(indices.value())?;
        }
        primitive.normals = normals;
        primitive.tangents = tangents;
        primitive.tex_coords = contiguous_sets(tex_coords, "TEXCOORD");
        primitive.colors = contiguous_sets(colors, "COLOR");
        primitive.material = source.material.map(|m| m.value());
        Ok(primitive)
    }

    fn sampler(&self, index: Option<json::Index<json::texture::Sampler>>) -> Sampler {
        let Some(sampler) = index.and_then(|i| self.root.samplers.get(i.value())) else {
            return Sampler::default();
        };
        Sampler {
            mag_filter: sampler
                .mag_filter
                .as_ref()
                .and_then(valid)
                .and_then(|f| FilterMode::from_gl(f.as_gl_enum())),
            min_filter: sampler
                .min_filter
                .as_ref()
                .and_then(valid)
                .and_then(|f| FilterMode::from_gl(f.as_gl_enum())),
            wrap_s: valid(&sampler.wrap_s)
                .and_then(|w| WrapMode::from_gl(w.as_gl_enum()))
                .unwrap_or_default(),
            wrap_t: valid(&sampler.wrap_t)
                .and_then(|w| WrapMode::from_gl(w.as_gl_enum()))
                .unwrap_or_default(),
        }
    }

    fn texture_ref(&self, info: &TextureInfoDef) -> Option<TextureRef> {
        let Some(texture) = self.root.textures.get(info.index) else {
            log::warn!("texture {} does not exist, using the constant factor", info.index);
            return None;
        };
        Some(TextureRef {
            image: ImageHandle(texture.source.value()),
            tex_coord: info.tex_coord,
            sampler: self.sampler(texture.sampler),
            transform: info.extensions.texture_transform,
        })
    }

    fn scalar(&self, factor: f32, texture: &Option<TextureInfoDef>) -> ScalarParam {
        ScalarParam {
            factor,
            texture: texture.as_ref().and_then(|t| self.texture_ref(t)),
        }
    }

    fn color(&self, factor: [f32; 3], texture: &Option<TextureInfoDef>) -> ColorParam {
        ColorParam {
            factor,
            texture: texture.as_ref().and_then(|t| self.texture_ref(t)),
        }
    }

    fn normal(&self, info: &Option<TextureInfoDef>) -> Option<NormalTexture> {
        let info = info.as_ref()?;
        Some(NormalTexture {
            texture: self.texture_ref(info)?,
            scale: info.scale,
        })
    }

    fn material(&self, def: MaterialDef) -> Material {
        let ext = &def.extensions;
        let emissive = (def.emissive_factor.is_some() || def.emissive_texture.is_some())
            .then(|| self.color(def.emissive_factor.unwrap_or([0.0; 3]), &def.emissive_texture));
        Material {
            name: def.name.clone(),
            alpha_mode: def.alpha_mode,
            alpha_cutoff: def.alpha_cutoff,
            double_sided: def.double_sided,
            unlit: ext.unlit.is_some(),
            pbr: def.pbr_metallic_roughness.as_ref().map(|pbr| PbrMetallicRoughness {
                base_color_factor: pbr.base_color_factor,
                base_color_texture: pbr.base_color_texture.as_ref().and_then(|t| self.texture_ref(t)),
                metallic_factor: pbr.metallic_factor,
                roughness_factor: pbr.roughness_factor,
                metallic_roughness_texture: pbr.metallic_roughness_texture.as_ref().and_then(|t| self.texture_ref(t)),
            }),
            emissive,
            emissive_strength: ext.emissive_strength.as_ref().map(|e| e.emissive_strength),
            normal: self.normal(&def.normal_texture),
            occlusion: def.occlusion_texture.as_ref().and_then(|info| {
                Some(OcclusionTexture {
                    texture: self.texture_ref(info)?,
                    strength: info.strength,
                })
            }),
            clearcoat: ext.clearcoat.as_ref().map(|c| Clearcoat {
                factor: self.scalar(c.clearcoat_factor, &c.clearcoat_texture),
                roughness: self.scalar(c.clearcoat_roughness_factor, &c.clearcoat_roughness_texture),
                normal: self.normal(&c.clearcoat_normal_texture),
            }),
            transmission: ext
                .transmission
                .as_ref()
                .map(|t| self.scalar(t.transmission_factor, &t.transmission_texture)),
            volume: ext.volume.as_ref().map(|v| Volume {
                thickness: self.scalar(v.thickness_factor, &v.thickness_texture),
                attenuation_distance: v.attenuation_distance,
                attenuation_color: v.attenuation_color,
            }),
            ior: ext.ior.as_ref().map(|i| i.ior),
            specular: ext.specular.as_ref().map(|s| Specular {
                factor: self.scalar(s.specular_factor, &s.specular_texture),
                color: self.color(s.specular_color_factor, &s.specular_color_texture),
            }),
            sheen: ext.sheen.as_ref().map(|s| Sheen {
                color: self.color(s.sheen_color_factor, &s.sheen_color_texture),
                roughness: self.scalar(s.sheen_roughness_factor, &s.sheen_roughness_texture),
            }),
            iridescence: ext.iridescence.as_ref().map(|i| Iridescence {
                factor: self.scalar(i.iridescence_factor, &i.iridescence_texture),
                ior: i.iridescence_ior,
                thickness_minimum: i.iridescence_thickness_minimum,
                thickness_maximum: i.iridescence_thickness_maximum,
                thickness_texture: i
                    .iridescence_thickness_texture
                    .as_ref()
                    .and_then(|t| self.texture_ref(t)),
            }),
            anisotropy: ext.anisotropy.as_ref().map(|a| Anisotropy {
                strength: a.anisotropy_strength,
                rotation: a.anisotropy_rotation,
                texture: a.anisotropy_texture.as_ref().and_then(|t| self.texture_ref(t)),
            }),
        }
    }

    /// Parse every material, in document order.
    pub fn materials(&self) -> Result<Vec<Material>> {
        let defs: Vec<MaterialDef> = match self.raw.get("materials") {
            Some(materials) => serde_json::from_value(materials.clone())?,
            None => Vec::new(),
        };
        Ok(defs.into_iter().map(|def| self.material(def)).collect())
    }

    /// Bytes of an image stored in a buffer view. `None` for images
    /// referenced by URI.
    pub fn image_data(&self, image: ImageHandle) -> Result<Option<&[u8]>> {
        let source = self
            .root
            .images
            .get(image.0)
            .ok_or_else(|| BridgeError::InvalidGltf(format!("image {} does not exist", image.0)))?;
        let Some(view_index) = source.buffer_view else {
            return Ok(None);
        };
        let view = self
            .root
            .buffer_views
            .get(view_index.value())
            .ok_or_else(|| BridgeError::InvalidGltf(format!("buffer view {} does not exist", view_index.value())))?;
        let buffer = self
            .buffers
            .get(view.buffer.value())
            .ok_or_else(|| BridgeError::InvalidGltf(format!("buffer {} does not exist", view.buffer.value())))?;
        let start = to_usize(view.byte_offset.map_or(0, |o| o.0), "buffer view offset")?;
        let end = start
            .checked_add(to_usize(view.byte_length.0, "buffer view length")?)
            .ok_or_else(|| BridgeError::InvalidGltf(format!("buffer view {} overflows", view_index.value())))?;
        buffer
            .get(start..end)
            .map(Some)
            .ok_or_else(|| BridgeError::InvalidGltf(format!("buffer view {} exceeds its buffer", view_index.value())))
    }

    pub fn image_uri(&self, image: ImageHandle) -> Option<&str> {
        self.root.images.get(image.0)?.uri.as_deref()
    }

    /// Probe every image embedded in a buffer view. Embedded images are
    /// named `image{index}.{ext}`; images that fail to decode are skipped.
    pub fn embedded_image_metadata(&self) -> ImageMetadataMap {
        let mut map = ImageMetadataMap::new();
        for index in 0..self.root.images.len() {
            let handle = ImageHandle(index);
            let data = match self.image_data(handle) {
                Ok(Some(data)) => data,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("image {}: {}", index, e);
                    continue;
                }
            };
            let Some(ext) = guess_extension(data) else {
                log::warn!("image {} has an unsupported format", index);
                continue;
            };
            match probe_image(data, &format!("image{}.{}", index, ext)) {
                Ok(metadata) => {
                    map.insert(handle, metadata);
                }
                Err(e) => log::warn!("image {}: {}", index, e),
            }
        }
        map
    }

    /// Collect all meshes and materials. Primitives that fail to decode are
    /// left out and reported.
    pub fn to_asset(&self) -> (Asset, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let materials = self.materials().unwrap_or_else(|e| {
            diagnostics.push(Diagnostic::from_error("materials", &e));
            Vec::new()
        });
        let mut meshes = Vec::with_capacity(self.mesh_count());
        for mesh in 0..self.mesh_count() {
            let name = self.mesh_name(mesh).map(str::to_string);
            let mut primitives = Vec::new();
            for index in 0..self.primitive_count(mesh) {
                match self.primitive(mesh, index) {
                    Ok(p) => primitives.push(p),
                    Err(e) => diagnostics.push(Diagnostic::from_error(
                        format!("mesh {} primitive {}", name.as_deref().unwrap_or("<unnamed>"), index),
                        &e,
                    )),
                }
            }
            meshes.push(SourceMesh { name, primitives });
        }
        (Asset { meshes, materials }, diagnostics)
    }
}

const GLB_MAGIC: &[u8] = b"glTF";
const GLB_CHUNK_JSON: u32 = 0x4E4F_534A;
const GLB_CHUNK_BIN: u32 = 0x004E_4942;

/// Split a GLB container into its JSON text and optional BIN chunk.
fn split_glb(data: &[u8]) -> Result<(&str, Option<&[u8]>)> {
    let read_u32 = |offset: usize| -> Result<u32> {
        data.get(offset..offset + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .ok_or_else(|| BridgeError::InvalidGltf("truncated GLB".into()))
    };
    let version = read_u32(4)?;
    if version != 2 {
        return Err(BridgeError::InvalidGltf(format!("unsupported GLB version {}", version)));
    }
    let total = (read_u32(8)? as usize).min(data.len());

    let mut json = None;
    let mut bin = None;
    let mut offset = 12;
    while offset + 8 <= total {
        let length = read_u32(offset)? as usize;
        let kind = read_u32(offset + 4)?;
        let chunk = data
            .get(offset + 8..offset + 8 + length)
            .ok_or_else(|| BridgeError::InvalidGltf("GLB chunk exceeds the file".into()))?;
        match kind {
            GLB_CHUNK_JSON if json.is_none() => json = Some(chunk),
            GLB_CHUNK_BIN if bin.is_none() => bin = Some(chunk),
            _ => {}
        }
        offset += 8 + length;
    }

    let json = json.ok_or_else(|| BridgeError::InvalidGltf("GLB has no JSON chunk".into()))?;
    let text = std::str::from_utf8(json).map_err(|e| BridgeError::InvalidGltf(format!("GLB JSON chunk: {}", e)))?;
    Ok((text, bin))
}

/// Keep sets 0..n; a gap drops every later set.
fn contiguous_sets<T>(sets: BTreeMap<u32, T>, name: &str) -> Vec<T> {
    let mut out = Vec::with_capacity(sets.len());
    for (i, (set, value)) in sets.into_iter().enumerate() {
        if set as usize != i {
            log::warn!("{}_{} skipped: set {} is missing", name, set, i);
            break;
        }
        out.push(value);
    }
    out
}

fn one() -> f32 {
    1.0
}

fn ones() -> [f32; 3] {
    [1.0; 3]
}

fn ones4() -> [f32; 4] {
    [1.0; 4]
}

fn infinity() -> f32 {
    f32::INFINITY
}

fn alpha_cutoff() -> f32 {
    DEFAULT_ALPHA_CUTOFF
}

fn ior() -> f32 {
    DEFAULT_IOR
}

fn iridescence_ior() -> f32 {
    1.3
}

fn thickness_minimum() -> f32 {
    100.0
}

fn thickness_maximum() -> f32 {
    400.0
}

#[derive(Debug, Default, Deserialize)]
struct TextureInfoExtensions {
    #[serde(rename = "KHR_texture_transform")]
    texture_transform: Option<TextureTransform>,
}

/// `textureInfo`, `normalTextureInfo` and `occlusionTextureInfo` in one.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextureInfoDef {
    index: usize,
    #[serde(default)]
    tex_coord: usize,
    #[serde(default = "one")]
    scale: f32,
    #[serde(default = "one")]
    strength: f32,
    #[serde(default)]
    extensions: TextureInfoExtensions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PbrDef {
    #[serde(default = "ones4")]
    base_color_factor: [f32; 4],
    base_color_texture: Option<TextureInfoDef>,
    #[serde(default = "one")]
    metallic_factor: f32,
    #[serde(default = "one")]
    roughness_factor: f32,
    metallic_roughness_texture: Option<TextureInfoDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmissiveStrengthDef {
    #[serde(default = "one")]
    emissive_strength: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClearcoatDef {
    #[serde(default)]
    clearcoat_factor: f32,
    clearcoat_texture: Option<TextureInfoDef>,
    #[serde(default)]
    clearcoat_roughness_factor: f32,
    clearcoat_roughness_texture: Option<TextureInfoDef>,
    clearcoat_normal_texture: Option<TextureInfoDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransmissionDef {
    #[serde(default)]
    transmission_factor: f32,
    transmission_texture: Option<TextureInfoDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeDef {
    #[serde(default)]
    thickness_factor: f32,
    thickness_texture: Option<TextureInfoDef>,
    #[serde(default = "infinity")]
    attenuation_distance: f32,
    #[serde(default = "ones")]
    attenuation_color: [f32; 3],
}

#[derive(Debug, Deserialize)]
struct IorDef {
    #[serde(default = "ior")]
    ior: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpecularDef {
    #[serde(default = "one")]
    specular_factor: f32,
    specular_texture: Option<TextureInfoDef>,
    #[serde(default = "ones")]
    specular_color_factor: [f32; 3],
    specular_color_texture: Option<TextureInfoDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheenDef {
    #[serde(default)]
    sheen_color_factor: [f32; 3],
    sheen_color_texture: Option<TextureInfoDef>,
    #[serde(default)]
    sheen_roughness_factor: f32,
    sheen_roughness_texture: Option<TextureInfoDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IridescenceDef {
    #[serde(default)]
    iridescence_factor: f32,
    iridescence_texture: Option<TextureInfoDef>,
    #[serde(default = "iridescence_ior")]
    iridescence_ior: f32,
    #[serde(default = "thickness_minimum")]
    iridescence_thickness_minimum: f32,
    #[serde(default = "thickness_maximum")]
    iridescence_thickness_maximum: f32,
    iridescence_thickness_texture: Option<TextureInfoDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnisotropyDef {
    #[serde(default)]
    anisotropy_strength: f32,
    #[serde(default)]
    anisotropy_rotation: f32,
    anisotropy_texture: Option<TextureInfoDef>,
}

#[derive(Debug, Default, Deserialize)]
struct MaterialExtensionsDef {
    #[serde(rename = "KHR_materials_unlit")]
    unlit: Option<serde_json::Value>,
    #[serde(rename = "KHR_materials_emissive_strength")]
    emissive_strength: Option<EmissiveStrengthDef>,
    #[serde(rename = "KHR_materials_clearcoat")]
    clearcoat: Option<ClearcoatDef>,
    #[serde(rename = "KHR_materials_transmission")]
    transmission: Option<TransmissionDef>,
    #[serde(rename = "KHR_materials_volume")]
    volume: Option<VolumeDef>,
    #[serde(rename = "KHR_materials_ior")]
    ior: Option<IorDef>,
    #[serde(rename = "KHR_materials_specular")]
    specular: Option<SpecularDef>,
    #[serde(rename = "KHR_materials_sheen")]
    sheen: Option<SheenDef>,
    #[serde(rename = "KHR_materials_iridescence")]
    iridescence: Option<IridescenceDef>,
    #[serde(rename = "KHR_materials_anisotropy")]
    anisotropy: Option<AnisotropyDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MaterialDef {
    name: Option<String>,
    pbr_metallic_roughness: Option<PbrDef>,
    normal_texture: Option<TextureInfoDef>,
    occlusion_texture: Option<TextureInfoDef>,
    emissive_texture: Option<TextureInfoDef>,
    emissive_factor: Option<[f32; 3]>,
    #[serde(default)]
    alpha_mode: AlphaMode,
    #[serde(default = "alpha_cutoff")]
    alpha_cutoff: f32,
    #[serde(default)]
    double_sided: bool,
    #[serde(default)]
    extensions: MaterialExtensionsDef,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_f32s(buffer: &mut Vec<u8>, values: &[f32]) {
        for v in values {
            buffer.extend_from_slice(&v.to_le_bytes());
        }
    }

    /// One triangle: positions at 0 (36 bytes), u16 indices at 36 (6 bytes,
    /// padded to 8), u8 normalized UVs at 44 (stride 4).
    fn triangle_buffer() -> Vec<u8> {
        let mut buffer = Vec::new();
        push_f32s(&mut buffer, &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        for i in [0u16, 1, 2, 0] {
            buffer.extend_from_slice(&i.to_le_bytes());
        }
        buffer.extend_from_slice(&[0, 0, 0, 0, 255, 0, 0, 0, 0, 255, 0, 0]);
        buffer
    }

    const TRIANGLE: &str = r#"{
        "asset": {"version": "2.0"},
        "buffers": [{"byteLength": 56}],
        "bufferViews": [
            {"buffer": 0, "byteOffset": 0, "byteLength": 36},
            {"buffer": 0, "byteOffset": 36, "byteLength": 6},
            {"buffer": 0, "byteOffset": 44, "byteLength": 12, "byteStride": 4}
        ],
        "accessors": [
            {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3"},
            {"bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR"},
            {"bufferView": 2, "componentType": 5121, "normalized": true, "count": 3, "type": "VEC2"}
        ],
        "meshes": [{
            "name": "Tri",
            "primitives": [{
                "attributes": {"POSITION": 0, "TEXCOORD_0": 2},
                "indices": 1,
                "material": 0
            }]
        }],
        "images": [{"uri": "base.png"}],
        "samplers": [{"magFilter": 9728, "minFilter": 9987, "wrapS": 33071}],
        "textures": [{"source": 0, "sampler": 0}],
        "materials": [{
            "name": "Painted",
            "pbrMetallicRoughness": {
                "baseColorFactor": [1.0, 0.5, 0.25, 1.0],
                "baseColorTexture": {
                    "index": 0,
                    "extensions": {"KHR_texture_transform": {"offset": [0.5, 0.0], "texCoord": 1}}
                }
            },
            "normalTexture": {"index": 0, "scale": 0.5},
            "alphaMode": "MASK",
            "extensions": {
                "KHR_materials_unlit": {},
                "KHR_materials_ior": {"ior": 1.4},
                "KHR_materials_emissive_strength": {"emissiveStrength": 3.0},
                "KHR_materials_volume": {"thicknessFactor": 0.2},
                "KHR_materials_iridescence": {"iridescenceFactor": 1.0},
                "KHR_materials_anisotropy": {"anisotropyStrength": 0.6, "anisotropyTexture": {"index": 0}}
            }
        }, {}]
    }"#;

    fn document() -> GltfDocument {
        GltfDocument::from_json(TRIANGLE, vec![triangle_buffer()]).unwrap()
    }

    #[test]
    fn test_read_primitive() {
        let doc = document();
        assert_eq!(doc.mesh_name(0), Some("Tri"));
        let primitive = doc.primitive(0, 0).unwrap();
        assert_eq!(primitive.mode, TopologyMode::Triangles);
        assert_eq!(primitive.indices, vec![0, 1, 2]);
        assert_eq!(primitive.positions[1], [1.0, 0.0, 0.0]);
        assert_eq!(primitive.tex_coords.len(), 1);
        assert_eq!(primitive.tex_coords[0], vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        assert_eq!(primitive.material, Some(0));
        assert!(primitive.normals.is_none());
    }

    #[test]
    fn test_sparse_rejected() {
        let text = TRIANGLE.replace(
            r#""count": 3, "type": "VEC3"}"#,
            r#""count": 3, "type": "VEC3", "sparse": {"count": 1,
                "indices": {"bufferView": 1, "componentType": 5123},
                "values": {"bufferView": 0}}}"#,
        );
        let doc = GltfDocument::from_json(&text, vec![triangle_buffer()]).unwrap();
        assert!(matches!(doc.primitive(0, 0), Err(BridgeError::InvalidGltf(_))));
    }

    #[test]
    fn test_out_of_bounds_accessor() {
        let text = TRIANGLE.replace(r#""byteOffset": 0, "byteLength": 36"#, r#""byteOffset": 0, "byteLength": 24"#);
        let doc = GltfDocument::from_json(&text, vec![triangle_buffer()]).unwrap();
        assert!(matches!(doc.primitive(0, 0), Err(BridgeError::InvalidGltf(_))));
    }

    #[test]
    fn test_missing_buffers() {
        assert!(GltfDocument::from_json(TRIANGLE, Vec::new()).is_err());
    }

    #[test]
    fn test_materials() {
        let materials = document().materials().unwrap();
        assert_eq!(materials.len(), 2);

        let painted = &materials[0];
        assert_eq!(painted.name.as_deref(), Some("Painted"));
        assert_eq!(painted.alpha_mode, AlphaMode::Mask);
        assert_eq!(painted.alpha_cutoff, DEFAULT_ALPHA_CUTOFF);
        assert!(painted.unlit);
        assert_eq!(painted.ior, Some(1.4));
        assert_eq!(painted.emissive_strength, Some(3.0));
        assert!(painted.emissive.is_none());

        let pbr = painted.pbr.as_ref().unwrap();
        assert_eq!(pbr.base_color_factor, [1.0, 0.5, 0.25, 1.0]);
        assert_eq!(pbr.metallic_factor, 1.0);
        let base = pbr.base_color_texture.as_ref().unwrap();
        assert_eq!(base.image, ImageHandle(0));
        assert_eq!(base.uv_set(), 1);
        assert_eq!(base.sampler.mag_filter, Some(FilterMode::Nearest));
        assert_eq!(base.sampler.min_filter, Some(FilterMode::Linear));
        assert_eq!(base.sampler.wrap_s, WrapMode::ClampToEdge);
        assert_eq!(base.sampler.wrap_t, WrapMode::Repeat);
        let transform = base.transform.unwrap();
        assert_eq!(transform.offset, [0.5, 0.0]);
        assert_eq!(transform.scale, [1.0, 1.0]);

        assert_eq!(painted.normal.as_ref().unwrap().scale, 0.5);
        let volume = painted.volume.as_ref().unwrap();
        assert_eq!(volume.thickness.factor, 0.2);
        assert!(volume.attenuation_distance.is_infinite());
        let iridescence = painted.iridescence.as_ref().unwrap();
        assert_eq!(iridescence.ior, 1.3);
        assert_eq!(iridescence.thickness_maximum, 400.0);
        let anisotropy = painted.anisotropy.as_ref().unwrap();
        assert_eq!(anisotropy.strength, 0.6);
        assert_eq!(anisotropy.rotation, 0.0);
        assert_eq!(anisotropy.texture.as_ref().unwrap().image, ImageHandle(0));

        let empty = &materials[1];
        assert!(empty.pbr.is_none());
        assert!(!empty.unlit);
        assert!(empty.anisotropy.is_none());
        assert_eq!(empty.alpha_mode, AlphaMode::Opaque);
    }

    #[test]
    fn test_missing_texture_dropped() {
        let text = TRIANGLE.replace(r#""normalTexture": {"index": 0"#, r#""normalTexture": {"index": 7"#);
        let doc = GltfDocument::from_json(&text, vec![triangle_buffer()]).unwrap();
        let materials = doc.materials().unwrap();
        assert!(materials[0].normal.is_none());
    }

    #[test]
    fn test_to_asset() {
        let (asset, diagnostics) = document().to_asset();
        assert!(diagnostics.is_empty());
        assert_eq!(asset.meshes.len(), 1);
        assert_eq!(asset.meshes[0].name.as_deref(), Some("Tri"));
        assert_eq!(asset.meshes[0].primitives.len(), 1);
        assert_eq!(asset.materials.len(), 2);
        assert_eq!(document().image_uri(ImageHandle(0)), Some("base.png"));
        assert_eq!(document().image_data(ImageHandle(0)).unwrap(), None);
    }

    #[test]
    fn test_image_view_overflow() {
        let text = TRIANGLE
            .replace(
                r#""byteLength": 12, "byteStride": 4}"#,
                r#""byteLength": 12, "byteStride": 4},
            {"buffer": 0, "byteOffset": 18446744073709551615, "byteLength": 12}"#,
            )
            .replace(r#"[{"uri": "base.png"}]"#, r#"[{"uri": "base.png"}, {"bufferView": 3, "mimeType": "image/png"}]"#);
        let doc = GltfDocument::from_json(&text, vec![triangle_buffer()]).unwrap();
        assert!(matches!(doc.image_data(ImageHandle(1)), Err(BridgeError::InvalidGltf(_))));
        assert!(doc.embedded_image_metadata().is_empty());
    }

    #[test]
    fn test_bad_primitive_reported() {
        let text = TRIANGLE.replace(r#""POSITION": 0, "#, "");
        let doc = GltfDocument::from_json(&text, vec![triangle_buffer()]).unwrap();
        let (asset, diagnostics) = doc.to_asset();
        assert!(asset.meshes[0].primitives.is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].subject, "mesh Tri primitive 0");
    }

    fn glb(json: &str, bin: &[u8]) -> Vec<u8> {
        let mut json = json.as_bytes().to_vec();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        let mut out = Vec::new();
        out.extend_from_slice(b"glTF");
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&((12 + 8 + json.len() + 8 + bin.len()) as u32).to_le_bytes());
        out.extend_from_slice(&(json.len() as u32).to_le_bytes());
        out.extend_from_slice(b"JSON");
        out.extend_from_slice(&json);
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(b"BIN\0");
        out.extend_from_slice(bin);
        out
    }

    fn no_files(uri: &str) -> Result<Vec<u8>> {
        Err(BridgeError::InvalidGltf(format!("unexpected load of {}", uri)))
    }

    #[test]
    fn test_load_glb() {
        let doc = GltfDocument::load(&glb(TRIANGLE, &triangle_buffer()), no_files).unwrap();
        assert_eq!(doc.primitive(0, 0).unwrap().indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_load_external_buffer() {
        let text = TRIANGLE.replace(r#"{"byteLength": 56}"#, r#"{"byteLength": 56, "uri": "tri.bin"}"#);
        let mut requested = Vec::new();
        let doc = GltfDocument::load(text.as_bytes(), |uri| {
            requested.push(uri.to_string());
            Ok(triangle_buffer())
        })
        .unwrap();
        assert_eq!(requested, vec!["tri.bin"]);
        assert_eq!(doc.primitive(0, 0).unwrap().positions.len(), 3);
    }

    #[test]
    fn test_load_rejects_garbage() {
        assert!(GltfDocument::load(b"glTF", no_files).is_err());
        assert!(GltfDocument::load(b"nope nope nope", no_files).is_err());
        // JSON without a BIN chunk for the URI-less buffer
        assert!(GltfDocument::load(TRIANGLE.as_bytes(), no_files).is_err());
    }

    #[test]
    fn test_uv_set_gap() {
        let sets = BTreeMap::from([(0u32, 'a'), (2, 'c')]);
        assert_eq!(contiguous_sets(sets, "TEXCOORD"), vec!['a']);
    }
}
