//! Parametric glTF material description.
//!
//! Every scalar or color parameter is a factor paired with an optional
//! texture. Extension groups are `Option`s; `None` means the extension is
//! absent and its shading inputs are left at the BRDF defaults.

use crate::texture::TextureRef;
use serde::{Deserialize, Serialize};

/// A float factor with an optional texture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarParam {
    pub factor: f32,
    pub texture: Option<TextureRef>,
}

impl ScalarParam {
    pub fn new(factor: f32) -> Self {
        Self {
            factor,
            texture: None,
        }
    }

    pub fn with_texture(mut self, texture: TextureRef) -> Self {
        self.texture = Some(texture);
        self
    }
}

/// An RGB factor with an optional texture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorParam {
    pub factor: [f32; 3],
    pub texture: Option<TextureRef>,
}

impl ColorParam {
    pub fn new(factor: [f32; 3]) -> Self {
        Self {
            factor,
            texture: None,
        }
    }

    pub fn with_texture(mut self, texture: TextureRef) -> Self {
        self.texture = Some(texture);
        self
    }
}

/// How alpha is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask,
    Blend,
}

impl AlphaMode {
    /// Value of the `gltf_pbr` `alpha_mode` input.
    pub fn mtlx_value(&self) -> i32 {
        match self {
            AlphaMode::Opaque => 0,
            AlphaMode::Mask => 1,
            AlphaMode::Blend => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PbrMetallicRoughness {
    pub base_color_factor: [f32; 4],
    pub base_color_texture: Option<TextureRef>,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    /// Roughness in G, metalness in B.
    pub metallic_roughness_texture: Option<TextureRef>,
}

impl Default for PbrMetallicRoughness {
    fn default() -> Self {
        Self {
            base_color_factor: [1.0; 4],
            base_color_texture: None,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            metallic_roughness_texture: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalTexture {
    pub texture: TextureRef,
    pub scale: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcclusionTexture {
    pub texture: TextureRef,
    pub strength: f32,
}

/// KHR_materials_clearcoat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clearcoat {
    pub factor: ScalarParam,
    pub roughness: ScalarParam,
    pub normal: Option<NormalTexture>,
}

/// KHR_materials_volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub thickness: ScalarParam,
    pub attenuation_distance: f32,
    pub attenuation_color: [f32; 3],
}

/// KHR_materials_specular
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specular {
    pub factor: ScalarParam,
    pub color: ColorParam,
}

/// KHR_materials_sheen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheen {
    pub color: ColorParam,
    pub roughness: ScalarParam,
}

/// KHR_materials_iridescence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iridescence {
    pub factor: ScalarParam,
    pub ior: f32,
    pub thickness_minimum: f32,
    pub thickness_maximum: f32,
    pub thickness_texture: Option<TextureRef>,
}

/// KHR_materials_anisotropy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anisotropy {
    pub strength: f32,
    /// Radians, counter-clockwise from the tangent.
    pub rotation: f32,
    /// Direction in RG, strength in B.
    pub texture: Option<TextureRef>,
}

/// A glTF material with the extensions the shading builders understand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: Option<String>,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    /// KHR_materials_unlit
    pub unlit: bool,
    pub pbr: Option<PbrMetallicRoughness>,
    pub emissive: Option<ColorParam>,
    /// KHR_materials_emissive_strength
    pub emissive_strength: Option<f32>,
    pub normal: Option<NormalTexture>,
    pub occlusion: Option<OcclusionTexture>,
    pub clearcoat: Option<Clearcoat>,
    /// KHR_materials_transmission
    pub transmission: Option<ScalarParam>,
    pub volume: Option<Volume>,
    /// KHR_materials_ior
    pub ior: Option<f32>,
    pub specular: Option<Specular>,
    pub sheen: Option<Sheen>,
    pub iridescence: Option<Iridescence>,
    pub anisotropy: Option<Anisotropy>,
}

/// glTF default alpha cutoff.
pub const DEFAULT_ALPHA_CUTOFF: f32 = 0.5;
/// glTF default index of refraction.
pub const DEFAULT_IOR: f32 = 1.5;

impl Default for Material {
    fn default() -> Self {
        Self {
            name: None,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: DEFAULT_ALPHA_CUTOFF,
            double_sided: false,
            unlit: false,
            pbr: None,
            emissive: None,
            emissive_strength: None,
            normal: None,
            occlusion: None,
            clearcoat: None,
            transmission: None,
            volume: None,
            ior: None,
            specular: None,
            sheen: None,
            iridescence: None,
            anisotropy: None,
        }
    }
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// The normal texture, if any. Tangent generation depends on it.
    pub fn normal_texture(&self) -> Option<&TextureRef> {
        self.normal.as_ref().map(|n| &n.texture)
    }

    /// The same material with every input that reads tangent frames
    /// removed: normal maps and anisotropy.
    pub fn without_tangent_inputs(&self) -> Material {
        let mut material = self.clone();
        material.normal = None;
        if let Some(clearcoat) = &mut material.clearcoat {
            clearcoat.normal = None;
        }
        material.anisotropy = None;
        material
    }

    /// Whether a transmission value other than zero is authored.
    pub fn has_transmission(&self) -> bool {
        self.transmission
            .as_ref()
            .is_some_and(|t| t.factor > 0.0 || t.texture.is_some())
    }
}
