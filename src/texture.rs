//! Texture references, samplers and UV transforms.

use crate::image_info::{ImageMetadata, ImageMetadataMap};
use serde::{Deserialize, Serialize};

/// Index of an image in the source asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageHandle(pub usize);

/// Texture coordinate wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WrapMode {
    #[default]
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

impl WrapMode {
    /// Decode a raw glTF/GL wrap constant. Zero means "unset" and maps to
    /// the glTF default.
    pub fn from_gl(code: u32) -> Option<Self> {
        match code {
            0 | 10497 => Some(WrapMode::Repeat),
            33071 => Some(WrapMode::ClampToEdge),
            33648 => Some(WrapMode::MirroredRepeat),
            _ => None,
        }
    }

    /// MaterialX `uaddressmode`/`vaddressmode` value.
    pub fn mtlx_address_mode(&self) -> &'static str {
        match self {
            WrapMode::Repeat => "periodic",
            WrapMode::ClampToEdge => "clamp",
            WrapMode::MirroredRepeat => "mirror",
        }
    }

    /// UsdUVTexture `wrapS`/`wrapT` token.
    pub fn usd_wrap_token(&self) -> &'static str {
        match self {
            WrapMode::Repeat => "repeat",
            WrapMode::ClampToEdge => "clamp",
            WrapMode::MirroredRepeat => "mirror",
        }
    }
}

/// Texture filtering, with mipmap variants folded into their base filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterMode {
    Nearest,
    Linear,
}

impl FilterMode {
    /// Decode a raw glTF/GL filter constant. Zero means "unset".
    pub fn from_gl(code: u32) -> Option<Self> {
        match code {
            9728 | 9984 | 9986 => Some(FilterMode::Nearest),
            9729 | 9985 | 9987 => Some(FilterMode::Linear),
            _ => None,
        }
    }

    /// MaterialX `filtertype` value.
    pub fn mtlx_filter_type(&self) -> &'static str {
        match self {
            FilterMode::Nearest => "closest",
            FilterMode::Linear => "linear",
        }
    }
}

/// Sampler state of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sampler {
    pub mag_filter: Option<FilterMode>,
    pub min_filter: Option<FilterMode>,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
}

impl Sampler {
    /// Single filter for consumers without separate min/mag filters.
    /// Magnification wins; `None` leaves the consumer default.
    pub fn filter(&self) -> Option<FilterMode> {
        self.mag_filter.or(self.min_filter)
    }
}

/// KHR_texture_transform parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextureTransform {
    pub offset: [f32; 2],
    /// Rotation in radians, counter-clockwise.
    pub rotation: f32,
    pub scale: [f32; 2],
    /// Overrides the texture reference's UV set.
    pub tex_coord: Option<usize>,
}

impl Default for TextureTransform {
    fn default() -> Self {
        Self {
            offset: [0.0, 0.0],
            rotation: 0.0,
            scale: [1.0, 1.0],
            tex_coord: None,
        }
    }
}

const TRANSFORM_EPSILON: f32 = 1e-5;

impl TextureTransform {
    /// Whether the transform differs from identity.
    pub fn is_required(&self) -> bool {
        self.offset[0].abs() > TRANSFORM_EPSILON
            || self.offset[1].abs() > TRANSFORM_EPSILON
            || self.rotation.abs() > TRANSFORM_EPSILON
            || (self.scale[0] - 1.0).abs() > TRANSFORM_EPSILON
            || (self.scale[1] - 1.0).abs() > TRANSFORM_EPSILON
    }
}

/// A material's reference to an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureRef {
    pub image: ImageHandle,
    /// UV set index (TEXCOORD_n).
    pub tex_coord: usize,
    pub sampler: Sampler,
    pub transform: Option<TextureTransform>,
}

impl TextureRef {
    pub fn new(image: ImageHandle) -> Self {
        Self {
            image,
            tex_coord: 0,
            sampler: Sampler::default(),
            transform: None,
        }
    }

    pub fn with_tex_coord(mut self, tex_coord: usize) -> Self {
        self.tex_coord = tex_coord;
        self
    }

    pub fn with_sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_transform(mut self, transform: TextureTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// UV set actually sampled, honoring a transform's override.
    pub fn uv_set(&self) -> usize {
        self.transform
            .and_then(|t| t.tex_coord)
            .unwrap_or(self.tex_coord)
    }

    /// Transform that must be applied, if any.
    pub fn required_transform(&self) -> Option<TextureTransform> {
        self.transform.filter(TextureTransform::is_required)
    }

    /// Look up the image metadata. `None` when the image was never
    /// probed, in which case callers fall back to constant values.
    pub fn resolve<'a>(&'a self, images: &'a ImageMetadataMap) -> Option<ResolvedTexture<'a>> {
        let image = images.get(&self.image)?;
        if !(1..=4).contains(&image.channel_count) {
            return None;
        }
        Some(ResolvedTexture {
            reference: self,
            image,
        })
    }
}

/// A texture reference paired with its image metadata.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedTexture<'a> {
    pub reference: &'a TextureRef,
    pub image: &'a ImageMetadata,
}

impl ResolvedTexture<'_> {
    pub fn channel_count(&self) -> u8 {
        self.image.channel_count
    }

    pub fn path(&self) -> &str {
        &self.image.ref_path
    }
}
