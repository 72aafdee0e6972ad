//! UsdPreviewSurface materials.
//!
//! The fixed schema has no arithmetic nodes, so factors are folded into the
//! texture node's `scale`/`bias` inputs. Vertex colors are not applied.

use super::channels::{self, DesiredType, NodeSequence};
use super::graph::{GraphBuilder, InputSource, Node, NodeId, NodeKind, Value, ValueType};
use super::SkippedInput;
use crate::error::Result;
use crate::image_info::ImageMetadataMap;
use crate::material::{AlphaMode, Material, NormalTexture, OcclusionTexture, PbrMetallicRoughness};
use crate::naming;
use crate::texture::{ResolvedTexture, TextureRef};
use serde::Serialize;

const COLORSPACE_SRGB: &str = "sRGB";
const COLORSPACE_RAW: &str = "raw";

/// A UsdPreviewSurface shader with the texture, primvar reader and
/// transform nodes feeding it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewMaterial {
    pub name: String,
    pub surface: Node,
    pub nodes: Vec<Node>,
}

impl PreviewMaterial {
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Node and output feeding a surface input.
    pub fn upstream_of(&self, input: &str) -> Option<(&Node, &str)> {
        match &self.surface.input(input)?.source {
            InputSource::Node {
                node,
                output: Some(output),
            } => Some((self.node(node)?, output.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct PreviewBuild {
    pub material: PreviewMaterial,
    pub skipped: Vec<SkippedInput>,
}

/// Build the UsdPreviewSurface network of `material`.
pub fn build_preview(material: &Material, name: &str, images: &ImageMetadataMap) -> PreviewBuild {
    let mut builder = PreviewBuilder::new(images);
    if material.unlit {
        builder.unlit_inputs(material);
    } else {
        builder.lit_inputs(material);
    }
    builder.finish(name)
}

/// Texture node parameters other than file and coordinates.
struct TextureParams {
    colorspace: &'static str,
    scale: Option<[f32; 4]>,
    bias: Option<[f32; 4]>,
    fallback: Option<[f32; 4]>,
}

impl TextureParams {
    fn srgb(factor: [f32; 4]) -> Self {
        Self {
            colorspace: COLORSPACE_SRGB,
            scale: Some(factor),
            bias: None,
            fallback: Some([1.0; 4]),
        }
    }

    fn raw(factor: [f32; 4]) -> Self {
        Self {
            colorspace: COLORSPACE_RAW,
            scale: Some(factor),
            bias: None,
            fallback: Some([1.0; 4]),
        }
    }
}

struct PreviewBuilder<'a> {
    images: &'a ImageMetadataMap,
    graph: GraphBuilder,
    surface: NodeId,
    skipped: Vec<SkippedInput>,
}

impl<'a> PreviewBuilder<'a> {
    fn new(images: &'a ImageMetadataMap) -> Self {
        let mut graph = GraphBuilder::new();
        let surface = graph.add(NodeKind::PreviewSurface, ValueType::SurfaceShader);
        graph.node_mut(surface).add_output("surface", ValueType::Token);
        Self {
            images,
            graph,
            surface,
            skipped: Vec::new(),
        }
    }

    fn set(&mut self, input: &str, value: Value) {
        self.graph.set_value(self.surface, input, value);
    }

    fn report(&mut self, input: &'static str, result: Result<()>) {
        if let Err(error) = result {
            log::error!("skipping preview input '{}': {}", input, error);
            self.skipped.push(SkippedInput { input, error });
        }
    }

    fn unlit_inputs(&mut self, material: &Material) {
        let Some(pbr) = &material.pbr else {
            self.set("emissiveColor", Value::Vector3([1.0; 3]));
            return;
        };
        let result = self.texture_input(
            "emissiveColor",
            pbr.base_color_texture.as_ref(),
            DesiredType::Vector3,
            None,
            TextureParams::srgb(pbr.base_color_factor),
        );
        self.report("emissiveColor", result);
        self.alpha_inputs(material, pbr);
    }

    fn lit_inputs(&mut self, material: &Material) {
        let strength = material.emissive_strength.unwrap_or(1.0);
        let (emissive, emissive_texture) = match &material.emissive {
            Some(param) => (param.factor, param.texture.as_ref()),
            None => ([0.0; 3], None),
        };
        let factor = [
            emissive[0] * strength,
            emissive[1] * strength,
            emissive[2] * strength,
            1.0,
        ];
        let result = self.texture_input(
            "emissiveColor",
            emissive_texture,
            DesiredType::Vector3,
            None,
            TextureParams {
                fallback: None,
                ..TextureParams::srgb(factor)
            },
        );
        self.report("emissiveColor", result);

        if let Some(occlusion) = &material.occlusion {
            let result = self.occlusion_input(occlusion);
            self.report("occlusion", result);
        }
        if let Some(normal) = &material.normal {
            let result = self.normal_input(normal);
            self.report("normal", result);
        }

        // UsdPreviewSurface defaults differ from glTF's.
        match &material.pbr {
            Some(pbr) => self.pbr_inputs(material, pbr),
            None => {
                self.set("diffuseColor", Value::Vector3([1.0; 3]));
                self.set("metallic", Value::Float(1.0));
                self.set("roughness", Value::Float(1.0));
            }
        }

        if let Some(clearcoat) = &material.clearcoat {
            let result = self.texture_input(
                "clearcoat",
                clearcoat.factor.texture.as_ref(),
                DesiredType::Float,
                Some(0),
                TextureParams::raw([clearcoat.factor.factor; 4]),
            );
            self.report("clearcoat", result);
            let result = self.texture_input(
                "clearcoatRoughness",
                clearcoat.roughness.texture.as_ref(),
                DesiredType::Float,
                Some(1),
                TextureParams::raw([clearcoat.roughness.factor; 4]),
            );
            self.report("clearcoatRoughness", result);
        }

        if let Some(ior) = material.ior {
            self.set("ior", Value::Float(ior));
        }

        if let Some(specular) = &material.specular {
            let [r, g, b] = specular.color.factor;
            let result = self.texture_input(
                "specularColor",
                specular.color.texture.as_ref(),
                DesiredType::Vector3,
                None,
                TextureParams::srgb([r, g, b, 1.0]),
            );
            self.report("specularColor", result);
            self.set("useSpecularWorkflow", Value::Integer(1));
        }

        // Transmissive materials render translucently, unless alpha is
        // already authored.
        if let (Some(transmission), Some(pbr)) = (&material.transmission, &material.pbr) {
            if material.alpha_mode == AlphaMode::Opaque {
                let [r, g, b, _] = pbr.base_color_factor;
                let max = r.max(g).max(b);
                let min = r.min(g).min(b);
                let saturation = if max <= f32::MIN_POSITIVE { 0.0 } else { (max - min) / max };
                let opacity = 0.25 + 0.75 * saturation * (1.0 - transmission.factor);
                self.set("opacity", Value::Float(opacity));
            }
        }
    }

    fn pbr_inputs(&mut self, material: &Material, pbr: &PbrMetallicRoughness) {
        let result = self.texture_input(
            "diffuseColor",
            pbr.base_color_texture.as_ref(),
            DesiredType::Vector3,
            None,
            TextureParams::srgb(pbr.base_color_factor),
        );
        self.report("diffuseColor", result);

        let texture = pbr.metallic_roughness_texture.as_ref();
        let result = self.texture_input(
            "metallic",
            texture,
            DesiredType::Float,
            Some(2),
            TextureParams::raw([pbr.metallic_factor; 4]),
        );
        self.report("metallic", result);
        let result = self.texture_input(
            "roughness",
            texture,
            DesiredType::Float,
            Some(1),
            TextureParams::raw([pbr.roughness_factor; 4]),
        );
        self.report("roughness", result);

        self.alpha_inputs(material, pbr);
    }

    fn alpha_inputs(&mut self, material: &Material, pbr: &PbrMetallicRoughness) {
        if material.alpha_mode == AlphaMode::Opaque {
            return;
        }
        let alpha = pbr.base_color_factor[3];
        let texture = pbr.base_color_texture.as_ref();
        let channel = texture
            .and_then(|t| t.resolve(self.images))
            .map(|resolved| channels::alpha_channel(resolved.channel_count()).0);
        let result = self.texture_input(
            "opacity",
            texture,
            DesiredType::Float,
            channel,
            TextureParams::raw([alpha; 4]),
        );
        self.report("opacity", result);

        if material.alpha_mode == AlphaMode::Mask {
            self.set("opacityThreshold", Value::Float(material.alpha_cutoff));
        }
    }

    fn normal_input(&mut self, normal: &NormalTexture) -> Result<()> {
        let Some(resolved) = normal.texture.resolve(self.images) else {
            return Ok(());
        };
        channels::resolve(DesiredType::Vector3, resolved.channel_count(), true, None)?;
        let s = normal.scale;
        let node = self.uv_texture(
            &resolved,
            TextureParams {
                colorspace: COLORSPACE_RAW,
                scale: Some([2.0 * s, 2.0 * s, 2.0, 1.0]),
                bias: Some([-s, -s, -1.0, 0.0]),
                fallback: Some([0.5, 0.5, 1.0, 0.0]),
            },
        );
        self.graph
            .connect_output(self.surface, "normal", ValueType::Vector3, node, "rgb", ValueType::Vector3);
        Ok(())
    }

    /// `sample * strength + (1 - strength)`.
    fn occlusion_input(&mut self, occlusion: &OcclusionTexture) -> Result<()> {
        let Some(resolved) = occlusion.texture.resolve(self.images) else {
            return Ok(());
        };
        let sequence = channels::resolve(DesiredType::Float, resolved.channel_count(), true, Some(0))?;
        let strength = occlusion.strength;
        let node = self.uv_texture(
            &resolved,
            TextureParams {
                colorspace: COLORSPACE_RAW,
                scale: Some([strength; 4]),
                bias: Some([1.0 - strength; 4]),
                fallback: Some([1.0; 4]),
            },
        );
        self.graph.connect_output(
            self.surface,
            "occlusion",
            ValueType::Float,
            node,
            output_channel(&sequence),
            ValueType::Float,
        );
        Ok(())
    }

    /// Connect `input` to a texture, or set the factor when the texture is
    /// absent or has no metadata.
    fn texture_input(
        &mut self,
        input: &'static str,
        texture: Option<&TextureRef>,
        desired: DesiredType,
        channel: Option<u8>,
        params: TextureParams,
    ) -> Result<()> {
        let resolved = texture.and_then(|t| t.resolve(self.images));
        let Some(resolved) = resolved else {
            let factor = params.scale.unwrap_or([1.0; 4]);
            let value = match desired {
                DesiredType::Float => Value::Float(factor[0]),
                _ => Value::Vector3([factor[0], factor[1], factor[2]]),
            };
            self.set(input, value);
            return Ok(());
        };

        let sequence = channels::resolve(desired, resolved.channel_count(), true, channel)?;
        let (output, ty) = match desired {
            DesiredType::Float => (output_channel(&sequence), ValueType::Float),
            _ => ("rgb", ValueType::Vector3),
        };
        let node = self.uv_texture(&resolved, params);
        self.graph.connect_output(self.surface, input, ty, node, output, ty);
        Ok(())
    }

    fn uv_texture(&mut self, resolved: &ResolvedTexture<'_>, params: TextureParams) -> NodeId {
        let texture = resolved.reference;
        let node = self.graph.add(NodeKind::UvTexture, ValueType::Vector4);
        self.graph
            .set_value(node, "file", Value::Filename(resolved.path().to_string()));
        if let Some(scale) = params.scale {
            self.graph.set_value(node, "scale", Value::Vector4(scale));
        }
        if let Some(bias) = params.bias {
            self.graph.set_value(node, "bias", Value::Vector4(bias));
        }
        if let Some(fallback) = params.fallback {
            self.graph.set_value(node, "fallback", Value::Vector4(fallback));
        }
        self.graph
            .set_value(node, "sourceColorSpace", Value::Token(params.colorspace.to_string()));
        self.graph.set_value(
            node,
            "wrapS",
            Value::Token(texture.sampler.wrap_s.usd_wrap_token().to_string()),
        );
        self.graph.set_value(
            node,
            "wrapT",
            Value::Token(texture.sampler.wrap_t.usd_wrap_token().to_string()),
        );

        let st = self.st_source(texture);
        self.graph
            .connect_output(node, "st", ValueType::Vector2, st, "result", ValueType::Vector2);
        node
    }

    /// Primvar reader for the texture's UV set, through a UsdTransform2d
    /// when a transform applies.
    fn st_source(&mut self, texture: &TextureRef) -> NodeId {
        let transform = texture.required_transform().map(|t| {
            let node = self.graph.add(NodeKind::Transform2d, ValueType::Vector2);
            let (sin, cos) = t.rotation.sin_cos();
            self.graph.set_value(node, "rotation", Value::Float(t.rotation.to_degrees()));
            self.graph.set_value(node, "scale", Value::Vector2(t.scale));
            // glTF rotates about the top-left corner with v pointing down.
            self.graph.set_value(
                node,
                "translation",
                Value::Vector2([t.offset[0] + sin * t.scale[1], 1.0 - t.offset[1] - cos * t.scale[1]]),
            );
            node
        });

        let reader = self.graph.add(NodeKind::PrimvarReader, ValueType::Vector2);
        self.graph
            .set_value(reader, "varname", Value::String(naming::st_set_name(texture.uv_set())));

        match transform {
            Some(node) => {
                self.graph
                    .connect_output(node, "in", ValueType::Vector2, reader, "result", ValueType::Vector2);
                node
            }
            None => reader,
        }
    }

    fn finish(self, name: &str) -> PreviewBuild {
        let mut nodes = self.graph.into_nodes();
        let surface = nodes.remove(0);
        PreviewBuild {
            material: PreviewMaterial {
                name: name.to_string(),
                surface,
                nodes,
            },
            skipped: self.skipped,
        }
    }
}

/// UsdUVTexture output carrying a float read.
fn output_channel(sequence: &NodeSequence) -> &'static str {
    match sequence.extracted_channel() {
        None | Some(0) => "r",
        Some(1) => "g",
        Some(2) => "b",
        Some(_) => "a",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_info::ImageMetadata;
    use crate::material::{ColorParam, ScalarParam, Specular};
    use crate::texture::{ImageHandle, TextureTransform};

    fn images(entries: &[(usize, u8)]) -> ImageMetadataMap {
        entries
            .iter()
            .map(|&(handle, channels)| {
                (
                    ImageHandle(handle),
                    ImageMetadata::new(format!("tex{}.png", handle), channels, true),
                )
            })
            .collect()
    }

    fn build(material: &Material, images: &ImageMetadataMap) -> PreviewMaterial {
        let built = build_preview(material, "m", images);
        assert!(built.skipped.is_empty(), "{:?}", built.skipped);
        built.material
    }

    fn vec4(node: &Node, input: &str) -> [f32; 4] {
        match node.input_value(input) {
            Some(Value::Vector4(v)) => *v,
            other => panic!("{} is {:?}", input, other),
        }
    }

    #[test]
    fn test_defaults_without_pbr() {
        let preview = build(&Material::new("m"), &ImageMetadataMap::new());
        let surface = &preview.surface;
        assert_eq!(surface.kind, NodeKind::PreviewSurface);
        assert_eq!(surface.input_value("diffuseColor"), Some(&Value::Vector3([1.0; 3])));
        assert_eq!(surface.input_value("metallic"), Some(&Value::Float(1.0)));
        assert_eq!(surface.input_value("roughness"), Some(&Value::Float(1.0)));
        assert_eq!(surface.input_value("emissiveColor"), Some(&Value::Vector3([0.0; 3])));
        assert!(surface.input("opacity").is_none());
        assert!(preview.nodes.is_empty());
    }

    #[test]
    fn test_textured_diffuse() {
        let mut material = Material::new("m");
        material.pbr = Some(PbrMetallicRoughness {
            base_color_factor: [0.5, 0.25, 1.0, 1.0],
            base_color_texture: Some(TextureRef::new(ImageHandle(0))),
            ..Default::default()
        });
        let preview = build(&material, &images(&[(0, 4)]));

        let (texture, output) = preview.upstream_of("diffuseColor").unwrap();
        assert_eq!(output, "rgb");
        assert_eq!(texture.kind, NodeKind::UvTexture);
        assert_eq!(vec4(texture, "scale"), [0.5, 0.25, 1.0, 1.0]);
        assert_eq!(vec4(texture, "fallback"), [1.0; 4]);
        assert_eq!(texture.input_value("sourceColorSpace"), Some(&Value::Token("sRGB".into())));
        assert_eq!(texture.input_value("wrapS"), Some(&Value::Token("repeat".into())));
        assert_eq!(
            texture.input_value("file"),
            Some(&Value::Filename("tex0.png".into()))
        );

        let InputSource::Node { node, output } = &texture.input("st").unwrap().source else {
            panic!("st not connected");
        };
        assert_eq!(output.as_deref(), Some("result"));
        let reader = preview.node(node).unwrap();
        assert_eq!(reader.kind, NodeKind::PrimvarReader);
        assert_eq!(reader.input_value("varname"), Some(&Value::String("st".into())));
        assert!(reader.outputs.iter().any(|o| o.name == "result"));
    }

    #[test]
    fn test_two_channel_metallic_roughness() {
        let mut material = Material::new("m");
        material.pbr = Some(PbrMetallicRoughness {
            metallic_factor: 0.5,
            metallic_roughness_texture: Some(TextureRef::new(ImageHandle(0))),
            ..Default::default()
        });
        let preview = build(&material, &images(&[(0, 2)]));
        let (metallic, output) = preview.upstream_of("metallic").unwrap();
        assert_eq!(output, "r");
        assert_eq!(vec4(metallic, "scale"), [0.5; 4]);
        assert_eq!(preview.upstream_of("roughness").unwrap().1, "a");
    }

    #[test]
    fn test_normal_map_scale_bias() {
        let mut material = Material::new("m");
        material.normal = Some(NormalTexture {
            texture: TextureRef::new(ImageHandle(0)),
            scale: 0.5,
        });
        let preview = build(&material, &images(&[(0, 3)]));
        let (texture, output) = preview.upstream_of("normal").unwrap();
        assert_eq!(output, "rgb");
        assert_eq!(vec4(texture, "scale"), [1.0, 1.0, 2.0, 1.0]);
        assert_eq!(vec4(texture, "bias"), [-0.5, -0.5, -1.0, 0.0]);
        assert_eq!(vec4(texture, "fallback"), [0.5, 0.5, 1.0, 0.0]);
        assert_eq!(texture.input_value("sourceColorSpace"), Some(&Value::Token("raw".into())));
    }

    #[test]
    fn test_occlusion_scale_bias() {
        let mut material = Material::new("m");
        material.occlusion = Some(OcclusionTexture {
            texture: TextureRef::new(ImageHandle(0)),
            strength: 0.25,
        });
        let preview = build(&material, &images(&[(0, 3)]));
        let (texture, output) = preview.upstream_of("occlusion").unwrap();
        assert_eq!(output, "r");
        assert_eq!(vec4(texture, "scale"), [0.25; 4]);
        assert_eq!(vec4(texture, "bias"), [0.75; 4]);
    }

    #[test]
    fn test_emissive_strength() {
        let mut material = Material::new("m");
        material.emissive = Some(ColorParam::new([1.0, 0.5, 0.0]));
        material.emissive_strength = Some(2.0);
        let preview = build(&material, &ImageMetadataMap::new());
        assert_eq!(
            preview.surface.input_value("emissiveColor"),
            Some(&Value::Vector3([2.0, 1.0, 0.0]))
        );
    }

    #[test]
    fn test_transmission_heuristic() {
        let mut material = Material::new("m");
        material.pbr = Some(PbrMetallicRoughness {
            base_color_factor: [1.0, 0.5, 0.5, 1.0],
            ..Default::default()
        });
        material.transmission = Some(ScalarParam::new(0.5));
        let preview = build(&material, &ImageMetadataMap::new());
        let Some(Value::Float(opacity)) = preview.surface.input_value("opacity") else {
            panic!("opacity not set");
        };
        assert!((opacity - 0.4375).abs() < 1e-6);

        material.alpha_mode = AlphaMode::Blend;
        let preview = build(&material, &ImageMetadataMap::new());
        assert_eq!(preview.surface.input_value("opacity"), Some(&Value::Float(1.0)));
    }

    #[test]
    fn test_mask_threshold() {
        let mut material = Material::new("m");
        material.alpha_mode = AlphaMode::Mask;
        material.alpha_cutoff = 0.4;
        material.pbr = Some(PbrMetallicRoughness {
            base_color_texture: Some(TextureRef::new(ImageHandle(0))),
            ..Default::default()
        });
        let preview = build(&material, &images(&[(0, 4)]));
        assert_eq!(preview.upstream_of("opacity").unwrap().1, "a");
        assert_eq!(
            preview.surface.input_value("opacityThreshold"),
            Some(&Value::Float(0.4))
        );
    }

    #[test]
    fn test_texture_transform() {
        let mut material = Material::new("m");
        material.pbr = Some(PbrMetallicRoughness {
            base_color_texture: Some(TextureRef::new(ImageHandle(0)).with_transform(TextureTransform {
                offset: [0.1, 0.2],
                rotation: 0.0,
                scale: [2.0, 3.0],
                tex_coord: Some(1),
            })),
            ..Default::default()
        });
        let preview = build(&material, &images(&[(0, 3)]));
        let transform = preview
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::Transform2d)
            .unwrap();
        assert_eq!(transform.input_value("scale"), Some(&Value::Vector2([2.0, 3.0])));
        assert_eq!(transform.input_value("rotation"), Some(&Value::Float(0.0)));
        let Some(Value::Vector2(t)) = transform.input_value("translation") else {
            panic!("translation not set");
        };
        assert!((t[0] - 0.1).abs() < 1e-6);
        assert!((t[1] + 2.2).abs() < 1e-6);
        let reader = preview
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::PrimvarReader)
            .unwrap();
        assert_eq!(reader.input_value("varname"), Some(&Value::String("st1".into())));
    }

    #[test]
    fn test_specular_workflow() {
        let mut material = Material::new("m");
        material.specular = Some(Specular {
            factor: ScalarParam::new(1.0),
            color: ColorParam::new([0.5, 0.5, 0.5]),
        });
        let preview = build(&material, &ImageMetadataMap::new());
        assert_eq!(preview.surface.input_value("useSpecularWorkflow"), Some(&Value::Integer(1)));
        assert_eq!(
            preview.surface.input_value("specularColor"),
            Some(&Value::Vector3([0.5, 0.5, 0.5]))
        );
    }

    #[test]
    fn test_unlit() {
        let mut material = Material::new("m");
        material.unlit = true;
        let preview = build(&material, &ImageMetadataMap::new());
        assert_eq!(preview.surface.inputs.len(), 1);
        assert_eq!(
            preview.surface.input_value("emissiveColor"),
            Some(&Value::Vector3([1.0; 3]))
        );
    }
}
