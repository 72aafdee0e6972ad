//! `gltf_pbr` node-graph materials.
//!
//! Helper nodes are created in parameter declaration order, so identical
//! materials always produce identical networks.

use super::channels::{self, ChannelOp, DesiredType};
use super::colorspace;
use super::graph::{
    GraphBuilder, GraphOutput, Helpers, InputSource, Node, NodeGraph, NodeId, NodeKind, ShadingNetwork, Value,
    ValueType,
};
use super::SkippedInput;
use crate::config::{ConvertOptions, GraphLayout};
use crate::error::Result;
use crate::image_info::ImageMetadataMap;
use crate::material::{
    AlphaMode, Anisotropy, ColorParam, Iridescence, Material, NormalTexture, OcclusionTexture, PbrMetallicRoughness,
    ScalarParam, DEFAULT_IOR,
};
use crate::naming;
use crate::texture::TextureRef;

const COLORSPACE_SRGB: &str = "srgb_texture";
const COLORSPACE_LINEAR: &str = "lin_rec709";

/// `gltf_pbr` default of `iridescence_thickness`.
const DEFAULT_IRIDESCENCE_THICKNESS: f32 = 100.0;

/// `gltf_anisotropy_image` default of `anisotropy_strength`, a multiplier
/// of the texture's blue channel.
const DEFAULT_ANISOTROPY_IMAGE_STRENGTH: f32 = 1.0;

/// A material's node-graph network plus the inputs that had to be dropped.
#[derive(Debug)]
pub struct NetworkBuild {
    pub network: ShadingNetwork,
    pub skipped: Vec<SkippedInput>,
}

/// Build the node-graph network of `material` under the unique name `name`.
pub fn build_network(
    material: &Material,
    name: &str,
    images: &ImageMetadataMap,
    options: &ConvertOptions,
) -> NetworkBuild {
    let mut builder = NetworkBuilder::new(images, options.compat());
    let kind = if material.unlit {
        builder.unlit_inputs(material);
        NodeKind::SurfaceUnlit
    } else {
        builder.pbr_inputs(material);
        NodeKind::GltfPbr
    };
    let (mut network, skipped) = builder.finish(name, kind);

    // Storm treats blend materials without transmission as opaque.
    let nudge = options.compat()
        && options.graph_layout == GraphLayout::Nested
        && !material.unlit
        && material.alpha_mode == AlphaMode::Blend
        && network.shader.input("transmission").is_none();
    if nudge {
        network.shader.set_value("transmission", Value::Float(f32::MIN_POSITIVE));
    }

    if options.graph_layout == GraphLayout::Flattened {
        network = network.flatten();
    }
    NetworkBuild { network, skipped }
}

enum Port {
    Value(Value),
    Node(NodeId),
    /// Named output of a multi-output node.
    Output(NodeId, &'static str),
}

struct NetworkBuilder<'a> {
    images: &'a ImageMetadataMap,
    compat: bool,
    graph: GraphBuilder,
    inputs: Vec<(&'static str, Port)>,
    skipped: Vec<SkippedInput>,
}

impl<'a> NetworkBuilder<'a> {
    fn new(images: &'a ImageMetadataMap, compat: bool) -> Self {
        Self {
            images,
            compat,
            graph: GraphBuilder::new(),
            inputs: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Run `build` for one shader input. On failure the nodes it created
    /// are discarded and the input is recorded as skipped.
    fn input<F>(&mut self, name: &'static str, build: F)
    where
        F: FnOnce(&mut Self) -> Result<Option<Port>>,
    {
        let mark = self.graph.len();
        match build(self) {
            Ok(Some(port)) => self.inputs.push((name, port)),
            Ok(None) => {}
            Err(error) => {
                log::error!("skipping shader input '{}': {}", name, error);
                self.graph.truncate(mark);
                self.skipped.push(SkippedInput { input: name, error });
            }
        }
    }

    fn constant(&mut self, name: &'static str, value: Value) {
        self.inputs.push((name, Port::Value(value)));
    }

    fn pbr_inputs(&mut self, material: &Material) {
        let default_pbr = PbrMetallicRoughness::default();
        let pbr = material.pbr.as_ref().unwrap_or(&default_pbr);
        let [red, green, blue, alpha] = pbr.base_color_factor;

        self.input("base_color", |b| b.base_color([red, green, blue], pbr.base_color_texture.as_ref()));
        if material.alpha_mode != AlphaMode::Opaque {
            self.input("alpha", |b| b.alpha(alpha, pbr.base_color_texture.as_ref()));
        }

        let metallic = ScalarParam {
            factor: pbr.metallic_factor,
            texture: pbr.metallic_roughness_texture.clone(),
        };
        let roughness = ScalarParam {
            factor: pbr.roughness_factor,
            texture: pbr.metallic_roughness_texture.clone(),
        };
        self.input("metallic", |b| b.scalar(&metallic, 2, 1.0));
        self.input("roughness", |b| b.scalar(&roughness, 1, 1.0));

        if let Some(emissive) = &material.emissive {
            self.input("emissive", |b| b.color(emissive, [0.0; 3]));
        }
        if let Some(strength) = material.emissive_strength {
            self.constant("emissive_strength", Value::Float(strength));
        }
        if let Some(normal) = &material.normal {
            self.input("normal", |b| b.normal_map(normal));
        }
        if let Some(occlusion) = &material.occlusion {
            self.input("occlusion", |b| b.occlusion(occlusion));
        }

        if material.alpha_mode != AlphaMode::Opaque {
            self.constant("alpha_mode", Value::Integer(material.alpha_mode.mtlx_value()));
        }
        if material.alpha_mode == AlphaMode::Mask {
            self.constant("alpha_cutoff", Value::Float(material.alpha_cutoff));
        }

        if let Some(clearcoat) = &material.clearcoat {
            self.input("clearcoat", |b| b.scalar(&clearcoat.factor, 0, 0.0));
            self.input("clearcoat_roughness", |b| b.scalar(&clearcoat.roughness, 1, 0.0));
            if let Some(normal) = &clearcoat.normal {
                self.input("clearcoat_normal", |b| b.normal_map(normal));
            }
        }

        if let Some(transmission) = &material.transmission {
            self.input("transmission", |b| b.scalar(transmission, 0, 0.0));
        }

        if let Some(volume) = &material.volume {
            self.input("thickness", |b| b.scalar(&volume.thickness, 1, 0.0));
            if volume.attenuation_distance.is_finite() {
                self.constant("attenuation_distance", Value::Float(volume.attenuation_distance));
            }
            self.constant("attenuation_color", Value::Color3(volume.attenuation_color));
        }

        if let Some(ior) = material.ior {
            if ior != DEFAULT_IOR {
                self.constant("ior", Value::Float(ior));
            }
        }

        if let Some(iridescence) = &material.iridescence {
            self.input("iridescence", |b| b.scalar(&iridescence.factor, 0, 0.0));
            self.constant("iridescence_ior", Value::Float(iridescence.ior));
            self.input("iridescence_thickness", |b| b.iridescence_thickness(iridescence));
        }

        if let Some(specular) = &material.specular {
            self.input("specular", |b| b.scalar(&specular.factor, 3, 1.0));
            self.input("specular_color", |b| b.color(&specular.color, [1.0; 3]));
        }

        if let Some(sheen) = &material.sheen {
            self.input("sheen_color", |b| b.color(&sheen.color, [0.0; 3]));
            self.input("sheen_roughness", |b| b.scalar(&sheen.roughness, 3, 0.0));
        }

        if let Some(anisotropy) = &material.anisotropy {
            self.anisotropy_inputs(anisotropy);
        }
    }

    /// Strength and rotation, through `gltf_anisotropy_image` when
    /// textured, plus the world-space tangent the lobe is oriented by.
    fn anisotropy_inputs(&mut self, anisotropy: &Anisotropy) {
        let image = anisotropy.texture.as_ref().and_then(|t| self.anisotropy_image(t));
        match image {
            Some(image) => {
                if anisotropy.strength != DEFAULT_ANISOTROPY_IMAGE_STRENGTH {
                    self.graph
                        .set_value(image, "anisotropy_strength", Value::Float(anisotropy.strength));
                }
                if anisotropy.rotation != 0.0 {
                    self.graph
                        .set_value(image, "anisotropy_rotation", Value::Float(anisotropy.rotation));
                }
                self.inputs
                    .push(("anisotropy_strength", Port::Output(image, "anisotropy_strength_out")));
                self.inputs
                    .push(("anisotropy_rotation", Port::Output(image, "anisotropy_rotation_out")));
            }
            None => {
                if anisotropy.strength != 0.0 {
                    self.constant("anisotropy_strength", Value::Float(anisotropy.strength));
                }
                if anisotropy.rotation != 0.0 {
                    self.constant("anisotropy_rotation", Value::Float(anisotropy.rotation));
                }
            }
        }
        self.input("tangent", |b| Ok(Some(Port::Node(b.world_tangent()))));
    }

    fn anisotropy_image(&mut self, texture: &TextureRef) -> Option<NodeId> {
        let Some(resolved) = texture.resolve(self.images) else {
            log::warn!("image {} has no metadata, using constant anisotropy", texture.image.0);
            return None;
        };
        let path = resolved.path().to_string();
        let image = self.graph.add(NodeKind::AnisotropyImage, ValueType::Vector3);
        self.graph
            .node_mut(image)
            .set_value("file", Value::Filename(path))
            .colorspace = Some(COLORSPACE_LINEAR.to_string());
        let texcoord = self.texcoord(texture);
        self.graph.connect(image, "texcoord", texcoord);
        self.sampler_inputs(image, texture);
        let node = self.graph.node_mut(image);
        node.add_output("anisotropy_strength_out", ValueType::Float);
        node.add_output("anisotropy_rotation_out", ValueType::Float);
        Some(image)
    }

    fn unlit_inputs(&mut self, material: &Material) {
        let default_pbr = PbrMetallicRoughness::default();
        let pbr = material.pbr.as_ref().unwrap_or(&default_pbr);
        let [red, green, blue, alpha] = pbr.base_color_factor;

        self.input("emission_color", |b| b.base_color([red, green, blue], pbr.base_color_texture.as_ref()));
        if material.alpha_mode != AlphaMode::Opaque {
            self.input("opacity", |b| b.alpha(alpha, pbr.base_color_texture.as_ref()));
        }
    }

    fn geomprop(&mut self, name: &str, ty: ValueType, default: Option<Value>) -> NodeId {
        let node = self.graph.add(NodeKind::GeomPropValue, ty);
        self.graph.set_value(node, "geomprop", Value::String(name.to_string()));
        if let Some(default) = default {
            self.graph.set_value(node, "default", default);
        }
        node
    }

    /// `in1 * in2` where `in2` is a constant.
    fn multiply(&mut self, in1: NodeId, in2: Value) -> NodeId {
        let ty = self.graph.node(in1).ty;
        let node = self.graph.add(NodeKind::Multiply, ty);
        self.graph.connect(node, "in1", in1);
        self.graph.set_value(node, "in2", in2);
        node
    }

    /// `in1 * in2` of two nodes.
    fn multiply_nodes(&mut self, in1: NodeId, in2: NodeId) -> NodeId {
        let ty = self.graph.node(in1).ty;
        let node = self.graph.add(NodeKind::Multiply, ty);
        self.graph.connect(node, "in1", in1);
        self.graph.connect(node, "in2", in2);
        node
    }

    fn unary(&mut self, kind: NodeKind, input: NodeId) -> NodeId {
        let ty = self.graph.node(input).ty;
        let node = self.graph.add(kind, ty);
        self.graph.connect(node, "in", input);
        node
    }

    fn extract(&mut self, input: NodeId, index: u8) -> NodeId {
        let node = self.graph.add(NodeKind::Extract, ValueType::Float);
        self.graph.connect(node, "in", input);
        self.graph.set_value(node, "index", Value::Integer(i32::from(index)));
        node
    }

    /// UV read for a texture, through `place2d` when a transform applies.
    fn texcoord(&mut self, texture: &TextureRef) -> NodeId {
        let reader = self.geomprop(&naming::st_set_name(texture.uv_set()), ValueType::Vector2, None);
        let Some(transform) = texture.required_transform() else {
            return reader;
        };

        let inverse = |s: f32| if s == 0.0 { 0.0 } else { 1.0 / s };
        let place = self.graph.add(NodeKind::Place2d, ValueType::Vector2);
        self.graph.connect(place, "texcoord", reader);
        self.graph.set_value(
            place,
            "offset",
            Value::Vector2([-transform.offset[0], transform.offset[1]]),
        );
        self.graph.set_value(place, "rotate", Value::Float((-transform.rotation).to_degrees()));
        self.graph.set_value(
            place,
            "scale",
            Value::Vector2([inverse(transform.scale[0]), inverse(transform.scale[1])]),
        );
        self.graph.set_value(place, "pivot", Value::Vector2([0.0, 1.0]));
        place
    }

    /// Image read adapted to `desired`. `None` when the texture has no
    /// metadata; callers then fall back to the constant factor.
    fn sample(
        &mut self,
        texture: &TextureRef,
        desired: DesiredType,
        channel: Option<u8>,
        default: Value,
    ) -> Result<Option<NodeId>> {
        let Some(resolved) = texture.resolve(self.images) else {
            log::warn!("image {} has no metadata, using constant factor", texture.image.0);
            return Ok(None);
        };
        let count = resolved.channel_count();
        let sequence = channels::resolve(desired, count, self.compat, channel)?;
        let image_ty = sequence.image_type();
        let linear_data = !desired.is_color();
        let alpha = sequence
            .extracted_channel()
            .is_some_and(|c| channels::is_alpha(count, c));
        let correct =
            colorspace::needs_correction(self.compat, resolved.image.srgb_in_target, count, linear_data, alpha);

        let mut default = channels::broadcast_default(&default, image_ty)?;
        if correct {
            let alpha_index = match image_ty.component_count() {
                4 => Some(3),
                2 => Some(1),
                _ => None,
            };
            default = colorspace::srgb_to_linear_value(&default, alpha_index);
        }

        let image = self.graph.add(NodeKind::Image, image_ty);
        {
            let node = self.graph.node_mut(image);
            let colorspace = if linear_data { COLORSPACE_LINEAR } else { COLORSPACE_SRGB };
            node.set_value("file", Value::Filename(resolved.path().to_string()))
                .colorspace = Some(colorspace.to_string());
            node.set_value("default", default).colorspace = Some(COLORSPACE_LINEAR.to_string());
        }
        let texcoord = self.texcoord(texture);
        self.graph.connect(image, "texcoord", texcoord);
        self.sampler_inputs(image, texture);

        let mut current = image;
        let mut corrected = !correct;
        for op in sequence.ops().iter().skip(1) {
            match *op {
                ChannelOp::Read(_) => {}
                ChannelOp::Extract(index) => current = self.extract(current, index),
                ChannelOp::Convert(ty) => {
                    if !corrected {
                        current = colorspace::append_linear_to_srgb(&mut self.graph, current);
                        corrected = true;
                    }
                    let convert = self.graph.add(NodeKind::Convert, ty);
                    self.graph.connect(convert, "in", current);
                    current = convert;
                }
            }
        }
        if !corrected {
            current = colorspace::append_linear_to_srgb(&mut self.graph, current);
        }
        Ok(Some(current))
    }

    fn sampler_inputs(&mut self, image: NodeId, texture: &TextureRef) {
        let sampler = texture.sampler;
        if let Some(filter) = sampler.filter() {
            self.graph
                .set_value(image, "filtertype", Value::String(filter.mtlx_filter_type().to_string()));
        }
        self.graph.set_value(
            image,
            "uaddressmode",
            Value::String(sampler.wrap_s.mtlx_address_mode().to_string()),
        );
        self.graph.set_value(
            image,
            "vaddressmode",
            Value::String(sampler.wrap_t.mtlx_address_mode().to_string()),
        );
    }

    fn scalar(&mut self, param: &ScalarParam, channel: u8, default: f32) -> Result<Option<Port>> {
        if let Some(texture) = &param.texture {
            if let Some(sample) = self.sample(texture, DesiredType::Float, Some(channel), Value::Float(1.0))? {
                let node = if param.factor != 1.0 {
                    self.multiply(sample, Value::Float(param.factor))
                } else {
                    sample
                };
                return Ok(Some(Port::Node(node)));
            }
        }
        Ok((param.factor != default).then(|| Port::Value(Value::Float(param.factor))))
    }

    fn color(&mut self, param: &ColorParam, default: [f32; 3]) -> Result<Option<Port>> {
        if let Some(texture) = &param.texture {
            if let Some(sample) = self.sample(texture, DesiredType::Color3, None, Value::Color3([1.0; 3]))? {
                let node = if param.factor != [1.0; 3] {
                    self.multiply(sample, Value::Color3(param.factor))
                } else {
                    sample
                };
                return Ok(Some(Port::Node(node)));
            }
        }
        Ok((param.factor != default).then(|| Port::Value(Value::Color3(param.factor))))
    }

    /// Vertex color times factor times texture. Always present, since the
    /// vertex color is read even when nothing else is authored.
    fn base_color(&mut self, factor: [f32; 3], texture: Option<&TextureRef>) -> Result<Option<Port>> {
        let color = self.geomprop(
            &naming::color_set_name(0),
            ValueType::Color3,
            Some(Value::Color3([1.0; 3])),
        );
        self.graph.node_mut(color).colorspace = Some(COLORSPACE_LINEAR.to_string());

        let mut current = color;
        if factor != [1.0; 3] {
            current = self.multiply(current, Value::Color3(factor));
        }
        if let Some(texture) = texture {
            if let Some(sample) = self.sample(texture, DesiredType::Color3, None, Value::Color3([1.0; 3]))? {
                current = self.multiply_nodes(current, sample);
            }
        }
        Ok(Some(Port::Node(current)))
    }

    /// Vertex opacity times factor times texture alpha.
    fn alpha(&mut self, factor: f32, texture: Option<&TextureRef>) -> Result<Option<Port>> {
        let opacity = self.geomprop(
            &naming::opacity_set_name(0),
            ValueType::Float,
            Some(Value::Float(1.0)),
        );

        let mut current = opacity;
        if factor != 1.0 {
            current = self.multiply(current, Value::Float(factor));
        }
        if let Some(texture) = texture {
            if let Some(resolved) = texture.resolve(self.images) {
                let (channel, has_alpha) = channels::alpha_channel(resolved.channel_count());
                if !has_alpha {
                    log::warn!(
                        "{} has {} channel(s) and no alpha, reading channel 0",
                        resolved.path(),
                        resolved.channel_count()
                    );
                }
                if let Some(sample) = self.sample(texture, DesiredType::Float, Some(channel), Value::Float(1.0))? {
                    current = self.multiply_nodes(current, sample);
                }
            }
        }
        Ok(Some(Port::Node(current)))
    }

    /// `normalize(transformvector(tangents, object -> world))`.
    fn world_tangent(&mut self) -> NodeId {
        let tangent = self.geomprop(naming::TANGENTS, ValueType::Vector3, None);
        let world = self.graph.add(NodeKind::TransformVector, ValueType::Vector3);
        self.graph.connect(world, "in", tangent);
        self.graph.set_value(world, "fromspace", Value::String("object".into()));
        self.graph.set_value(world, "tospace", Value::String("world".into()));
        self.unary(NodeKind::Normalize, world)
    }

    /// Tangent-space normal map projected onto the per-corner TBN basis.
    fn normal_map(&mut self, normal: &NormalTexture) -> Result<Option<Port>> {
        let Some(sample) = self.sample(
            &normal.texture,
            DesiredType::Vector3,
            None,
            Value::Vector3([0.5, 0.5, 1.0]),
        )?
        else {
            return Ok(None);
        };

        let doubled = self.multiply(sample, Value::Float(2.0));
        let signed = self.graph.add(NodeKind::Subtract, ValueType::Vector3);
        self.graph.connect(signed, "in1", doubled);
        self.graph.set_value(signed, "in2", Value::Float(1.0));
        let mut scaled = signed;
        if normal.scale != 1.0 {
            scaled = self.multiply(signed, Value::Vector3([normal.scale, normal.scale, 1.0]));
        }
        let unit = self.unary(NodeKind::Normalize, scaled);
        let x = self.extract(unit, 0);
        let y = self.extract(unit, 1);
        let z = self.extract(unit, 2);

        let world_normal = self.graph.add(NodeKind::Normal, ValueType::Vector3);
        self.graph.set_value(world_normal, "space", Value::String("world".into()));

        let tangent = self.world_tangent();

        let cross = self.graph.add(NodeKind::CrossProduct, ValueType::Vector3);
        self.graph.connect(cross, "in1", world_normal);
        self.graph.connect(cross, "in2", tangent);
        let sign = self.geomprop(naming::TANGENT_SIGNS, ValueType::Float, None);
        let bitangent = self.multiply_nodes(cross, sign);

        let tx = self.multiply_nodes(tangent, x);
        let by = self.multiply_nodes(bitangent, y);
        let nz = self.multiply_nodes(world_normal, z);
        let sum = self.graph.add(NodeKind::Add, ValueType::Vector3);
        self.graph.connect(sum, "in1", tx);
        self.graph.connect(sum, "in2", by);
        let total = self.graph.add(NodeKind::Add, ValueType::Vector3);
        self.graph.connect(total, "in1", sum);
        self.graph.connect(total, "in2", nz);
        let result = self.unary(NodeKind::Normalize, total);
        Ok(Some(Port::Node(result)))
    }

    /// `1 + strength * (sample - 1)`.
    fn occlusion(&mut self, occlusion: &OcclusionTexture) -> Result<Option<Port>> {
        let Some(sample) = self.sample(&occlusion.texture, DesiredType::Float, Some(0), Value::Float(1.0))? else {
            return Ok(None);
        };
        let offset = self.graph.add(NodeKind::Subtract, ValueType::Float);
        self.graph.connect(offset, "in1", sample);
        self.graph.set_value(offset, "in2", Value::Float(1.0));
        let mut scaled = offset;
        if occlusion.strength != 1.0 {
            scaled = self.multiply(offset, Value::Float(occlusion.strength));
        }
        let result = self.graph.add(NodeKind::Add, ValueType::Float);
        self.graph.set_value(result, "in1", Value::Float(1.0));
        self.graph.connect(result, "in2", scaled);
        Ok(Some(Port::Node(result)))
    }

    /// `mix(min, max, texture.g)`, or the maximum without a texture.
    fn iridescence_thickness(&mut self, iridescence: &Iridescence) -> Result<Option<Port>> {
        if let Some(texture) = &iridescence.thickness_texture {
            if let Some(sample) = self.sample(texture, DesiredType::Float, Some(1), Value::Float(1.0))? {
                let mix = self.graph.add(NodeKind::Mix, ValueType::Float);
                self.graph.set_value(mix, "bg", Value::Float(iridescence.thickness_minimum));
                self.graph.set_value(mix, "fg", Value::Float(iridescence.thickness_maximum));
                self.graph.connect(mix, "mix", sample);
                return Ok(Some(Port::Node(mix)));
            }
        }
        let maximum = iridescence.thickness_maximum;
        Ok((maximum != DEFAULT_IRIDESCENCE_THICKNESS).then(|| Port::Value(Value::Float(maximum))))
    }

    /// Assemble the shader, material and nested node graph.
    fn finish(self, name: &str, kind: NodeKind) -> (ShadingNetwork, Vec<SkippedInput>) {
        let NetworkBuilder {
            graph,
            inputs,
            skipped,
            ..
        } = self;
        let graph_name = format!("NG_{}", name);
        let mut shader = Node::new(format!("SR_{}", name), kind, ValueType::SurfaceShader);
        let mut outputs: Vec<GraphOutput> = Vec::new();

        for (input, port) in inputs {
            let (id, node_output) = match port {
                Port::Value(value) => {
                    shader.set_value(input, value);
                    continue;
                }
                Port::Node(id) => (id, None),
                Port::Output(id, output) => (id, Some(output)),
            };
            let node = graph.node(id);
            let (output, ty) = match node_output {
                None => (format!("out_{}", node.name), node.ty),
                Some(name) => {
                    let ty = node.outputs.iter().find(|o| o.name == name).map_or(node.ty, |o| o.ty);
                    (format!("out_{}_{}", node.name, name), ty)
                }
            };
            if !outputs.iter().any(|o| o.name == output) {
                outputs.push(GraphOutput {
                    name: output.clone(),
                    ty,
                    node: node.name.clone(),
                    output: node_output.map(str::to_string),
                });
            }
            shader.set_input(
                input,
                ty,
                InputSource::GraphOutput {
                    graph: graph_name.clone(),
                    output,
                },
            );
        }

        let mut material = Node::new(name, NodeKind::SurfaceMaterial, ValueType::Material);
        material.set_input(
            "surfaceshader",
            ValueType::SurfaceShader,
            InputSource::Node {
                node: shader.name.clone(),
                output: None,
            },
        );

        let network = ShadingNetwork {
            material_name: name.to_string(),
            shader,
            material,
            helpers: Helpers::Nested(NodeGraph {
                name: graph_name,
                nodes: graph.into_nodes(),
                outputs,
            }),
        };
        (network, skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompatMode;
    use crate::image_info::ImageMetadata;
    use crate::material::{Specular, Volume};
    use crate::shading::graph::NodeMarker;
    use crate::texture::{FilterMode, ImageHandle, Sampler, TextureTransform, WrapMode};

    fn images(entries: &[(usize, u8, bool)]) -> ImageMetadataMap {
        entries
            .iter()
            .map(|&(handle, channels, srgb)| {
                (
                    ImageHandle(handle),
                    ImageMetadata::new(format!("tex{}.png", handle), channels, srgb),
                )
            })
            .collect()
    }

    fn build(material: &Material, images: &ImageMetadataMap, options: &ConvertOptions) -> ShadingNetwork {
        let built = build_network(material, "m", images, options);
        assert!(built.skipped.is_empty(), "{:?}", built.skipped);
        built.network.validate().unwrap();
        built.network
    }

    fn geomprop_name(node: &Node) -> Option<&Value> {
        node.input_value("geomprop")
    }

    #[test]
    fn test_base_color_always_present() {
        let network = build(&Material::new("m"), &ImageMetadataMap::new(), &ConvertOptions::default());
        assert_eq!(network.shader.kind, NodeKind::GltfPbr);
        assert_eq!(network.shader.name, "SR_m");
        assert_eq!(network.shader.inputs.len(), 1);
        let upstream = network.upstream_of("base_color").unwrap();
        assert_eq!(upstream.kind, NodeKind::GeomPropValue);
        assert_eq!(geomprop_name(upstream), Some(&Value::String("color".into())));
        assert_eq!(upstream.colorspace.as_deref(), Some("lin_rec709"));
        assert_eq!(
            network.material.input("surfaceshader").unwrap().source,
            InputSource::Node {
                node: "SR_m".into(),
                output: None
            }
        );
    }

    #[test]
    fn test_textured_base_color() {
        let mut material = Material::new("m");
        material.pbr = Some(PbrMetallicRoughness {
            base_color_factor: [0.5, 0.5, 0.5, 1.0],
            base_color_texture: Some(TextureRef::new(ImageHandle(0)).with_sampler(Sampler {
                mag_filter: Some(FilterMode::Nearest),
                min_filter: None,
                wrap_s: WrapMode::ClampToEdge,
                wrap_t: WrapMode::MirroredRepeat,
            })),
            ..Default::default()
        });
        let network = build(&material, &images(&[(0, 4, true)]), &ConvertOptions::default());

        let kinds: Vec<NodeKind> = network.helper_nodes().iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::GeomPropValue,
                NodeKind::Multiply,
                NodeKind::Image,
                NodeKind::GeomPropValue,
                NodeKind::Convert,
                NodeKind::Multiply,
            ]
        );
        let image = network.helper("node3").unwrap();
        assert_eq!(image.ty, ValueType::Color4);
        let file = image.input("file").unwrap();
        assert_eq!(file.source, InputSource::Value(Value::Filename("tex0.png".into())));
        assert_eq!(file.colorspace.as_deref(), Some("srgb_texture"));
        assert_eq!(image.input_value("default"), Some(&Value::Color4([1.0; 4])));
        assert_eq!(image.input_value("filtertype"), Some(&Value::String("closest".into())));
        assert_eq!(image.input_value("uaddressmode"), Some(&Value::String("clamp".into())));
        assert_eq!(image.input_value("vaddressmode"), Some(&Value::String("mirror".into())));
        assert_eq!(
            geomprop_name(network.helper("node4").unwrap()),
            Some(&Value::String("st".into()))
        );
        assert_eq!(network.upstream_of("base_color").unwrap().name, "node6");
    }

    #[test]
    fn test_alpha_modulation() {
        let mut material = Material::new("m");
        material.alpha_mode = AlphaMode::Mask;
        material.alpha_cutoff = 0.3;
        material.pbr = Some(PbrMetallicRoughness {
            base_color_factor: [1.0, 1.0, 1.0, 0.5],
            ..Default::default()
        });
        let network = build(&material, &ImageMetadataMap::new(), &ConvertOptions::default());
        let alpha = network.upstream_of("alpha").unwrap();
        assert_eq!(alpha.kind, NodeKind::Multiply);
        assert_eq!(alpha.input_value("in2"), Some(&Value::Float(0.5)));
        assert_eq!(network.shader.input_value("alpha_mode"), Some(&Value::Integer(1)));
        assert_eq!(network.shader.input_value("alpha_cutoff"), Some(&Value::Float(0.3)));
    }

    #[test]
    fn test_normal_map_chain() {
        let mut material = Material::new("m");
        material.normal = Some(NormalTexture {
            texture: TextureRef::new(ImageHandle(1)),
            scale: 0.5,
        });
        let network = build(&material, &images(&[(1, 3, true)]), &ConvertOptions::default());

        let result = network.upstream_of("normal").unwrap();
        assert_eq!(result.kind, NodeKind::Normalize);
        let nodes = network.helper_nodes();
        let image = nodes.iter().find(|n| n.kind == NodeKind::Image).unwrap();
        assert_eq!(image.ty, ValueType::Vector3);
        assert_eq!(image.input_value("default"), Some(&Value::Vector3([0.5, 0.5, 1.0])));
        assert_eq!(image.input("file").unwrap().colorspace.as_deref(), Some("lin_rec709"));
        assert!(nodes
            .iter()
            .any(|n| n.kind == NodeKind::Multiply && n.input_value("in2") == Some(&Value::Vector3([0.5, 0.5, 1.0]))));
        let normal = nodes.iter().find(|n| n.kind == NodeKind::Normal).unwrap();
        assert_eq!(normal.input_value("space"), Some(&Value::String("world".into())));
        let transform = nodes.iter().find(|n| n.kind == NodeKind::TransformVector).unwrap();
        assert_eq!(transform.input_value("tospace"), Some(&Value::String("world".into())));
        for name in ["tangents", "tangentSigns"] {
            assert!(nodes
                .iter()
                .any(|n| geomprop_name(n) == Some(&Value::String(name.into()))));
        }
        assert_eq!(nodes.iter().filter(|n| n.kind == NodeKind::Extract).count(), 3);
        assert_eq!(nodes.iter().filter(|n| n.kind == NodeKind::CrossProduct).count(), 1);
    }

    #[test]
    fn test_occlusion_algebra() {
        let mut material = Material::new("m");
        material.occlusion = Some(OcclusionTexture {
            texture: TextureRef::new(ImageHandle(2)),
            strength: 0.25,
        });
        let network = build(&material, &images(&[(2, 3, true)]), &ConvertOptions::default());
        let add = network.upstream_of("occlusion").unwrap();
        assert_eq!(add.kind, NodeKind::Add);
        assert_eq!(add.input_value("in1"), Some(&Value::Float(1.0)));
        let kinds: Vec<NodeKind> = network.helper_nodes().iter().map(|n| n.kind).collect();
        assert!(kinds.ends_with(&[NodeKind::Extract, NodeKind::Subtract, NodeKind::Multiply, NodeKind::Add]));
    }

    #[test]
    fn test_missing_metadata_falls_back() {
        let mut material = Material::new("m");
        material.pbr = Some(PbrMetallicRoughness {
            metallic_factor: 0.3,
            metallic_roughness_texture: Some(TextureRef::new(ImageHandle(9))),
            ..Default::default()
        });
        let network = build(&material, &ImageMetadataMap::new(), &ConvertOptions::default());
        assert_eq!(network.shader.input_value("metallic"), Some(&Value::Float(0.3)));
        assert!(network.shader.input("roughness").is_none());
    }

    #[test]
    fn test_compat_nudge() {
        let mut material = Material::new("m");
        material.alpha_mode = AlphaMode::Blend;
        let images = ImageMetadataMap::new();

        let compat = ConvertOptions::default().with_compat_mode(CompatMode::On);
        let network = build(&material, &images, &compat);
        assert_eq!(
            network.shader.input_value("transmission"),
            Some(&Value::Float(f32::MIN_POSITIVE))
        );

        let flat = compat.clone().with_graph_layout(GraphLayout::Flattened);
        assert!(build(&material, &images, &flat).shader.input("transmission").is_none());
        assert!(build(&material, &images, &ConvertOptions::default())
            .shader
            .input("transmission")
            .is_none());

        material.transmission = Some(ScalarParam::new(0.5));
        assert_eq!(
            build(&material, &images, &compat).shader.input_value("transmission"),
            Some(&Value::Float(0.5))
        );
    }

    #[test]
    fn test_flattened_layout() {
        let options = ConvertOptions::default().with_graph_layout(GraphLayout::Flattened);
        let network = build(&Material::new("m"), &ImageMetadataMap::new(), &options);
        assert_eq!(network.layout(), GraphLayout::Flattened);
        assert_eq!(network.helper_nodes()[0].name, "m_node1");
        assert_eq!(
            network.shader.input("base_color").unwrap().source,
            InputSource::Node {
                node: "m_node1".into(),
                output: None
            }
        );
    }

    #[test]
    fn test_single_channel_correction() {
        let mut material = Material::new("m");
        material.pbr = Some(PbrMetallicRoughness {
            metallic_roughness_texture: Some(TextureRef::new(ImageHandle(0))),
            ..Default::default()
        });
        let images = images(&[(0, 1, true)]);

        let compat = ConvertOptions::default().with_compat_mode(CompatMode::On);
        let network = build(&material, &images, &compat);
        let roughness = network.upstream_of("roughness").unwrap();
        assert_eq!(roughness.marker, Some(NodeMarker::SrgbCorrection));

        let network = build(&material, &images, &ConvertOptions::default());
        assert_eq!(network.upstream_of("roughness").unwrap().kind, NodeKind::Image);
    }

    #[test]
    fn test_two_channel_alpha_not_corrected() {
        let mut material = Material::new("m");
        material.alpha_mode = AlphaMode::Blend;
        material.pbr = Some(PbrMetallicRoughness {
            base_color_texture: Some(TextureRef::new(ImageHandle(0))),
            ..Default::default()
        });
        let options = ConvertOptions::default().with_compat_mode(CompatMode::On);
        let network = build(&material, &images(&[(0, 2, true)]), &options);
        assert!(network
            .helper_nodes()
            .iter()
            .all(|n| n.marker != Some(NodeMarker::SrgbCorrection)));
        assert!(network
            .helper_nodes()
            .iter()
            .any(|n| n.kind == NodeKind::Extract && n.input_value("index") == Some(&Value::Integer(3))));
    }

    #[test]
    fn test_texture_transform() {
        let mut material = Material::new("m");
        material.emissive = Some(ColorParam::new([1.0; 3]).with_texture(
            TextureRef::new(ImageHandle(0)).with_tex_coord(1).with_transform(TextureTransform {
                offset: [0.5, 0.25],
                rotation: std::f32::consts::FRAC_PI_2,
                scale: [2.0, 0.0],
                tex_coord: None,
            }),
        ));
        let network = build(&material, &images(&[(0, 3, true)]), &ConvertOptions::default());
        let place = network
            .helper_nodes()
            .iter()
            .find(|n| n.kind == NodeKind::Place2d)
            .unwrap();
        assert_eq!(place.input_value("offset"), Some(&Value::Vector2([-0.5, 0.25])));
        assert_eq!(place.input_value("scale"), Some(&Value::Vector2([0.5, 0.0])));
        assert_eq!(place.input_value("pivot"), Some(&Value::Vector2([0.0, 1.0])));
        let Some(Value::Float(rotate)) = place.input_value("rotate") else {
            panic!("missing rotate");
        };
        assert!((rotate + 90.0).abs() < 1e-4);
        assert!(network
            .helper_nodes()
            .iter()
            .any(|n| geomprop_name(n) == Some(&Value::String("st1".into()))));
    }

    #[test]
    fn test_resolution_gap_skips_input() {
        let mut material = Material::new("m");
        material.specular = Some(Specular {
            factor: ScalarParam::new(1.0).with_texture(TextureRef::new(ImageHandle(0))),
            color: ColorParam::new([0.5, 0.5, 0.5]),
        });
        let built = build_network(&material, "m", &images(&[(0, 3, true)]), &ConvertOptions::default());
        assert_eq!(built.skipped.len(), 1);
        assert_eq!(built.skipped[0].input, "specular");
        assert!(built.skipped[0].error.is_internal());
        assert!(built.network.shader.input("specular").is_none());
        assert_eq!(
            built.network.shader.input_value("specular_color"),
            Some(&Value::Color3([0.5, 0.5, 0.5]))
        );
        assert!(built
            .network
            .helper_nodes()
            .iter()
            .all(|n| n.kind != NodeKind::Image));
        built.network.validate().unwrap();
    }

    #[test]
    fn test_extension_constants() {
        let mut material = Material::new("m");
        material.ior = Some(1.5);
        material.volume = Some(Volume {
            thickness: ScalarParam::new(0.0),
            attenuation_distance: f32::INFINITY,
            attenuation_color: [1.0, 0.5, 0.5],
        });
        let network = build(&material, &ImageMetadataMap::new(), &ConvertOptions::default());
        assert!(network.shader.input("ior").is_none());
        assert!(network.shader.input("attenuation_distance").is_none());
        assert_eq!(
            network.shader.input_value("attenuation_color"),
            Some(&Value::Color3([1.0, 0.5, 0.5]))
        );
    }

    #[test]
    fn test_anisotropy_image() {
        let mut material = Material::new("m");
        material.anisotropy = Some(Anisotropy {
            strength: 0.5,
            rotation: 0.25,
            texture: Some(TextureRef::new(ImageHandle(2))),
        });
        let network = build(&material, &images(&[(2, 3, false)]), &ConvertOptions::default());

        let image = network.upstream_of("anisotropy_strength").unwrap();
        assert_eq!(image.kind.category(), "gltf_anisotropy_image");
        assert_eq!(image.input_value("anisotropy_strength"), Some(&Value::Float(0.5)));
        assert_eq!(image.input_value("anisotropy_rotation"), Some(&Value::Float(0.25)));
        assert_eq!(image.input("file").unwrap().colorspace.as_deref(), Some("lin_rec709"));
        assert_eq!(image.outputs.len(), 2);
        let image_name = image.name.clone();
        assert_eq!(network.upstream_of("anisotropy_rotation").unwrap().name, image_name);
        assert_eq!(network.shader.input("anisotropy_rotation").unwrap().ty, ValueType::Float);

        let Helpers::Nested(graph) = &network.helpers else { panic!() };
        let output = graph
            .outputs
            .iter()
            .find(|o| o.output.as_deref() == Some("anisotropy_rotation_out"))
            .unwrap();
        assert_eq!(output.ty, ValueType::Float);
        assert_eq!(output.node, image_name);

        assert_eq!(network.upstream_of("tangent").unwrap().kind, NodeKind::Normalize);
        assert!(network.reads_geomprop(naming::TANGENTS));
        assert!(!network.reads_geomprop(naming::TANGENT_SIGNS));

        let flat = network.flatten();
        flat.validate().unwrap();
        assert_eq!(
            flat.shader.input("anisotropy_strength").unwrap().source,
            InputSource::Node {
                node: format!("m_{}", image_name),
                output: Some("anisotropy_strength_out".into())
            }
        );
    }

    #[test]
    fn test_anisotropy_without_metadata() {
        let mut material = Material::new("m");
        material.anisotropy = Some(Anisotropy {
            strength: 0.8,
            rotation: 0.0,
            texture: Some(TextureRef::new(ImageHandle(5))),
        });
        let network = build(&material, &ImageMetadataMap::new(), &ConvertOptions::default());
        assert_eq!(network.shader.input_value("anisotropy_strength"), Some(&Value::Float(0.8)));
        assert!(network.shader.input("anisotropy_rotation").is_none());
        assert!(network.helper_nodes().iter().all(|n| n.kind != NodeKind::AnisotropyImage));
        assert!(network.shader.input("tangent").is_some());
    }

    #[test]
    fn test_unlit() {
        let mut material = Material::new("m");
        material.unlit = true;
        material.alpha_mode = AlphaMode::Blend;
        let options = ConvertOptions::default().with_compat_mode(CompatMode::On);
        let network = build(&material, &ImageMetadataMap::new(), &options);
        assert_eq!(network.shader.kind, NodeKind::SurfaceUnlit);
        assert!(network.shader.input("emission_color").is_some());
        assert!(network.shader.input("opacity").is_some());
        assert!(network.shader.input("transmission").is_none());
    }

    #[test]
    fn test_deterministic() {
        let mut material = Material::new("m");
        material.normal = Some(NormalTexture {
            texture: TextureRef::new(ImageHandle(0)),
            scale: 1.0,
        });
        material.occlusion = Some(OcclusionTexture {
            texture: TextureRef::new(ImageHandle(0)),
            strength: 1.0,
        });
        let images = images(&[(0, 4, true)]);
        let options = ConvertOptions::default();
        let a = build(&material, &images, &options);
        let b = build(&material, &images, &options);
        assert_eq!(a, b);
    }
}
