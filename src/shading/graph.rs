//! Typed shading node graphs.
//!
//! Both material representations are built from the same node and input
//! types. Node-graph materials use single-output MaterialX nodes;
//! fixed-schema materials use USD shader records with named outputs.

use crate::config::GraphLayout;
use crate::error::{BridgeError, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt::Write;

/// Value type of an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueType {
    Boolean,
    Integer,
    Float,
    Vector2,
    Vector3,
    Vector4,
    Color3,
    Color4,
    String,
    Filename,
    /// USD token; written as a MaterialX string.
    Token,
    SurfaceShader,
    Material,
}

impl ValueType {
    /// MaterialX type name.
    pub fn mtlx_name(&self) -> &'static str {
        match self {
            ValueType::Boolean => "boolean",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Vector2 => "vector2",
            ValueType::Vector3 => "vector3",
            ValueType::Vector4 => "vector4",
            ValueType::Color3 => "color3",
            ValueType::Color4 => "color4",
            ValueType::String | ValueType::Token => "string",
            ValueType::Filename => "filename",
            ValueType::SurfaceShader => "surfaceshader",
            ValueType::Material => "material",
        }
    }

    /// USD attribute type name.
    pub fn usd_name(&self) -> &'static str {
        match self {
            ValueType::Boolean => "bool",
            ValueType::Integer => "int",
            ValueType::Float => "float",
            ValueType::Vector2 => "float2",
            ValueType::Vector3 => "float3",
            ValueType::Vector4 => "float4",
            ValueType::Color3 => "color3f",
            ValueType::Color4 => "color4f",
            ValueType::String => "string",
            ValueType::Filename => "asset",
            ValueType::Token | ValueType::SurfaceShader | ValueType::Material => "token",
        }
    }

    /// Number of float components, zero for non-numeric types.
    pub fn component_count(&self) -> usize {
        match self {
            ValueType::Float => 1,
            ValueType::Vector2 => 2,
            ValueType::Vector3 | ValueType::Color3 => 3,
            ValueType::Vector4 | ValueType::Color4 => 4,
            _ => 0,
        }
    }

    pub fn is_color(&self) -> bool {
        matches!(self, ValueType::Color3 | ValueType::Color4)
    }
}

/// A constant input value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Value {
    Boolean(bool),
    Integer(i32),
    Float(f32),
    Vector2([f32; 2]),
    Vector3([f32; 3]),
    Vector4([f32; 4]),
    Color3([f32; 3]),
    Color4([f32; 4]),
    String(String),
    Filename(String),
    Token(String),
}

fn join_floats(values: &[f32], out: &mut String) {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{}", v);
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Boolean(_) => ValueType::Boolean,
            Value::Integer(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::Vector2(_) => ValueType::Vector2,
            Value::Vector3(_) => ValueType::Vector3,
            Value::Vector4(_) => ValueType::Vector4,
            Value::Color3(_) => ValueType::Color3,
            Value::Color4(_) => ValueType::Color4,
            Value::String(_) => ValueType::String,
            Value::Filename(_) => ValueType::Filename,
            Value::Token(_) => ValueType::Token,
        }
    }

    /// Float components of numeric values.
    pub fn components(&self) -> Option<&[f32]> {
        match self {
            Value::Float(v) => Some(std::slice::from_ref(v)),
            Value::Vector2(v) => Some(v),
            Value::Vector3(v) | Value::Color3(v) => Some(v),
            Value::Vector4(v) | Value::Color4(v) => Some(v),
            _ => None,
        }
    }

    /// MaterialX attribute string, e.g. `0.5, 0.5, 1`.
    pub fn to_mtlx_string(&self) -> String {
        let mut out = String::new();
        match self {
            Value::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Integer(i) => {
                let _ = write!(out, "{}", i);
            }
            Value::String(s) | Value::Filename(s) | Value::Token(s) => out.push_str(s),
            numeric => {
                if let Some(c) = numeric.components() {
                    join_floats(c, &mut out);
                }
            }
        }
        out
    }

    /// USDA literal, e.g. `(0.5, 0.5, 1)` or `@tex.png@`.
    pub fn to_usda_string(&self) -> String {
        let mut out = String::new();
        match self {
            Value::Boolean(b) => out.push_str(if *b { "1" } else { "0" }),
            Value::Integer(i) => {
                let _ = write!(out, "{}", i);
            }
            Value::Float(f) => {
                let _ = write!(out, "{}", f);
            }
            Value::String(s) | Value::Token(s) => {
                let _ = write!(out, "\"{}\"", s);
            }
            Value::Filename(s) => {
                let _ = write!(out, "@{}@", s);
            }
            numeric => {
                if let Some(c) = numeric.components() {
                    out.push('(');
                    join_floats(c, &mut out);
                    out.push(')');
                }
            }
        }
        out
    }
}

/// Where an input gets its value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InputSource {
    Value(Value),
    /// Output of a sibling node; `None` is the node's only output.
    Node { node: String, output: Option<String> },
    /// Boundary output of a node graph.
    GraphOutput { graph: String, output: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Input {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
    pub source: InputSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colorspace: Option<String>,
}

/// Named output of a multi-output node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Output {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
}

/// Node kinds. The category string is the node definition name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Image,
    GeomPropValue,
    Multiply,
    Add,
    Subtract,
    Power,
    IfGreater,
    Clamp,
    Normalize,
    Extract,
    Convert,
    Normal,
    TransformVector,
    CrossProduct,
    Mix,
    Place2d,
    AnisotropyImage,
    GltfPbr,
    SurfaceUnlit,
    SurfaceMaterial,
    PreviewSurface,
    UvTexture,
    PrimvarReader,
    Transform2d,
}

impl NodeKind {
    pub fn category(&self) -> &'static str {
        match self {
            NodeKind::Image => "image",
            NodeKind::GeomPropValue => "geompropvalue",
            NodeKind::Multiply => "multiply",
            NodeKind::Add => "add",
            NodeKind::Subtract => "subtract",
            NodeKind::Power => "power",
            NodeKind::IfGreater => "ifgreater",
            NodeKind::Clamp => "clamp",
            NodeKind::Normalize => "normalize",
            NodeKind::Extract => "extract",
            NodeKind::Convert => "convert",
            NodeKind::Normal => "normal",
            NodeKind::TransformVector => "transformvector",
            NodeKind::CrossProduct => "crossproduct",
            NodeKind::Mix => "mix",
            NodeKind::Place2d => "place2d",
            NodeKind::AnisotropyImage => "gltf_anisotropy_image",
            NodeKind::GltfPbr => "gltf_pbr",
            NodeKind::SurfaceUnlit => "surface_unlit",
            NodeKind::SurfaceMaterial => "surfacematerial",
            NodeKind::PreviewSurface => "UsdPreviewSurface",
            NodeKind::UvTexture => "UsdUVTexture",
            NodeKind::PrimvarReader => "UsdPrimvarReader_float2",
            NodeKind::Transform2d => "UsdTransform2d",
        }
    }
}

/// Marks a node with a meaning checked by graph validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeMarker {
    /// Last node of a linear-to-sRGB correction chain.
    SrgbCorrection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    /// Type of the node's default output.
    #[serde(rename = "type")]
    pub ty: ValueType,
    pub inputs: Vec<Input>,
    /// Declared outputs; empty for single-output nodes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<Output>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colorspace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<NodeMarker>,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            inputs: Vec::new(),
            outputs: Vec::new(),
            colorspace: None,
            marker: None,
        }
    }

    pub fn input(&self, name: &str) -> Option<&Input> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// Value of a constant input.
    pub fn input_value(&self, name: &str) -> Option<&Value> {
        match &self.input(name)?.source {
            InputSource::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Add or replace an input.
    pub fn set_input(&mut self, name: &str, ty: ValueType, source: InputSource) -> &mut Input {
        let input = Input {
            name: name.to_string(),
            ty,
            source,
            colorspace: None,
        };
        match self.inputs.iter().position(|i| i.name == name) {
            Some(pos) => {
                self.inputs[pos] = input;
                &mut self.inputs[pos]
            }
            None => {
                self.inputs.push(input);
                let last = self.inputs.len() - 1;
                &mut self.inputs[last]
            }
        }
    }

    pub fn set_value(&mut self, name: &str, value: Value) -> &mut Input {
        let ty = value.value_type();
        self.set_input(name, ty, InputSource::Value(value))
    }

    pub fn add_output(&mut self, name: &str, ty: ValueType) {
        if !self.outputs.iter().any(|o| o.name == name) {
            self.outputs.push(Output {
                name: name.to_string(),
                ty,
            });
        }
    }
}

/// Handle to a node inside a [`GraphBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Handle of the node created `index`-th (zero based).
    pub fn from_index(index: usize) -> Self {
        NodeId(index)
    }
}

/// Creates uniquely named nodes in insertion order.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node named `node1`, `node2`, ... in creation order.
    pub fn add(&mut self, kind: NodeKind, ty: ValueType) -> NodeId {
        let name = format!("node{}", self.nodes.len() + 1);
        self.nodes.push(Node::new(name, kind, ty));
        NodeId(self.nodes.len() - 1)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id.0].name
    }

    pub fn set_value(&mut self, id: NodeId, input: &str, value: Value) {
        self.node_mut(id).set_value(input, value);
    }

    /// Connect the default output of `from` to `input` of `to`.
    pub fn connect(&mut self, to: NodeId, input: &str, from: NodeId) {
        let ty = self.node(from).ty;
        let source = InputSource::Node {
            node: self.name(from).to_string(),
            output: None,
        };
        self.node_mut(to).set_input(input, ty, source);
    }

    /// Connect a named output of `from`, declaring it on the source node.
    pub fn connect_output(&mut self, to: NodeId, input: &str, input_ty: ValueType, from: NodeId, output: &str, output_ty: ValueType) {
        self.node_mut(from).add_output(output, output_ty);
        let source = InputSource::Node {
            node: self.name(from).to_string(),
            output: Some(output.to_string()),
        };
        self.node_mut(to).set_input(input, input_ty, source);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every node created after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        self.nodes.truncate(len);
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }
}

/// Boundary output of a nested node graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphOutput {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
    /// Node inside the graph feeding this output.
    pub node: String,
    /// Named output of `node`; `None` is its only output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeGraph {
    pub name: String,
    pub nodes: Vec<Node>,
    pub outputs: Vec<GraphOutput>,
}

/// Helper node placement of a network.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Helpers {
    Nested(NodeGraph),
    Flattened(Vec<Node>),
}

/// One material as a node-graph shading network.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadingNetwork {
    pub material_name: String,
    /// BRDF node (`SR_<name>`).
    pub shader: Node,
    /// `surfacematerial` node named after the material.
    pub material: Node,
    pub helpers: Helpers,
}

impl ShadingNetwork {
    pub fn layout(&self) -> GraphLayout {
        match self.helpers {
            Helpers::Nested(_) => GraphLayout::Nested,
            Helpers::Flattened(_) => GraphLayout::Flattened,
        }
    }

    pub fn helper_nodes(&self) -> &[Node] {
        match &self.helpers {
            Helpers::Nested(graph) => &graph.nodes,
            Helpers::Flattened(nodes) => nodes,
        }
    }

    /// Find a helper node by name.
    pub fn helper(&self, name: &str) -> Option<&Node> {
        self.helper_nodes().iter().find(|n| n.name == name)
    }

    /// Whether any helper reads the geometric property `name`.
    pub fn reads_geomprop(&self, name: &str) -> bool {
        self.helper_nodes().iter().any(|n| {
            n.kind == NodeKind::GeomPropValue && matches!(n.input_value("geomprop"), Some(Value::String(p)) if p == name)
        })
    }

    /// Helper node feeding a shader input, through a graph output if nested.
    pub fn upstream_of(&self, shader_input: &str) -> Option<&Node> {
        match &self.shader.input(shader_input)?.source {
            InputSource::Node { node, .. } => self.helper(node),
            InputSource::GraphOutput { output, .. } => {
                let Helpers::Nested(graph) = &self.helpers else { return None };
                let out = graph.outputs.iter().find(|o| &o.name == output)?;
                self.helper(&out.node)
            }
            InputSource::Value(_) => None,
        }
    }

    /// Move helpers beside the shader, prefixing their names with the
    /// material name so networks can share one document.
    pub fn flatten(self) -> ShadingNetwork {
        let Helpers::Nested(graph) = self.helpers else { return self };
        let prefix = format!("{}_", self.material_name);
        let rename = |name: &str| format!("{}{}", prefix, name);
        let outputs: HashMap<String, (String, Option<String>)> = graph
            .outputs
            .iter()
            .map(|o| (o.name.clone(), (rename(&o.node), o.output.clone())))
            .collect();

        let nodes = graph
            .nodes
            .into_iter()
            .map(|mut node| {
                node.name = rename(&node.name);
                for input in &mut node.inputs {
                    if let InputSource::Node { node, .. } = &mut input.source {
                        *node = rename(node);
                    }
                }
                node
            })
            .collect();

        let mut shader = self.shader;
        for input in &mut shader.inputs {
            if let InputSource::GraphOutput { output, .. } = &input.source {
                if let Some((node, output)) = outputs.get(output) {
                    input.source = InputSource::Node {
                        node: node.clone(),
                        output: output.clone(),
                    };
                }
            }
        }

        ShadingNetwork {
            material_name: self.material_name,
            shader,
            material: self.material,
            helpers: Helpers::Flattened(nodes),
        }
    }

    /// Check that every connection resolves, the helpers form a DAG, and no
    /// path carries more than one sRGB correction.
    pub fn validate(&self) -> Result<()> {
        let resolver = Resolver {
            network: self,
            nodes: self.helper_nodes().iter().map(|n| (n.name.as_str(), n)).collect(),
        };
        let mut corrections = HashMap::new();
        let mut active = HashSet::new();
        for input in &self.shader.inputs {
            if let Some(node) = resolver.resolve(&input.source)? {
                resolver.visit(node, &mut corrections, &mut active)?;
            }
        }
        for node in self.helper_nodes() {
            resolver.visit(node, &mut corrections, &mut active)?;
        }
        Ok(())
    }
}

struct Resolver<'a> {
    network: &'a ShadingNetwork,
    nodes: HashMap<&'a str, &'a Node>,
}

impl<'a> Resolver<'a> {
    fn lookup(&self, name: &str) -> Result<&'a Node> {
        self.nodes
            .get(name)
            .copied()
            .ok_or_else(|| BridgeError::InvalidGraph(format!("unknown node '{}'", name)))
    }

    fn resolve(&self, source: &InputSource) -> Result<Option<&'a Node>> {
        match source {
            InputSource::Value(_) => Ok(None),
            InputSource::Node { node, .. } => self.lookup(node).map(Some),
            InputSource::GraphOutput { graph, output } => {
                let Helpers::Nested(g) = &self.network.helpers else {
                    return Err(BridgeError::InvalidGraph(format!(
                        "graph output '{}' in flattened network",
                        output
                    )));
                };
                if &g.name != graph {
                    return Err(BridgeError::InvalidGraph(format!("unknown node graph '{}'", graph)));
                }
                let out = g
                    .outputs
                    .iter()
                    .find(|o| &o.name == output)
                    .ok_or_else(|| BridgeError::InvalidGraph(format!("unknown graph output '{}'", output)))?;
                self.lookup(&out.node).map(Some)
            }
        }
    }

    /// Largest number of corrections on any path ending at `node`.
    fn visit(
        &self,
        node: &'a Node,
        corrections: &mut HashMap<&'a str, usize>,
        active: &mut HashSet<&'a str>,
    ) -> Result<usize> {
        if let Some(&count) = corrections.get(node.name.as_str()) {
            return Ok(count);
        }
        if !active.insert(node.name.as_str()) {
            return Err(BridgeError::InvalidGraph(format!("cycle through '{}'", node.name)));
        }
        let mut upstream = 0;
        for input in &node.inputs {
            if let Some(next) = self.resolve(&input.source)? {
                upstream = upstream.max(self.visit(next, corrections, active)?);
            }
        }
        active.remove(node.name.as_str());
        let count = upstream + usize::from(node.marker == Some(NodeMarker::SrgbCorrection));
        if count > 1 {
            return Err(BridgeError::InvalidGraph(format!(
                "color space corrected more than once at '{}'",
                node.name
            )));
        }
        corrections.insert(node.name.as_str(), count);
        Ok(count)
    }
}
