//! Conversion options.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Workarounds for the Storm rasterizer's handling of MaterialX networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompatMode {
    #[default]
    Off,
    On,
}

/// When tangent frames are generated for normal-mapped primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TangentTrigger {
    /// Whenever the bound material has a usable normal texture.
    Always,
    /// Only when node-graph materials are emitted, since the fixed-schema
    /// surface never reads tangents.
    #[default]
    WhenNodeGraphEmitted,
}

/// Placement of helper nodes in emitted node graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GraphLayout {
    /// Helpers live in a node graph exposing boundary outputs.
    #[default]
    Nested,
    /// Helpers live beside the shader node.
    Flattened,
}

/// Options for a conversion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConvertOptions {
    /// Build `gltf_pbr` node-graph materials.
    pub emit_node_graph: bool,
    /// Build UsdPreviewSurface materials.
    pub emit_preview_surface: bool,
    /// Storm compatibility workarounds.
    pub compat_mode: CompatMode,
    pub generate_tangents_when: TangentTrigger,
    pub graph_layout: GraphLayout,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            emit_node_graph: true,
            emit_preview_surface: true,
            compat_mode: CompatMode::Off,
            generate_tangents_when: TangentTrigger::WhenNodeGraphEmitted,
            graph_layout: GraphLayout::Nested,
        }
    }
}

impl ConvertOptions {
    /// Parse options from JSON; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_compat_mode(mut self, mode: CompatMode) -> Self {
        self.compat_mode = mode;
        self
    }

    pub fn with_graph_layout(mut self, layout: GraphLayout) -> Self {
        self.graph_layout = layout;
        self
    }

    pub fn with_tangent_trigger(mut self, trigger: TangentTrigger) -> Self {
        self.generate_tangents_when = trigger;
        self
    }

    pub fn with_node_graph(mut self, emit: bool) -> Self {
        self.emit_node_graph = emit;
        self
    }

    pub fn with_preview_surface(mut self, emit: bool) -> Self {
        self.emit_preview_surface = emit;
        self
    }

    pub fn compat(&self) -> bool {
        self.compat_mode == CompatMode::On
    }

    /// Whether tangents should be generated for normal-mapped geometry.
    pub fn wants_tangents(&self) -> bool {
        match self.generate_tangents_when {
            TangentTrigger::Always => true,
            TangentTrigger::WhenNodeGraphEmitted => self.emit_node_graph,
        }
    }
}
