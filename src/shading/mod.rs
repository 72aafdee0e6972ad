//! Shading network synthesis.
//!
//! Each material is turned into two representations: a `gltf_pbr` node
//! graph ([`materialx`]) and a fixed-schema UsdPreviewSurface network
//! ([`preview`]). Both share the channel resolution and color space rules.

pub mod channels;
pub mod colorspace;
pub mod graph;
pub mod materialx;
pub mod preview;

pub use channels::{ChannelOp, DesiredType, NodeSequence};
pub use graph::{
    GraphBuilder, Helpers, Input, InputSource, Node, NodeGraph, NodeId, NodeKind, ShadingNetwork, Value, ValueType,
};
pub use materialx::{build_network, NetworkBuild};
pub use preview::{build_preview, PreviewBuild, PreviewMaterial};

use crate::error::BridgeError;

/// A shader input left out because building it failed.
#[derive(Debug)]
pub struct SkippedInput {
    pub input: &'static str,
    pub error: BridgeError,
}
