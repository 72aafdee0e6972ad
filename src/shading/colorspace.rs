//! sRGB transfer functions and the correction node chain.

use super::graph::{GraphBuilder, NodeId, NodeKind, NodeMarker, Value, ValueType};

const LINEAR_CUTOFF: f32 = 0.0031308;
const SRGB_CUTOFF: f32 = 0.04045;

/// Linear to sRGB-encoded, clamped to [0, 1].
pub fn linear_to_srgb(x: f32) -> f32 {
    let y = if x <= LINEAR_CUTOFF {
        12.92 * x
    } else {
        1.055 * x.powf(1.0 / 2.4) - 0.055
    };
    y.clamp(0.0, 1.0)
}

/// sRGB-encoded to linear, clamped to [0, 1].
pub fn srgb_to_linear(x: f32) -> f32 {
    let y = if x <= SRGB_CUTOFF {
        x / 12.92
    } else {
        ((x + 0.055) / 1.055).powf(2.4)
    };
    y.clamp(0.0, 1.0)
}

/// Apply `srgb_to_linear` to every component of a numeric value except the
/// one at `alpha`.
pub fn srgb_to_linear_value(value: &Value, alpha: Option<usize>) -> Value {
    let map = |i: usize, x: f32| if Some(i) == alpha { x } else { srgb_to_linear(x) };
    fn apply<const N: usize>(v: &[f32; N], map: impl Fn(usize, f32) -> f32) -> [f32; N] {
        let mut out = *v;
        for (i, x) in out.iter_mut().enumerate() {
            *x = map(i, *x);
        }
        out
    }
    match value {
        Value::Float(x) => Value::Float(map(0, *x)),
        Value::Vector2(v) => Value::Vector2(apply(v, map)),
        Value::Vector3(v) => Value::Vector3(apply(v, map)),
        Value::Color3(v) => Value::Color3(apply(v, map)),
        Value::Vector4(v) => Value::Vector4(apply(v, map)),
        Value::Color4(v) => Value::Color4(apply(v, map)),
        other => other.clone(),
    }
}

/// Whether the consumer will wrongly decode a linear data channel as sRGB.
///
/// Only one- and two-channel 8-bit images are affected, and alpha is never
/// decoded.
pub fn needs_correction(compat: bool, srgb_in_target: bool, channel_count: u8, linear_data: bool, alpha: bool) -> bool {
    compat && srgb_in_target && (channel_count == 1 || channel_count == 2) && linear_data && !alpha
}

/// Append nodes computing `linear_to_srgb` of a float node's output,
/// undoing the consumer's sRGB decode. Returns the final clamp node.
pub fn append_linear_to_srgb(graph: &mut GraphBuilder, input: NodeId) -> NodeId {
    let low = graph.add(NodeKind::Multiply, ValueType::Float);
    graph.connect(low, "in1", input);
    graph.set_value(low, "in2", Value::Float(12.92));

    let pow = graph.add(NodeKind::Power, ValueType::Float);
    graph.connect(pow, "in1", input);
    graph.set_value(pow, "in2", Value::Float(1.0 / 2.4));

    let scaled = graph.add(NodeKind::Multiply, ValueType::Float);
    graph.connect(scaled, "in1", pow);
    graph.set_value(scaled, "in2", Value::Float(1.055));

    let high = graph.add(NodeKind::Subtract, ValueType::Float);
    graph.connect(high, "in1", scaled);
    graph.set_value(high, "in2", Value::Float(0.055));

    let select = graph.add(NodeKind::IfGreater, ValueType::Float);
    graph.connect(select, "value1", input);
    graph.set_value(select, "value2", Value::Float(LINEAR_CUTOFF));
    graph.connect(select, "in1", high);
    graph.connect(select, "in2", low);

    let clamp = graph.add(NodeKind::Clamp, ValueType::Float);
    graph.connect(clamp, "in", select);
    graph.set_value(clamp, "low", Value::Float(0.0));
    graph.set_value(clamp, "high", Value::Float(1.0));
    graph.node_mut(clamp).marker = Some(NodeMarker::SrgbCorrection);
    clamp
}
