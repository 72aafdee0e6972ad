//! Texture channel resolution and default value broadcasting.
//!
//! Given a texture's channel count and the semantic type a shading input
//! wants, decides which image type to sample and which extract/convert
//! steps follow. Every (type, channel count) pair resolves; requests that
//! cannot be expressed are reported as internal errors.

use super::graph::{Value, ValueType};
use crate::error::{BridgeError, Result};

/// Semantic type requested by a shading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DesiredType {
    Float,
    Vector3,
    Color3,
}

impl DesiredType {
    pub fn value_type(&self) -> ValueType {
        match self {
            DesiredType::Float => ValueType::Float,
            DesiredType::Vector3 => ValueType::Vector3,
            DesiredType::Color3 => ValueType::Color3,
        }
    }

    pub fn is_color(&self) -> bool {
        *self == DesiredType::Color3
    }
}

/// One step of a resolved read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOp {
    /// Sample the image as the given type.
    Read(ValueType),
    /// Extract a single channel as float.
    Extract(u8),
    /// Convert the previous result to the given type.
    Convert(ValueType),
}

/// Non-empty op sequence starting with a `Read`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSequence(Vec<ChannelOp>);

impl NodeSequence {
    pub fn ops(&self) -> &[ChannelOp] {
        &self.0
    }

    /// Type the image node is sampled as.
    pub fn image_type(&self) -> ValueType {
        match self.0.first() {
            Some(ChannelOp::Read(ty)) => *ty,
            _ => ValueType::Float,
        }
    }

    /// Channel picked by an extract step, if any.
    pub fn extracted_channel(&self) -> Option<u8> {
        self.0.iter().find_map(|op| match op {
            ChannelOp::Extract(c) => Some(*c),
            _ => None,
        })
    }

    /// Type produced after the last step.
    pub fn output_type(&self) -> ValueType {
        match self.0.last() {
            Some(ChannelOp::Read(ty)) | Some(ChannelOp::Convert(ty)) => *ty,
            Some(ChannelOp::Extract(_)) | None => ValueType::Float,
        }
    }
}

/// Image node type for a texture.
///
/// Under compat mode two-channel images are read as four channels, since
/// the consumer promotes them to (L, L, L, A) internally.
pub fn texture_value_type(channel_count: u8, color: bool, compat: bool) -> Result<ValueType> {
    let ty = match (channel_count, color) {
        (1, _) => ValueType::Float,
        (2, true) if compat => ValueType::Color4,
        (2, false) if compat => ValueType::Vector4,
        (2, _) => ValueType::Vector2,
        (3, true) => ValueType::Color3,
        (3, false) => ValueType::Vector3,
        (4, true) => ValueType::Color4,
        (4, false) => ValueType::Vector4,
        _ => {
            return Err(BridgeError::UnresolvedChannel(format!(
                "{} channels",
                channel_count
            )))
        }
    };
    Ok(ty)
}

/// Map a requested channel onto what the image node actually exposes.
///
/// Two-channel images are luminance + alpha: indices 1 and 3 address
/// alpha, 0 and 2 address luminance.
pub fn normalize_channel(channel_count: u8, channel: u8, compat: bool) -> Result<u8> {
    let unresolved = || {
        BridgeError::UnresolvedChannel(format!(
            "channel {} of a {}-channel image",
            channel, channel_count
        ))
    };
    if channel > 3 {
        return Err(unresolved());
    }
    match channel_count {
        1 => Ok(0),
        2 => match channel {
            1 | 3 if compat => Ok(3),
            1 | 3 => Ok(1),
            _ => Ok(0),
        },
        3 if channel == 3 => Err(unresolved()),
        3 | 4 => Ok(channel),
        _ => Err(unresolved()),
    }
}

/// Resolve the steps that turn a texture sample into `desired`.
pub fn resolve(desired: DesiredType, channel_count: u8, compat: bool, channel: Option<u8>) -> Result<NodeSequence> {
    let image_ty = texture_value_type(channel_count, desired.is_color(), compat)?;
    let channel = channel.unwrap_or(0);
    let mut ops = vec![ChannelOp::Read(image_ty)];

    match (desired, channel_count) {
        (DesiredType::Float, 1) => {}
        (DesiredType::Float, _) => {
            ops.push(ChannelOp::Extract(normalize_channel(channel_count, channel, compat)?));
        }
        (_, 1) | (_, 4) => ops.push(ChannelOp::Convert(desired.value_type())),
        (_, 2) => {
            ops.push(ChannelOp::Extract(normalize_channel(channel_count, channel, compat)?));
            ops.push(ChannelOp::Convert(desired.value_type()));
        }
        (_, 3) => {}
        _ => {
            return Err(BridgeError::UnresolvedChannel(format!(
                "{:?} from {} channels",
                desired, channel_count
            )))
        }
    }

    Ok(NodeSequence(ops))
}

/// Channel holding alpha, and whether the image actually has one.
pub fn alpha_channel(channel_count: u8) -> (u8, bool) {
    match channel_count {
        4 => (3, true),
        2 => (1, true),
        _ => (0, false),
    }
}

/// Whether a normalized channel index addresses alpha.
pub fn is_alpha(channel_count: u8, channel: u8) -> bool {
    match channel_count {
        2 => channel != 0,
        4 => channel == 3,
        _ => false,
    }
}

/// Re-express a default value in a texture node's type.
pub fn broadcast_default(value: &Value, target: ValueType) -> Result<Value> {
    if value.value_type() == target {
        return Ok(value.clone());
    }
    let broadcast = match (value, target) {
        (Value::Float(f), ValueType::Vector2) => Value::Vector2([*f; 2]),
        (Value::Float(f), ValueType::Vector3) => Value::Vector3([*f; 3]),
        (Value::Float(f), ValueType::Color3) => Value::Color3([*f; 3]),
        (Value::Float(f), ValueType::Vector4) => Value::Vector4([*f, *f, *f, 1.0]),
        (Value::Float(f), ValueType::Color4) => Value::Color4([*f, *f, *f, 1.0]),
        (Value::Color3(c), ValueType::Color4) => Value::Color4([c[0], c[1], c[2], 1.0]),
        (Value::Color3(c), ValueType::Vector2) => Value::Vector2([c[0]; 2]),
        (Value::Color3(c), ValueType::Float) => Value::Float(c[0]),
        (Value::Vector3(v), ValueType::Vector4) => Value::Vector4([v[0], v[1], v[2], 1.0]),
        (Value::Vector3(v), ValueType::Vector2) => Value::Vector2([v[0]; 2]),
        (Value::Vector3(v), ValueType::Float) => Value::Float(v[0]),
        _ => {
            return Err(BridgeError::UnhandledDefaultBroadcast {
                from: value.value_type().mtlx_name(),
                to: target.mtlx_name(),
            })
        }
    };
    Ok(broadcast)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totality() {
        for desired in [DesiredType::Float, DesiredType::Vector3, DesiredType::Color3] {
            for count in 1..=4u8 {
                for compat in [false, true] {
                    let seq = resolve(desired, count, compat, None).unwrap();
                    assert!(!seq.ops().is_empty());
                    assert!(matches!(seq.ops()[0], ChannelOp::Read(_)));
                    assert_eq!(seq.output_type(), desired.value_type(), "{:?} {}", desired, count);
                }
            }
        }
    }

    #[test]
    fn test_two_channel_remap() {
        let seq = resolve(DesiredType::Vector3, 2, false, Some(1)).unwrap();
        assert_eq!(
            seq.ops(),
            &[
                ChannelOp::Read(ValueType::Vector2),
                ChannelOp::Extract(1),
                ChannelOp::Convert(ValueType::Vector3)
            ]
        );
        let seq = resolve(DesiredType::Vector3, 2, true, Some(1)).unwrap();
        assert_eq!(
            seq.ops(),
            &[
                ChannelOp::Read(ValueType::Vector4),
                ChannelOp::Extract(3),
                ChannelOp::Convert(ValueType::Vector3)
            ]
        );
    }

    #[test]
    fn test_direct_reads() {
        let seq = resolve(DesiredType::Color3, 3, false, None).unwrap();
        assert_eq!(seq.ops(), &[ChannelOp::Read(ValueType::Color3)]);
        let seq = resolve(DesiredType::Float, 1, true, Some(2)).unwrap();
        assert_eq!(seq.ops(), &[ChannelOp::Read(ValueType::Float)]);
    }

    #[test]
    fn test_four_channel() {
        let seq = resolve(DesiredType::Color3, 4, false, None).unwrap();
        assert_eq!(
            seq.ops(),
            &[ChannelOp::Read(ValueType::Color4), ChannelOp::Convert(ValueType::Color3)]
        );
        let seq = resolve(DesiredType::Float, 4, false, Some(2)).unwrap();
        assert_eq!(seq.extracted_channel(), Some(2));
    }

    #[test]
    fn test_unresolvable_channels() {
        assert!(resolve(DesiredType::Float, 3, false, Some(3)).is_err());
        assert!(resolve(DesiredType::Float, 4, false, Some(4)).is_err());
        assert!(resolve(DesiredType::Float, 5, false, None).unwrap_err().is_internal());
        assert_eq!(normalize_channel(2, 2, false).unwrap(), 0);
        assert_eq!(normalize_channel(2, 3, false).unwrap(), 1);
    }

    #[test]
    fn test_broadcast() {
        assert_eq!(
            broadcast_default(&Value::Float(1.0), ValueType::Vector4).unwrap(),
            Value::Vector4([1.0, 1.0, 1.0, 1.0])
        );
        assert_eq!(
            broadcast_default(&Value::Float(0.5), ValueType::Color4).unwrap(),
            Value::Color4([0.5, 0.5, 0.5, 1.0])
        );
        assert_eq!(
            broadcast_default(&Value::Color3([0.2, 0.3, 0.4]), ValueType::Vector2).unwrap(),
            Value::Vector2([0.2, 0.2])
        );
        assert_eq!(
            broadcast_default(&Value::Vector3([0.5, 0.5, 1.0]), ValueType::Vector4).unwrap(),
            Value::Vector4([0.5, 0.5, 1.0, 1.0])
        );
        assert_eq!(
            broadcast_default(&Value::Color3([0.2, 0.3, 0.4]), ValueType::Float).unwrap(),
            Value::Float(0.2)
        );
    }

    #[test]
    fn test_broadcast_gap_is_internal() {
        let err = broadcast_default(&Value::Color3([1.0; 3]), ValueType::Vector3).unwrap_err();
        assert!(err.is_internal());
        assert!(broadcast_default(&Value::Vector2([0.0; 2]), ValueType::Float).is_err());
    }

    #[test]
    fn test_alpha_channel() {
        assert_eq!(alpha_channel(4), (3, true));
        assert_eq!(alpha_channel(2), (1, true));
        assert_eq!(alpha_channel(3), (0, false));
        assert!(is_alpha(2, 3));
        assert!(is_alpha(4, 3));
        assert!(!is_alpha(3, 2));
        assert!(!is_alpha(2, 0));
    }
}
