//! Gathering indexed attribute arrays into per-corner order.

use super::attribute::{Attribute, Interpolation};
use crate::error::{BridgeError, Result};

/// Rewrite every indexed array so that `out[i] = in[indices[i]]`.
///
/// All arrays are checked before any is rewritten, so on error nothing has
/// changed. `Constant` arrays pass through. On success the caller must
/// replace `indices` with the identity list of the same length.
pub fn deindex(indices: &[u32], attributes: &mut [&mut Attribute]) -> Result<()> {
    let required = match indices.iter().max() {
        Some(&max) => max as usize + 1,
        None => 0,
    };

    for attr in attributes.iter() {
        if attr.interpolation == Interpolation::Constant {
            continue;
        }
        if attr.len() < required {
            return Err(BridgeError::AttributeLength {
                name: attr.name.clone(),
                expected: required,
                actual: attr.len(),
            });
        }
    }

    for attr in attributes.iter_mut() {
        if attr.interpolation == Interpolation::Constant {
            continue;
        }
        attr.data = attr.data.gather(indices);
    }

    Ok(())
}
