//! Descriptor wire encoding.
//!
//! A serialized descriptor is `dim` little-endian IEEE-754 f32 values packed
//! back to back, optionally wrapped in standard-alphabet base64. Decoding
//! validates the length before converting anything.

use crate::types::Descriptor;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

const F32_SIZE: usize = std::mem::size_of::<f32>();

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("descriptor must be {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },
    #[error("descriptor component {index} is not finite")]
    NonFinite { index: usize },
    #[error("descriptor dimension {0} is too large")]
    DimensionTooLarge(usize),
}

/// Decode a raw byte buffer into a `dim`-component descriptor.
pub fn decode_bytes(bytes: &[u8], dim: usize) -> Result<Descriptor, DecodeError> {
    let expected = dim
        .checked_mul(F32_SIZE)
        .ok_or(DecodeError::DimensionTooLarge(dim))?;
    if bytes.len() != expected {
        return Err(DecodeError::Length {
            expected,
            got: bytes.len(),
        });
    }

    let mut values = Vec::with_capacity(dim);
    for (index, chunk) in bytes.chunks_exact(F32_SIZE).enumerate() {
        let v = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if !v.is_finite() {
            return Err(DecodeError::NonFinite { index });
        }
        values.push(v);
    }

    Ok(Descriptor::new(values))
}

/// Decode a base64 string into a `dim`-component descriptor.
pub fn decode_base64(text: &str, dim: usize) -> Result<Descriptor, DecodeError> {
    let bytes = STANDARD.decode(text.trim())?;
    decode_bytes(&bytes, dim)
}

pub fn encode_bytes(descriptor: &Descriptor) -> Vec<u8> {
    descriptor
        .as_slice()
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect()
}

pub fn encode_base64(descriptor: &Descriptor) -> String {
    STANDARD.encode(encode_bytes(descriptor))
}
