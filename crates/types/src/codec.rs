// Path: crates/types/src/codec.rs
//! Canonical byte encoding for persisted and transported structures.
//!
//! All durable state goes through these helpers so that the encoding stays
//! a single, stable SCALE rendition regardless of which crate performs the
//! write.

use parity_scale_codec::{Decode, Encode};

/// Encodes a value into its canonical byte representation.
pub fn to_bytes_canonical<T: Encode>(value: &T) -> Result<Vec<u8>, String> {
    Ok(value.encode())
}

/// Decodes a value from its canonical byte representation.
///
/// Trailing bytes are rejected so that corrupted or truncated-and-padded
/// records cannot decode successfully.
pub fn from_bytes_canonical<T: Decode>(bytes: &[u8]) -> Result<T, String> {
    let mut input = bytes;
    let value = T::decode(&mut input).map_err(|e| e.to_string())?;
    if !input.is_empty() {
        return Err(format!("{} trailing bytes after decode", input.len()));
    }
    Ok(value)
}
