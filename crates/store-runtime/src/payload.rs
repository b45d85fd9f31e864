//! # Payload Encoding
//!
//! What a client writes into a block. Arrays travel as raw element bytes
//! behind a small header so a reader can borrow them in place; anything
//! else is an opaque byte string produced by an external serializer.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────┬──────────────────────────┬──────────────────────┐
//! │ u32 LE       │ bincode PayloadHeader    │ data bytes           │
//! │ header len   │ (kind, dtype, shape, len)│                      │
//! └──────────────┴──────────────────────────┴──────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

/// Element type of an array payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    U8,
    I16,
    I32,
    I64,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl DType {
    /// Bytes per element.
    pub fn item_size(self) -> usize {
        match self {
            DType::U8 => 1,
            DType::I16 | DType::U16 => 2,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
        }
    }
}

/// A decoded block payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A dense, row-major array.
    Array {
        dtype: DType,
        shape: Vec<usize>,
        data: Vec<u8>,
    },
    /// Bytes from an external serializer.
    Opaque(Vec<u8>),
}

#[derive(Debug, Serialize, Deserialize)]
enum PayloadHeader {
    Array { dtype: DType, shape: Vec<usize>, len: u64 },
    Opaque { len: u64 },
}

/// Encoding and decoding failures.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("header encoding failed: {0}")]
    Header(#[from] bincode::Error),

    #[error("payload truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("array shape {shape:?} of {dtype:?} needs {expected} bytes, data has {actual}")]
    ShapeMismatch {
        dtype: DType,
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
}

const LEN_PREFIX: usize = 4;

fn array_bytes(dtype: DType, shape: &[usize]) -> Option<usize> {
    shape
        .iter()
        .try_fold(dtype.item_size(), |acc, dim| acc.checked_mul(*dim))
}

fn check_shape(dtype: DType, shape: &[usize], actual: usize) -> Result<(), PayloadError> {
    match array_bytes(dtype, shape) {
        Some(expected) if expected == actual => Ok(()),
        expected => Err(PayloadError::ShapeMismatch {
            dtype,
            shape: shape.to_vec(),
            expected: expected.unwrap_or(usize::MAX),
            actual,
        }),
    }
}

impl Payload {
    /// Builds an array payload, checking `data` matches `shape`.
    pub fn array(dtype: DType, shape: Vec<usize>, data: Vec<u8>) -> Result<Self, PayloadError> {
        check_shape(dtype, &shape, data.len())?;
        Ok(Payload::Array { dtype, shape, data })
    }

    /// The payload's data bytes, without header.
    pub fn data(&self) -> &[u8] {
        match self {
            Payload::Array { data, .. } | Payload::Opaque(data) => data,
        }
    }

    /// Serializes header and data into one buffer, ready to copy into a
    /// block of at least that many bytes.
    pub fn encode(&self) -> Result<Vec<u8>, PayloadError> {
        let header = match self {
            Payload::Array { dtype, shape, data } => {
                check_shape(*dtype, shape, data.len())?;
                PayloadHeader::Array {
                    dtype: *dtype,
                    shape: shape.clone(),
                    len: data.len() as u64,
                }
            }
            Payload::Opaque(data) => PayloadHeader::Opaque {
                len: data.len() as u64,
            },
        };
        let header = bincode::serialize(&header)?;
        let data = self.data();

        let mut out = Vec::with_capacity(LEN_PREFIX + header.len() + data.len());
        out.extend_from_slice(&(header.len() as u32).to_le_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(data);
        Ok(out)
    }

    /// Parses a buffer produced by `encode`. Trailing bytes (the unused
    /// tail of a size class) are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, PayloadError> {
        Ok(PayloadView::parse(bytes)?.to_payload())
    }
}

/// A payload borrowed from an encoded buffer, typically mapped memory.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadView<'a> {
    Array {
        dtype: DType,
        shape: Vec<usize>,
        data: &'a [u8],
    },
    Opaque(&'a [u8]),
}

impl<'a> PayloadView<'a> {
    /// Parses the header of `bytes` and borrows the data in place.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, PayloadError> {
        let (header, range) = locate(bytes)?;
        let data = &bytes[range];
        match header {
            PayloadHeader::Array { dtype, shape, .. } => {
                check_shape(dtype, &shape, data.len())?;
                Ok(PayloadView::Array { dtype, shape, data })
            }
            PayloadHeader::Opaque { .. } => Ok(PayloadView::Opaque(data)),
        }
    }

    pub fn data(&self) -> &'a [u8] {
        match self {
            PayloadView::Array { data, .. } | PayloadView::Opaque(data) => data,
        }
    }

    /// Copies the borrowed data into an owned `Payload`.
    pub fn to_payload(&self) -> Payload {
        match self {
            PayloadView::Array { dtype, shape, data } => Payload::Array {
                dtype: *dtype,
                shape: shape.clone(),
                data: data.to_vec(),
            },
            PayloadView::Opaque(data) => Payload::Opaque(data.to_vec()),
        }
    }
}

fn split_header(bytes: &[u8]) -> Result<(PayloadHeader, &[u8]), PayloadError> {
    if bytes.len() < LEN_PREFIX {
        return Err(PayloadError::Truncated {
            needed: LEN_PREFIX,
            available: bytes.len(),
        });
    }
    let mut prefix = [0u8; LEN_PREFIX];
    prefix.copy_from_slice(&bytes[..LEN_PREFIX]);
    let header_len = u32::from_le_bytes(prefix) as usize;

    let rest = &bytes[LEN_PREFIX..];
    if rest.len() < header_len {
        return Err(PayloadError::Truncated {
            needed: LEN_PREFIX + header_len,
            available: bytes.len(),
        });
    }
    let header = bincode::deserialize(&rest[..header_len])?;
    Ok((header, &rest[header_len..]))
}

fn locate(bytes: &[u8]) -> Result<(PayloadHeader, Range<usize>), PayloadError> {
    let (header, body) = split_header(bytes)?;
    let len = match &header {
        PayloadHeader::Array { len, .. } | PayloadHeader::Opaque { len } => *len as usize,
    };
    if body.len() < len {
        return Err(PayloadError::Truncated {
            needed: len,
            available: body.len(),
        });
    }
    let start = bytes.len() - body.len();
    Ok((header, start..start + len))
}

/// Offset and length of the data bytes inside an encoded buffer, so an
/// array can be borrowed from mapped memory without copying.
pub fn data_range(bytes: &[u8]) -> Result<Range<usize>, PayloadError> {
    Ok(locate(bytes)?.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_array_survives_size_class_padding() {
        let payload =
            Payload::array(DType::F32, vec![2, 2], f32_bytes(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        let mut block = payload.encode().unwrap();
        block.resize(64.max(block.len()).next_power_of_two(), 0xAA);

        assert_eq!(Payload::decode(&block).unwrap(), payload);
    }

    #[test]
    fn test_data_range_points_at_elements() {
        let data = f32_bytes(&[0.5; 6]);
        let payload = Payload::array(DType::F32, vec![3, 2], data.clone()).unwrap();
        let encoded = payload.encode().unwrap();

        let range = data_range(&encoded).unwrap();
        assert_eq!(&encoded[range], &data[..]);
    }

    #[test]
    fn test_view_borrows_data_in_place() {
        let data = f32_bytes(&[1.5; 4]);
        let encoded = Payload::array(DType::F32, vec![4], data.clone())
            .unwrap()
            .encode()
            .unwrap();

        let view = PayloadView::parse(&encoded).unwrap();
        let range = data_range(&encoded).unwrap();

        assert_eq!(view.data(), &data[..]);
        assert_eq!(view.data().as_ptr(), encoded[range].as_ptr());
        assert!(matches!(view, PayloadView::Array { dtype: DType::F32, .. }));
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let err = Payload::array(DType::I64, vec![3], vec![0; 16]).unwrap_err();
        assert!(matches!(
            err,
            PayloadError::ShapeMismatch {
                expected: 24,
                actual: 16,
                ..
            }
        ));
    }

    #[test]
    fn test_opaque_and_empty_payloads() {
        let empty = Payload::Opaque(Vec::new());
        assert_eq!(Payload::decode(&empty.encode().unwrap()).unwrap(), empty);

        let scalar = Payload::array(DType::U8, vec![], vec![7]).unwrap();
        assert_eq!(Payload::decode(&scalar.encode().unwrap()).unwrap(), scalar);
    }

    #[test]
    fn test_truncated_buffers_are_errors() {
        let encoded = Payload::Opaque(vec![1; 32]).encode().unwrap();

        assert!(matches!(
            Payload::decode(&encoded[..2]),
            Err(PayloadError::Truncated { .. })
        ));
        assert!(matches!(
            Payload::decode(&encoded[..encoded.len() - 1]),
            Err(PayloadError::Truncated { needed: 32, .. })
        ));
    }
}
