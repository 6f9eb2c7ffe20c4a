//! Float32 vector value type and distance kernels.
//!
//! Distance kernels deliberately return sentinel values on dimension
//! mismatch (`2.0` for cosine, `f32::MAX` for Euclidean and Manhattan)
//! instead of erroring. Dimension validation happens once at the index
//! boundary; the hot loops stay branch-light.

use crate::error::IndexError;
use serde::{Deserialize, Serialize};

/// Sentinel distance returned by [`Vector::cosine_distance`] on mismatch.
pub const COSINE_MISMATCH: f32 = 2.0;

/// An owned, fixed-dimension vector of `f32` components.
///
/// Immutable after construction except for in-place [`Vector::normalize`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    data: Vec<f32>,
}

impl Vector {
    /// Creates a vector by copying the given slice.
    #[must_use]
    pub fn new(values: &[f32]) -> Self {
        Self {
            data: values.to_vec(),
        }
    }

    /// Returns the number of components.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.data.len()
    }

    /// Borrows the components.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Normalizes in place to unit L2 magnitude.
    ///
    /// A zero vector is left unchanged. Applying `normalize` twice is
    /// equivalent to applying it once.
    pub fn normalize(&mut self) {
        let magnitude = self.data.iter().map(|v| v * v).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for v in &mut self.data {
                *v /= magnitude;
            }
        }
    }

    /// Dot product. Returns `0.0` when dimensions differ.
    #[must_use]
    pub fn dot(&self, other: &Self) -> f32 {
        if self.data.len() != other.data.len() {
            return 0.0;
        }
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    /// Cosine distance, `1 - dot`. Assumes normalized inputs.
    ///
    /// Returns [`COSINE_MISMATCH`] when dimensions differ.
    #[must_use]
    pub fn cosine_distance(&self, other: &Self) -> f32 {
        if self.data.len() != other.data.len() {
            return COSINE_MISMATCH;
        }
        1.0 - self.dot(other)
    }

    /// Euclidean (L2) distance. Returns `f32::MAX` when dimensions differ.
    #[must_use]
    pub fn euclidean_distance(&self, other: &Self) -> f32 {
        if self.data.len() != other.data.len() {
            return f32::MAX;
        }
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| {
                let d = a - b;
                d * d
            })
            .sum::<f32>()
            .sqrt()
    }

    /// Manhattan (L1) distance. Returns `f32::MAX` when dimensions differ.
    #[must_use]
    pub fn manhattan_distance(&self, other: &Self) -> f32 {
        if self.data.len() != other.data.len() {
            return f32::MAX;
        }
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| (a - b).abs())
            .sum()
    }

    /// Number of bytes [`Vector::to_bytes`] produces.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        4 + self.data.len() * 4
    }

    /// Encodes as little-endian `u32` dimension followed by the raw
    /// `f32` bit patterns.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        #[allow(clippy::cast_possible_truncation)]
        buf.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        #[cfg(target_endian = "little")]
        {
            buf.extend_from_slice(bytemuck::cast_slice(&self.data));
        }
        #[cfg(not(target_endian = "little"))]
        {
            for v in &self.data {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        buf
    }

    /// Decodes a buffer produced by [`Vector::to_bytes`].
    ///
    /// The buffer may carry trailing bytes; exactly `4 + 4 * dim` bytes are
    /// consumed from the front.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::CorruptedData`] if the buffer is truncated.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < 4 {
            return Err(IndexError::CorruptedData(
                "vector buffer shorter than dimension prefix".into(),
            ));
        }
        let dim = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let needed = dim
            .checked_mul(4)
            .and_then(|n| n.checked_add(4))
            .ok_or_else(|| {
                IndexError::CorruptedData(format!("vector dimension {dim} overflows"))
            })?;
        if bytes.len() < needed {
            return Err(IndexError::CorruptedData(format!(
                "vector buffer truncated: need {needed} bytes, have {}",
                bytes.len()
            )));
        }
        let payload = &bytes[4..needed];
        // Fast path when the slice happens to be aligned; otherwise fall
        // back to per-component little-endian reads.
        let data = match bytemuck::try_cast_slice::<u8, f32>(payload) {
            Ok(floats) if cfg!(target_endian = "little") => floats.to_vec(),
            _ => payload
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        };
        Ok(Self { data })
    }
}

impl From<Vec<f32>> for Vector {
    fn from(data: Vec<f32>) -> Self {
        Self { data }
    }
}
