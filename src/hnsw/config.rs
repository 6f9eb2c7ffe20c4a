//! HNSW configuration.

use crate::vector::Vector;
use serde::{Deserialize, Serialize};

/// Hard ceiling on the random level draw.
pub(crate) const MAX_LEVEL: u32 = 32;

/// Distance metric used for both construction and search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Cosine distance (`1 - dot`); assumes normalized vectors.
    #[default]
    Cosine,
    /// Euclidean (L2) distance.
    Euclidean,
    /// Manhattan (L1) distance.
    Manhattan,
}

impl DistanceMetric {
    /// Distance between two vectors under this metric.
    ///
    /// Mismatched dimensions produce the kernel sentinels rather than an
    /// error; callers validate dimensions at the API boundary.
    #[inline]
    #[must_use]
    pub fn distance(self, a: &Vector, b: &Vector) -> f32 {
        match self {
            Self::Cosine => a.cosine_distance(b),
            Self::Euclidean => a.euclidean_distance(b),
            Self::Manhattan => a.manhattan_distance(b),
        }
    }
}

/// HNSW algorithm parameters. Immutable once an index is constructed.
///
/// # Parameter guidelines (from the paper)
///
/// - `m`: 12-48 for high recall, 4-8 for speed
/// - `ef_construction`: higher = better graph quality, slower build
/// - `ef_search`: higher = better recall, slower search
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Max neighbors per node in layers above 0.
    pub m: u32,

    /// Max neighbors per node in layer 0 (typically `2 * m`).
    pub m_max0: u32,

    /// Beam width during construction.
    pub ef_construction: u32,

    /// Default beam width during search.
    pub ef_search: u32,

    /// Vector dimensionality; every insert must match.
    pub dimension: u32,

    /// Level-draw factor (typically `1 / ln(m)`).
    pub ml: f64,

    /// Use the diversity heuristic when selecting neighbors.
    pub use_heuristic: bool,

    /// Extend heuristic candidates with their level-0 neighbors.
    pub extend_candidates: bool,

    /// Distance metric.
    pub metric: DistanceMetric,
}

impl HnswConfig {
    /// Creates the default configuration for the given dimension.
    #[must_use]
    pub fn new(dimension: u32) -> Self {
        Self {
            m: 16,
            m_max0: 32,
            ef_construction: 200,
            ef_search: 50,
            dimension,
            ml: 1.0 / f64::from(16u32).ln(),
            use_heuristic: false,
            extend_candidates: false,
            metric: DistanceMetric::Cosine,
        }
    }

    /// Neighbor budget for a layer: `m_max0` at layer 0, `m` above.
    #[inline]
    #[must_use]
    pub fn level_budget(&self, level: u32) -> u32 {
        if level == 0 {
            self.m_max0
        } else {
            self.m
        }
    }
}
