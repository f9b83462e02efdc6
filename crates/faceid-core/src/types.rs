use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default descriptor dimensionality produced by the face extractor.
pub const DESCRIPTOR_DIM: usize = 128;

/// Face descriptor: a point in an embedding space where Euclidean distance
/// approximates perceptual face similarity.
///
/// Immutable once produced. Cloning is cheap (shared storage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<f32>", into = "Vec<f32>")]
pub struct Descriptor {
    values: Arc<[f32]>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values: values.into(),
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Squared Euclidean distance. Monotonic in [`distance`](Self::distance),
    /// so it is the comparator used for nearest-neighbour search.
    ///
    /// Both descriptors must have the same length; callers check dimensions
    /// before comparing.
    pub fn squared_distance(&self, other: &Descriptor) -> f32 {
        squared_distance(&self.values, &other.values)
    }

    /// Euclidean distance.
    pub fn distance(&self, other: &Descriptor) -> f32 {
        self.squared_distance(other).sqrt()
    }
}

impl From<Vec<f32>> for Descriptor {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

impl From<Descriptor> for Vec<f32> {
    fn from(d: Descriptor) -> Self {
        d.values.to_vec()
    }
}

impl AsRef<[f32]> for Descriptor {
    fn as_ref(&self) -> &[f32] {
        &self.values
    }
}

pub(crate) fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Dense category id assigned at ingest (0, 1, 2, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub u32);

impl CategoryId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One gallery entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub descriptor: Descriptor,
    pub category: CategoryId,
}

/// Outcome of classifying a query descriptor.
///
/// `Unknown` is a legitimate result, not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    /// Nearest sample is within the acceptance threshold.
    Known {
        category: CategoryId,
        /// Euclidean distance to the nearest sample.
        distance: f32,
    },
    Unknown,
}

impl Classification {
    pub fn category(&self) -> Option<CategoryId> {
        match self {
            Self::Known { category, .. } => Some(*category),
            Self::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known { .. })
    }
}

/// Face bounding rectangle in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// A detected face with its extracted descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub rect: Rect,
    pub descriptor: Descriptor,
}
