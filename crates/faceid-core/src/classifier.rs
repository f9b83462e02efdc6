//! Nearest-neighbour classification against the published gallery.

use crate::error::GalleryError;
use crate::store::{DescriptorStore, Gallery};
use crate::types::{squared_distance, CategoryId, Classification, Descriptor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Maximum Euclidean distance from the nearest sample for a match.
///
/// Raising it trades false rejects for false accepts.
pub const DEFAULT_THRESHOLD: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Acceptance threshold (Euclidean distance).
    pub threshold: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<(), GalleryError> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(GalleryError::InvalidThreshold(self.threshold));
        }
        Ok(())
    }
}

/// Nearest gallery sample for a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position of the sample in the gallery.
    pub index: usize,
    pub category: CategoryId,
    /// Euclidean distance to the query.
    pub distance: f32,
}

/// Strategy for finding the nearest gallery sample.
///
/// Implementations must return the exact nearest sample and break ties
/// towards the lowest category id, then the lowest index.
pub trait NearestSearch: Send + Sync {
    fn nearest(&self, gallery: &Gallery, query: &[f32]) -> Option<Neighbor>;
}

/// Brute-force scan over every sample: O(samples × dimension) per query.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearScan;

impl NearestSearch for LinearScan {
    fn nearest(&self, gallery: &Gallery, query: &[f32]) -> Option<Neighbor> {
        let samples = gallery.samples();
        let mut best: Option<(usize, f32)> = None;

        for (i, sample) in samples.iter().enumerate() {
            let dist = squared_distance(query, sample.descriptor.as_slice());
            if dist.is_nan() {
                continue;
            }
            let better = match best {
                None => true,
                Some((bi, bd)) => {
                    dist < bd || (dist == bd && sample.category < samples[bi].category)
                }
            };
            if better {
                best = Some((i, dist));
            }
        }

        best.map(|(index, dist)| Neighbor {
            index,
            category: samples[index].category,
            distance: dist.sqrt(),
        })
    }
}

/// Labels query descriptors with the category of their nearest gallery
/// sample, or `Unknown` when nothing is within the threshold.
///
/// Classification never mutates the store and is safe to call from many
/// threads at once.
#[derive(Debug, Clone)]
pub struct Classifier<S = LinearScan> {
    store: Arc<DescriptorStore>,
    threshold: f32,
    search: S,
}

impl Classifier<LinearScan> {
    pub fn new(
        store: Arc<DescriptorStore>,
        config: ClassifierConfig,
    ) -> Result<Self, GalleryError> {
        Self::with_search(store, config, LinearScan)
    }
}

impl<S: NearestSearch> Classifier<S> {
    /// Use a custom search strategy in place of the linear scan.
    pub fn with_search(
        store: Arc<DescriptorStore>,
        config: ClassifierConfig,
        search: S,
    ) -> Result<Self, GalleryError> {
        config.validate()?;
        Ok(Self {
            store,
            threshold: config.threshold,
            search,
        })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn store(&self) -> &Arc<DescriptorStore> {
        &self.store
    }

    /// Classify against the currently published gallery.
    pub fn classify(&self, query: &Descriptor) -> Result<Classification, GalleryError> {
        let gallery = self.store.snapshot();
        self.classify_in(&gallery, query)
    }

    /// Classify against a specific gallery snapshot. Lets a caller label
    /// several faces from one image against the same gallery.
    pub fn classify_in(
        &self,
        gallery: &Gallery,
        query: &Descriptor,
    ) -> Result<Classification, GalleryError> {
        let Some(nearest) = self.nearest_in(gallery, query)? else {
            return Ok(Classification::Unknown);
        };

        if nearest.distance > self.threshold {
            tracing::debug!(
                distance = nearest.distance,
                threshold = self.threshold,
                "nearest sample beyond threshold"
            );
            return Ok(Classification::Unknown);
        }

        Ok(Classification::Known {
            category: nearest.category,
            distance: nearest.distance,
        })
    }

    /// Nearest sample regardless of threshold. `None` for an empty gallery.
    pub fn nearest(&self, query: &Descriptor) -> Result<Option<Neighbor>, GalleryError> {
        let gallery = self.store.snapshot();
        self.nearest_in(&gallery, query)
    }

    fn nearest_in(
        &self,
        gallery: &Gallery,
        query: &Descriptor,
    ) -> Result<Option<Neighbor>, GalleryError> {
        if gallery.is_empty() {
            return Ok(None);
        }
        if let Some(expected) = gallery.dimension() {
            if query.len() != expected {
                return Err(GalleryError::DimensionMismatch {
                    expected,
                    got: query.len(),
                });
            }
        }
        Ok(self.search.nearest(gallery, query.as_slice()))
    }
}
