//! Descriptor gallery storage.
//!
//! [`Gallery`] is an immutable snapshot of labelled samples. [`DescriptorStore`]
//! publishes one gallery at a time: replacement builds the new gallery off to
//! the side and swaps an `Arc` under a short write lock, so readers see either
//! the old or the new gallery in full.

use crate::error::GalleryError;
use crate::types::{CategoryId, Descriptor, Sample};
use std::sync::{Arc, PoisonError, RwLock};

/// Immutable set of (descriptor, category) samples in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    samples: Vec<Sample>,
    dimension: Option<usize>,
}

impl Gallery {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a gallery from parallel descriptor and category sequences.
    ///
    /// All descriptors must share one length, equal to `expected_dim` when
    /// given.
    pub fn from_parts(
        descriptors: Vec<Descriptor>,
        categories: Vec<CategoryId>,
        expected_dim: Option<usize>,
    ) -> Result<Self, GalleryError> {
        if descriptors.len() != categories.len() {
            return Err(GalleryError::ArityMismatch {
                samples: descriptors.len(),
                categories: categories.len(),
            });
        }

        let dimension = expected_dim.or_else(|| descriptors.first().map(Descriptor::len));
        if let Some(expected) = dimension {
            if let Some(bad) = descriptors.iter().find(|d| d.len() != expected) {
                return Err(GalleryError::DimensionMismatch {
                    expected,
                    got: bad.len(),
                });
            }
        }

        let samples = descriptors
            .into_iter()
            .zip(categories)
            .map(|(descriptor, category)| Sample {
                descriptor,
                category,
            })
            .collect();

        Ok(Self { samples, dimension })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Descriptor length shared by every sample, if known.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Number of distinct categories (highest id + 1 for ingest-built galleries).
    pub fn category_count(&self) -> usize {
        self.samples
            .iter()
            .map(|s| s.category.index() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Pin this gallery to the store's fixed dimension, if any.
    fn pinned_to(mut self, fixed: Option<usize>) -> Result<Self, GalleryError> {
        let Some(fixed) = fixed else {
            return Ok(self);
        };
        match self.dimension {
            Some(dim) if dim != fixed && !self.samples.is_empty() => {
                Err(GalleryError::DimensionMismatch {
                    expected: fixed,
                    got: dim,
                })
            }
            _ => {
                self.dimension = Some(fixed);
                Ok(self)
            }
        }
    }
}

impl<'a> IntoIterator for &'a Gallery {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

/// Owning iterator over a gallery snapshot, returned by [`DescriptorStore::all`].
pub struct Samples {
    gallery: Arc<Gallery>,
    pos: usize,
}

impl Iterator for Samples {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        let sample = self.gallery.samples.get(self.pos)?.clone();
        self.pos += 1;
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.gallery.samples.len() - self.pos;
        (rest, Some(rest))
    }
}

impl ExactSizeIterator for Samples {}

/// Shared handle to the currently published gallery.
///
/// Safe to share across threads; classification reads a snapshot and never
/// blocks on a concurrent replacement for longer than the pointer swap.
#[derive(Debug, Default)]
pub struct DescriptorStore {
    current: RwLock<Arc<Gallery>>,
    dimension: Option<usize>,
}

impl DescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that only accepts descriptors of length `dim`.
    pub fn with_dimension(dim: usize) -> Self {
        Self {
            current: RwLock::new(Arc::new(Gallery {
                samples: Vec::new(),
                dimension: Some(dim),
            })),
            dimension: Some(dim),
        }
    }

    /// Atomically replace the whole gallery.
    ///
    /// On error the previously published gallery stays in place.
    pub fn replace(
        &self,
        descriptors: Vec<Descriptor>,
        categories: Vec<CategoryId>,
    ) -> Result<(), GalleryError> {
        let gallery = Gallery::from_parts(descriptors, categories, self.dimension)?;
        self.publish(gallery)
    }

    /// Publish a pre-built gallery, replacing the current one.
    pub fn publish(&self, gallery: Gallery) -> Result<(), GalleryError> {
        let gallery = Arc::new(gallery.pinned_to(self.dimension)?);
        let (size, dimension) = (gallery.len(), gallery.dimension());

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = gallery;

        tracing::info!(size, dimension = ?dimension, "gallery replaced");
        Ok(())
    }

    /// Current gallery. The snapshot stays valid across later replacements.
    pub fn snapshot(&self) -> Arc<Gallery> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of samples in the current gallery.
    pub fn size(&self) -> usize {
        self.snapshot().len()
    }

    /// Fixed dimension if configured, otherwise the current gallery's.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension.or_else(|| self.snapshot().dimension())
    }

    /// Iterate the current gallery in insertion order.
    pub fn all(&self) -> Samples {
        Samples {
            gallery: self.snapshot(),
            pos: 0,
        }
    }
}
