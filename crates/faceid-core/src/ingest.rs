//! Gallery construction from labelled training samples.
//!
//! Category ids are minted densely from 0 in the order identities appear in
//! the input. How repeated identities are grouped depends on
//! [`GroupingPolicy`].

use crate::error::GalleryError;
use crate::store::{DescriptorStore, Gallery};
use crate::types::{CategoryId, Descriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

/// How identity labels map to categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupingPolicy {
    /// A new category starts whenever the label differs from the previous
    /// sample's label. Non-contiguous runs of one identity get separate
    /// categories, so input must be pre-grouped by identity.
    #[default]
    Adjacent,
    /// One category per distinct label, wherever it appears.
    Global,
}

/// Dense `CategoryId -> label` mapping produced by ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryMap<L> {
    labels: Vec<L>,
}

impl<L> Default for CategoryMap<L> {
    fn default() -> Self {
        Self { labels: Vec::new() }
    }
}

impl<L> CategoryMap<L> {
    pub fn get(&self, category: CategoryId) -> Option<&L> {
        self.labels.get(category.index())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CategoryId, &L)> + '_ {
        self.labels
            .iter()
            .enumerate()
            .map(|(i, label)| (CategoryId(i as u32), label))
    }
}

impl<L: PartialEq> CategoryMap<L> {
    /// Every category minted for `label`. More than one only under
    /// [`GroupingPolicy::Adjacent`] with non-contiguous input.
    pub fn categories_for(&self, label: &L) -> Vec<CategoryId> {
        self.iter()
            .filter(|(_, l)| *l == label)
            .map(|(c, _)| c)
            .collect()
    }
}

/// Result of [`Ingest::build`].
#[derive(Debug, Clone)]
pub struct Trained<L> {
    pub gallery: Gallery,
    pub labels: CategoryMap<L>,
    dimension: Option<usize>,
}

impl<L> Trained<L> {
    /// Wrap the trained gallery in a fresh store. The store is pinned to the
    /// ingest dimension when one was configured.
    pub fn into_store(self) -> Result<(DescriptorStore, CategoryMap<L>), GalleryError> {
        let store = match self.dimension {
            Some(dim) => DescriptorStore::with_dimension(dim),
            None => DescriptorStore::new(),
        };
        store.publish(self.gallery)?;
        Ok((store, self.labels))
    }
}

/// Training ingest settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ingest {
    policy: GroupingPolicy,
    require_non_empty: bool,
    dimension: Option<usize>,
}

impl Ingest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn policy(mut self, policy: GroupingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fail with [`GalleryError::EmptyDataset`] instead of building an empty
    /// gallery.
    pub fn require_non_empty(mut self, yes: bool) -> Self {
        self.require_non_empty = yes;
        self
    }

    /// Expected descriptor length.
    pub fn dimension(mut self, dim: usize) -> Self {
        self.dimension = Some(dim);
        self
    }

    pub fn grouping(&self) -> GroupingPolicy {
        self.policy
    }

    /// Walk `samples` in order, assigning a category to each.
    pub fn build<L, I>(&self, samples: I) -> Result<Trained<L>, GalleryError>
    where
        L: Clone + Eq + Hash,
        I: IntoIterator<Item = (Descriptor, L)>,
    {
        let mut descriptors = Vec::new();
        let mut categories = Vec::new();
        let mut labels: Vec<L> = Vec::new();
        let mut seen: HashMap<L, CategoryId> = HashMap::new();

        for (descriptor, label) in samples {
            let category = match self.policy {
                GroupingPolicy::Adjacent => {
                    if labels.last() == Some(&label) {
                        CategoryId(labels.len() as u32 - 1)
                    } else {
                        mint(&mut labels, label)
                    }
                }
                GroupingPolicy::Global => match seen.get(&label) {
                    Some(&category) => category,
                    None => {
                        let category = mint(&mut labels, label.clone());
                        seen.insert(label, category);
                        category
                    }
                },
            };
            descriptors.push(descriptor);
            categories.push(category);
        }

        if descriptors.is_empty() && self.require_non_empty {
            return Err(GalleryError::EmptyDataset);
        }

        let samples = descriptors.len();
        let gallery = Gallery::from_parts(descriptors, categories, self.dimension)?;

        tracing::info!(
            samples,
            categories = labels.len(),
            policy = ?self.policy,
            "training gallery built"
        );

        Ok(Trained {
            gallery,
            labels: CategoryMap { labels },
            dimension: self.dimension,
        })
    }

    /// Build a gallery and publish it into `store`, replacing its contents.
    pub fn train<L, I>(
        &self,
        store: &DescriptorStore,
        samples: I,
    ) -> Result<CategoryMap<L>, GalleryError>
    where
        L: Clone + Eq + Hash,
        I: IntoIterator<Item = (Descriptor, L)>,
    {
        let trained = self.build(samples)?;
        store.publish(trained.gallery)?;
        Ok(trained.labels)
    }
}

fn mint<L>(labels: &mut Vec<L>, label: L) -> CategoryId {
    labels.push(label);
    CategoryId(labels.len() as u32 - 1)
}
