//! faceid-core — Face descriptor gallery and identity classification.
//!
//! Builds a labelled gallery of face descriptors from training samples and
//! classifies query descriptors by nearest neighbour with a distance
//! threshold. Descriptor extraction itself happens elsewhere.

pub mod classifier;
pub mod codec;
pub mod error;
pub mod ingest;
pub mod store;
pub mod types;

pub use classifier::{
    Classifier, ClassifierConfig, LinearScan, NearestSearch, Neighbor, DEFAULT_THRESHOLD,
};
pub use error::GalleryError;
pub use ingest::{CategoryMap, GroupingPolicy, Ingest, Trained};
pub use store::{DescriptorStore, Gallery};
pub use types::{CategoryId, Classification, Descriptor, Face, Rect, Sample, DESCRIPTOR_DIM};
