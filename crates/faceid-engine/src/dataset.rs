//! JSON training dataset: an identity registry plus labelled face descriptors.
//!
//! ```json
//! {
//!   "identities": [{ "id": "p1", "name": "Ada", "group": "Analytical" }],
//!   "faces": [{ "descriptor": "<base64 f32 LE>", "identity_id": "p1" }]
//! }
//! ```
//!
//! Face order is significant: it is the order ingest walks the samples in.

use faceid_core::codec::{self, DecodeError};
use faceid_core::{CategoryId, CategoryMap, Descriptor, DescriptorStore, GalleryError, Ingest};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse dataset: {0}")]
    Json(#[from] serde_json::Error),
    #[error("face {index}: {source}")]
    Decode {
        index: usize,
        #[source]
        source: DecodeError,
    },
    #[error("gallery: {0}")]
    Gallery(#[from] GalleryError),
}

/// A registered real-world identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    /// Free-form grouping (team, band, department).
    #[serde(default)]
    pub group: String,
}

/// One training photo: an encoded descriptor and the identity it shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub descriptor: String,
    pub identity_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    identities: Vec<Identity>,
    #[serde(default)]
    faces: Vec<FaceRecord>,
    #[serde(skip)]
    by_id: HashMap<String, usize>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self, DatasetError> {
        let mut dataset: Dataset = serde_json::from_str(text)?;
        dataset.reindex();
        Ok(dataset)
    }

    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let text = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dataset = Self::from_json(&text)?;
        tracing::info!(
            path = %path.display(),
            identities = dataset.identities.len(),
            faces = dataset.faces.len(),
            "dataset loaded"
        );
        Ok(dataset)
    }

    pub fn to_json(&self) -> Result<String, DatasetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn reindex(&mut self) {
        self.by_id.clear();
        for (i, identity) in self.identities.iter().enumerate() {
            if self.by_id.insert(identity.id.clone(), i).is_some() {
                tracing::warn!(id = %identity.id, "duplicate identity id; later entry wins");
            }
        }
    }

    /// Register an identity. Replaces an earlier entry with the same id.
    pub fn add_identity(&mut self, identity: Identity) {
        match self.by_id.get(&identity.id) {
            Some(&i) => self.identities[i] = identity,
            None => {
                self.by_id.insert(identity.id.clone(), self.identities.len());
                self.identities.push(identity);
            }
        }
    }

    /// Append a training face for `identity_id`.
    pub fn add_face(&mut self, identity_id: &str, descriptor: &Descriptor) {
        self.faces.push(FaceRecord {
            descriptor: codec::encode_base64(descriptor),
            identity_id: identity_id.to_string(),
        });
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn faces(&self) -> &[FaceRecord] {
        &self.faces
    }

    pub fn identity(&self, id: &str) -> Option<&Identity> {
        self.by_id.get(id).map(|&i| &self.identities[i])
    }

    /// Resolve a classified category back to its registered identity.
    pub fn resolve(
        &self,
        labels: &CategoryMap<String>,
        category: CategoryId,
    ) -> Option<&Identity> {
        labels.get(category).and_then(|id| self.identity(id))
    }

    /// Decode every face, in file order, as a `(descriptor, identity id)` pair.
    pub fn labeled_samples(
        &self,
        dim: usize,
    ) -> Result<Vec<(Descriptor, String)>, DatasetError> {
        self.faces
            .iter()
            .enumerate()
            .map(|(index, face)| {
                if !self.by_id.contains_key(&face.identity_id) {
                    tracing::warn!(
                        index,
                        identity_id = %face.identity_id,
                        "face references unregistered identity"
                    );
                }
                let descriptor = codec::decode_base64(&face.descriptor, dim)
                    .map_err(|source| DatasetError::Decode { index, source })?;
                Ok((descriptor, face.identity_id.clone()))
            })
            .collect()
    }

    /// Decode the faces and publish them into `store` using `ingest`.
    pub fn train(
        &self,
        ingest: &Ingest,
        store: &DescriptorStore,
        dim: usize,
    ) -> Result<CategoryMap<String>, DatasetError> {
        let samples = self.labeled_samples(dim)?;
        Ok(ingest.train(store, samples)?)
    }
}
