//! Trained gallery plus the identity registry that gives its categories
//! meaning.

use crate::config::{Config, ConfigError};
use crate::dataset::{Dataset, DatasetError, Identity};
use faceid_core::{
    CategoryId, CategoryMap, Classification, Classifier, Descriptor, DescriptorStore, Gallery,
    GalleryError, Ingest,
};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("dataset: {0}")]
    Dataset(#[from] DatasetError),
    #[error("gallery: {0}")]
    Gallery(#[from] GalleryError),
}

/// A published gallery together with the labels and registry it was
/// trained from. Always replaced as a unit.
#[derive(Debug)]
pub struct Roster {
    pub gallery: Arc<Gallery>,
    pub labels: CategoryMap<String>,
    pub dataset: Dataset,
}

/// Result of [`Service::identify`].
#[derive(Debug, Clone, PartialEq)]
pub struct Identified {
    pub category: CategoryId,
    pub distance: f32,
    pub identity_id: String,
    /// Registry entry, if the dataset registers `identity_id`.
    pub identity: Option<Identity>,
}

pub struct Service {
    store: Arc<DescriptorStore>,
    classifier: Classifier,
    ingest: Ingest,
    dimension: usize,
    roster: RwLock<Arc<Roster>>,
}

impl Service {
    /// Validate `config`, create the store and train it from
    /// `config.dataset_path` when set.
    pub fn new(config: &Config) -> Result<Self, ServiceError> {
        config.validate()?;

        let store = Arc::new(DescriptorStore::with_dimension(config.dimension));
        let classifier = Classifier::new(Arc::clone(&store), config.classifier_config())?;
        let roster = Roster {
            gallery: store.snapshot(),
            labels: CategoryMap::default(),
            dataset: Dataset::new(),
        };

        let service = Self {
            store,
            classifier,
            ingest: config.ingest(),
            dimension: config.dimension,
            roster: RwLock::new(Arc::new(roster)),
        };

        if let Some(path) = &config.dataset_path {
            let dataset = Dataset::load(path)?;
            service.retrain(dataset)?;
        }

        tracing::info!(
            threshold = config.threshold,
            dimension = config.dimension,
            grouping = ?config.grouping,
            samples = service.store.size(),
            "service ready"
        );
        Ok(service)
    }

    pub fn store(&self) -> &Arc<DescriptorStore> {
        &self.store
    }

    /// Classifier over the shared store, e.g. for [`spawn_engine`](crate::spawn_engine).
    pub fn classifier(&self) -> Classifier {
        self.classifier.clone()
    }

    pub fn roster(&self) -> Arc<Roster> {
        Arc::clone(&self.roster.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the gallery and registry with ones trained from `dataset`.
    ///
    /// On error the current roster stays published.
    pub fn retrain(&self, dataset: Dataset) -> Result<(), ServiceError> {
        let samples = dataset.labeled_samples(self.dimension)?;
        let trained = self.ingest.build(samples)?;

        let mut roster = self.roster.write().unwrap_or_else(PoisonError::into_inner);
        self.store.publish(trained.gallery)?;
        *roster = Arc::new(Roster {
            gallery: self.store.snapshot(),
            labels: trained.labels,
            dataset,
        });
        Ok(())
    }

    /// Classify `query` and resolve the category to its identity.
    ///
    /// `None` means unknown.
    pub fn identify(&self, query: &Descriptor) -> Result<Option<Identified>, ServiceError> {
        let roster = self.roster();
        let Classification::Known { category, distance } =
            self.classifier.classify_in(&roster.gallery, query)?
        else {
            return Ok(None);
        };

        let Some(identity_id) = roster.labels.get(category) else {
            return Ok(None);
        };
        Ok(Some(Identified {
            category,
            distance,
            identity_id: identity_id.clone(),
            identity: roster.dataset.identity(identity_id).cloned(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faceid_core::GroupingPolicy;
    use std::io::Write;
    use std::thread;

    const DIM: usize = 3;

    fn d(x: f32) -> Descriptor {
        Descriptor::new(vec![x, 0.0, 0.0])
    }

    fn dataset(faces: &[(&str, f32)]) -> Dataset {
        let mut ds = Dataset::new();
        ds.add_identity(Identity {
            id: "a".into(),
            name: "Alice".into(),
            group: "Ops".into(),
        });
        ds.add_identity(Identity {
            id: "b".into(),
            name: "Bob".into(),
            group: "Dev".into(),
        });
        for (id, x) in faces {
            ds.add_face(id, &d(*x));
        }
        ds
    }

    fn config() -> Config {
        Config {
            dimension: DIM,
            ..Config::default()
        }
    }

    #[test]
    fn test_new_without_dataset_is_empty() {
        let service = Service::new(&config()).unwrap();
        assert_eq!(service.store().size(), 0);
        assert_eq!(service.identify(&d(0.0)).unwrap(), None);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let cfg = Config {
            threshold: f32::NAN,
            ..config()
        };
        assert!(matches!(
            Service::new(&cfg),
            Err(ServiceError::Config(ConfigError::Classifier(
                GalleryError::InvalidThreshold(_)
            )))
        ));
    }

    #[test]
    fn test_new_trains_from_dataset_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = dataset(&[("a", 0.0), ("b", 4.0)]).to_json().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let cfg = Config {
            dataset_path: Some(file.path().to_path_buf()),
            ..config()
        };
        let service = Service::new(&cfg).unwrap();
        assert_eq!(service.store().size(), 2);

        let who = service.identify(&d(3.9)).unwrap().unwrap();
        assert_eq!(who.identity_id, "b");
        assert_eq!(who.identity.unwrap().name, "Bob");
    }

    #[test]
    fn test_new_requires_non_empty_dataset_when_configured() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"identities\": [], \"faces\": []}").unwrap();

        let cfg = Config {
            dataset_path: Some(file.path().to_path_buf()),
            require_non_empty: true,
            ..config()
        };
        assert!(matches!(
            Service::new(&cfg),
            Err(ServiceError::Gallery(GalleryError::EmptyDataset))
        ));
    }

    #[test]
    fn test_retrain_swaps_roster() {
        let service = Service::new(&config()).unwrap();
        service.retrain(dataset(&[("a", 0.0)])).unwrap();
        assert_eq!(service.identify(&d(0.1)).unwrap().unwrap().identity_id, "a");

        service.retrain(dataset(&[("b", 0.0)])).unwrap();
        let who = service.identify(&d(0.1)).unwrap().unwrap();
        assert_eq!(who.identity_id, "b");
        assert_eq!(service.roster().labels.len(), 1);
    }

    #[test]
    fn test_new_rejects_oversized_dimension() {
        let cfg = Config {
            dimension: usize::MAX / 4 + 1,
            ..config()
        };
        assert!(matches!(
            Service::new(&cfg),
            Err(ServiceError::Config(ConfigError::DimensionOutOfRange(_)))
        ));
    }

    #[test]
    fn test_identify_during_retrain_uses_matching_labels() {
        // Both rosters put "a" at the origin, under category 0 in one and
        // category 1 in the other. Pairing a gallery with the other roster's
        // labels would resolve the origin to "c" or "b".
        let first = || dataset(&[("a", 0.0), ("b", 4.0)]);
        let second = || dataset(&[("c", 8.0), ("a", 0.0)]);

        let service = Arc::new(Service::new(&config()).unwrap());
        service.retrain(first()).unwrap();

        let writer = {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                for i in 0..200 {
                    let ds = if i % 2 == 0 { second() } else { first() };
                    service.retrain(ds).unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let who = service.identify(&d(0.0)).unwrap().unwrap();
                        assert_eq!(who.identity_id, "a", "category {}", who.category);
                        assert!(who.category == CategoryId(0) || who.category == CategoryId(1));
                        assert_eq!(who.distance, 0.0);

                        let roster = service.roster();
                        assert_eq!(roster.gallery.category_count(), roster.labels.len());
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }

    #[test]
    fn test_failed_retrain_keeps_roster() {
        let service = Service::new(&config()).unwrap();
        service.retrain(dataset(&[("a", 0.0)])).unwrap();

        let mut bad = dataset(&[]);
        bad.add_face("b", &Descriptor::new(vec![1.0, 2.0]));
        assert!(matches!(
            service.retrain(bad),
            Err(ServiceError::Dataset(DatasetError::Decode { index: 0, .. }))
        ));

        assert_eq!(service.store().size(), 1);
        assert_eq!(service.identify(&d(0.0)).unwrap().unwrap().identity_id, "a");
    }

    #[test]
    fn test_grouping_policy_applies_on_retrain() {
        let cfg = Config {
            grouping: GroupingPolicy::Global,
            ..config()
        };
        let service = Service::new(&cfg).unwrap();
        service
            .retrain(dataset(&[("a", 0.0), ("b", 4.0), ("a", 0.2)]))
            .unwrap();
        assert_eq!(service.roster().labels.len(), 2);
    }

    #[test]
    fn test_unregistered_identity_still_identified() {
        let service = Service::new(&config()).unwrap();
        let mut ds = dataset(&[]);
        ds.add_face("ghost", &d(1.0));
        service.retrain(ds).unwrap();

        let who = service.identify(&d(1.0)).unwrap().unwrap();
        assert_eq!(who.identity_id, "ghost");
        assert_eq!(who.identity, None);
        assert_eq!(who.distance, 0.0);
    }
}
