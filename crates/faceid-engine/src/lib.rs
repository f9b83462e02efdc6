//! faceid-engine — Recognition pipeline around the faceid gallery.
//!
//! Loads configuration and training datasets, trains the shared descriptor
//! store, and runs a pluggable face detector/extractor whose descriptors are
//! classified against it.

pub mod config;
pub mod dataset;
pub mod engine;
pub mod service;

pub use config::{Config, ConfigError};
pub use dataset::{Dataset, DatasetError, FaceRecord, Identity};
pub use engine::{spawn_engine, EngineError, EngineHandle, FaceEngine, Recognition, Recognizer};
pub use service::{Identified, Roster, Service, ServiceError};
