use faceid_core::{Classification, Classifier, Face, GalleryError};
use std::path::Path;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Detection and descriptor extraction, provided by whatever face
/// recognition backend is available.
///
/// Every returned descriptor must have the dimensionality the gallery was
/// trained with.
pub trait FaceEngine: Send + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Find every face in an encoded image and describe it.
    fn detect_and_describe(&mut self, image: &[u8]) -> Result<Vec<Face>, Self::Error>;
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("face engine: {0}")]
    Engine(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("classification: {0}")]
    Gallery(#[from] GalleryError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// A detected face and the label it was given.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub face: Face,
    pub classification: Classification,
}

/// Runs a [`FaceEngine`] and classifies every face it finds.
pub struct Recognizer<E> {
    engine: E,
    classifier: Classifier,
}

impl<E: FaceEngine> Recognizer<E> {
    pub fn new(engine: E, classifier: Classifier) -> Self {
        Self { engine, classifier }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Detect, describe and classify every face in `image`.
    ///
    /// All faces of one image are classified against the same gallery
    /// snapshot.
    pub fn recognize(&mut self, image: &[u8]) -> Result<Vec<Recognition>, EngineError> {
        let faces = self.detect(image)?;
        let gallery = self.classifier.store().snapshot();

        let recognitions = faces
            .into_iter()
            .map(|face| -> Result<Recognition, EngineError> {
                let classification = self.classifier.classify_in(&gallery, &face.descriptor)?;
                Ok(Recognition {
                    face,
                    classification,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            faces = recognitions.len(),
            known = recognitions.iter().filter(|r| r.classification.is_known()).count(),
            gallery = gallery.len(),
            "recognize: classified faces"
        );
        Ok(recognitions)
    }

    /// Recognize an image expected to contain one face.
    ///
    /// Returns `None` when no face or more than one face is found.
    pub fn recognize_single(&mut self, image: &[u8]) -> Result<Option<Recognition>, EngineError> {
        let mut faces = self.detect(image)?;
        if faces.len() != 1 {
            tracing::debug!(faces = faces.len(), "recognize_single: expected exactly one face");
            return Ok(None);
        }
        let face = faces.remove(0);
        let classification = self.classifier.classify(&face.descriptor)?;
        Ok(Some(Recognition {
            face,
            classification,
        }))
    }

    /// Read an image file and recognize every face in it.
    pub fn recognize_file(&mut self, path: &Path) -> Result<Vec<Recognition>, EngineError> {
        let image = std::fs::read(path)?;
        self.recognize(&image)
    }

    fn detect(&mut self, image: &[u8]) -> Result<Vec<Face>, EngineError> {
        self.engine
            .detect_and_describe(image)
            .map_err(|e| EngineError::Engine(Box::new(e)))
    }
}

/// Messages sent from async callers to the engine thread.
enum EngineRequest {
    Recognize {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Vec<Recognition>, EngineError>>,
    },
    RecognizeSingle {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Option<Recognition>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Request recognition of every face in `image`.
    pub async fn recognize(&self, image: Vec<u8>) -> Result<Vec<Recognition>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Recognize {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Request recognition of an image expected to contain one face.
    pub async fn recognize_single(
        &self,
        image: Vec<u8>,
    ) -> Result<Option<Recognition>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::RecognizeSingle {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the face engine on a dedicated OS thread.
///
/// The engine owns its backend exclusively; requests are served one at a
/// time in arrival order. The classifier reads whatever gallery is
/// published when each request runs, so retraining through the shared
/// store takes effect without restarting the thread. The thread exits once
/// every handle is dropped.
pub fn spawn_engine<E: FaceEngine>(
    engine: E,
    classifier: Classifier,
) -> Result<EngineHandle, EngineError> {
    let mut recognizer = Recognizer::new(engine, classifier);
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("faceid-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Recognize { image, reply } => {
                        let _ = reply.send(recognizer.recognize(&image));
                    }
                    EngineRequest::RecognizeSingle { image, reply } => {
                        let _ = reply.send(recognizer.recognize_single(&image));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use faceid_core::{CategoryId, ClassifierConfig, Descriptor, DescriptorStore, Rect};
    use std::io::Write;
    use std::sync::Arc;

    #[derive(Debug, Error)]
    #[error("undecodable image")]
    struct BadImage;

    /// Treats each image byte as one face whose descriptor is `[byte, 0]`.
    /// An empty image is undecodable.
    struct ByteFaces;

    impl FaceEngine for ByteFaces {
        type Error = BadImage;

        fn detect_and_describe(&mut self, image: &[u8]) -> Result<Vec<Face>, BadImage> {
            if image.is_empty() {
                return Err(BadImage);
            }
            Ok(image
                .iter()
                .enumerate()
                .map(|(i, &b)| Face {
                    rect: Rect {
                        left: i as i32 * 10,
                        top: 0,
                        right: i as i32 * 10 + 10,
                        bottom: 10,
                    },
                    descriptor: Descriptor::new(vec![b as f32, 0.0]),
                })
                .collect())
        }
    }

    /// Returns a 3-dimensional descriptor regardless of input.
    struct WrongDimension;

    impl FaceEngine for WrongDimension {
        type Error = BadImage;

        fn detect_and_describe(&mut self, _image: &[u8]) -> Result<Vec<Face>, BadImage> {
            Ok(vec![Face {
                rect: Rect { left: 0, top: 0, right: 1, bottom: 1 },
                descriptor: Descriptor::new(vec![0.0, 0.0, 0.0]),
            }])
        }
    }

    fn trained_store() -> Arc<DescriptorStore> {
        let store = Arc::new(DescriptorStore::with_dimension(2));
        store
            .replace(
                vec![
                    Descriptor::new(vec![10.0, 0.0]),
                    Descriptor::new(vec![20.0, 0.0]),
                ],
                vec![CategoryId(0), CategoryId(1)],
            )
            .unwrap();
        store
    }

    fn classifier(store: &Arc<DescriptorStore>) -> Classifier {
        Classifier::new(Arc::clone(store), ClassifierConfig::default()).unwrap()
    }

    #[test]
    fn test_recognize_labels_every_face() {
        let store = trained_store();
        let mut rec = Recognizer::new(ByteFaces, classifier(&store));

        let results = rec.recognize(&[20, 15, 10]).unwrap();
        let labels: Vec<_> = results.iter().map(|r| r.classification.category()).collect();
        assert_eq!(labels, vec![Some(CategoryId(1)), None, Some(CategoryId(0))]);
        assert_eq!(results[1].face.rect.left, 10);
    }

    #[test]
    fn test_recognize_single_requires_exactly_one_face() {
        let store = trained_store();
        let mut rec = Recognizer::new(ByteFaces, classifier(&store));

        let one = rec.recognize_single(&[10]).unwrap().unwrap();
        assert_eq!(one.classification.category(), Some(CategoryId(0)));
        assert!(rec.recognize_single(&[10, 20]).unwrap().is_none());
    }

    #[test]
    fn test_engine_error_propagates() {
        let store = trained_store();
        let mut rec = Recognizer::new(ByteFaces, classifier(&store));
        let err = rec.recognize(&[]).unwrap_err();
        assert!(matches!(err, EngineError::Engine(_)));
        assert_eq!(err.to_string(), "face engine: undecodable image");
    }

    #[test]
    fn test_dimension_mismatch_surfaces_as_error() {
        let store = trained_store();
        let mut rec = Recognizer::new(WrongDimension, classifier(&store));
        let err = rec.recognize(&[1]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Gallery(GalleryError::DimensionMismatch { expected: 2, got: 3 })
        ));
    }

    #[test]
    fn test_recognize_file() {
        let store = trained_store();
        let mut rec = Recognizer::new(ByteFaces, classifier(&store));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[20]).unwrap();
        let results = rec.recognize_file(file.path()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].classification.category(), Some(CategoryId(1)));

        let missing = rec.recognize_file(Path::new("/nonexistent/face.jpg"));
        assert!(matches!(missing, Err(EngineError::Io(_))));
    }

    #[tokio::test]
    async fn test_handle_serves_concurrent_callers() {
        let store = trained_store();
        let handle = spawn_engine(ByteFaces, classifier(&store)).unwrap();

        let mut tasks = Vec::new();
        for i in 0..8u8 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                let byte = if i % 2 == 0 { 10 } else { 20 };
                let result = handle.recognize_single(vec![byte]).await.unwrap().unwrap();
                (i, result.classification.category())
            }));
        }
        for task in tasks {
            let (i, category) = task.await.unwrap();
            let expected = if i % 2 == 0 { CategoryId(0) } else { CategoryId(1) };
            assert_eq!(category, Some(expected));
        }
    }

    #[tokio::test]
    async fn test_handle_sees_retrained_gallery() {
        let store = trained_store();
        let handle = spawn_engine(ByteFaces, classifier(&store)).unwrap();

        let before = handle.recognize(vec![30]).await.unwrap();
        assert_eq!(before[0].classification, Classification::Unknown);

        store
            .replace(vec![Descriptor::new(vec![30.0, 0.0])], vec![CategoryId(0)])
            .unwrap();
        let after = handle.recognize(vec![30]).await.unwrap();
        assert_eq!(after[0].classification.category(), Some(CategoryId(0)));
    }

    #[tokio::test]
    async fn test_handle_reports_engine_errors() {
        let store = trained_store();
        let handle = spawn_engine(ByteFaces, classifier(&store)).unwrap();
        assert!(matches!(
            handle.recognize(Vec::new()).await,
            Err(EngineError::Engine(_))
        ));
    }
}
