mod lbph;

pub use lbph::LbphRecognizer;

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Outcome of classifying one face.
///
/// `confidence` is a distance: lower is better and 0 is a perfect match. An identity is
/// only ever present when the distance is strictly below the recognition threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    identity: Option<String>,
    confidence: f64,
}

impl ClassificationResult {
    /// Apply the threshold to the nearest enrolled match
    pub fn from_match<S: Into<String>>(label: S, distance: f64, threshold: f64) -> Self {
        let identity = if distance < threshold {
            Some(label.into())
        } else {
            None
        };
        Self {
            identity,
            confidence: distance,
        }
    }

    /// A face that matched nobody
    pub fn unknown(confidence: f64) -> Self {
        Self {
            identity: None,
            confidence,
        }
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn is_authorized(&self) -> bool {
        self.identity.is_some()
    }
}

/// A stored face image with the person it belongs to
#[derive(Debug, Clone)]
pub struct LabeledSample {
    pub label: String,
    pub image: GrayImage,
}

impl LabeledSample {
    pub fn new<S: Into<String>>(label: S, image: GrayImage) -> Self {
        Self {
            label: label.into(),
            image,
        }
    }
}

/// A face recognition model trained offline from enrolled samples
pub trait FaceClassifier: Send {
    /// Replace the model with one trained on `samples`.
    ///
    /// Returns `false` and leaves the current model untouched when `samples` is empty.
    fn train(&mut self, samples: &[LabeledSample]) -> bool;

    fn is_trained(&self) -> bool;

    /// Classify a cropped face. Callers must check [`FaceClassifier::is_trained`] first;
    /// an untrained model reports every face as unknown.
    fn classify(&self, face: &GrayImage) -> ClassificationResult;

    /// Names the model can recognize
    fn labels(&self) -> Vec<String>;
}

impl<T: FaceClassifier + ?Sized> FaceClassifier for Box<T> {
    fn train(&mut self, samples: &[LabeledSample]) -> bool {
        (**self).train(samples)
    }

    fn is_trained(&self) -> bool {
        (**self).is_trained()
    }

    fn classify(&self, face: &GrayImage) -> ClassificationResult {
        (**self).classify(face)
    }

    fn labels(&self) -> Vec<String> {
        (**self).labels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_strict_less_than() {
        let at_boundary = ClassificationResult::from_match("alice", 100.0, 100.0);
        assert!(!at_boundary.is_authorized());
        assert_eq!(at_boundary.identity(), None);
        assert_eq!(at_boundary.confidence(), 100.0);

        let just_below = ClassificationResult::from_match("alice", 99.999, 100.0);
        assert!(just_below.is_authorized());
        assert_eq!(just_below.identity(), Some("alice"));

        let above = ClassificationResult::from_match("alice", 150.0, 100.0);
        assert!(!above.is_authorized());
    }

    #[test]
    fn test_nan_distance_is_never_authorized() {
        let result = ClassificationResult::from_match("alice", f64::NAN, 100.0);
        assert!(!result.is_authorized());
    }
}
