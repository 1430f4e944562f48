mod session;
mod store;


pub use session::{EnrollmentReport, Enroller};
pub use store::EnrollmentStore;

use crate::recognition::FaceClassifier;
use tracing::{error, info, warn};

/// Train `classifier` on every sample in `store`.
///
/// Returns `false` when the folder is missing, unreadable or holds no samples.
pub fn train_from_store<C: FaceClassifier + ?Sized>(
    store: &EnrollmentStore,
    classifier: &mut C,
) -> bool {
    let samples = match store.load_all() {
        Ok(samples) => samples,
        Err(e) => {
            error!(
                "Failed to read enrollment folder {}: {}",
                store.root().display(),
                e
            );
            return false;
        }
    };

    if samples.is_empty() {
        warn!(
            "No face samples found in {}, enroll someone first",
            store.root().display()
        );
        return false;
    }

    let trained = classifier.train(&samples);
    if trained {
        info!("Trained recognizer for: {}", classifier.labels().join(", "));
    }
    trained
}
