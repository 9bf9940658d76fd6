//! Stable digests for questions and dataset schemas.

use quickframe_types::{Dataset, Fingerprint};
use sha2::{Digest, Sha256};
use tracing::warn;

/// Fingerprint a question after lower-casing and trimming it.
pub fn hash_question(question: &str) -> Fingerprint {
    let normalized = question.trim().to_lowercase();
    Fingerprint::new(hex_digest(normalized.as_bytes()))
}

/// Fingerprint a dataset from its row count, column names and column types.
///
/// Cell values do not participate, so two tables with the same shape and
/// schema share a fingerprint. Introspection failures yield the `"unknown"`
/// sentinel instead of an error.
pub fn hash_dataset(dataset: &Dataset) -> Fingerprint {
    let shape = match dataset.shape() {
        Ok(shape) => shape,
        Err(e) => {
            warn!(target: "quickframe::cache", "Dataset introspection failed, using sentinel fingerprint: {}", e);
            return Fingerprint::unknown();
        }
    };

    let dtypes: Vec<&str> = shape.column_types.iter().map(|t| t.dtype_name()).collect();
    let composite = serde_json::to_string(&(
        shape.row_count,
        shape.column_count(),
        &shape.column_names,
        &dtypes,
    ));

    match composite {
        Ok(composite) => Fingerprint::new(hex_digest(composite.as_bytes())),
        Err(e) => {
            warn!(target: "quickframe::cache", "Failed to encode dataset schema, using sentinel fingerprint: {}", e);
            Fingerprint::unknown()
        }
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
