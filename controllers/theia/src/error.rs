//! Controller-specific error types.
//!
//! This module defines error types specific to the Theia Controller
//! that are not covered by upstream library errors.

use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the Theia Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Failure to establish the owner linkage between a Theia and a child object
    #[error("Owner reference error: {0}")]
    Reference(String),

    /// An event's involved object could not be mapped back to a Theia
    #[error("Event resolution error: {0}")]
    Resolution(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Metrics registration or serving failure
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

/// NotFound on a read is an expected branch (first creation, deleted
/// parent), never an error to surface.
pub fn is_not_found(err: &KubeError) -> bool {
    matches!(err, KubeError::Api(resp) if resp.code == 404)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    #[test]
    fn not_found_is_detected_by_status_code() {
        let err = KubeError::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "statefulsets \"foo\" not found".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        });
        assert!(is_not_found(&err));

        let err = KubeError::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        });
        assert!(!is_not_found(&err));
    }
}
