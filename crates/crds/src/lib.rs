//! Theia CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the Theia controller.

pub mod theia;

pub use theia::*;
