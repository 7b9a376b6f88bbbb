//! The Elephant Protocol: normalized error-signature stall detection and
//! velocity calculation for routing.

pub mod signature;
pub mod tracker;

pub use signature::compute_error_signature;
pub use tracker::{ProgressTracker, Recommendation, StallInfo};
