//! Typed errors for the capture pipeline.
//!
//! Most of the crate works with `anyhow::Result`; these variants exist for
//! the cases a caller may want to match on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// The hand-landmark estimator could not be loaded
    #[error("Failed to load hand estimator: {0}")]
    EstimatorLoad(String),

    /// The estimator did not finish loading in time
    #[error("Hand estimator did not load within {0} ms")]
    EstimatorLoadTimeout(u64),

    /// The frame source is not producing frames yet
    #[error("No camera frame available")]
    NoFrame,

    /// JPEG encoding of a snapshot failed
    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] image::ImageError),

    /// A data URI did not hold a base64 JPEG payload
    #[error("Malformed image data URI: {0}")]
    DataUri(String),
}
