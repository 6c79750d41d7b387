//! Gesture-gated photo capture.
//!
//! A candidate shows one, two and then three fingers to the camera; after a
//! short countdown a still photo is taken, which can be retaken or submitted.

pub mod camera_controller;
pub mod config;
pub mod controller;
pub mod error;
pub mod estimator;
pub mod landmarks;
pub mod pose;
pub mod session;
pub mod snapshot;
pub mod storage;
pub mod texture;
pub mod timer;
pub mod ui;

pub use crate::camera_controller::{CameraController, FrameSource, StaticFrameSource};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::controller::{CaptureCallbacks, CaptureController, CaptureHandle, SessionOutcome};
pub use crate::error::CaptureError;
pub use crate::estimator::{EstimatorLoader, HandEstimator, ScriptedEstimator, SimulatedEstimator};
pub use crate::landmarks::{count_extended_fingers, Hand, Landmark};
pub use crate::session::{CaptureSession, CaptureView, Phase};
pub use crate::snapshot::CapturedImage;
