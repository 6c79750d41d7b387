use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::RgbImage;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, Duration};

use crate::config::{EstimatorBackend, EstimatorConfig};
use crate::error::CaptureError;
use crate::landmarks::{Hand, Landmark, MAX_FINGERS};

/// Capability to estimate hand landmarks from a single frame
#[async_trait]
pub trait HandEstimator: Send + Sync {
    /// Returns every hand found in the frame; empty when there is none
    async fn estimate(&self, frame: &RgbImage) -> Result<Vec<Hand>>;
}

/// Asynchronously prepares an estimator before its first use
#[async_trait]
pub trait EstimatorLoader: Send + Sync {
    async fn load(&self) -> Result<Box<dyn HandEstimator>>;
}

// ============================================================================
// EXTERNAL PROCESS BACKEND
// ============================================================================

/// Runs an external landmark detector once per frame.
///
/// The frame is written to `frame_path` as JPEG and the path is appended to
/// the command line. The command prints a JSON list of hands on stdout, each
/// hand a list of `[x, y]` or `[x, y, z]` points in pixel coordinates.
pub struct ProcessEstimator {
    command: String,
    args: Vec<String>,
    frame_path: PathBuf,
}

impl ProcessEstimator {
    pub fn new(command: impl Into<String>, args: Vec<String>, frame_path: PathBuf) -> Self {
        Self {
            command: command.into(),
            args,
            frame_path,
        }
    }
}

#[async_trait]
impl HandEstimator for ProcessEstimator {
    async fn estimate(&self, frame: &RgbImage) -> Result<Vec<Hand>> {
        // JPEG encoding and the file write stay off the async workers
        let owned = frame.clone();
        let path = self.frame_path.clone();
        tokio::task::spawn_blocking(move || owned.save(&path))
            .await
            .context("Frame writer task failed")?
            .with_context(|| format!("Failed to write frame to {}", self.frame_path.display()))?;

        // A cancelled session drops this future; the detector must not outlive it
        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(&self.frame_path)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run estimator command: {}", self.command))?;

        if !output.status.success() {
            return Err(anyhow!(
                "Estimator exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        parse_hands(&output.stdout)
    }
}

impl Drop for ProcessEstimator {
    fn drop(&mut self) {
        if self.frame_path.exists() {
            let _ = std::fs::remove_file(&self.frame_path);
        }
    }
}

/// Parse the detector's JSON output into hands
pub fn parse_hands(stdout: &[u8]) -> Result<Vec<Hand>> {
    let raw: Vec<Vec<Vec<f32>>> =
        serde_json::from_slice(stdout).context("Estimator output is not a list of hands")?;

    raw.into_iter()
        .map(|points| {
            points
                .into_iter()
                .map(|coords| match coords.as_slice() {
                    [x, y] => Ok(Landmark::new(*x, *y)),
                    [x, y, z, ..] => Ok(Landmark { x: *x, y: *y, z: *z }),
                    _ => Err(anyhow!("Landmark needs at least x and y, got {:?}", coords)),
                })
                .collect::<Result<Vec<_>>>()
                .map(Hand::new)
        })
        .collect()
}

pub struct ProcessEstimatorLoader {
    command: String,
    args: Vec<String>,
    frame_path: PathBuf,
}

impl ProcessEstimatorLoader {
    pub fn new(command: impl Into<String>, args: Vec<String>, frame_path: PathBuf) -> Self {
        Self {
            command: command.into(),
            args,
            frame_path,
        }
    }
}

#[async_trait]
impl EstimatorLoader for ProcessEstimatorLoader {
    async fn load(&self) -> Result<Box<dyn HandEstimator>> {
        info!("Probing hand estimator command: {}", self.command);

        match Command::new(&self.command).arg("--help").output().await {
            Ok(output) => {
                debug!("Estimator help output: {}", String::from_utf8_lossy(&output.stdout));
                info!("Hand estimator ready ({})", self.command);
                Ok(Box::new(ProcessEstimator::new(
                    self.command.clone(),
                    self.args.clone(),
                    self.frame_path.clone(),
                )))
            }
            Err(e) => {
                warn!("Hand estimator command {} unavailable: {}", self.command, e);
                Err(CaptureError::EstimatorLoad(format!("{}: {}", self.command, e)).into())
            }
        }
    }
}

// ============================================================================
// KEYBOARD SIMULATION
// ============================================================================

/// Development estimator driven by the keyboard instead of a model.
///
/// The UI writes the simulated finger count (`None` = no hand) and every
/// estimate returns a synthetic hand with that many fingers raised.
#[derive(Clone)]
pub struct SimulatedEstimator {
    pose: Arc<RwLock<Option<u8>>>,
    load_delay: Duration,
}

impl SimulatedEstimator {
    pub fn new(load_delay: Duration) -> Self {
        info!("Keyboard gesture simulation active:");
        info!("  0-4: Raise that many fingers");
        info!("  N: Hide hand");

        Self {
            pose: Arc::new(RwLock::new(None)),
            load_delay,
        }
    }

    /// Non-blocking update from the UI thread; returns false if the pose is busy
    pub fn try_set_fingers(&self, fingers: Option<u8>) -> bool {
        match self.pose.try_write() {
            Ok(mut pose) => {
                *pose = fingers.map(|n| n.min(MAX_FINGERS));
                true
            }
            Err(_) => false,
        }
    }

    pub async fn set_fingers(&self, fingers: Option<u8>) {
        *self.pose.write().await = fingers.map(|n| n.min(MAX_FINGERS));
    }

    pub fn current_fingers(&self) -> Option<u8> {
        self.pose.try_read().ok().and_then(|pose| *pose)
    }
}

#[async_trait]
impl HandEstimator for SimulatedEstimator {
    async fn estimate(&self, frame: &RgbImage) -> Result<Vec<Hand>> {
        let pose = *self.pose.read().await;
        Ok(pose
            .map(|fingers| {
                vec![Hand::with_extended_fingers(fingers)
                    .scaled(frame.width() as f32, frame.height() as f32)]
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl EstimatorLoader for SimulatedEstimator {
    async fn load(&self) -> Result<Box<dyn HandEstimator>> {
        sleep(self.load_delay).await;
        info!("Simulated hand estimator ready");
        Ok(Box::new(self.clone()))
    }
}

// ============================================================================
// SCRIPTED READINGS
// ============================================================================

/// Replays a fixed sequence of readings, one per estimate call.
///
/// `None` means no hand. The last reading repeats once the script runs out.
#[derive(Clone)]
pub struct ScriptedEstimator {
    readings: Arc<Mutex<VecDeque<Option<u8>>>>,
    last: Arc<Mutex<Option<u8>>>,
    calls: Arc<Mutex<usize>>,
}

impl ScriptedEstimator {
    pub fn new(readings: impl IntoIterator<Item = Option<u8>>) -> Self {
        Self {
            readings: Arc::new(Mutex::new(readings.into_iter().collect())),
            last: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Script of finger counts where every reading contains a hand
    pub fn from_counts(counts: &[u8]) -> Self {
        Self::new(counts.iter().copied().map(Some))
    }

    /// Number of estimate calls served so far
    pub async fn calls(&self) -> usize {
        *self.calls.lock().await
    }
}

#[async_trait]
impl HandEstimator for ScriptedEstimator {
    async fn estimate(&self, frame: &RgbImage) -> Result<Vec<Hand>> {
        *self.calls.lock().await += 1;

        let reading = {
            let mut readings = self.readings.lock().await;
            let mut last = self.last.lock().await;
            if let Some(next) = readings.pop_front() {
                *last = next;
            }
            *last
        };

        Ok(reading
            .map(|fingers| {
                vec![Hand::with_extended_fingers(fingers)
                    .scaled(frame.width() as f32, frame.height() as f32)]
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl EstimatorLoader for ScriptedEstimator {
    async fn load(&self) -> Result<Box<dyn HandEstimator>> {
        Ok(Box::new(self.clone()))
    }
}

/// Pick the estimator backend named in the configuration
pub fn create_loader(
    config: &EstimatorConfig,
    simulated: &SimulatedEstimator,
) -> Result<Box<dyn EstimatorLoader>> {
    match config.backend {
        EstimatorBackend::Simulated => Ok(Box::new(simulated.clone())),
        EstimatorBackend::Scripted => Ok(Box::new(ScriptedEstimator::new(config.script.iter().copied()))),
        EstimatorBackend::Process => {
            let command = config
                .command
                .clone()
                .ok_or_else(|| anyhow!("Process estimator selected but no command configured"))?;
            Ok(Box::new(ProcessEstimatorLoader::new(
                command,
                config.args.clone(),
                config.frame_path.clone(),
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::count_extended_fingers;

    #[test]
    fn test_parse_hands() {
        let json = br#"[[[1.0, 2.0], [3.0, 4.0, 5.0]], []]"#;
        let hands = parse_hands(json).unwrap();
        assert_eq!(hands.len(), 2);
        assert_eq!(hands[0].landmarks[0], Landmark::new(1.0, 2.0));
        assert_eq!(hands[0].landmarks[1].z, 5.0);
        assert!(hands[1].landmarks.is_empty());
    }

    #[test]
    fn test_parse_hands_rejects_short_points() {
        assert!(parse_hands(br#"[[[1.0]]]"#).is_err());
        assert!(parse_hands(b"not json").is_err());
        assert!(parse_hands(b"[]").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_simulated_estimator() {
        let sim = SimulatedEstimator::new(Duration::ZERO);
        let estimator = sim.load().await.unwrap();
        let frame = RgbImage::new(320, 240);

        assert!(estimator.estimate(&frame).await.unwrap().is_empty());

        sim.set_fingers(Some(2)).await;
        let hands = estimator.estimate(&frame).await.unwrap();
        assert_eq!(hands.len(), 1);
        assert_eq!(count_extended_fingers(&hands[0]), 2);

        assert!(sim.try_set_fingers(Some(9)));
        assert_eq!(sim.current_fingers(), Some(MAX_FINGERS));
    }

    #[tokio::test]
    async fn test_scripted_estimator_repeats_last_reading() {
        let scripted = ScriptedEstimator::new([Some(1), None, Some(3)]);
        let frame = RgbImage::new(10, 10);

        let mut counts = Vec::new();
        for _ in 0..5 {
            let hands = scripted.estimate(&frame).await.unwrap();
            counts.push(hands.first().map(count_extended_fingers));
        }

        assert_eq!(counts, vec![Some(1), None, Some(3), Some(3), Some(3)]);
        assert_eq!(scripted.calls().await, 5);
    }

    fn sh_estimator(script: &str, frame_path: PathBuf) -> ProcessEstimator {
        // `sh -c <script> -- <frame>` exposes the frame path as $1
        ProcessEstimator::new("sh", vec!["-c".to_string(), script.to_string(), "--".to_string()], frame_path)
    }

    #[tokio::test]
    async fn test_process_estimator_runs_command_on_written_frame() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let frame_path = temp_dir.path().join("frame.jpg");
        let estimator = sh_estimator(
            r#"test -s "$1" && echo '[[[10, 20], [30, 40, 0.5]]]'"#,
            frame_path.clone(),
        );

        let hands = estimator.estimate(&RgbImage::new(32, 24)).await.unwrap();
        assert_eq!(hands.len(), 1);
        assert_eq!(hands[0].landmarks[0], Landmark::new(10.0, 20.0));
        assert_eq!(hands[0].landmarks[1].z, 0.5);

        let written = image::open(&frame_path).unwrap();
        assert_eq!((written.width(), written.height()), (32, 24));

        drop(estimator);
        assert!(!frame_path.exists());
    }

    #[tokio::test]
    async fn test_process_estimator_reports_failed_command() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let estimator = sh_estimator("echo 'model missing' >&2; exit 3", temp_dir.path().join("frame.jpg"));

        let err = estimator.estimate(&RgbImage::new(8, 8)).await.unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("model missing"), "{}", message);
    }

    #[tokio::test]
    async fn test_process_estimator_rejects_garbage_output() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let estimator = sh_estimator("echo 'no hands here'", temp_dir.path().join("frame.jpg"));
        assert!(estimator.estimate(&RgbImage::new(8, 8)).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_process_command_fails_to_load() {
        let loader = ProcessEstimatorLoader::new(
            "gesture-capture-no-such-estimator",
            Vec::new(),
            std::env::temp_dir().join("gesture_capture_test_frame.jpg"),
        );
        let err = loader.load().await.err().unwrap();
        assert!(err.downcast_ref::<CaptureError>().is_some());
    }
}
