//! Async driver for a capture session.
//!
//! One task owns the session and multiplexes estimator loading, the sampling
//! timer, the in-flight inference, the countdown timer and user commands with
//! `select!`, so every state change happens on a single logical thread.
//! Inference never runs inside a branch body: a slow estimator cannot delay a
//! countdown tick or a cancel.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::camera_controller::FrameSource;
use crate::config::{CaptureConfig, Config};
use crate::error::CaptureError;
use crate::estimator::{EstimatorLoader, HandEstimator};
use crate::landmarks::{count_extended_fingers, Hand};
use crate::pose::PoseTransition;
use crate::session::{CaptureSession, CaptureView, CountdownStep};
use crate::snapshot::{CapturedImage, Snapshotter};
use crate::timer::Ticker;

/// One sample in flight: `None` when the camera had no usable frame
type Inference = Pin<Box<dyn Future<Output = Option<Result<Vec<Hand>>>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Retake,
    Submit,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Submitted,
    Cancelled,
}

/// Caller hooks for accepting the photo and closing the session
pub struct CaptureCallbacks {
    pub on_capture: Box<dyn FnOnce(CapturedImage) + Send>,
    pub on_close: Box<dyn FnOnce() + Send>,
}

impl CaptureCallbacks {
    pub fn new(
        on_capture: impl FnOnce(CapturedImage) + Send + 'static,
        on_close: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            on_capture: Box::new(on_capture),
            on_close: Box::new(on_close),
        }
    }

    pub fn noop() -> Self {
        Self::new(|_| {}, || {})
    }
}

/// Cloneable handle used by the UI to steer a running session
#[derive(Clone)]
pub struct CaptureHandle {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<CaptureView>,
    hand: watch::Receiver<Option<Hand>>,
}

impl CaptureHandle {
    pub fn retake(&self) -> bool {
        self.commands.send(Command::Retake).is_ok()
    }

    pub fn submit(&self) -> bool {
        self.commands.send(Command::Submit).is_ok()
    }

    pub fn cancel(&self) -> bool {
        self.commands.send(Command::Cancel).is_ok()
    }

    pub fn subscribe(&self) -> watch::Receiver<CaptureView> {
        self.view.clone()
    }

    pub fn view(&self) -> CaptureView {
        self.view.borrow().clone()
    }

    /// First hand found by the latest sample, in frame pixel coordinates
    pub fn latest_hand(&self) -> Option<Hand> {
        self.hand.borrow().clone()
    }
}

pub struct CaptureController {
    capture: CaptureConfig,
    snapshotter: Snapshotter,
    frame_source: Arc<dyn FrameSource>,
    loader: Box<dyn EstimatorLoader>,
    callbacks: CaptureCallbacks,
    commands: mpsc::UnboundedReceiver<Command>,
    view: watch::Sender<CaptureView>,
    hand: watch::Sender<Option<Hand>>,
}

impl CaptureController {
    pub fn new(
        config: &Config,
        frame_source: Arc<dyn FrameSource>,
        loader: Box<dyn EstimatorLoader>,
        callbacks: CaptureCallbacks,
    ) -> (Self, CaptureHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let initial = CaptureSession::new(config.capture.countdown_start).view();
        let (view_tx, view_rx) = watch::channel(initial);
        let (hand_tx, hand_rx) = watch::channel(None);

        let controller = Self {
            capture: config.capture.clone(),
            snapshotter: Snapshotter::new(config.camera.jpeg_quality, config.camera.mirrored),
            frame_source,
            loader,
            callbacks,
            commands: command_rx,
            view: view_tx,
            hand: hand_tx,
        };
        let handle = CaptureHandle {
            commands: command_tx,
            view: view_rx,
            hand: hand_rx,
        };

        (controller, handle)
    }

    pub fn spawn(self) -> JoinHandle<SessionOutcome> {
        tokio::spawn(self.run())
    }

    /// Drive the session until it is submitted or cancelled.
    ///
    /// Dropping every [`CaptureHandle`] counts as a cancel. Both timers are
    /// stopped before the callbacks run.
    pub async fn run(self) -> SessionOutcome {
        let CaptureController {
            capture,
            snapshotter,
            frame_source,
            loader,
            callbacks,
            mut commands,
            view,
            hand,
        } = self;

        let mut session = CaptureSession::new(capture.countdown_start);
        let mut sampler = Ticker::new();
        let mut countdown = Ticker::new();
        let mut estimator: Option<Arc<dyn HandEstimator>> = None;
        let mut inference: Option<Inference> = None;
        let mut loading = true;

        info!("Capture session started - loading hand estimator");
        let load = timeout(capture.estimator_load_timeout(), loader.load());
        tokio::pin!(load);

        let (outcome, submitted) = loop {
            tokio::select! {
                result = &mut load, if loading => {
                    loading = false;
                    match result {
                        Ok(Ok(loaded)) => {
                            estimator = Some(Arc::from(loaded));
                            session.estimator_ready();
                            sampler.start(capture.sample_interval());
                        }
                        Ok(Err(e)) => session.estimator_failed(format!("{:#}", e)),
                        Err(_) => session.estimator_failed(
                            CaptureError::EstimatorLoadTimeout(capture.estimator_load_timeout_ms).to_string(),
                        ),
                    }
                }
                _ = sampler.tick() => {
                    // A tick while the previous sample is still running is skipped
                    if inference.is_none() && session.accepts_samples() {
                        if let Some(estimator) = &estimator {
                            inference = Some(start_inference(Arc::clone(estimator), Arc::clone(&frame_source)));
                        }
                    }
                }
                result = in_flight(&mut inference) => {
                    inference = None;
                    match result {
                        Some(hands) => {
                            let transition = record_sample(hands, &mut session, &hand);
                            if transition == Some(PoseTransition::Completed) && !countdown.is_active() {
                                countdown.start(capture.countdown_tick());
                            }
                        }
                        None => debug!("Camera not producing frames yet - skipping sample"),
                    }
                }
                _ = countdown.tick() => {
                    match session.countdown_tick() {
                        CountdownStep::Remaining(_) => {}
                        CountdownStep::Elapsed => {
                            countdown.cancel();
                            inference = None;
                            match take_snapshot(snapshotter, Arc::clone(&frame_source)).await {
                                Ok(image) => {
                                    session.complete_capture(image);
                                    sampler.cancel();
                                    hand.send_replace(None);
                                }
                                Err(e) => {
                                    warn!("Snapshot failed: {:#}", e);
                                    session.capture_failed();
                                }
                            }
                        }
                        CountdownStep::Inactive => countdown.cancel(),
                    }
                }
                command = commands.recv() => {
                    match command {
                        Some(Command::Retake) => {
                            countdown.cancel();
                            inference = None;
                            session.retake();
                            if session.accepts_samples() && !sampler.is_active() {
                                sampler.start(capture.sample_interval());
                            }
                        }
                        Some(Command::Submit) => {
                            if let Some(image) = session.submit() {
                                break (SessionOutcome::Submitted, Some(image));
                            }
                            debug!("Submit ignored - no photo captured yet");
                        }
                        Some(Command::Cancel) | None => {
                            session.cancel();
                            break (SessionOutcome::Cancelled, None);
                        }
                    }
                }
            }

            view.send_replace(session.view());
        };

        // Dropping the pending inference also kills an external detector
        drop(inference);
        sampler.cancel();
        countdown.cancel();
        view.send_replace(session.view());

        if let Some(image) = submitted {
            (callbacks.on_capture)(image);
        }
        (callbacks.on_close)();

        info!("Capture session finished: {:?}", outcome);
        outcome
    }
}

/// Read a frame off the blocking pool and run the estimator on it
fn start_inference(estimator: Arc<dyn HandEstimator>, source: Arc<dyn FrameSource>) -> Inference {
    Box::pin(async move {
        let frame = match tokio::task::spawn_blocking(move || source.current_frame()).await {
            Ok(Some(frame)) if frame.width() > 0 && frame.height() > 0 => frame,
            Ok(_) => return None,
            Err(e) => {
                warn!("Frame reader task failed: {}", e);
                return None;
            }
        };
        Some(estimator.estimate(&frame).await)
    })
}

/// Resolves with the pending inference, or never when there is none
async fn in_flight(slot: &mut Option<Inference>) -> Option<Result<Vec<Hand>>> {
    match slot {
        Some(inference) => inference.await,
        None => std::future::pending().await,
    }
}

/// Feed one estimator result to the session
fn record_sample(
    hands: Result<Vec<Hand>>,
    session: &mut CaptureSession,
    hand: &watch::Sender<Option<Hand>>,
) -> Option<PoseTransition> {
    // A countdown or retake may have started while the sample was in flight
    if !session.accepts_samples() {
        return None;
    }

    let hands = match hands {
        Ok(hands) => hands,
        Err(e) => {
            warn!("Hand estimation failed: {:#}", e);
            Vec::new()
        }
    };

    let first = hands.into_iter().next();
    let fingers = first.as_ref().map(count_extended_fingers).unwrap_or(0);
    debug!("Sample: {} finger(s) at stage {}", fingers, session.stage());
    hand.send_replace(first);

    session.record_finger_count(fingers)
}

async fn take_snapshot(snapshotter: Snapshotter, source: Arc<dyn FrameSource>) -> Result<CapturedImage> {
    let image = tokio::task::spawn_blocking(move || snapshotter.capture(source.as_ref()))
        .await
        .context("Snapshot task failed")??;
    Ok(image)
}
