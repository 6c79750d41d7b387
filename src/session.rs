//! State of a single gesture capture session.
//!
//! Every transition is synchronous; timers, the estimator and the camera are
//! driven from [`crate::controller`].

use log::{debug, info, warn};

use crate::landmarks::MAX_FINGERS;
use crate::pose::{PoseProgress, PoseStatus, PoseTransition};
use crate::snapshot::CapturedImage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the hand estimator
    Loading,
    /// Sampling frames and matching poses
    Sampling,
    /// Final pose confirmed, counting down to the snapshot
    Countdown(u8),
    /// A photo is waiting to be accepted or retaken
    Captured,
    /// The estimator never became ready
    Failed(String),
    Closed,
}

/// What the countdown did on one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    Remaining(u8),
    /// Reached zero; a snapshot should be taken now
    Elapsed,
    Inactive,
}

/// Read-only view of a session for rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureView {
    pub phase: Phase,
    pub stage: u8,
    pub pose_status: PoseStatus,
    pub fingers: u8,
    pub countdown: Option<u8>,
    pub captured: Option<CapturedImage>,
}

#[derive(Debug)]
pub struct CaptureSession {
    estimator_ready: bool,
    failure: Option<String>,
    closed: bool,
    progress: PoseProgress,
    fingers: u8,
    countdown_start: u8,
    countdown: Option<u8>,
    captured: Option<CapturedImage>,
}

impl CaptureSession {
    pub fn new(countdown_start: u8) -> Self {
        Self {
            estimator_ready: false,
            failure: None,
            closed: false,
            progress: PoseProgress::default(),
            fingers: 0,
            countdown_start: countdown_start.max(1),
            countdown: None,
            captured: None,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.closed {
            Phase::Closed
        } else if let Some(reason) = &self.failure {
            Phase::Failed(reason.clone())
        } else if !self.estimator_ready {
            Phase::Loading
        } else if self.captured.is_some() {
            Phase::Captured
        } else if let Some(remaining) = self.countdown {
            Phase::Countdown(remaining)
        } else {
            Phase::Sampling
        }
    }

    pub fn stage(&self) -> u8 {
        self.progress.stage()
    }

    pub fn pose_status(&self) -> PoseStatus {
        self.progress.status()
    }

    pub fn countdown(&self) -> Option<u8> {
        self.countdown
    }

    pub fn captured(&self) -> Option<&CapturedImage> {
        self.captured.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn view(&self) -> CaptureView {
        CaptureView {
            phase: self.phase(),
            stage: self.stage(),
            pose_status: self.pose_status(),
            fingers: self.fingers,
            countdown: self.countdown,
            captured: self.captured.clone(),
        }
    }

    pub fn estimator_ready(&mut self) {
        if self.closed || self.failure.is_some() {
            return;
        }
        self.estimator_ready = true;
        info!("Hand estimator ready - show one finger to begin");
    }

    pub fn estimator_failed(&mut self, reason: impl Into<String>) {
        if self.closed || self.estimator_ready {
            return;
        }
        let reason = reason.into();
        warn!("Capture session cannot start: {}", reason);
        self.failure = Some(reason);
    }

    /// Whether a sampling tick should read a frame at all
    pub fn accepts_samples(&self) -> bool {
        self.estimator_ready && self.failure.is_none() && !self.closed && self.captured.is_none()
    }

    /// Store the latest finger count and run pose evaluation.
    ///
    /// Evaluation only happens while no countdown is running and no photo
    /// exists. Returns the pose transition, if any.
    pub fn record_finger_count(&mut self, fingers: u8) -> Option<PoseTransition> {
        if !self.accepts_samples() {
            return None;
        }

        self.fingers = fingers.min(MAX_FINGERS);
        if self.countdown.is_some() {
            return None;
        }

        let transition = self.progress.evaluate(self.fingers)?;
        match transition {
            PoseTransition::Advanced { confirmed } => {
                info!("Pose {} confirmed, waiting for pose {}", confirmed, confirmed + 1);
            }
            PoseTransition::Completed => {
                self.countdown = Some(self.countdown_start);
                info!("Final pose confirmed - countdown from {}", self.countdown_start);
            }
        }
        Some(transition)
    }

    pub fn countdown_tick(&mut self) -> CountdownStep {
        let Some(remaining) = self.countdown else {
            return CountdownStep::Inactive;
        };

        let next = remaining.saturating_sub(1);
        self.countdown = Some(next);
        debug!("Countdown: {}", next);

        if next == 0 {
            CountdownStep::Elapsed
        } else {
            CountdownStep::Remaining(next)
        }
    }

    /// Store the snapshot taken when the countdown reached zero
    pub fn complete_capture(&mut self, image: CapturedImage) {
        if self.closed || self.captured.is_some() || self.countdown != Some(0) {
            warn!("Ignoring snapshot outside of a finished countdown");
            return;
        }
        info!("Photo captured: {:?}", image);
        self.captured = Some(image);
        self.countdown = None;
    }

    /// The snapshot could not be taken; start the pose sequence over
    pub fn capture_failed(&mut self) {
        if self.countdown.is_none() {
            return;
        }
        warn!("Snapshot failed - restarting pose sequence");
        self.countdown = None;
        self.progress.reset();
    }

    /// Drop the photo (if any) and start the pose sequence over
    pub fn retake(&mut self) {
        if self.closed {
            return;
        }
        self.captured = None;
        self.countdown = None;
        self.progress.reset();
        self.fingers = 0;
        info!("Retake requested - back to pose 1");
    }

    /// Hand the photo over and close; does nothing without a photo
    pub fn submit(&mut self) -> Option<CapturedImage> {
        if self.closed {
            return None;
        }
        let image = self.captured.take()?;
        self.closed = true;
        info!("Photo submitted");
        Some(image)
    }

    pub fn cancel(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.countdown = None;
        info!("Capture session cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn ready_session() -> CaptureSession {
        let mut session = CaptureSession::new(3);
        session.estimator_ready();
        session
    }

    fn photo() -> CapturedImage {
        CapturedImage::encode(&RgbImage::new(8, 8), 80).unwrap()
    }

    fn run_countdown(session: &mut CaptureSession) -> Vec<CountdownStep> {
        let mut steps = Vec::new();
        loop {
            let step = session.countdown_tick();
            steps.push(step);
            if !matches!(step, CountdownStep::Remaining(_)) {
                break;
            }
        }
        steps
    }

    #[test]
    fn test_loading_ignores_samples() {
        let mut session = CaptureSession::new(3);
        assert_eq!(session.phase(), Phase::Loading);
        assert!(!session.accepts_samples());
        assert_eq!(session.record_finger_count(1), None);
        assert_eq!(session.stage(), 1);
    }

    #[test]
    fn test_full_sequence_starts_countdown() {
        let mut session = ready_session();
        let transitions: Vec<_> = [0, 1, 1, 2, 3]
            .into_iter()
            .map(|n| session.record_finger_count(n))
            .collect();

        assert_eq!(
            transitions,
            vec![
                None,
                Some(PoseTransition::Advanced { confirmed: 1 }),
                None,
                Some(PoseTransition::Advanced { confirmed: 2 }),
                Some(PoseTransition::Completed),
            ]
        );
        assert_eq!(session.phase(), Phase::Countdown(3));
        assert_eq!(session.pose_status(), [true, true, true]);
    }

    #[test]
    fn test_out_of_order_never_starts_countdown() {
        let mut session = ready_session();
        for n in [1, 3, 2] {
            session.record_finger_count(n);
        }
        assert_eq!(session.stage(), 3);
        assert_eq!(session.countdown(), None);
        assert_eq!(session.phase(), Phase::Sampling);
    }

    #[test]
    fn test_countdown_runs_to_zero_and_captures_once() {
        let mut session = ready_session();
        for n in [1, 2, 3] {
            session.record_finger_count(n);
        }

        // Repeated final pose during the countdown must not restart it
        assert_eq!(session.record_finger_count(3), None);
        assert_eq!(session.countdown(), Some(3));

        let steps = run_countdown(&mut session);
        assert_eq!(
            steps,
            vec![CountdownStep::Remaining(2), CountdownStep::Remaining(1), CountdownStep::Elapsed]
        );
        assert_eq!(session.countdown(), Some(0));

        session.complete_capture(photo());
        assert_eq!(session.phase(), Phase::Captured);
        assert_eq!(session.countdown(), None);
        assert_eq!(session.countdown_tick(), CountdownStep::Inactive);

        // A second snapshot is refused
        session.complete_capture(photo());
        assert!(session.captured().is_some());
    }

    #[test]
    fn test_no_sampling_after_capture() {
        let mut session = ready_session();
        for n in [1, 2, 3] {
            session.record_finger_count(n);
        }
        run_countdown(&mut session);
        session.complete_capture(photo());

        assert!(!session.accepts_samples());
        assert_eq!(session.record_finger_count(1), None);
        assert_eq!(session.stage(), 3);
    }

    #[test]
    fn test_retake_resets_from_any_state() {
        let mut session = ready_session();
        for n in [1, 2, 3] {
            session.record_finger_count(n);
        }
        run_countdown(&mut session);
        session.complete_capture(photo());

        session.retake();
        assert!(session.captured().is_none());
        assert_eq!(session.stage(), 1);
        assert_eq!(session.pose_status(), [false, false, false]);
        assert_eq!(session.phase(), Phase::Sampling);
        assert!(session.accepts_samples());

        // Mid-countdown retake
        for n in [1, 2, 3] {
            session.record_finger_count(n);
        }
        session.countdown_tick();
        session.retake();
        assert_eq!(session.countdown(), None);
        assert_eq!(session.stage(), 1);
    }

    #[test]
    fn test_submit_without_photo_is_noop() {
        let mut session = ready_session();
        session.record_finger_count(1);
        assert_eq!(session.stage(), 2);

        assert!(session.submit().is_none());
        assert_eq!(session.phase(), Phase::Sampling);
        assert_eq!(session.stage(), 2);
    }

    #[test]
    fn test_submit_hands_over_photo_and_closes() {
        let mut session = ready_session();
        for n in [1, 2, 3] {
            session.record_finger_count(n);
        }
        run_countdown(&mut session);
        let image = photo();
        session.complete_capture(image.clone());

        assert_eq!(session.submit(), Some(image));
        assert_eq!(session.phase(), Phase::Closed);
        assert!(session.submit().is_none());
    }

    #[test]
    fn test_capture_failure_restarts_sequence() {
        let mut session = ready_session();
        for n in [1, 2, 3] {
            session.record_finger_count(n);
        }
        run_countdown(&mut session);
        session.capture_failed();

        assert_eq!(session.phase(), Phase::Sampling);
        assert_eq!(session.stage(), 1);
        assert_eq!(session.record_finger_count(1), Some(PoseTransition::Advanced { confirmed: 1 }));
    }

    #[test]
    fn test_estimator_failure_and_cancel() {
        let mut session = CaptureSession::new(3);
        session.estimator_failed("model missing");
        assert_eq!(session.phase(), Phase::Failed("model missing".to_string()));
        assert!(!session.accepts_samples());

        // A late ready signal does not revive a failed session
        session.estimator_ready();
        assert!(matches!(session.phase(), Phase::Failed(_)));

        session.cancel();
        assert_eq!(session.phase(), Phase::Closed);
        session.retake();
        assert_eq!(session.phase(), Phase::Closed);
    }

    #[test]
    fn test_finger_count_is_clamped() {
        let mut session = ready_session();
        session.record_finger_count(9);
        assert_eq!(session.view().fingers, MAX_FINGERS);
    }
}
