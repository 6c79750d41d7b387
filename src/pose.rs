//! Three-step hand pose sequence: one finger, then two, then three.

/// Number of poses in the sequence
pub const POSE_COUNT: usize = 3;

/// Per-stage completion flags, for display only
pub type PoseStatus = [bool; POSE_COUNT];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoseProgress {
    #[default]
    AwaitingOne,
    AwaitingTwo,
    AwaitingThree,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseTransition {
    /// A stage was confirmed and the next one is now expected
    Advanced { confirmed: u8 },
    /// The final stage was confirmed
    Completed,
}

impl PoseProgress {
    /// Finger count that confirms the current stage
    pub fn expected_fingers(self) -> Option<u8> {
        match self {
            PoseProgress::AwaitingOne => Some(1),
            PoseProgress::AwaitingTwo => Some(2),
            PoseProgress::AwaitingThree => Some(3),
            PoseProgress::Complete => None,
        }
    }

    /// Pose stage in 1..=3; the final stage stays at 3 once complete
    pub fn stage(self) -> u8 {
        match self {
            PoseProgress::AwaitingOne => 1,
            PoseProgress::AwaitingTwo => 2,
            PoseProgress::AwaitingThree | PoseProgress::Complete => 3,
        }
    }

    pub fn is_complete(self) -> bool {
        self == PoseProgress::Complete
    }

    pub fn status(self) -> PoseStatus {
        match self {
            PoseProgress::AwaitingOne => [false, false, false],
            PoseProgress::AwaitingTwo => [true, false, false],
            PoseProgress::AwaitingThree => [true, true, false],
            PoseProgress::Complete => [true, true, true],
        }
    }

    /// Feed one finger count. Only the exact expected count moves forward;
    /// anything else leaves progress untouched.
    pub fn evaluate(&mut self, fingers: u8) -> Option<PoseTransition> {
        if self.expected_fingers() != Some(fingers) {
            return None;
        }

        let (next, transition) = match self {
            PoseProgress::AwaitingOne => {
                (PoseProgress::AwaitingTwo, PoseTransition::Advanced { confirmed: 1 })
            }
            PoseProgress::AwaitingTwo => {
                (PoseProgress::AwaitingThree, PoseTransition::Advanced { confirmed: 2 })
            }
            PoseProgress::AwaitingThree => (PoseProgress::Complete, PoseTransition::Completed),
            PoseProgress::Complete => return None,
        };

        *self = next;
        Some(transition)
    }

    pub fn reset(&mut self) {
        *self = PoseProgress::AwaitingOne;
    }
}
