//! Hand landmark model and the extended-finger heuristic.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use serde::{Deserialize, Serialize};

// ============================================================================
// HAND LANDMARK INDICES
// ============================================================================

pub const WRIST: usize = 0;
pub const THUMB_CMC: usize = 1;
pub const THUMB_MCP: usize = 2;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_PIP: usize = 6;
pub const INDEX_DIP: usize = 7;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_DIP: usize = 11;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_PIP: usize = 14;
pub const RING_DIP: usize = 15;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_PIP: usize = 18;
pub const PINKY_DIP: usize = 19;
pub const PINKY_TIP: usize = 20;

pub const LANDMARK_COUNT: usize = 21;

/// Non-thumb fingertips, in index..pinky order
pub const FINGERTIPS: [usize; 4] = [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];

/// Maximum value `count_extended_fingers` can return
pub const MAX_FINGERS: u8 = FINGERTIPS.len() as u8;

/// Hand skeleton connections for the preview overlay
pub const HAND_SKELETON: [(usize, usize); 21] = [
    (WRIST, THUMB_CMC), (THUMB_CMC, THUMB_MCP), (THUMB_MCP, THUMB_IP), (THUMB_IP, THUMB_TIP),
    (WRIST, INDEX_MCP), (INDEX_MCP, INDEX_PIP), (INDEX_PIP, INDEX_DIP), (INDEX_DIP, INDEX_TIP),
    (WRIST, MIDDLE_MCP), (MIDDLE_MCP, MIDDLE_PIP), (MIDDLE_PIP, MIDDLE_DIP), (MIDDLE_DIP, MIDDLE_TIP),
    (WRIST, RING_MCP), (RING_MCP, RING_PIP), (RING_PIP, RING_DIP), (RING_DIP, RING_TIP),
    (WRIST, PINKY_MCP), (PINKY_MCP, PINKY_PIP), (PINKY_PIP, PINKY_DIP), (PINKY_DIP, PINKY_TIP),
    (INDEX_MCP, MIDDLE_MCP),
];

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// A single estimated keypoint, image coordinates with a top-left origin
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// One detected hand, landmarks ordered by the indices above
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hand {
    pub landmarks: Vec<Landmark>,
}

impl Hand {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    /// Build a plausible open-palm hand in the unit square with the first
    /// `extended` non-thumb fingers raised and the rest curled.
    pub fn with_extended_fingers(extended: u8) -> Self {
        let mut landmarks = vec![Landmark::default(); LANDMARK_COUNT];
        landmarks[WRIST] = Landmark::new(0.5, 0.9);

        let thumb = [(0.38, 0.82), (0.32, 0.75), (0.28, 0.68), (0.25, 0.62)];
        for (offset, (x, y)) in thumb.into_iter().enumerate() {
            landmarks[THUMB_CMC + offset] = Landmark::new(x, y);
        }

        for (finger, &tip) in FINGERTIPS.iter().enumerate() {
            let x = 0.4 + 0.07 * finger as f32;
            let raised = (finger as u8) < extended;
            let (dip_y, tip_y) = if raised { (0.42, 0.35) } else { (0.55, 0.6) };
            landmarks[tip - 3] = Landmark::new(x, 0.65);
            landmarks[tip - 2] = Landmark::new(x, 0.5);
            landmarks[tip - 1] = Landmark::new(x, dip_y);
            landmarks[tip] = Landmark::new(x, tip_y);
        }

        Self { landmarks }
    }

    /// Scale every landmark, e.g. from unit coordinates to frame pixels
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            landmarks: self
                .landmarks
                .iter()
                .map(|p| Landmark { x: p.x * sx, y: p.y * sy, z: p.z })
                .collect(),
        }
    }
}

// ============================================================================
// FINGER COUNTING
// ============================================================================

/// Count extended non-thumb fingers.
///
/// A finger counts as extended when its tip sits above (smaller `y` than) the
/// joint two positions earlier in the same finger chain. The thumb is never
/// counted and only vertical displacement is considered.
pub fn count_extended_fingers(hand: &Hand) -> u8 {
    FINGERTIPS
        .iter()
        .filter(|&&tip| {
            match (hand.landmarks.get(tip), hand.landmarks.get(tip - 2)) {
                (Some(tip_point), Some(reference)) => tip_point.y < reference.y,
                _ => false,
            }
        })
        .count() as u8
}

// ============================================================================
// PREVIEW OVERLAY
// ============================================================================

/// Draw the hand skeleton onto a preview frame (landmarks in pixel coordinates)
pub fn draw_hand_overlay(frame: &mut RgbImage, hand: &Hand) {
    let bone = Rgb([0u8, 200, 120]);
    let joint = Rgb([255u8, 255, 255]);
    let tip = Rgb([1u8, 149, 159]);

    for &(from, to) in HAND_SKELETON.iter() {
        if let (Some(a), Some(b)) = (hand.landmarks.get(from), hand.landmarks.get(to)) {
            draw_line_segment_mut(frame, (a.x, a.y), (b.x, b.y), bone);
        }
    }

    for (index, point) in hand.landmarks.iter().enumerate() {
        let (color, radius) = if FINGERTIPS.contains(&index) { (tip, 5) } else { (joint, 3) };
        draw_filled_circle_mut(frame, (point.x.round() as i32, point.y.round() as i32), radius, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_hands_count_as_requested() {
        for extended in 0..=MAX_FINGERS {
            let hand = Hand::with_extended_fingers(extended);
            assert_eq!(hand.landmarks.len(), LANDMARK_COUNT);
            assert_eq!(count_extended_fingers(&hand), extended);
        }
    }

    #[test]
    fn test_thumb_is_ignored() {
        let mut hand = Hand::with_extended_fingers(0);
        // Thumb tip far above everything else
        hand.landmarks[THUMB_TIP] = Landmark::new(0.2, 0.0);
        assert_eq!(count_extended_fingers(&hand), 0);
    }

    #[test]
    fn test_equal_height_is_not_extended() {
        let mut hand = Hand::with_extended_fingers(0);
        hand.landmarks[INDEX_TIP].y = hand.landmarks[INDEX_PIP].y;
        assert_eq!(count_extended_fingers(&hand), 0);
    }

    #[test]
    fn test_only_vertical_displacement_matters() {
        let mut hand = Hand::with_extended_fingers(1);
        // Sideways index finger that still sits slightly higher than its PIP
        hand.landmarks[INDEX_TIP] = Landmark::new(0.95, 0.49);
        assert_eq!(count_extended_fingers(&hand), 1);
    }

    #[test]
    fn test_short_landmark_list_counts_nothing_missing() {
        let hand = Hand::new(Hand::with_extended_fingers(4).landmarks[..13].to_vec());
        // Only index (8) and middle (12) tips are present
        assert_eq!(count_extended_fingers(&hand), 2);
        assert_eq!(count_extended_fingers(&Hand::default()), 0);
    }

    #[test]
    fn test_scaling_preserves_count() {
        let hand = Hand::with_extended_fingers(3).scaled(640.0, 480.0);
        assert_eq!(count_extended_fingers(&hand), 3);
        assert!((hand.landmarks[WRIST].x - 320.0).abs() < 1e-3);
    }

    #[test]
    fn test_overlay_draws_on_frame() {
        let mut frame = RgbImage::new(64, 64);
        let hand = Hand::with_extended_fingers(2).scaled(64.0, 64.0);
        draw_hand_overlay(&mut frame, &hand);
        assert!(frame.pixels().any(|p| p.0 != [0, 0, 0]));
    }
}
