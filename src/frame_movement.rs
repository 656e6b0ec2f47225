//! Folds every movelet of a video into one cumulative movement value per frame.

use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};

use crate::movelet::Movelet;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FrameMovement {
    /// largest per-frame value, for min-max normalization downstream
    pub max_movement: f32,
    /// frame number (1-based) to summed movement
    pub frames: BTreeMap<u32, f32>,
}

impl FrameMovement {
    #[inline]
    pub fn get(&self, frame: u32) -> Option<f32> {
        self.frames.get(&frame).copied()
    }
}

/// Portion of a movelet's movement attributed to each frame it covers.
/// A single-frame tick contributes its whole movement; NaN counts as 0.
#[inline]
pub fn per_frame_share(movement: f32, start_frame: u32, end_frame: u32) -> f32 {
    if movement.is_nan() {
        return 0.0;
    }

    match end_frame.saturating_sub(start_frame) {
        0 => movement,
        span => movement / span as f32,
    }
}

/// Sums `value(m)` shares over frames `1..=frame_count`. Movelets for which
/// `value` yields `None` are skipped.
pub fn aggregate_by<F>(movelets: &[Movelet], frame_count: u32, value: F) -> FrameMovement
where
    F: Fn(&Movelet) -> Option<f32>,
{
    let mut totals = vec![0.0f32; frame_count as usize + 1];

    for m in movelets {
        let share = match value(m) {
            Some(v) => per_frame_share(v, m.start_frame, m.end_frame),
            None => continue,
        };

        let first = m.start_frame.max(1);
        let last = m.end_frame.min(frame_count);
        for frame in first..=last {
            totals[frame as usize] += share;
        }
    }

    let mut out = FrameMovement::default();
    for frame in 1..=frame_count {
        let v = totals[frame as usize];
        out.max_movement = out.max_movement.max(v);
        out.frames.insert(frame, v);
    }

    out
}

/// Cumulative planar movement per frame.
pub fn aggregate(movelets: &[Movelet], frame_count: u32) -> FrameMovement {
    aggregate_by(movelets, frame_count, |m| Some(m.movement))
}

/// Cumulative global-pose movement per frame, if any movelet carries one.
pub fn aggregate_3d(movelets: &[Movelet], frame_count: u32) -> Option<FrameMovement> {
    if movelets.iter().all(|m| m.movement_3d.is_none()) {
        return None;
    }

    Some(aggregate_by(movelets, frame_count, |m| m.movement_3d))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movelet(start_frame: u32, end_frame: u32, movement: f32) -> Movelet {
        Movelet {
            track_id: 1,
            tick: 0,
            start_frame,
            end_frame,
            start_timecode: 0.0,
            end_timecode: 0.0,
            pose_idx: 0,
            prev_averaged_pose: Vec::new(),
            averaged_pose: Vec::new(),
            motion_vector: Vec::new(),
            movelet_vector: Vec::new(),
            movement,
            movement_3d: None,
            embedding: None,
        }
    }

    #[test]
    fn single_frame_tick_contributes_whole_movement() {
        assert_eq!(per_frame_share(3.0, 50, 50), 3.0);
        assert_eq!(per_frame_share(6.0, 48, 51), 2.0);
        assert_eq!(per_frame_share(f32::NAN, 1, 4), 0.0);
    }

    #[test]
    fn overlapping_ticks_sum_per_frame() {
        let ms = vec![movelet(48, 51, 6.0), movelet(50, 50, 3.0)];
        let fm = aggregate(&ms, 60);

        assert_eq!(fm.get(50), Some(5.0));
        assert_eq!(fm.get(49), Some(2.0));
        assert_eq!(fm.get(52), Some(0.0));
        assert_eq!(fm.max_movement, 5.0);
        assert_eq!(fm.frames.len(), 60);
        assert_eq!(fm.get(0), None);
    }

    #[test]
    fn nan_and_out_of_range_movelets() {
        let ms = vec![movelet(1, 3, f32::NAN), movelet(9, 12, 9.0)];
        let fm = aggregate(&ms, 10);

        assert_eq!(fm.get(2), Some(0.0));
        assert_eq!(fm.get(10), Some(3.0));
        assert_eq!(fm.get(11), None);
        assert_eq!(fm.max_movement, 3.0);
    }

    #[test]
    fn spatial_series_only_when_present() {
        let mut ms = vec![movelet(1, 2, 1.0)];
        assert!(aggregate_3d(&ms, 5).is_none());

        ms[0].movement_3d = Some(4.0);
        let fm = aggregate_3d(&ms, 5).unwrap();
        assert_eq!(fm.get(1), Some(4.0));
        assert_eq!(fm.get(2), Some(4.0));
    }

    #[test]
    fn empty_video() {
        let fm = aggregate(&[], 3);
        assert_eq!(fm.max_movement, 0.0);
        assert_eq!(fm.frames.values().copied().collect::<Vec<_>>(), vec![0.0; 3]);
    }
}
