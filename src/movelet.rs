//! Turns consecutive ticks of a track into movelets: the tick's averaged pose
//! plus its displacement from the previous tick and a speed scalar.

use serde_derive::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Warning;
use crate::pose::Pose;
use crate::tick::Tick;

/// Persisted movelet row. Vectors are sentinel-encoded; `movement` is NaN when
/// consecutive ticks share no coordinate.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Movelet {
    pub track_id: u32,
    pub tick: u32,
    pub start_frame: u32,
    pub end_frame: u32,
    pub start_timecode: f64,
    pub end_timecode: f64,
    pub pose_idx: u32,
    pub prev_averaged_pose: Vec<f32>,
    pub averaged_pose: Vec<f32>,
    pub motion_vector: Vec<f32>,
    /// `averaged_pose` followed by `motion_vector`
    pub movelet_vector: Vec<f32>,
    pub movement: f32,
    #[serde(default)]
    pub movement_3d: Option<f32>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// Speed between two poses over `elapsed` seconds, NaN with nothing shared.
pub fn movement(prev: &Pose, cur: &Pose, elapsed: f64) -> f32 {
    match prev.distance(cur) {
        Some(dist) => (dist as f64 / elapsed) as f32,
        None => f32::NAN,
    }
}

/// Builds the movelet of `cur`. Without a predecessor, or with no time
/// elapsed since it, the motion is all-missing and the movement is 0.
pub fn vectorize(prev: Option<&Tick>, cur: &Tick, warnings: &mut Vec<Warning>) -> Movelet {
    let elapsed = prev.map(|p| cur.start_timecode - p.start_timecode);
    let moving = match (prev, elapsed) {
        (Some(p), Some(e)) if e > 0.0 => Some((p, e)),
        (Some(_), Some(_)) => {
            let w = Warning::ZeroDurationTick {
                track_id: cur.track_id,
                tick: cur.tick,
            };
            warn!(track_id = cur.track_id, tick = cur.tick, "{}", w);
            warnings.push(w);
            None
        }
        _ => None,
    };

    let len = cur.averaged_pose.len();
    let stride = cur.averaged_pose.stride();

    let (motion_vector, movement_2d) = match moving {
        Some((p, e)) => {
            let m = movement(&p.averaged_pose, &cur.averaged_pose, e);
            if m.is_nan() {
                let w = Warning::NoSharedKeypoints {
                    track_id: cur.track_id,
                    tick: cur.tick,
                };
                warn!(track_id = cur.track_id, tick = cur.tick, "{}", w);
                warnings.push(w);
            }
            (p.averaged_pose.displacement(&cur.averaged_pose), m)
        }
        None => (Pose::missing(len, stride), 0.0),
    };

    let movement_3d = cur.averaged_global_pose.as_ref().map(|g| match moving {
        Some((p, e)) => p
            .averaged_global_pose
            .as_ref()
            .map(|pg| movement(pg, g, e))
            .unwrap_or(f32::NAN),
        None => 0.0,
    });

    let prev_averaged_pose = prev
        .map(|p| p.averaged_pose.to_sentinel())
        .unwrap_or_else(|| Pose::missing(len, stride).to_sentinel());

    let averaged_pose = cur.averaged_pose.to_sentinel();
    let motion_vector = motion_vector.to_sentinel();
    let movelet_vector = averaged_pose
        .iter()
        .chain(motion_vector.iter())
        .copied()
        .collect();

    Movelet {
        track_id: cur.track_id,
        tick: cur.tick,
        start_frame: cur.start_frame,
        end_frame: cur.end_frame,
        start_timecode: cur.start_timecode,
        end_timecode: cur.end_timecode,
        pose_idx: cur.pose_idx,
        prev_averaged_pose,
        averaged_pose,
        motion_vector,
        movelet_vector,
        movement: movement_2d,
        movement_3d,
        embedding: cur.averaged_embedding.as_ref().map(Pose::to_sentinel),
    }
}

/// Movelets of one track's ticks, which must be in tick order.
pub fn movelets_for_track(ticks: &[Tick], warnings: &mut Vec<Warning>) -> Vec<Movelet> {
    ticks
        .iter()
        .enumerate()
        .map(|(i, cur)| vectorize(i.checked_sub(1).map(|p| &ticks[p]), cur, warnings))
        .collect()
}
