//! Quantizes a track's timeline into fixed-length ticks and averages the
//! poses that fall into each one.

use crate::error::Error;
use crate::pose::Pose;
use crate::track::Track;
use crate::Detection;

/// Detections of one track that share a tick slot.
#[derive(Debug, Clone)]
pub struct TickBucket<'a> {
    pub tick: u32,
    pub members: Vec<&'a Detection>,
}

/// One tick of a track with its averaged poses.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub track_id: u32,
    pub tick: u32,
    pub start_frame: u32,
    pub end_frame: u32,
    pub start_timecode: f64,
    pub end_timecode: f64,
    /// frame and pose index of the first member detection
    pub first_frame: u32,
    pub pose_idx: u32,
    pub averaged_pose: Pose,
    pub averaged_global_pose: Option<Pose>,
    pub averaged_embedding: Option<Pose>,
}

#[inline]
pub fn tick_index(timecode: f64, first_timecode: f64, interval: f64) -> u32 {
    ((timecode - first_timecode) / interval).floor().max(0.0) as u32
}

/// Groups the detections of a track by tick. Buckets come out in increasing
/// tick order; slots without detections are not synthesized.
pub fn bucket_track(track: &Track, fps: f64, interval: f64) -> Vec<TickBucket<'_>> {
    let mut buckets: Vec<TickBucket<'_>> = Vec::new();
    let first = match track.detections.first() {
        Some(det) => det.timecode(fps),
        None => return buckets,
    };

    for det in &track.detections {
        let tick = tick_index(det.timecode(fps), first, interval);
        match buckets.last_mut() {
            Some(bucket) if bucket.tick == tick => bucket.members.push(det),
            _ => buckets.push(TickBucket {
                tick,
                members: vec![det],
            }),
        }
    }

    buckets
}

fn mean_optional<'a, F>(members: &[&'a Detection], field: F) -> Result<Option<Pose>, Error>
where
    F: Fn(&'a Detection) -> Option<&'a Pose>,
{
    let present: Vec<&Pose> = members.iter().filter_map(|d| field(*d)).collect();
    if present.is_empty() {
        Ok(None)
    } else {
        Pose::mean(present).map(Some)
    }
}

/// Folds one bucket into a [`Tick`].
pub fn aggregate(track_id: u32, bucket: &TickBucket<'_>, fps: f64) -> Result<Tick, Error> {
    let first = bucket
        .members
        .first()
        .ok_or_else(|| Error::data_integrity(format!("track {} has an empty tick", track_id)))?;

    let frames = bucket.members.iter().map(|d| d.frame);
    let start_frame = frames.clone().min().unwrap_or(first.frame);
    let end_frame = frames.max().unwrap_or(first.frame);

    Ok(Tick {
        track_id,
        tick: bucket.tick,
        start_frame,
        end_frame,
        start_timecode: start_frame as f64 / fps,
        end_timecode: end_frame as f64 / fps,
        first_frame: first.frame,
        pose_idx: first.pose_idx,
        averaged_pose: Pose::mean(bucket.members.iter().map(|d| &d.pose))?,
        averaged_global_pose: mean_optional(&bucket.members, |d| d.global_pose.as_ref())?,
        averaged_embedding: mean_optional(&bucket.members, |d| d.embedding.as_ref())?,
    })
}

/// All ticks of a track, in tick order.
pub fn ticks_for_track(track: &Track, fps: f64, interval: f64) -> Result<Vec<Tick>, Error> {
    bucket_track(track, fps, interval)
        .iter()
        .map(|bucket| aggregate(track.track_id, bucket, fps))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;
    use crate::config::TICK_INTERVAL;

    fn det(frame: u32, coords: &[f32]) -> Detection {
        Detection::new(
            frame,
            frame * 10,
            BBox::ltwh(0.0, 0.0, 10.0, 20.0),
            0.9,
            Pose::from_sentinel(coords, 2),
        )
    }

    fn track(frames: &[u32]) -> Track {
        Track {
            track_id: 3,
            detections: frames.iter().map(|&f| det(f, &[1.0, 2.0])).collect(),
        }
    }

    #[test]
    fn four_frames_at_30fps_share_tick_zero() {
        let t = track(&[1, 2, 3, 4]);
        let ticks = ticks_for_track(&t, 30.0, TICK_INTERVAL).unwrap();

        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].tick, 0);
        assert_eq!(ticks[0].start_frame, 1);
        assert_eq!(ticks[0].end_frame, 4);
        assert!((ticks[0].end_timecode - 4.0 / 30.0).abs() < 1e-12);
        assert_eq!(ticks[0].pose_idx, 10);
    }

    #[test]
    fn tick_indices_start_at_zero_and_increase() {
        let t = track(&[5, 6, 7, 8, 9, 10, 11, 12, 20, 40, 41]);
        let buckets = bucket_track(&t, 30.0, TICK_INTERVAL);
        let ticks: Vec<u32> = buckets.iter().map(|b| b.tick).collect();

        // frame 10 sits a hair under one full interval after frame 5
        assert_eq!(ticks, vec![0, 1, 2, 6, 7]);
        assert!(ticks.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(buckets[0].members.len(), 6);
    }

    #[test]
    fn sentinel_keypoint_does_not_drag_the_mean() {
        let t = Track {
            track_id: 1,
            detections: vec![det(1, &[5.0, 5.0, 1.0, 1.0]), det(2, &[-1.0, -1.0, 3.0, 3.0])],
        };
        let ticks = ticks_for_track(&t, 30.0, TICK_INTERVAL).unwrap();

        assert_eq!(ticks[0].averaged_pose.keypoint(0), Some(vec![5.0, 5.0]));
        assert_eq!(ticks[0].averaged_pose.keypoint(1), Some(vec![2.0, 2.0]));
    }

    #[test]
    fn single_member_tick_keeps_pose() {
        let d = det(9, &[12.0, 34.0, -1.0, -1.0]);
        let t = Track {
            track_id: 1,
            detections: vec![d.clone()],
        };
        let ticks = ticks_for_track(&t, 25.0, TICK_INTERVAL).unwrap();

        assert_eq!(ticks[0].averaged_pose, d.pose);
        assert_eq!(ticks[0].start_frame, ticks[0].end_frame);
        assert_eq!(ticks[0].averaged_global_pose, None);
    }

    #[test]
    fn optional_channels_average_where_present() {
        let mut a = det(1, &[1.0, 1.0]);
        a.global_pose = Some(Pose::from_sentinel(&[1.0, 2.0, 3.0], 3));
        let mut b = det(2, &[1.0, 1.0]);
        b.global_pose = Some(Pose::from_sentinel(&[3.0, 4.0, 5.0], 3));
        let c = det(3, &[1.0, 1.0]);

        let t = Track {
            track_id: 1,
            detections: vec![a, b, c],
        };
        let ticks = ticks_for_track(&t, 30.0, TICK_INTERVAL).unwrap();

        assert_eq!(
            ticks[0].averaged_global_pose.as_ref().unwrap().coords(),
            &[Some(2.0), Some(3.0), Some(4.0)]
        );
    }

    #[test]
    fn empty_track_has_no_ticks() {
        let t = Track {
            track_id: 1,
            detections: Vec::new(),
        };
        assert!(ticks_for_track(&t, 30.0, TICK_INTERVAL).unwrap().is_empty());
    }
}
