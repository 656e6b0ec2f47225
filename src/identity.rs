//! Resolves per-frame detections into persistent identity tracks.
//!
//! Detections are fed frame by frame to a [`Tracking`] implementation. The
//! tracker reports smoothed boxes, so every accepted target is matched back to
//! the detection in its frame whose box is closest.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{Error, Warning};
use crate::frame::{Candidate, Frame};
use crate::track::{Target, Track, TrackAssignment};
use crate::detection::check_channel_lengths;
use crate::{Detection, Tracking};

#[derive(Debug, Default)]
pub struct Tracked {
    pub assignments: Vec<TrackAssignment>,
    pub tracks: Vec<Track>,
    pub warnings: Vec<Warning>,
}

/// Drops targets too small or too wide to be a single upright figure.
pub fn accept_target(target: &Target, config: &PipelineConfig) -> bool {
    let b = &target.bbox;

    b.area() > config.min_box_area
        && b.height() > 0.0
        && b.width() / b.height() <= config.aspect_ratio_threshold
}

/// Index of the detection whose [x,y,w,h] is nearest the target box.
/// Ties go to the first detection. A nearest detection farther than
/// `max_distance` is no match.
pub fn reconcile(
    target: &Target,
    detections: &[&Detection],
    max_distance: Option<f32>,
) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;

    for (idx, det) in detections.iter().enumerate() {
        let dist = det.bbox.distance(&target.bbox);
        if best.map_or(true, |(_, d)| dist < d) {
            best = Some((idx, dist));
        }
    }

    best.filter(|&(_, dist)| max_distance.map_or(!dist.is_nan(), |max| dist <= max))
        .map(|(idx, _)| idx)
}

fn check_order(detections: &[Detection]) -> Result<(), Error> {
    for pair in detections.windows(2) {
        if pair[1].frame < pair[0].frame {
            return Err(Error::data_integrity(format!(
                "detections out of frame order: frame {} follows frame {}",
                pair[1].frame, pair[0].frame
            )));
        }
    }

    Ok(())
}

fn frame_of(number: u32, dims: (u32, u32), dets: &[&Detection]) -> Frame {
    Frame {
        number,
        dims,
        candidates: dets
            .iter()
            .map(|d| Candidate {
                bbox: d.bbox.as_ltrb(),
                score: d.score,
            })
            .collect(),
    }
}

/// Runs `tracker` over `detections` (sorted by frame) and builds compact,
/// 1-based identity tracks.
pub fn track_detections<T: Tracking + ?Sized>(
    detections: &[Detection],
    dims: (u32, u32),
    tracker: &mut T,
    config: &PipelineConfig,
) -> Result<Tracked, Error> {
    check_order(detections)?;
    check_channel_lengths(detections)?;

    let mut out = Tracked::default();
    let mut raw: Vec<(usize, u32)> = Vec::new();
    let mut start = 0;

    // frames without detections are never handed to the tracker
    while start < detections.len() {
        let number = detections[start].frame;
        let end = start
            + detections[start..]
                .iter()
                .take_while(|d| d.frame == number)
                .count();

        let members: Vec<&Detection> = detections[start..end].iter().collect();
        let targets = tracker.update(&frame_of(number, dims, &members))?;

        for target in targets.iter().filter(|t| accept_target(t, config)) {
            match reconcile(target, &members, config.max_match_distance) {
                Some(idx) => raw.push((start + idx, target.track_id)),
                None => {
                    let w = Warning::MatchingAmbiguity {
                        frame: number,
                        raw_track_id: target.track_id,
                    };
                    warn!(frame = number, "{}", w);
                    out.warnings.push(w);
                }
            }
        }

        start = end;
    }

    let min_id = match raw.iter().map(|&(_, id)| id).min() {
        Some(id) => id,
        None => {
            warn!("{}", Warning::NoTargetsAccepted);
            out.warnings.push(Warning::NoTargetsAccepted);
            return Ok(out);
        }
    };

    let mut by_track: BTreeMap<u32, Vec<Detection>> = BTreeMap::new();
    for &(idx, raw_id) in &raw {
        let det = &detections[idx];
        let track_id = raw_id - min_id + 1;

        out.assignments.push(TrackAssignment {
            frame: det.frame,
            pose_idx: det.pose_idx,
            track_id,
        });
        by_track.entry(track_id).or_default().push(det.clone());
    }

    for (track_id, mut dets) in by_track {
        dets.sort_by_key(|d| d.frame);
        dets.dedup_by_key(|d| d.frame);

        if dets.len() == 1 {
            let w = Warning::DegenerateTrack { track_id };
            warn!(track_id, "{}", w);
            out.warnings.push(w);
        }

        out.tracks.push(Track {
            track_id,
            detections: dets,
        });
    }

    info!(
        matched = out.assignments.len(),
        tracks = out.tracks.len(),
        "tracked poses across all frames"
    );

    Ok(out)
}
