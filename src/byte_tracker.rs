//! ByteTrack-style multi-object tracker.
//!
//! Boxes are followed with a Kalman filter and associated by IoU through the
//! Hungarian solver in two passes: confident detections first, then the
//! low-score leftovers against tracks that are still unmatched.

use crate::bbox::{BBox, Ltrb};
use crate::config::ByteTrackerConfig;
use crate::error::Error;
use crate::frame::{Candidate, Frame};
use crate::kalman::KalmanBox;
use crate::track::Target;
use crate::Tracking;

use munkres::{solve_assignment, WeightMatrix};
use ndarray::Array2;
use tracing::debug;

const PADDING_COST: f32 = 100000.0;
const LOW_SCORE_MATCH_THRESH: f32 = 0.5;
const UNCONFIRMED_MATCH_THRESH: f32 = 0.7;
const DUPLICATE_IOU: f32 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackState {
    Tracked,
    Lost,
    Removed,
}

#[derive(Debug, Clone)]
struct Participant {
    id: u32,
    kalman: KalmanBox,
    state: TrackState,
    activated: bool,
    score: f32,
    last_frame: u32,
}

impl Participant {
    fn new(id: u32, cand: &Candidate, frame_id: u32) -> Self {
        Self {
            id,
            kalman: KalmanBox::new(&cand.bbox.as_xyah()),
            state: TrackState::Tracked,
            activated: frame_id == 1,
            score: cand.score,
            last_frame: frame_id,
        }
    }

    fn update(&mut self, cand: &Candidate, frame_id: u32) {
        self.kalman.update(&cand.bbox.as_xyah());
        self.state = TrackState::Tracked;
        self.activated = true;
        self.score = cand.score;
        self.last_frame = frame_id;
    }

    #[inline]
    fn ltrb(&self) -> BBox<Ltrb> {
        self.kalman.bbox().as_ltrb()
    }
}

#[derive(Debug, Default)]
struct Matching {
    matches: Vec<(usize, usize)>,
    tracks: Vec<usize>,
    dets: Vec<usize>,
}

/// Optimal assignment on IoU distance; pairs costlier than `thresh` stay unmatched.
fn associate(tracks: &[BBox<Ltrb>], dets: &[BBox<Ltrb>], thresh: f32) -> Result<Matching, Error> {
    if tracks.is_empty() || dets.is_empty() {
        return Ok(Matching {
            matches: Vec::new(),
            tracks: (0..tracks.len()).collect(),
            dets: (0..dets.len()).collect(),
        });
    }

    let n = tracks.len().max(dets.len());
    let mut cost = Array2::from_elem((n, n), PADDING_COST);
    for (r, t) in tracks.iter().enumerate() {
        for (c, d) in dets.iter().enumerate() {
            cost[(r, c)] = 1.0 - t.iou(d);
        }
    }

    let mut weights = WeightMatrix::from_row_vec(n, cost.clone().into_raw_vec());
    let solution = solve_assignment(&mut weights)?;

    let mut matching = Matching::default();
    let mut track_used = vec![false; tracks.len()];
    let mut det_used = vec![false; dets.len()];

    for pos in solution {
        if pos.row < tracks.len() && pos.column < dets.len() && cost[(pos.row, pos.column)] <= thresh {
            matching.matches.push((pos.row, pos.column));
            track_used[pos.row] = true;
            det_used[pos.column] = true;
        }
    }

    matching.tracks = (0..tracks.len()).filter(|&i| !track_used[i]).collect();
    matching.dets = (0..dets.len()).filter(|&i| !det_used[i]).collect();

    Ok(matching)
}

fn in_frame(bbox: &BBox<Ltrb>, dims: (u32, u32)) -> bool {
    let (w, h) = (dims.0 as f32, dims.1 as f32);

    bbox.right() > bbox.left()
        && bbox.bottom() > bbox.top()
        && (dims.0 == 0 || (bbox.right() > 0.0 && bbox.left() < w))
        && (dims.1 == 0 || (bbox.bottom() > 0.0 && bbox.top() < h))
}

pub struct ByteTracker {
    config: ByteTrackerConfig,
    max_time_lost: u32,
    frame_id: u32,
    next_id: u32,
    tracked: Vec<Participant>,
    lost: Vec<Participant>,
}

impl ByteTracker {
    pub fn new(config: ByteTrackerConfig, fps: f64) -> Self {
        Self {
            max_time_lost: config.max_time_lost(fps),
            config,
            frame_id: 0,
            next_id: 1,
            tracked: Vec::with_capacity(32),
            lost: Vec::with_capacity(32),
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn reset(&mut self) {
        self.frame_id = 0;
        self.next_id = 1;
        self.tracked.clear();
        self.lost.clear();
    }
}

impl Tracking for ByteTracker {
    fn update(&mut self, frame: &Frame) -> Result<Vec<Target>, Error> {
        self.frame_id += 1;
        let frame_id = self.frame_id;
        let cfg = self.config.clone();

        let mut high = Vec::new();
        let mut low = Vec::new();
        for cand in frame.iter().filter(|c| in_frame(&c.bbox, frame.dims)) {
            if cand.score >= cfg.track_thresh {
                high.push(*cand);
            } else if cand.score > cfg.low_thresh {
                low.push(*cand);
            }
        }

        let (mut unconfirmed, tracked): (Vec<_>, Vec<_>) =
            self.tracked.drain(..).partition(|p| !p.activated);
        let mut pool: Vec<Participant> = tracked.into_iter().chain(self.lost.drain(..)).collect();
        pool.iter_mut().for_each(|p| p.kalman.predict());

        // confident detections against every live track
        let pool_boxes: Vec<_> = pool.iter().map(Participant::ltrb).collect();
        let high_boxes: Vec<_> = high.iter().map(|c| c.bbox).collect();
        let first = associate(&pool_boxes, &high_boxes, cfg.match_thresh)?;
        for &(t, d) in &first.matches {
            pool[t].update(&high[d], frame_id);
        }

        // low-score detections against the tracks still unmatched
        let remain: Vec<usize> = first
            .tracks
            .iter()
            .copied()
            .filter(|&t| pool[t].state == TrackState::Tracked)
            .collect();
        let remain_boxes: Vec<_> = remain.iter().map(|&t| pool[t].ltrb()).collect();
        let low_boxes: Vec<_> = low.iter().map(|c| c.bbox).collect();
        let second = associate(&remain_boxes, &low_boxes, LOW_SCORE_MATCH_THRESH)?;
        for &(i, d) in &second.matches {
            pool[remain[i]].update(&low[d], frame_id);
        }
        for &i in &second.tracks {
            pool[remain[i]].state = TrackState::Lost;
        }

        // tracks seen once before get one chance to confirm
        let left: Vec<Candidate> = first.dets.iter().map(|&d| high[d]).collect();
        let left_boxes: Vec<_> = left.iter().map(|c| c.bbox).collect();
        let unconfirmed_boxes: Vec<_> = unconfirmed.iter().map(Participant::ltrb).collect();
        let third = associate(&unconfirmed_boxes, &left_boxes, UNCONFIRMED_MATCH_THRESH)?;
        for &(u, d) in &third.matches {
            unconfirmed[u].update(&left[d], frame_id);
        }
        for &u in &third.tracks {
            unconfirmed[u].state = TrackState::Removed;
        }

        let mut started = Vec::new();
        for &d in &third.dets {
            if left[d].score >= cfg.high_thresh {
                let id = self.next_id();
                started.push(Participant::new(id, &left[d], frame_id));
            }
        }

        for p in pool.iter_mut() {
            if p.state == TrackState::Lost && frame_id - p.last_frame > self.max_time_lost {
                p.state = TrackState::Removed;
            }
        }

        for p in pool.into_iter().chain(unconfirmed).chain(started) {
            match p.state {
                TrackState::Tracked => self.tracked.push(p),
                TrackState::Lost => self.lost.push(p),
                TrackState::Removed => {}
            }
        }

        let tracked = &self.tracked;
        self.lost.retain(|l| {
            let lb = l.ltrb();
            !tracked.iter().any(|t| t.ltrb().iou(&lb) > DUPLICATE_IOU)
        });

        debug!(
            frame = frame.number,
            tracked = self.tracked.len(),
            lost = self.lost.len(),
            "tracker updated"
        );

        Ok(self
            .tracked
            .iter()
            .filter(|p| p.activated)
            .map(|p| Target {
                bbox: p.kalman.bbox().as_ltwh(),
                track_id: p.id,
                score: p.score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(number: u32, boxes: &[([f32; 4], f32)]) -> Frame {
        Frame {
            number,
            dims: (640, 480),
            candidates: boxes
                .iter()
                .map(|(b, score)| Candidate {
                    bbox: BBox::ltwh(b[0], b[1], b[2], b[3]).as_ltrb(),
                    score: *score,
                })
                .collect(),
        }
    }

    #[test]
    fn associate_pairs_overlapping_boxes() {
        let tracks = [BBox::ltrb(0.0, 0.0, 10.0, 10.0), BBox::ltrb(100.0, 100.0, 110.0, 110.0)];
        let dets = [BBox::ltrb(101.0, 100.0, 111.0, 110.0), BBox::ltrb(300.0, 300.0, 310.0, 310.0)];
        let m = associate(&tracks, &dets, 0.8).unwrap();

        assert_eq!(m.matches, vec![(1, 0)]);
        assert_eq!(m.tracks, vec![0]);
        assert_eq!(m.dets, vec![1]);
    }

    #[test]
    fn first_frame_tracks_are_active() {
        let mut tracker = ByteTracker::new(ByteTrackerConfig::default(), 30.0);
        let targets = tracker
            .update(&frame(1, &[([10.0, 10.0, 50.0, 100.0], 0.9), ([300.0, 10.0, 50.0, 100.0], 0.8)]))
            .unwrap();

        assert_eq!(targets.len(), 2);
        assert_ne!(targets[0].track_id, targets[1].track_id);
    }

    #[test]
    fn identity_persists_across_frames() {
        let mut tracker = ByteTracker::new(ByteTrackerConfig::default(), 30.0);
        let first = tracker
            .update(&frame(1, &[([10.0, 10.0, 50.0, 100.0], 0.9)]))
            .unwrap();

        let mut last = Vec::new();
        for i in 2..10 {
            let x = 10.0 + i as f32 * 2.0;
            last = tracker.update(&frame(i, &[([x, 10.0, 50.0, 100.0], 0.9)])).unwrap();
        }

        assert_eq!(last.len(), 1);
        assert_eq!(last[0].track_id, first[0].track_id);
    }

    #[test]
    fn later_tracks_need_confirmation() {
        let mut tracker = ByteTracker::new(ByteTrackerConfig::default(), 30.0);
        tracker.update(&frame(1, &[])).unwrap();
        let seen_once = tracker
            .update(&frame(2, &[([10.0, 10.0, 50.0, 100.0], 0.9)]))
            .unwrap();
        let seen_twice = tracker
            .update(&frame(3, &[([11.0, 10.0, 50.0, 100.0], 0.9)]))
            .unwrap();

        assert!(seen_once.is_empty());
        assert_eq!(seen_twice.len(), 1);
    }

    #[test]
    fn low_scores_never_start_tracks() {
        let mut tracker = ByteTracker::new(ByteTrackerConfig::default(), 30.0);
        let targets = tracker
            .update(&frame(1, &[([10.0, 10.0, 50.0, 100.0], 0.3)]))
            .unwrap();
        assert!(targets.is_empty());
    }

    #[test]
    fn reset_restarts_ids() {
        let mut tracker = ByteTracker::new(ByteTrackerConfig::default(), 30.0);
        let a = tracker.update(&frame(1, &[([10.0, 10.0, 50.0, 100.0], 0.9)])).unwrap();
        tracker.reset();
        let b = tracker.update(&frame(1, &[([10.0, 10.0, 50.0, 100.0], 0.9)])).unwrap();
        assert_eq!(a[0].track_id, b[0].track_id);
    }
}
