use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltwh};
use crate::Detection;

/// Tracker output for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    /// smoothed box, in [x, y, w, h]
    pub bbox: BBox<Ltwh>,
    /// tracker-internal id, not yet compacted
    pub track_id: u32,
    pub score: f32,
}

/// Persisted link between a detection and its track.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackAssignment {
    pub frame: u32,
    pub pose_idx: u32,
    pub track_id: u32,
}

/// Detections of one figure, ordered by frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub track_id: u32,
    pub detections: Vec<Detection>,
}

impl Track {
    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
