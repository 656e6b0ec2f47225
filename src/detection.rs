use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltwh};
use crate::error::Error;
use crate::pose::Pose;

/// Stored form of one pose detection, sentinel-encoded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PoseRecord {
    pub frame: u32,
    pub pose_idx: u32,
    /// [x, y, w, h]
    pub bbox: [f32; 4],
    pub score: f32,
    #[serde(rename = "norm")]
    pub normalized_pose: Vec<f32>,
    #[serde(default, rename = "global3d")]
    pub global_pose: Option<Vec<f32>>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// A single figure detected in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// 1-based frame number
    pub frame: u32,
    pub pose_idx: u32,
    pub bbox: BBox<Ltwh>,
    pub score: f32,
    pub pose: Pose,
    pub global_pose: Option<Pose>,
    pub embedding: Option<Pose>,
}

impl Detection {
    /// Builds a detection with only the planar pose.
    pub fn new(frame: u32, pose_idx: u32, bbox: BBox<Ltwh>, score: f32, pose: Pose) -> Self {
        Self {
            frame,
            pose_idx,
            bbox,
            score,
            pose,
            global_pose: None,
            embedding: None,
        }
    }

    #[inline]
    pub fn timecode(&self, fps: f64) -> f64 {
        self.frame as f64 / fps
    }
}

impl TryFrom<&PoseRecord> for Detection {
    type Error = Error;

    fn try_from(rec: &PoseRecord) -> Result<Self, Error> {
        if rec.frame == 0 {
            return Err(Error::data_integrity(format!(
                "pose {} has frame 0, frames are 1-based",
                rec.pose_idx
            )));
        }

        if rec.bbox.iter().any(|v| !v.is_finite()) || !rec.score.is_finite() {
            return Err(Error::data_integrity(format!(
                "pose {} in frame {} has a non-finite bbox or score",
                rec.pose_idx, rec.frame
            )));
        }

        if rec.normalized_pose.is_empty() || rec.normalized_pose.len() % 2 != 0 {
            return Err(Error::data_integrity(format!(
                "pose {} in frame {} has {} normalized coordinates",
                rec.pose_idx,
                rec.frame,
                rec.normalized_pose.len()
            )));
        }

        if let Some(global) = &rec.global_pose {
            if global.len() % 3 != 0 {
                return Err(Error::data_integrity(format!(
                    "pose {} in frame {} has {} global coordinates",
                    rec.pose_idx,
                    rec.frame,
                    global.len()
                )));
            }
        }

        Ok(Self {
            frame: rec.frame,
            pose_idx: rec.pose_idx,
            bbox: BBox::assigned(&rec.bbox),
            score: rec.score,
            pose: Pose::from_sentinel(&rec.normalized_pose, 2),
            global_pose: rec.global_pose.as_deref().map(|v| Pose::from_sentinel(v, 3)),
            embedding: rec.embedding.as_deref().map(|v| Pose::from_sentinel(v, 1)),
        })
    }
}

/// Decodes stored records, failing on the first malformed one.
pub fn decode_records(records: &[PoseRecord]) -> Result<Vec<Detection>, Error> {
    records.iter().map(Detection::try_from).collect()
}

fn check_len(
    expected: &mut Option<usize>,
    pose: Option<&Pose>,
    channel: &str,
    det: &Detection,
) -> Result<(), Error> {
    let len = match pose {
        Some(pose) => pose.len(),
        None => return Ok(()),
    };

    match *expected {
        Some(exp) if exp != len => Err(Error::data_integrity(format!(
            "pose {} in frame {} has {} {} coordinates, expected {}",
            det.pose_idx, det.frame, len, channel, exp
        ))),
        Some(_) => Ok(()),
        None => {
            *expected = Some(len);
            Ok(())
        }
    }
}

/// Every pose channel must keep one length across a video's detections.
pub fn check_channel_lengths(detections: &[Detection]) -> Result<(), Error> {
    let (mut norm, mut global, mut embedding) = (None, None, None);

    for det in detections {
        check_len(&mut norm, Some(&det.pose), "normalized", det)?;
        check_len(&mut global, det.global_pose.as_ref(), "global", det)?;
        check_len(&mut embedding, det.embedding.as_ref(), "embedding", det)?;
    }

    Ok(())
}
