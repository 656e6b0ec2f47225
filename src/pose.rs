//! Keypoint vectors with explicit missing coordinates.
//!
//! Upstream storage marks undetected coordinates with [`SENTINEL`]. Inside the
//! crate a missing coordinate is `None`; the sentinel is decoded when a pose is
//! read and re-encoded only when a record is written back out.
//!
//! Normalized coordinates are clamped to `[0, POSE_MAX_DIM]` upstream, so a
//! legitimate value never collides with the sentinel.

use crate::error::Error;
use ndarray::{Array2, Axis};

pub const SENTINEL: f32 = -1.0;

/// Side length of the canonical square normalized poses are scaled into.
pub const POSE_MAX_DIM: f32 = 100.0;

/// Flat coordinate vector grouped into keypoints of `stride` coordinates
/// (2 for planar poses, 3 for global poses, 1 for embeddings).
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    coords: Vec<Option<f32>>,
    stride: usize,
}

impl Pose {
    pub fn new(coords: Vec<Option<f32>>, stride: usize) -> Self {
        Self { coords, stride }
    }

    pub fn missing(len: usize, stride: usize) -> Self {
        Self::new(vec![None; len], stride)
    }

    /// Decodes a stored vector, turning sentinel and NaN values into `None`.
    pub fn from_sentinel(values: &[f32], stride: usize) -> Self {
        let coords = values
            .iter()
            .map(|&v| if v == SENTINEL || v.is_nan() { None } else { Some(v) })
            .collect();

        Self::new(coords, stride)
    }

    pub fn to_sentinel(&self) -> Vec<f32> {
        self.coords.iter().map(|v| v.unwrap_or(SENTINEL)).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn coords(&self) -> &[Option<f32>] {
        &self.coords
    }

    /// All coordinates of keypoint `k`, or `None` if any of them is missing.
    pub fn keypoint(&self, k: usize) -> Option<Vec<f32>> {
        let stride = self.stride.max(1);
        self.coords
            .get(k * stride..(k + 1) * stride)?
            .iter()
            .copied()
            .collect()
    }

    /// Element-wise mean over the poses, counting each coordinate only where
    /// it is present. A coordinate missing from every pose stays missing.
    pub fn mean<'a, I>(poses: I) -> Result<Pose, Error>
    where
        I: IntoIterator<Item = &'a Pose>,
    {
        let poses: Vec<&Pose> = poses.into_iter().collect();
        let first = poses
            .first()
            .ok_or_else(|| Error::data_integrity("cannot average an empty set of poses"))?;

        let (len, stride) = (first.len(), first.stride);
        if poses.iter().any(|p| p.len() != len) {
            return Err(Error::data_integrity(format!(
                "pose lengths differ within one tick (expected {})",
                len
            )));
        }

        let values = poses
            .iter()
            .flat_map(|p| p.coords.iter().map(|v| v.unwrap_or(f32::NAN)))
            .collect();

        let table = Array2::from_shape_vec((poses.len(), len), values)
            .map_err(|err| Error::data_integrity(err.to_string()))?;

        let coords = table
            .axis_iter(Axis(1))
            .map(|column| {
                let (sum, count) = column
                    .iter()
                    .filter(|v| !v.is_nan())
                    .fold((0.0f32, 0u32), |(s, n), v| (s + v, n + 1));

                if count > 0 {
                    Some(sum / count as f32)
                } else {
                    None
                }
            })
            .collect();

        Ok(Pose::new(coords, stride))
    }

    /// Euclidean distance over the coordinates present in both poses.
    /// `None` when the poses share no coordinate.
    pub fn distance(&self, other: &Pose) -> Option<f32> {
        let mut shared = 0;
        let mut sum = 0.0f32;

        for (a, b) in self.coords.iter().zip(other.coords.iter()) {
            if let (Some(a), Some(b)) = (a, b) {
                sum += (a - b) * (a - b);
                shared += 1;
            }
        }

        if shared > 0 {
            Some(sum.sqrt())
        } else {
            None
        }
    }

    /// Per-keypoint displacement `self - next`; a keypoint is missing in the
    /// result unless it is complete in both poses.
    pub fn displacement(&self, next: &Pose) -> Pose {
        let stride = self.stride.max(1);
        let mut coords = Vec::with_capacity(self.len());

        for (prev, cur) in self
            .coords
            .chunks(stride)
            .zip(next.coords.chunks(stride))
        {
            let complete = prev.iter().chain(cur.iter()).all(Option::is_some);

            coords.extend(prev.iter().zip(cur.iter()).map(|(p, c)| match (p, c) {
                (Some(p), Some(c)) if complete => Some(p - c),
                _ => None,
            }));
        }

        Pose::new(coords, self.stride)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_roundtrip() {
        let pose = Pose::from_sentinel(&[10.0, 20.0, -1.0, -1.0], 2);
        assert_eq!(pose.coords(), &[Some(10.0), Some(20.0), None, None]);
        assert_eq!(pose.keypoint(0), Some(vec![10.0, 20.0]));
        assert_eq!(pose.keypoint(1), None);
        assert_eq!(pose.to_sentinel(), vec![10.0, 20.0, -1.0, -1.0]);
    }

    #[test]
    fn mean_skips_sentinel() {
        let a = Pose::from_sentinel(&[5.0, 5.0, 2.0, 4.0], 2);
        let b = Pose::from_sentinel(&[-1.0, -1.0, 4.0, 8.0], 2);
        let mean = Pose::mean([&a, &b]).unwrap();

        assert_eq!(mean.coords(), &[Some(5.0), Some(5.0), Some(3.0), Some(6.0)]);
    }

    #[test]
    fn mean_keeps_all_missing_coordinate_missing() {
        let a = Pose::from_sentinel(&[-1.0, -1.0, 1.0, 1.0], 2);
        let b = Pose::from_sentinel(&[-1.0, -1.0, 3.0, 3.0], 2);
        let mean = Pose::mean([&a, &b]).unwrap();

        assert_eq!(mean.keypoint(0), None);
        assert_eq!(mean.keypoint(1), Some(vec![2.0, 2.0]));
    }

    #[test]
    fn mean_of_single_pose_is_identity() {
        let a = Pose::from_sentinel(&[12.5, 33.25, -1.0, -1.0, 0.0, 99.0], 2);
        assert_eq!(Pose::mean([&a]).unwrap(), a);
    }

    #[test]
    fn mean_rejects_mismatched_lengths() {
        let a = Pose::from_sentinel(&[1.0, 1.0], 2);
        let b = Pose::from_sentinel(&[1.0, 1.0, 2.0, 2.0], 2);
        assert!(matches!(
            Pose::mean([&a, &b]),
            Err(Error::DataIntegrity(_))
        ));
        assert!(Pose::mean(std::iter::empty()).is_err());
    }

    #[test]
    fn distance_uses_shared_coordinates_only() {
        let prev = Pose::from_sentinel(&[10.0, 10.0, -1.0, -1.0], 2);
        let cur = Pose::from_sentinel(&[12.0, 11.0, -1.0, -1.0], 2);
        let d = prev.distance(&cur).unwrap();
        assert!((d - 5.0f32.sqrt()).abs() < 1e-6);

        let none = Pose::missing(4, 2);
        assert_eq!(prev.distance(&none), None);
    }

    #[test]
    fn displacement_requires_complete_keypoints() {
        let prev = Pose::new(vec![Some(10.0), Some(10.0), Some(1.0), None], 2);
        let cur = Pose::new(vec![Some(12.0), Some(11.0), Some(3.0), Some(3.0)], 2);
        let motion = prev.displacement(&cur);

        assert_eq!(motion.coords(), &[Some(-2.0), Some(-1.0), None, None]);
    }
}
