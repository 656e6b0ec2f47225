//! Constant-velocity Kalman filter over boxes in (cx, cy, aspect, height).

use crate::bbox::{BBox, Xyah};
use nalgebra as na;

type State = na::SVector<f32, 8>;
type StateCov = na::SMatrix<f32, 8, 8>;
type Measurement = na::Vector4<f32>;

const STD_WEIGHT_POSITION: f32 = 1.0 / 20.0;
const STD_WEIGHT_VELOCITY: f32 = 1.0 / 160.0;

#[derive(Debug, Clone)]
pub struct KalmanBox {
    mean: State,
    covariance: StateCov,
}

fn diag8(std: [f32; 8]) -> StateCov {
    StateCov::from_diagonal(&State::from_iterator(std.iter().map(|s| s * s)))
}

fn motion_mat() -> StateCov {
    let mut f = StateCov::identity();
    for i in 0..4 {
        f[(i, i + 4)] = 1.0;
    }
    f
}

fn update_mat() -> na::SMatrix<f32, 4, 8> {
    na::SMatrix::<f32, 4, 8>::from_fn(|r, c| if r == c { 1.0 } else { 0.0 })
}

impl KalmanBox {
    pub fn new(bbox: &BBox<Xyah>) -> Self {
        let m = bbox.as_slice();
        let h = m[3];
        let mean = State::from_column_slice(&[m[0], m[1], m[2], m[3], 0.0, 0.0, 0.0, 0.0]);

        let p = 2.0 * STD_WEIGHT_POSITION * h;
        let v = 10.0 * STD_WEIGHT_VELOCITY * h;

        Self {
            mean,
            covariance: diag8([p, p, 1e-2, p, v, v, 1e-5, v]),
        }
    }

    pub fn predict(&mut self) {
        let h = self.mean[3];
        let p = STD_WEIGHT_POSITION * h;
        let v = STD_WEIGHT_VELOCITY * h;
        let noise = diag8([p, p, 1e-2, p, v, v, 1e-5, v]);

        let f = motion_mat();
        self.mean = f * self.mean;
        self.covariance = f * self.covariance * f.transpose() + noise;
    }

    /// Corrects the state with a measured box. Leaves the prediction in place
    /// if the innovation covariance is singular.
    pub fn update(&mut self, bbox: &BBox<Xyah>) {
        let z = bbox.as_slice();
        let z = Measurement::new(z[0], z[1], z[2], z[3]);

        let h = self.mean[3];
        let p = STD_WEIGHT_POSITION * h;
        let noise = na::Matrix4::from_diagonal(&na::Vector4::new(p * p, p * p, 1e-2, p * p));

        let hm = update_mat();
        let projected_mean = hm * self.mean;
        let projected_cov = hm * self.covariance * hm.transpose() + noise;

        let inv = match projected_cov.try_inverse() {
            Some(inv) => inv,
            None => return,
        };

        let gain = self.covariance * hm.transpose() * inv;
        self.mean += gain * (z - projected_mean);
        self.covariance -= gain * projected_cov * gain.transpose();
    }

    /// Current box estimate.
    pub fn bbox(&self) -> BBox<Xyah> {
        BBox::xyah(self.mean[0], self.mean[1], self.mean[2], self.mean[3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_filter_reports_initial_box() {
        let b = BBox::xyah(50.0, 60.0, 0.5, 100.0);
        let kf = KalmanBox::new(&b);
        assert_eq!(kf.bbox(), b);
    }

    #[test]
    fn update_pulls_towards_measurement() {
        let mut kf = KalmanBox::new(&BBox::xyah(50.0, 60.0, 0.5, 100.0));
        kf.predict();
        kf.update(&BBox::xyah(60.0, 60.0, 0.5, 100.0));

        let cx = kf.bbox().cx();
        assert!(cx > 50.0 && cx < 60.0, "cx = {}", cx);
    }

    #[test]
    fn predict_follows_velocity() {
        let mut kf = KalmanBox::new(&BBox::xyah(0.0, 0.0, 0.5, 100.0));
        for step in 1..=10 {
            kf.predict();
            kf.update(&BBox::xyah(step as f32 * 5.0, 0.0, 0.5, 100.0));
        }

        let before = kf.bbox().cx();
        kf.predict();
        assert!(kf.bbox().cx() > before);
    }
}
