pub mod bbox;
pub mod byte_tracker;
pub mod config;
pub mod detection;
pub mod error;
pub mod frame;
pub mod frame_movement;
pub mod identity;
pub mod movelet;
pub mod pipeline;
pub mod pose;
pub mod storage;
pub mod tick;
pub mod track;

mod kalman;

pub use byte_tracker::ByteTracker;
pub use config::PipelineConfig;
pub use detection::Detection;
pub use frame::Frame;
pub use frame_movement::FrameMovement;
pub use movelet::Movelet;
pub use pipeline::{MotionPipeline, RunReport};
pub use pose::Pose;
pub use track::{Target, Track};

use error::Error;

/// A multi-object tracker fed one frame of candidate boxes at a time, in
/// frame order. Implementations are free to smooth the boxes they report.
pub trait Tracking {
    fn update(&mut self, frame: &Frame) -> Result<Vec<Target>, Error>;
}

impl<T: Tracking + ?Sized> Tracking for Box<T> {
    #[inline]
    fn update(&mut self, frame: &Frame) -> Result<Vec<Target>, Error> {
        (**self).update(frame)
    }
}
