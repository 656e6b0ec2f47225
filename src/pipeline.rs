//! End-to-end batch run for one video.
//!
//! All derived tables are computed before the first write, so a fatal error
//! leaves whatever was persisted by an earlier run untouched.

use tracing::{info, warn};

use crate::byte_tracker::ByteTracker;
use crate::config::PipelineConfig;
use crate::detection::decode_records;
use crate::error::{Error, RunError, Stage, Warning};
use crate::frame_movement::{self, FrameMovement};
use crate::identity::track_detections;
use crate::movelet::{movelets_for_track, Movelet};
use crate::storage::{MovementStore, PoseSource, VideoMetadata};
use crate::tick::ticks_for_track;
use crate::track::TrackAssignment;
use crate::{Detection, Tracking};

/// Everything one run derives from a video's poses.
#[derive(Debug, Clone, Default)]
pub struct Derived {
    pub assignments: Vec<TrackAssignment>,
    pub track_count: usize,
    pub movelets: Vec<Movelet>,
    pub frame_movement: FrameMovement,
    pub frame_movement_3d: Option<FrameMovement>,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub tracked_detections: usize,
    pub tracks: usize,
    pub movelets: usize,
    pub max_movement: f32,
    pub warnings: Vec<Warning>,
}

fn check_metadata(meta: &VideoMetadata) -> Result<(), Error> {
    if !(meta.fps.is_finite() && meta.fps > 0.0) {
        return Err(Error::data_integrity(format!("invalid fps {}", meta.fps)));
    }

    Ok(())
}

/// Tracks, buckets and vectorizes `detections`; no I/O.
pub fn derive<T: Tracking + ?Sized>(
    detections: &[Detection],
    meta: &VideoMetadata,
    tracker: &mut T,
    config: &PipelineConfig,
) -> Result<Derived, RunError> {
    check_metadata(meta).map_err(RunError::at(Stage::Metadata))?;

    let tracked = track_detections(detections, (meta.width, meta.height), tracker, config)
        .map_err(RunError::at(Stage::Tracking))?;

    let mut warnings = tracked.warnings;
    let mut movelets = Vec::new();

    for track in &tracked.tracks {
        let ticks = ticks_for_track(track, meta.fps, config.tick_interval)
            .map_err(RunError::at(Stage::Movelets))?;
        movelets.extend(movelets_for_track(&ticks, &mut warnings));
    }

    info!(movelets = movelets.len(), "computed motion movelets");

    let frame_movement = frame_movement::aggregate(&movelets, meta.frame_count);
    let frame_movement_3d = frame_movement::aggregate_3d(&movelets, meta.frame_count);

    info!(
        frames = meta.frame_count,
        max_movement = frame_movement.max_movement,
        "computed cumulative movement per frame"
    );

    Ok(Derived {
        assignments: tracked.assignments,
        track_count: tracked.tracks.len(),
        movelets,
        frame_movement,
        frame_movement_3d,
        warnings,
    })
}

pub struct MotionPipeline<S> {
    store: S,
    config: PipelineConfig,
}

impl<S: PoseSource + MovementStore> MotionPipeline<S> {
    pub fn new(store: S, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs with a fresh [`ByteTracker`] tuned to the video's frame rate.
    pub async fn run(&self, video_id: &str) -> Result<RunReport, RunError> {
        let meta = self
            .store
            .fetch_video_metadata(video_id)
            .await
            .map_err(RunError::at(Stage::Metadata))?;

        let mut tracker = ByteTracker::new(self.config.tracker.clone(), meta.fps);
        self.run_inner(video_id, meta, &mut tracker).await
    }

    /// Runs with a caller-supplied tracker.
    pub async fn run_with<T: Tracking + Send + ?Sized>(
        &self,
        video_id: &str,
        tracker: &mut T,
    ) -> Result<RunReport, RunError> {
        let meta = self
            .store
            .fetch_video_metadata(video_id)
            .await
            .map_err(RunError::at(Stage::Metadata))?;

        self.run_inner(video_id, meta, tracker).await
    }

    async fn run_inner<T: Tracking + Send + ?Sized>(
        &self,
        video_id: &str,
        meta: VideoMetadata,
        tracker: &mut T,
    ) -> Result<RunReport, RunError> {
        let records = self
            .store
            .fetch_poses(video_id)
            .await
            .map_err(RunError::at(Stage::FetchPoses))?;

        info!(video_id, poses = records.len(), "fetched pose data");

        let detections = decode_records(&records).map_err(RunError::at(Stage::FetchPoses))?;
        let derived = derive(&detections, &meta, tracker, &self.config)?;

        for w in &derived.warnings {
            if let Warning::NoTargetsAccepted = w {
                warn!(video_id, "video has no tracked movement data");
            }
        }

        self.store
            .write_track_assignments(video_id, &derived.assignments)
            .await
            .map_err(RunError::at(Stage::Persist))?;
        self.store
            .write_movelets(video_id, &derived.movelets)
            .await
            .map_err(RunError::at(Stage::Persist))?;
        self.store
            .write_frame_movement(
                video_id,
                &derived.frame_movement,
                derived.frame_movement_3d.as_ref(),
            )
            .await
            .map_err(RunError::at(Stage::Persist))?;

        info!(
            video_id,
            tracks = derived.track_count,
            movelets = derived.movelets.len(),
            "stored motion data"
        );

        Ok(RunReport {
            tracked_detections: derived.assignments.len(),
            tracks: derived.track_count,
            movelets: derived.movelets.len(),
            max_movement: derived.frame_movement.max_movement,
            warnings: derived.warnings,
        })
    }
}
