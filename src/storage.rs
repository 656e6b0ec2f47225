//! Storage collaborators the pipeline reads from and writes to.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_derive::{Deserialize, Serialize};

use crate::detection::PoseRecord;
use crate::error::Error;
use crate::frame_movement::FrameMovement;
use crate::movelet::Movelet;
use crate::track::TrackAssignment;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct VideoMetadata {
    pub fps: f64,
    pub frame_count: u32,
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait PoseSource: Send + Sync {
    /// Every pose of the video, ordered by frame.
    async fn fetch_poses(&self, video_id: &str) -> Result<Vec<PoseRecord>, Error>;
}

/// Derived tables are replaced wholesale on every write.
#[async_trait]
pub trait MovementStore: Send + Sync {
    async fn fetch_video_metadata(&self, video_id: &str) -> Result<VideoMetadata, Error>;

    async fn write_track_assignments(
        &self,
        video_id: &str,
        assignments: &[TrackAssignment],
    ) -> Result<(), Error>;

    async fn write_movelets(&self, video_id: &str, movelets: &[Movelet]) -> Result<(), Error>;

    async fn write_frame_movement(
        &self,
        video_id: &str,
        movement: &FrameMovement,
        movement_3d: Option<&FrameMovement>,
    ) -> Result<(), Error>;
}

#[derive(Debug, Clone, Default)]
pub struct VideoRows {
    pub metadata: Option<VideoMetadata>,
    pub poses: Vec<PoseRecord>,
    pub assignments: Vec<TrackAssignment>,
    pub movelets: Vec<Movelet>,
    pub frame_movement: Option<FrameMovement>,
    pub frame_movement_3d: Option<FrameMovement>,
}

/// In-process store keyed by video id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    videos: Mutex<HashMap<String, VideoRows>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, VideoRows>>, Error> {
        self.videos
            .lock()
            .map_err(|_| Error::storage("memory store lock poisoned"))
    }

    pub fn insert_video(
        &self,
        video_id: &str,
        metadata: VideoMetadata,
        poses: Vec<PoseRecord>,
    ) -> Result<(), Error> {
        let mut videos = self.lock()?;
        let rows = videos.entry(video_id.to_string()).or_default();
        rows.metadata = Some(metadata);
        rows.poses = poses;
        Ok(())
    }

    /// Snapshot of everything stored for `video_id`.
    pub fn rows(&self, video_id: &str) -> Option<VideoRows> {
        self.lock().ok()?.get(video_id).cloned()
    }

    fn with_rows<R>(
        &self,
        video_id: &str,
        f: impl FnOnce(&mut VideoRows) -> R,
    ) -> Result<R, Error> {
        let mut videos = self.lock()?;
        let rows = videos
            .get_mut(video_id)
            .ok_or_else(|| Error::storage(format!("unknown video {}", video_id)))?;
        Ok(f(rows))
    }
}

#[async_trait]
impl PoseSource for MemoryStore {
    async fn fetch_poses(&self, video_id: &str) -> Result<Vec<PoseRecord>, Error> {
        self.with_rows(video_id, |rows| rows.poses.clone())
    }
}

#[async_trait]
impl MovementStore for MemoryStore {
    async fn fetch_video_metadata(&self, video_id: &str) -> Result<VideoMetadata, Error> {
        self.with_rows(video_id, |rows| rows.metadata)?
            .ok_or_else(|| Error::storage(format!("video {} has no metadata", video_id)))
    }

    async fn write_track_assignments(
        &self,
        video_id: &str,
        assignments: &[TrackAssignment],
    ) -> Result<(), Error> {
        self.with_rows(video_id, |rows| rows.assignments = assignments.to_vec())
    }

    async fn write_movelets(&self, video_id: &str, movelets: &[Movelet]) -> Result<(), Error> {
        self.with_rows(video_id, |rows| rows.movelets = movelets.to_vec())
    }

    async fn write_frame_movement(
        &self,
        video_id: &str,
        movement: &FrameMovement,
        movement_3d: Option<&FrameMovement>,
    ) -> Result<(), Error> {
        self.with_rows(video_id, |rows| {
            rows.frame_movement = Some(movement.clone());
            rows.frame_movement_3d = movement_3d.cloned();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const META: VideoMetadata = VideoMetadata {
        fps: 30.0,
        frame_count: 10,
        width: 640,
        height: 480,
    };

    #[tokio::test]
    async fn unknown_video_is_a_storage_error() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.fetch_poses("missing").await,
            Err(Error::Storage(_))
        ));
        assert!(store.fetch_video_metadata("missing").await.is_err());
    }

    #[tokio::test]
    async fn writes_replace_previous_rows() {
        let store = MemoryStore::new();
        store.insert_video("v", META, Vec::new()).unwrap();

        let a = TrackAssignment {
            frame: 1,
            pose_idx: 0,
            track_id: 1,
        };
        store.write_track_assignments("v", &[a, a]).await.unwrap();
        store.write_track_assignments("v", &[a]).await.unwrap();

        let rows = store.rows("v").unwrap();
        assert_eq!(rows.assignments, vec![a]);
        assert_eq!(store.fetch_video_metadata("v").await.unwrap(), META);
    }
}
