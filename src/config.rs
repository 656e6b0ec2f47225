use serde_derive::{Deserialize, Serialize};
use std::str::FromStr;

/// Length of one tick, 1/6 of a second.
pub const TICK_INTERVAL: f64 = 0.1666667;

/// Targets with a box area at or below this are dropped.
pub const MIN_BOX_AREA: f32 = 10.0;

/// Targets wider than this times their height are dropped (merged figures).
pub const ASPECT_RATIO_THRESHOLD: f32 = 1.6;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ByteTrackerConfig {
    /// Detections at or above this score take part in the first association.
    pub track_thresh: f32,
    /// Unmatched detections at or above this score start new tracks.
    pub high_thresh: f32,
    /// Detections below this score are ignored entirely.
    pub low_thresh: f32,
    /// Maximum IoU distance accepted in the first association.
    pub match_thresh: f32,
    /// Frames a lost track is kept, at 30 fps.
    pub track_buffer: u32,
}

impl Default for ByteTrackerConfig {
    fn default() -> Self {
        Self {
            track_thresh: 0.5,
            high_thresh: 0.6,
            low_thresh: 0.1,
            match_thresh: 0.8,
            track_buffer: 30,
        }
    }
}

impl ByteTrackerConfig {
    /// Lost-track lifetime in frames for a video at `fps`.
    pub fn max_time_lost(&self, fps: f64) -> u32 {
        ((fps / 30.0) * self.track_buffer as f64).round().max(1.0) as u32
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// seconds
    pub tick_interval: f64,
    pub min_box_area: f32,
    pub aspect_ratio_threshold: f32,
    /// Largest [x,y,w,h] distance at which a tracked box still matches a
    /// detection; unbounded when unset.
    pub max_match_distance: Option<f32>,
    pub tracker: ByteTrackerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_interval: TICK_INTERVAL,
            min_box_area: MIN_BOX_AREA,
            aspect_ratio_threshold: ASPECT_RATIO_THRESHOLD,
            max_match_distance: None,
            tracker: ByteTrackerConfig::default(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl PipelineConfig {
    /// Defaults overridden by `MOVELET_*` environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();

        Self {
            tick_interval: env_or("MOVELET_TICK_INTERVAL", d.tick_interval),
            min_box_area: env_or("MOVELET_MIN_BOX_AREA", d.min_box_area),
            aspect_ratio_threshold: env_or(
                "MOVELET_ASPECT_RATIO_THRESHOLD",
                d.aspect_ratio_threshold,
            ),
            max_match_distance: std::env::var("MOVELET_MAX_MATCH_DISTANCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(d.max_match_distance),
            tracker: ByteTrackerConfig {
                track_thresh: env_or("MOVELET_TRACK_THRESH", d.tracker.track_thresh),
                high_thresh: env_or("MOVELET_HIGH_THRESH", d.tracker.high_thresh),
                low_thresh: env_or("MOVELET_LOW_THRESH", d.tracker.low_thresh),
                match_thresh: env_or("MOVELET_MATCH_THRESH", d.tracker.match_thresh),
                track_buffer: env_or("MOVELET_TRACK_BUFFER", d.tracker.track_buffer),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.tick_interval, TICK_INTERVAL);
        assert_eq!(cfg.min_box_area, 10.0);
        assert_eq!(cfg.aspect_ratio_threshold, 1.6);
        assert_eq!(cfg.tracker.track_thresh, 0.5);
        assert_eq!(cfg.max_match_distance, None);
    }

    #[test]
    fn env_overrides_and_falls_back() {
        std::env::set_var("MOVELET_MIN_BOX_AREA", "25");
        std::env::set_var("MOVELET_TRACK_BUFFER", "not-a-number");
        std::env::set_var("MOVELET_MAX_MATCH_DISTANCE", "12.5");
        let cfg = PipelineConfig::from_env();
        std::env::remove_var("MOVELET_MIN_BOX_AREA");
        std::env::remove_var("MOVELET_TRACK_BUFFER");
        std::env::remove_var("MOVELET_MAX_MATCH_DISTANCE");

        assert_eq!(cfg.min_box_area, 25.0);
        assert_eq!(cfg.max_match_distance, Some(12.5));
        assert_eq!(cfg.tracker.track_buffer, 30);
    }

    #[test]
    fn lost_buffer_scales_with_fps() {
        let cfg = ByteTrackerConfig::default();
        assert_eq!(cfg.max_time_lost(30.0), 30);
        assert_eq!(cfg.max_time_lost(60.0), 60);
    }
}
