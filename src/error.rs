use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("External tool failure: {0}")]
    ExternalTool(String),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Assignment Error: {0:?}")]
    Assignment(munkres::Error),
}

impl From<munkres::Error> for Error {
    fn from(err: munkres::Error) -> Self {
        Error::Assignment(err)
    }
}

impl Error {
    pub fn data_integrity(message: impl Into<String>) -> Self {
        Self::DataIntegrity(message.into())
    }

    pub fn external_tool(message: impl Into<String>) -> Self {
        Self::ExternalTool(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}

/// Pipeline step a fatal error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Metadata,
    FetchPoses,
    Tracking,
    Movelets,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Metadata => "metadata",
            Stage::FetchPoses => "fetch poses",
            Stage::Tracking => "tracking",
            Stage::Movelets => "movelets",
            Stage::Persist => "persist",
        };

        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct RunError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

impl RunError {
    pub fn at(stage: Stage) -> impl FnOnce(Error) -> RunError {
        move |source| RunError { stage, source }
    }
}

/// Non-fatal conditions; the run degrades to a numeric default and continues.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// Track made of a single detection.
    DegenerateTrack { track_id: u32 },
    /// Tick starting at the same timecode as its predecessor.
    ZeroDurationTick { track_id: u32, tick: u32 },
    /// Consecutive ticks with no jointly present coordinate; movement is NaN.
    NoSharedKeypoints { track_id: u32, tick: u32 },
    /// Accepted target with no detection in its frame to reconcile against.
    MatchingAmbiguity { frame: u32, raw_track_id: u32 },
    /// The tracker never produced an acceptable target.
    NoTargetsAccepted,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::DegenerateTrack { track_id } => {
                write!(f, "track {} has a single detection", track_id)
            }
            Warning::ZeroDurationTick { track_id, tick } => {
                write!(f, "track {} tick {} has zero elapsed time", track_id, tick)
            }
            Warning::NoSharedKeypoints { track_id, tick } => write!(
                f,
                "track {} tick {} shares no keypoints with its predecessor",
                track_id, tick
            ),
            Warning::MatchingAmbiguity {
                frame,
                raw_track_id,
            } => write!(
                f,
                "target {} in frame {} has no detection to match",
                raw_track_id, frame
            ),
            Warning::NoTargetsAccepted => f.write_str("no tracker target was accepted"),
        }
    }
}
