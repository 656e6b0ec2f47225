use crate::bbox::{BBox, Ltrb};

/// Detection box handed to a tracker, in corner form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub bbox: BBox<Ltrb>,
    pub score: f32,
}

/// All candidates of one video frame.
pub struct Frame {
    pub number: u32,
    /// (width, height)
    pub dims: (u32, u32),
    pub candidates: Vec<Candidate>,
}

impl Frame {
    #[inline]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
