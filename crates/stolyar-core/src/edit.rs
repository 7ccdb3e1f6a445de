//! Edit descriptions and byte/point ranges.

use serde::{Deserialize, Serialize};

use crate::points::Point;

/// A single text replacement: the span `start..old_end` was replaced by text
/// ending at `new_end`. Both byte offsets and points are supplied by the host
/// (the engine never re-scans the document to recover them).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEdit {
    pub start_byte: u32,
    pub old_end_byte: u32,
    pub new_end_byte: u32,
    pub start_point: Point,
    pub old_end_point: Point,
    pub new_end_point: Point,
}

/// A half-open span of the source, with both byte and point endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start_byte: u32,
    pub end_byte: u32,
    pub start_point: Point,
    pub end_point: Point,
}

impl Range {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start_byte >= self.end_byte
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}..{})", self.start_byte, self.end_byte)
    }
}
