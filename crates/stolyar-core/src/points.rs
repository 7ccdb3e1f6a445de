//! Byte/row/column positions and span lengths.
//!
//! A `Length` is a relative measure (byte count plus row/column extent), not
//! an absolute position. Absolute positions are `Length`s measured from the
//! start of the text, which keeps the arithmetic in one place: advancing a
//! position by a span is `+`, and re-basing a span is `-`.

use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

/// A row/column position. Columns are measured in bytes from the last newline.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Point {
    pub row: u32,
    pub column: u32,
}

impl Point {
    pub const ZERO: Point = Point { row: 0, column: 0 };

    #[inline]
    pub fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }
}

impl Add for Point {
    type Output = Point;

    /// Extend `self` by a relative extent: crossing a row resets the column.
    fn add(self, rhs: Point) -> Point {
        if rhs.row > 0 {
            Point::new(self.row + rhs.row, rhs.column)
        } else {
            Point::new(self.row, self.column + rhs.column)
        }
    }
}

impl Sub for Point {
    type Output = Point;

    /// Relative extent from `rhs` to `self`. Requires `rhs <= self`.
    fn sub(self, rhs: Point) -> Point {
        if self.row == rhs.row {
            Point::new(0, self.column.saturating_sub(rhs.column))
        } else {
            Point::new(self.row.saturating_sub(rhs.row), self.column)
        }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.row, self.column)
    }
}

/// A span length: byte count plus the row/column extent it covers.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct Length {
    pub bytes: u32,
    pub extent: Point,
}

impl Length {
    pub const ZERO: Length = Length {
        bytes: 0,
        extent: Point::ZERO,
    };

    #[inline]
    pub fn new(bytes: u32, extent: Point) -> Self {
        Self { bytes, extent }
    }

    /// Measure a text slice.
    pub fn of_str(text: &str) -> Self {
        let mut rows = 0u32;
        let mut column = 0u32;
        for b in text.bytes() {
            if b == b'\n' {
                rows += 1;
                column = 0;
            } else {
                column += 1;
            }
        }
        Self {
            bytes: text.len() as u32,
            extent: Point::new(rows, column),
        }
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.bytes == 0
    }
}

impl Add for Length {
    type Output = Length;

    fn add(self, rhs: Length) -> Length {
        Length::new(self.bytes + rhs.bytes, self.extent + rhs.extent)
    }
}

impl AddAssign for Length {
    fn add_assign(&mut self, rhs: Length) {
        *self = *self + rhs;
    }
}

impl Sub for Length {
    type Output = Length;

    /// Requires `rhs` to be a prefix of `self`.
    fn sub(self, rhs: Length) -> Length {
        Length::new(self.bytes.saturating_sub(rhs.bytes), self.extent - rhs.extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_add_same_row() {
        assert_eq!(Point::new(2, 5) + Point::new(0, 3), Point::new(2, 8));
    }

    #[test]
    fn point_add_crossing_rows() {
        assert_eq!(Point::new(2, 5) + Point::new(3, 1), Point::new(5, 1));
    }

    #[test]
    fn point_sub_inverts_add() {
        let base = Point::new(4, 7);
        for ext in [Point::new(0, 2), Point::new(1, 0), Point::new(2, 9)] {
            assert_eq!((base + ext) - base, ext);
        }
    }

    #[test]
    fn length_of_str_counts_rows() {
        let len = Length::of_str("ab\ncde\nf");
        assert_eq!(len.bytes, 8);
        assert_eq!(len.extent, Point::new(2, 1));
    }

    #[test]
    fn length_of_str_single_line() {
        let len = Length::of_str("hello");
        assert_eq!(len.bytes, 5);
        assert_eq!(len.extent, Point::new(0, 5));
    }

    #[test]
    fn length_add_sub_roundtrip() {
        let a = Length::of_str("foo(\n");
        let b = Length::of_str("1, 2)");
        assert_eq!((a + b) - a, b);
    }
}
