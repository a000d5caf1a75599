//! Integer screen geometry.

use serde::{Deserialize, Serialize};

/// A point in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle. A rectangle with a non-positive width or
/// height is *empty* and contributes nothing to a union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Smallest rectangle containing both `self` and `other`.
    pub fn united(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(
            x,
            y,
            span(x, self.right().max(other.right())),
            span(y, self.bottom().max(other.bottom())),
        )
    }

    /// Bounding rectangle of a region made of several rectangles.
    ///
    /// Returns the empty default rectangle for an empty region.
    pub fn bounding(region: &[Rect]) -> Rect {
        region
            .iter()
            .fold(Rect::default(), |acc, rect| acc.united(rect))
    }
}

/// Distance from `start` to `end`, clamped to what an `i32` extent can hold.
fn span(start: i32, end: i32) -> i32 {
    let distance = i64::from(end) - i64::from(start);
    i32::try_from(distance).unwrap_or(i32::MAX)
}
