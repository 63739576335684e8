use geo::Rect;
use serde::{Deserialize, Serialize};

use crate::errors::{SindexError, SindexResult};

/// A 2D axis-aligned bounding box represented by minimum and maximum coordinates.
///
/// `BoundingBox` is the only thing the spatial index knows about a row: its
/// extent. Query boxes and stored boxes share the same type, and every
/// comparison between them is inclusive, so boxes that merely touch along an
/// edge or at a corner intersect.
///
/// # Examples
///
/// ```rust
/// use sindex::BoundingBox;
///
/// let region = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
/// let point = BoundingBox::point(100.0, 50.0);
///
/// assert!(region.intersects(&point));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum X coordinate
    pub min_x: f64,
    /// Minimum Y coordinate
    pub min_y: f64,
    /// Maximum X coordinate
    pub max_x: f64,
    /// Maximum Y coordinate
    pub max_y: f64,
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BoundingBox({}, {}, {}, {})",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

impl BoundingBox {
    /// Creates a new bounding box with the specified coordinates.
    ///
    /// No validation happens here; use [`BoundingBox::try_new`] for boxes
    /// coming from untrusted input.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> BoundingBox {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Creates a bounding box, rejecting NaN coordinates and inverted axes.
    pub fn try_new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> SindexResult<BoundingBox> {
        let bbox = BoundingBox::new(min_x, min_y, max_x, max_y);
        bbox.validate()?;
        Ok(bbox)
    }

    /// Creates a degenerate box covering a single point.
    pub fn point(x: f64, y: f64) -> BoundingBox {
        BoundingBox::new(x, y, x, y)
    }

    /// Creates a bounding box from `[min_x, min_y, max_x, max_y]`.
    pub fn from_array(bounds: [f64; 4]) -> BoundingBox {
        BoundingBox::new(bounds[0], bounds[1], bounds[2], bounds[3])
    }

    /// Returns `[min_x, min_y, max_x, max_y]`.
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    /// An "inverted" box that any real box expands.
    pub(crate) fn empty() -> BoundingBox {
        BoundingBox::new(
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        )
    }

    /// Returns the width of the bounding box.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Returns the height of the bounding box.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Returns the area of the bounding box.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Returns the center point of the bounding box.
    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    /// Checks if this bounding box contains a point (boundary included).
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Checks if this bounding box contains another bounding box.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Checks if this bounding box intersects another bounding box.
    /// Touching edges and corners count as intersecting.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Returns the union of this bounding box with another.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Grows this box in place to cover `other`.
    pub fn expand(&mut self, other: &BoundingBox) {
        *self = self.union(other);
    }

    /// Checks if this bounding box is a point (zero area on both axes).
    pub fn is_point(&self) -> bool {
        self.min_x == self.max_x && self.min_y == self.max_y
    }

    /// Checks if this bounding box is valid: no NaN and min <= max on both axes.
    pub fn is_valid(&self) -> bool {
        self.min_x <= self.max_x && self.min_y <= self.max_y
    }

    pub fn validate(&self) -> SindexResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(SindexError::InvalidBoundingBox(*self))
        }
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        let (min, max) = (rect.min(), rect.max());
        BoundingBox::new(min.x, min.y, max.x, max.y)
    }
}
