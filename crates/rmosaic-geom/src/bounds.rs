//! World-coordinate bounding boxes.

use crate::{GeomError, Result};

/// Axis-aligned box in world coordinates.
///
/// Invariant: `left <= right` and `bottom <= top`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox {
    /// West edge.
    pub left: f64,
    /// South edge.
    pub bottom: f64,
    /// East edge.
    pub right: f64,
    /// North edge.
    pub top: f64,
}

impl BoundingBox {
    /// Create a bounding box, rejecting non-finite or inverted edges.
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Result<Self> {
        let bounds = Self {
            left,
            bottom,
            right,
            top,
        };
        bounds.validate()?;
        Ok(bounds)
    }

    /// Smallest box enclosing all `points`.
    pub fn from_points<I>(points: I) -> Result<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut iter = points.into_iter();
        let (x0, y0) = iter
            .next()
            .ok_or_else(|| GeomError::InvalidBounds("no points to enclose".to_string()))?;
        let mut bounds = Self {
            left: x0,
            bottom: y0,
            right: x0,
            top: y0,
        };
        for (x, y) in iter {
            bounds.left = bounds.left.min(x);
            bounds.right = bounds.right.max(x);
            bounds.bottom = bounds.bottom.min(y);
            bounds.top = bounds.top.max(y);
        }
        bounds.validate()?;
        Ok(bounds)
    }

    /// Check the box invariants.
    pub fn validate(&self) -> Result<()> {
        if ![self.left, self.bottom, self.right, self.top]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(GeomError::InvalidBounds(format!(
                "non-finite coordinate in {self:?}"
            )));
        }
        if self.left > self.right || self.bottom > self.top {
            return Err(GeomError::InvalidBounds(format!(
                "inverted edges in {self:?}"
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// True when the box has no area.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Check if a point is within the box (edges included).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right && y >= self.bottom && y <= self.top
    }

    /// Corners as `(x, y)` pairs: upper-left, upper-right, lower-left, lower-right.
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.left, self.top),
            (self.right, self.top),
            (self.left, self.bottom),
            (self.right, self.bottom),
        ]
    }

    /// Minimal box enclosing both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            left: self.left.min(other.left),
            bottom: self.bottom.min(other.bottom),
            right: self.right.max(other.right),
            top: self.top.max(other.top),
        }
    }

    /// Shared area of both boxes, or `None` when they do not overlap.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let overlap = BoundingBox {
            left: self.left.max(other.left),
            bottom: self.bottom.max(other.bottom),
            right: self.right.min(other.right),
            top: self.top.min(other.top),
        };
        if overlap.is_empty() {
            None
        } else {
            Some(overlap)
        }
    }

    /// Extent in `(left, right, bottom, top)` order, as image viewers expect.
    pub fn extent(&self) -> (f64, f64, f64, f64) {
        (self.left, self.right, self.bottom, self.top)
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = GeomError;

    fn try_from(value: [f64; 4]) -> Result<Self> {
        Self::new(value[0], value[1], value[2], value[3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_inverted() {
        assert!(BoundingBox::new(0.0, 0.0, 10.0, 10.0).is_ok());
        assert!(matches!(
            BoundingBox::new(10.0, 0.0, 0.0, 10.0),
            Err(GeomError::InvalidBounds(_))
        ));
        assert!(matches!(
            BoundingBox::new(0.0, f64::NAN, 10.0, 10.0),
            Err(GeomError::InvalidBounds(_))
        ));
    }

    #[test]
    fn test_union_and_intersection() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0).unwrap();
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0).unwrap();
        assert_eq!(a.union(&b), BoundingBox::new(0.0, 0.0, 15.0, 15.0).unwrap());
        assert_eq!(
            a.intersection(&b),
            Some(BoundingBox::new(5.0, 5.0, 10.0, 10.0).unwrap())
        );

        // Touching edges share no area.
        let c = BoundingBox::new(10.0, 0.0, 20.0, 10.0).unwrap();
        assert_eq!(a.intersection(&c), None);
    }

    #[test]
    fn test_from_points() {
        let bounds = BoundingBox::from_points([(3.0, -1.0), (-2.0, 4.0), (1.0, 1.0)]).unwrap();
        assert_eq!(bounds, BoundingBox::new(-2.0, -1.0, 3.0, 4.0).unwrap());
        assert!(BoundingBox::from_points(Vec::new()).is_err());
    }

    #[test]
    fn test_contains() {
        let bounds = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        assert!(bounds.contains(0.5, 0.5));
        assert!(bounds.contains(1.0, 0.0));
        assert!(!bounds.contains(1.5, 0.5));
    }
}
