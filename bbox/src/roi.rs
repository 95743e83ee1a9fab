use super::{Rect, TLBR};
use crate::common::*;

/// An axis-aligned region proposal in pixel coordinates.
///
/// The box spans columns `x1..x2` and rows `y1..y2`. A valid box always
/// satisfies `x2 > x1` and `y2 > y1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoiBox {
    x1: i64,
    y1: i64,
    x2: i64,
    y2: i64,
}

impl RoiBox {
    pub fn try_from_xyxy(xyxy: [i64; 4]) -> Result<Self> {
        let [x1, y1, x2, y2] = xyxy;
        ensure!(
            x2 > x1 && y2 > y1,
            "malformed box ({}, {}, {}, {}): x2 > x1 and y2 > y1 must hold",
            x1,
            y1,
            x2,
            y2
        );
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn xyxy(&self) -> [i64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn x1(&self) -> i64 {
        self.x1
    }

    pub fn y1(&self) -> i64 {
        self.y1
    }

    pub fn x2(&self) -> i64 {
        self.x2
    }

    pub fn y2(&self) -> i64 {
        self.y2
    }

    /// Projects the box onto a grid of the given stride, flooring every coordinate.
    ///
    /// The projected box may be empty when the box is narrower than the stride.
    pub fn to_grid(&self, stride: i64) -> Result<TLBR<i64>> {
        ensure!(stride > 0, "stride must be positive, but get {}", stride);
        Ok(TLBR {
            t: self.y1.div_euclid(stride),
            l: self.x1.div_euclid(stride),
            b: self.y2.div_euclid(stride),
            r: self.x2.div_euclid(stride),
        })
    }

    /// Fails unless the box lies inside an image of the given size.
    pub fn ensure_within(&self, height: i64, width: i64) -> Result<()> {
        ensure!(
            self.x1 >= 0 && self.y1 >= 0 && self.x2 <= width && self.y2 <= height,
            "box ({}, {}, {}, {}) exceeds the image bounds {}x{}",
            self.x1,
            self.y1,
            self.x2,
            self.y2,
            height,
            width
        );
        Ok(())
    }

    /// Clips the box to an image of the given size, returning `None` if nothing remains.
    pub fn clip(&self, height: i64, width: i64) -> Option<Self> {
        let x1 = self.x1.max(0);
        let y1 = self.y1.max(0);
        let x2 = self.x2.min(width);
        let y2 = self.y2.min(height);
        Self::try_from_xyxy([x1, y1, x2, y2]).ok()
    }
}

impl Rect for RoiBox {
    type Type = i64;

    fn t(&self) -> Self::Type {
        self.y1
    }

    fn l(&self) -> Self::Type {
        self.x1
    }

    fn b(&self) -> Self::Type {
        self.y2
    }

    fn r(&self) -> Self::Type {
        self.x2
    }

    fn h(&self) -> Self::Type {
        self.y2 - self.y1
    }

    fn w(&self) -> Self::Type {
        self.x2 - self.x1
    }

    fn try_from_tlbr(tlbr: [Self::Type; 4]) -> Result<Self> {
        let [t, l, b, r] = tlbr;
        Self::try_from_xyxy([l, t, r, b])
    }
}
