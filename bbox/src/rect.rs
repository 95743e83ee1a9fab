use super::{HW, TLBR};
use crate::common::*;

/// The generic rectangle.
pub trait Rect {
    type Type;

    fn t(&self) -> Self::Type;
    fn l(&self) -> Self::Type;
    fn b(&self) -> Self::Type;
    fn r(&self) -> Self::Type;
    fn h(&self) -> Self::Type;
    fn w(&self) -> Self::Type;

    fn try_from_tlbr(tlbr: [Self::Type; 4]) -> Result<Self>
    where
        Self: Sized;
}

pub trait RectNum: Rect
where
    Self::Type: Num + PartialOrd + Copy,
{
    fn tlbr(&self) -> [Self::Type; 4] {
        [self.t(), self.l(), self.b(), self.r()]
    }

    fn tlhw(&self) -> [Self::Type; 4] {
        [self.t(), self.l(), self.h(), self.w()]
    }

    fn hw(&self) -> [Self::Type; 2] {
        [self.h(), self.w()]
    }

    fn to_hw(&self) -> HW<Self::Type> {
        let [h, w] = self.hw();
        HW { h, w }
    }

    fn area(&self) -> Self::Type {
        self.h() * self.w()
    }

    /// Compute intersection area in TLBR format.
    fn intersect_with<R>(&self, other: &R) -> Option<TLBR<Self::Type>>
    where
        R: Rect<Type = Self::Type>,
    {
        let t = max_of(self.t(), other.t());
        let l = max_of(self.l(), other.l());
        let b = min_of(self.b(), other.b());
        let r = min_of(self.r(), other.r());
        (b > t && r > l).then(|| TLBR { t, l, b, r })
    }

    fn intersection_area_with<R>(&self, other: &R) -> Self::Type
    where
        R: Rect<Type = Self::Type>,
    {
        self.intersect_with(other)
            .map(|rect| rect.area())
            .unwrap_or_else(Self::Type::zero)
    }

    /// Intersection over union. Empty unions yield zero.
    fn iou_with<R>(&self, other: &R) -> f64
    where
        R: Rect<Type = Self::Type>,
        Self::Type: ToPrimitive,
    {
        let to_f64 = |value: Self::Type| value.to_f64().unwrap_or(0.0);
        let inter_area = to_f64(self.intersection_area_with(other));
        let union_area = to_f64(self.area()) + to_f64(other.h() * other.w()) - inter_area;

        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }
}

impl<T> RectNum for T
where
    T: Rect,
    T::Type: Num + PartialOrd + Copy,
{
}

fn max_of<T: PartialOrd>(lhs: T, rhs: T) -> T {
    if lhs >= rhs {
        lhs
    } else {
        rhs
    }
}

fn min_of<T: PartialOrd>(lhs: T, rhs: T) -> T {
    if lhs <= rhs {
        lhs
    } else {
        rhs
    }
}
