use crate::common::*;

/// Resizes a label grid with nearest-neighbour sampling.
///
/// Target pixel `(y, x)` reads source pixel `(y * h / th, x * w / tw)`, so
/// discrete label values are preserved.
pub fn resize<T>(grid: ArrayView2<T>, height: usize, width: usize) -> Result<Array2<T>>
where
    T: Copy,
{
    let (src_h, src_w) = grid.dim();
    ensure!(
        src_h > 0 && src_w > 0,
        "cannot resize an empty {}x{} grid",
        src_h,
        src_w
    );
    ensure!(
        height > 0 && width > 0,
        "target size {}x{} must be non-empty",
        height,
        width
    );

    if (src_h, src_w) == (height, width) {
        return Ok(grid.to_owned());
    }

    let resized = Array2::from_shape_fn((height, width), |(y, x)| {
        grid[[y * src_h / height, x * src_w / width]]
    });
    Ok(resized)
}

/// Copies the region of a grid covered by a rectangle.
pub fn crop<T, R>(grid: ArrayView2<T>, rect: &R) -> Result<Array2<T>>
where
    T: Clone,
    R: Rect<Type = i64>,
{
    let (height, width) = grid.dim();
    let [t, l, b, r] = rect.tlbr();
    ensure!(
        t >= 0 && l >= 0 && b <= height as i64 && r <= width as i64 && b >= t && r >= l,
        "crop region (t={}, l={}, b={}, r={}) exceeds the {}x{} grid",
        t,
        l,
        b,
        r,
        height,
        width
    );
    let (t, l, b, r) = (t as usize, l as usize, b as usize, r as usize);
    Ok(grid.slice(s![t..b, l..r]).to_owned())
}

/// Fails unless both grids have the same shape.
pub fn ensure_same_shape<A, B>(lhs: ArrayView2<A>, rhs: ArrayView2<B>) -> Result<()> {
    ensure!(
        lhs.dim() == rhs.dim(),
        "label grid shapes mismatch: {:?} vs {:?}",
        lhs.dim(),
        rhs.dim()
    );
    Ok(())
}
