//! Position-sensitive score assembly.
//!
//! A position-sensitive score volume carries `2·k²·(C+1)` channels: an
//! inside/outside pair for every class at each of the `k×k` relative positions
//! of a region. Assembly splits a region into a `k×k` grid of cells and lets
//! each pixel read the channel group of the cell it falls into, yielding a
//! `(2, C+1, h, w)` inside/outside score map.

use crate::common::*;

/// Index of the outside score on the inside/outside axis.
pub const OUTSIDE: i64 = 0;
/// Index of the inside score on the inside/outside axis.
pub const INSIDE: i64 = 1;

/// The decomposition of the score volume channel axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelLayout {
    /// `channel = io·k²·(C+1) + cell·(C+1) + class`
    InsideOutsideMajor,
    /// `channel = cell·2·(C+1) + class·2 + io`
    CellMajor,
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self::InsideOutsideMajor
    }
}

impl ChannelLayout {
    /// Returns the input channel holding the score of `(io, cell, class)`.
    pub fn channel_index(
        &self,
        io: usize,
        cell: usize,
        class: usize,
        kernel_size: usize,
        num_classes: usize,
    ) -> usize {
        let num_cells = kernel_size * kernel_size;
        let class_dim = num_classes + 1;

        match self {
            Self::InsideOutsideMajor => io * num_cells * class_dim + cell * class_dim + class,
            Self::CellMajor => cell * 2 * class_dim + class * 2 + io,
        }
    }

    /// Rearranges a `(2·k²·(C+1), h, w)` tensor into `(k², 2, C+1, h, w)`.
    fn to_cell_first(&self, slice: &Tensor, kernel_size: i64, num_classes: i64) -> Result<Tensor> {
        let (_, height, width) = slice.size3()?;
        let num_cells = kernel_size * kernel_size;
        let class_dim = num_classes + 1;

        let output = match self {
            Self::InsideOutsideMajor => slice
                .f_view(&[2, num_cells, class_dim, height, width] as &[_])?
                .permute(&[1, 0, 2, 3, 4]),
            Self::CellMajor => slice
                .f_view(&[num_cells, class_dim, 2, height, width] as &[_])?
                .permute(&[0, 2, 1, 3, 4]),
        };
        Ok(output)
    }
}

/// The half-open range `[⌊index·len/k⌋, ⌊(index+1)·len/k⌋)` covered by one of the `k` cells along an axis.
pub fn cell_bounds(len: i64, kernel_size: i64, index: i64) -> (i64, i64) {
    (
        index * len / kernel_size,
        (index + 1) * len / kernel_size,
    )
}

/// The row-major cell index of pixel `(y, x)` in an `h×w` region split into `k×k` cells.
pub fn cell_index(y: i64, x: i64, height: i64, width: i64, kernel_size: i64) -> i64 {
    let ky = ((y + 1) * kernel_size - 1) / height;
    let kx = ((x + 1) * kernel_size - 1) / width;
    ky * kernel_size + kx
}

/// Assembles a `(2·k²·(C+1), h, w)` score slice into a `(2, C+1, h, w)` score map.
///
/// The region must be at least `k` pixels along both axes so that every cell
/// is non-empty. The operation is differentiable with respect to the slice.
pub fn assemble(
    slice: &Tensor,
    kernel_size: usize,
    num_classes: usize,
    layout: ChannelLayout,
) -> Result<Tensor> {
    let (channels, height, width) = slice
        .size3()
        .map_err(|_| format_err!("expect a 3d score slice, but get shape {:?}", slice.size()))?;
    let k = kernel_size as i64;
    let expect_channels = 2 * k * k * (num_classes as i64 + 1);

    ensure!(k >= 1, "kernel size must be positive");
    ensure!(
        channels == expect_channels,
        "channel count mismatch: expect 2*{}^2*({}+1) = {}, but get {}",
        k,
        num_classes,
        expect_channels,
        channels
    );
    ensure!(
        height >= k && width >= k,
        "a {}x{} region cannot be split into {}x{} cells",
        height,
        width,
        k,
        k
    );

    let cell_first = layout.to_cell_first(slice, k, num_classes as i64)?;

    let rows: Vec<Tensor> = (0..k)
        .map(|ky| {
            let (top, bottom) = cell_bounds(height, k, ky);
            let cells: Vec<Tensor> = (0..k)
                .map(|kx| {
                    let (left, right) = cell_bounds(width, k, kx);
                    cell_first
                        .select(0, ky * k + kx)
                        .narrow(2, top, bottom - top)
                        .narrow(3, left, right - left)
                })
                .collect();
            Tensor::cat(&cells, 3)
        })
        .collect();

    Ok(Tensor::cat(&rows, 2))
}
