//! Region proposal generation.

use crate::common::*;

/// Generates candidate object boxes for an image.
pub trait RegionProposer: Debug {
    /// Proposes boxes for a `(C, H, W)` or `(1, C, H, W)` image. No ordering is implied.
    fn propose(&self, image: &Tensor) -> Result<Vec<RoiBox>>;
}

#[derive(Debug, Clone)]
pub struct SlidingWindowProposerInit {
    /// Window `[height, width]` sizes in pixels.
    pub window_sizes: Vec<[i64; 2]>,
    /// The window step as a ratio of the window size.
    pub step_ratio: R64,
}

impl Default for SlidingWindowProposerInit {
    fn default() -> Self {
        Self {
            window_sizes: vec![[64, 64], [128, 128], [64, 128], [128, 64], [256, 256]],
            step_ratio: r64(0.5),
        }
    }
}

impl SlidingWindowProposerInit {
    pub fn build(self) -> Result<SlidingWindowProposer> {
        let Self {
            window_sizes,
            step_ratio,
        } = self;

        ensure!(!window_sizes.is_empty(), "window_sizes must not be empty");
        ensure!(
            window_sizes.iter().all(|&[h, w]| h > 0 && w > 0),
            "window sizes must be positive"
        );
        ensure!(
            step_ratio > 0.0 && step_ratio <= 1.0,
            "step_ratio must be in range (0, 1]"
        );

        Ok(SlidingWindowProposer {
            window_sizes,
            step_ratio: step_ratio.raw(),
        })
    }
}

/// Proposes windows of fixed sizes slid over the image, clipped to its bounds.
#[derive(Debug, Clone)]
pub struct SlidingWindowProposer {
    window_sizes: Vec<[i64; 2]>,
    step_ratio: f64,
}

impl SlidingWindowProposer {
    pub fn propose_for_size(&self, height: i64, width: i64) -> Vec<RoiBox> {
        self.window_sizes
            .iter()
            .flat_map(|&[window_h, window_w]| {
                let step_y = ((window_h as f64 * self.step_ratio) as i64).max(1);
                let step_x = ((window_w as f64 * self.step_ratio) as i64).max(1);
                let ys = (0..height).step_by(step_y as usize);
                let xs = (0..width).step_by(step_x as usize);

                ys.cartesian_product(xs).filter_map(move |(y, x)| {
                    RoiBox::try_from_xyxy([x, y, x + window_w, y + window_h])
                        .ok()?
                        .clip(height, width)
                })
            })
            .unique()
            .collect()
    }
}

impl RegionProposer for SlidingWindowProposer {
    fn propose(&self, image: &Tensor) -> Result<Vec<RoiBox>> {
        let size = image.size();
        ensure!(
            size.len() == 3 || size.len() == 4,
            "expect a 3d or 4d image, but get shape {:?}",
            size
        );
        let height = size[size.len() - 2];
        let width = size[size.len() - 1];
        Ok(self.propose_for_size(height, width))
    }
}
