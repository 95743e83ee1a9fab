use crate::{
    assemble::{assemble, ChannelLayout},
    common::*,
};

/// A dense position-sensitive score volume of one image.
///
/// The wrapped tensor has shape `(2·k²·(C+1), H', W')` and lives on whatever
/// device produced it. `H'` and `W'` are the image size divided by the stride.
#[derive(Debug, Getters, CopyGetters)]
pub struct ScoreVolume {
    #[getset(get = "pub")]
    tensor: Tensor,
    #[getset(get_copy = "pub")]
    kernel_size: usize,
    #[getset(get_copy = "pub")]
    num_classes: usize,
    #[getset(get_copy = "pub")]
    stride: i64,
    #[getset(get_copy = "pub")]
    layout: ChannelLayout,
}

impl ScoreVolume {
    /// Wraps a `(C', H', W')` or `(1, C', H', W')` tensor.
    ///
    /// Fails if the channel count differs from `2·k²·(C+1)`.
    pub fn new(
        tensor: Tensor,
        kernel_size: usize,
        num_classes: usize,
        stride: i64,
        layout: ChannelLayout,
    ) -> Result<Self> {
        ensure!(kernel_size >= 1, "kernel size must be positive");
        ensure!(stride >= 1, "stride must be positive");

        let tensor = match tensor.dim() {
            3 => tensor,
            4 => {
                let batch_size = tensor.size()[0];
                ensure!(
                    batch_size == 1,
                    "expect a single-image score volume, but get batch size {}",
                    batch_size
                );
                tensor.squeeze_dim(0)
            }
            _ => bail!(
                "expect a 3d or 4d score volume, but get shape {:?}",
                tensor.size()
            ),
        };

        let channels = tensor.size()[0];
        let expect_channels = Self::num_channels(kernel_size, num_classes);
        ensure!(
            channels == expect_channels,
            "score volume channel count mismatch: expect 2*{}^2*({}+1) = {}, but get {}",
            kernel_size,
            num_classes,
            expect_channels,
            channels
        );

        Ok(Self {
            tensor,
            kernel_size,
            num_classes,
            stride,
            layout,
        })
    }

    /// The channel count `2·k²·(C+1)` of a score volume.
    pub fn num_channels(kernel_size: usize, num_classes: usize) -> i64 {
        (2 * kernel_size * kernel_size * (num_classes + 1)) as i64
    }

    pub fn device(&self) -> Device {
        self.tensor.device()
    }

    pub fn height(&self) -> i64 {
        self.tensor.size()[1]
    }

    pub fn width(&self) -> i64 {
        self.tensor.size()[2]
    }

    /// Projects a pixel-frame ROI into the volume frame.
    pub fn roi_extent(&self, roi: &RoiBox) -> Result<TLBR<i64>> {
        let extent = roi.to_grid(self.stride)?;
        ensure!(
            extent.b() <= self.height() && extent.r() <= self.width(),
            "box {:?} falls outside the {}x{} score volume",
            roi.xyxy(),
            self.height(),
            self.width()
        );
        Ok(extent)
    }

    /// Assembles the `(2, C+1, h, w)` score map of a ROI.
    ///
    /// Returns `None` when the ROI is smaller than the kernel size in the
    /// volume frame. Such ROIs take no part in scoring.
    pub fn assemble_roi(&self, roi: &RoiBox) -> Result<Option<Tensor>> {
        let extent = self.roi_extent(roi)?;
        let [top, left, height, width] = extent.tlhw();
        let k = self.kernel_size as i64;

        if height < k || width < k {
            return Ok(None);
        }

        let slice = self
            .tensor
            .narrow(1, top, height)
            .narrow(2, left, width);
        let score = assemble(&slice, self.kernel_size, self.num_classes, self.layout)?;
        Ok(Some(score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_count_is_checked() {
        let options = (Kind::Float, Device::Cpu);
        let volume = ScoreVolume::new(
            Tensor::zeros(&[1, 2 * 9 * 3, 8, 8], options),
            3,
            2,
            8,
            ChannelLayout::default(),
        );
        assert!(volume.is_ok());

        let mismatch = ScoreVolume::new(
            Tensor::zeros(&[2 * 9 * 3 + 1, 8, 8], options),
            3,
            2,
            8,
            ChannelLayout::default(),
        );
        assert!(mismatch.is_err());

        let batched = ScoreVolume::new(
            Tensor::zeros(&[2, 2 * 9 * 3, 8, 8], options),
            3,
            2,
            8,
            ChannelLayout::default(),
        );
        assert!(batched.is_err());
    }

    #[test]
    fn small_rois_are_skipped() -> Result<()> {
        let volume = ScoreVolume::new(
            Tensor::randn(&[2 * 49 * 2, 16, 16], (Kind::Float, Device::Cpu)),
            7,
            1,
            8,
            ChannelLayout::default(),
        )?;

        // 24 pixels tall is 3 cells in the volume frame, less than k = 7
        let short = RoiBox::try_from_xyxy([0, 0, 64, 24])?;
        assert!(volume.assemble_roi(&short)?.is_none());

        let large = RoiBox::try_from_xyxy([8, 16, 72, 80])?;
        let score = volume.assemble_roi(&large)?.unwrap();
        assert_eq!(score.size(), vec![2, 2, 8, 8]);

        let outside = RoiBox::try_from_xyxy([64, 64, 136, 136])?;
        assert!(volume.assemble_roi(&outside).is_err());
        Ok(())
    }
}
