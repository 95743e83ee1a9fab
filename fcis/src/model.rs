//! The backbone network and the end-to-end model.

use crate::{
    assemble::ChannelLayout,
    common::*,
    config::Config,
    head::{FcisHead, FcisHeadInit, FcisOutput, GroundTruth},
    volume::ScoreVolume,
};

pub use backbone::*;
pub use fcis_model::*;

mod backbone {
    use super::*;

    /// A feature extractor producing a dense feature map at a fixed stride.
    pub trait Backbone: Debug + Send {
        /// Maps a `(B, 3, H, W)` image batch to `(B, out_channels, H/stride, W/stride)`.
        fn forward_t(&self, input: &Tensor, train: bool) -> Tensor;

        fn stride(&self) -> i64;

        fn out_channels(&self) -> i64;
    }

    /// The VGG-16 layers up to conv4_3.
    #[derive(Debug)]
    pub struct VggBackbone {
        blocks: Vec<Vec<nn::Conv2D>>,
    }

    impl VggBackbone {
        const BLOCKS: [&'static [i64]; 4] = [
            &[64, 64],
            &[128, 128],
            &[256, 256, 256],
            &[512, 512, 512],
        ];

        pub fn new<'p, P>(path: P) -> Self
        where
            P: Borrow<nn::Path<'p>>,
        {
            let path = path.borrow();
            let mut in_c = 3;

            let blocks = Self::BLOCKS
                .iter()
                .enumerate()
                .map(|(block_index, channels)| {
                    channels
                        .iter()
                        .enumerate()
                        .map(|(conv_index, &out_c)| {
                            let conv = nn::conv2d(
                                path / format!("conv{}_{}", block_index + 1, conv_index + 1),
                                in_c,
                                out_c,
                                3,
                                nn::ConvConfig {
                                    padding: 1,
                                    ..Default::default()
                                },
                            );
                            in_c = out_c;
                            conv
                        })
                        .collect()
                })
                .collect();

            Self { blocks }
        }
    }

    impl Backbone for VggBackbone {
        fn forward_t(&self, input: &Tensor, _train: bool) -> Tensor {
            let num_blocks = self.blocks.len();

            self.blocks
                .iter()
                .enumerate()
                .fold(input.shallow_clone(), |xs, (index, block)| {
                    let xs = block.iter().fold(xs, |xs, conv| xs.apply(conv).relu());
                    // no pooling after the last block
                    if index + 1 < num_blocks {
                        xs.max_pool2d_default(2)
                    } else {
                        xs
                    }
                })
        }

        fn stride(&self) -> i64 {
            8
        }

        fn out_channels(&self) -> i64 {
            512
        }
    }
}

mod fcis_model {
    use super::*;

    #[derive(Debug, Clone)]
    pub struct FcisInit {
        pub num_classes: usize,
        pub kernel_size: usize,
        pub channel_layout: ChannelLayout,
        pub head: FcisHeadInit,
    }

    impl FcisInit {
        pub fn new(num_classes: usize) -> Self {
            Self {
                num_classes,
                kernel_size: 7,
                channel_layout: ChannelLayout::default(),
                head: Default::default(),
            }
        }

        pub fn from_config(config: &Config) -> Self {
            Self {
                num_classes: config.model.num_classes,
                kernel_size: config.model.kernel_size,
                channel_layout: config.model.channel_layout,
                head: config.head_init(),
            }
        }

        /// Builds the model with a VGG backbone.
        pub fn build<'p, P>(self, path: P) -> Result<Fcis>
        where
            P: Borrow<nn::Path<'p>>,
        {
            let path = path.borrow();
            let backbone = VggBackbone::new(path / "backbone");
            self.build_with_backbone(path, Box::new(backbone))
        }

        pub fn build_with_backbone<'p, P>(
            self,
            path: P,
            backbone: Box<dyn Backbone>,
        ) -> Result<Fcis>
        where
            P: Borrow<nn::Path<'p>>,
        {
            let path = path.borrow();
            let Self {
                num_classes,
                kernel_size,
                channel_layout,
                head,
            } = self;

            ensure!(num_classes >= 1, "num_classes must be positive");
            ensure!(kernel_size >= 1, "kernel_size must be positive");

            let score_fr = nn::conv2d(
                path / "score_fr",
                backbone.out_channels(),
                ScoreVolume::num_channels(kernel_size, num_classes),
                1,
                Default::default(),
            );

            Ok(Fcis {
                num_classes,
                kernel_size,
                channel_layout,
                backbone,
                score_fr,
                head: head.build()?,
            })
        }
    }

    /// The fully convolutional instance-aware segmentation model.
    #[derive(Debug, CopyGetters, Getters)]
    pub struct Fcis {
        #[getset(get_copy = "pub")]
        num_classes: usize,
        #[getset(get_copy = "pub")]
        kernel_size: usize,
        #[getset(get_copy = "pub")]
        channel_layout: ChannelLayout,
        backbone: Box<dyn Backbone>,
        score_fr: nn::Conv2D,
        #[getset(get = "pub")]
        head: FcisHead,
    }

    impl Fcis {
        /// Computes the score volume of a `(3, H, W)` or `(1, 3, H, W)` image.
        pub fn score_volume(&self, image: &Tensor, train: bool) -> Result<ScoreVolume> {
            let image = Self::batched_image(image)?;
            let volume = self
                .backbone
                .forward_t(&image, train)
                .apply(&self.score_fr);

            ScoreVolume::new(
                volume,
                self.kernel_size,
                self.num_classes,
                self.backbone.stride(),
                self.channel_layout,
            )
        }

        /// Runs the model on one image.
        ///
        /// Returns `Ok(None)` when `rois` is empty. Losses and the report are
        /// present only when ground truth is given.
        pub fn forward(
            &self,
            image: &Tensor,
            ground_truth: Option<&GroundTruth>,
            rois: &[RoiBox],
            train: bool,
        ) -> Result<Option<FcisOutput>> {
            if rois.is_empty() {
                return Ok(None);
            }

            let (_, _, height, width) = Self::batched_image(image)?.size4()?;
            let volume = self.score_volume(image, train)?;
            self.head.forward(
                &volume,
                [height as usize, width as usize],
                ground_truth,
                rois,
            )
        }

        /// Draws a balanced subset of training ROIs.
        pub fn sample_training_rois(
            &self,
            rois: &[RoiBox],
            ground_truth: &GroundTruth,
        ) -> Result<Vec<RoiBox>> {
            self.head.sample_rois(rois, ground_truth)
        }

        fn batched_image(image: &Tensor) -> Result<Tensor> {
            let image = match image.dim() {
                3 => image.unsqueeze(0),
                4 => image.shallow_clone(),
                _ => bail!("expect a 3d or 4d image, but get shape {:?}", image.size()),
            };
            let (batch_size, channels, _, _) = image.size4()?;
            ensure!(
                batch_size == 1 && channels == 3,
                "expect a single 3-channel image, but get shape {:?}",
                image.size()
            );
            Ok(image)
        }
    }
}
