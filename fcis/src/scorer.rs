//! Per-ROI classification and segmentation scoring.

use crate::{
    assemble::INSIDE,
    common::*,
    labeler::RoiSupervision,
    tensor::ToHost,
    volume::ScoreVolume,
};

pub use roi_prediction::*;
pub use roi_scorer::*;
pub use scorer_loss::*;

mod roi_prediction {
    use super::*;

    /// The prediction of a scored ROI, materialized on the host.
    #[derive(Debug, Clone)]
    pub struct RoiPrediction {
        /// The position of the ROI in the input proposal list.
        pub roi_index: usize,
        pub roi: RoiBox,
        /// The arg-max of `class_scores`.
        pub class: i32,
        /// The `(C+1,)` classification score.
        pub class_scores: Array1<f32>,
        /// The top classification score.
        pub confidence: R64,
        /// The inside probability of the predicted class at the volume-frame ROI size.
        pub mask_prob: Array2<f32>,
        /// The supervised class, if ground truth is given.
        pub target_class: Option<i32>,
    }
}

mod scorer_loss {
    use super::*;

    /// Averaged training losses of one scoring call.
    #[derive(Debug, TensorLike)]
    pub struct ScorerLoss {
        /// `loss_cls + loss_seg`
        pub loss: Tensor,
        /// Classification cross-entropy averaged over scored ROIs.
        pub loss_cls: Tensor,
        /// Inside/outside cross-entropy averaged over positive scored ROIs.
        pub loss_seg: Tensor,
    }

    /// The result of one scoring call.
    #[derive(Debug)]
    pub struct ScorerOutput {
        /// Present only when supervision is given.
        pub loss: Option<ScorerLoss>,
        /// The number of ROIs contributing to the classification loss.
        pub num_cls_samples: usize,
        /// The number of ROIs contributing to the segmentation loss.
        pub num_seg_samples: usize,
        /// Predictions of scored ROIs, in input order. Skipped ROIs are absent.
        pub predictions: Vec<RoiPrediction>,
    }
}

mod roi_scorer {
    use super::*;

    /// Scores ROIs on a position-sensitive score volume.
    #[derive(Debug, Clone, Default)]
    pub struct RoiScorer {
        _private: (),
    }

    impl RoiScorer {
        pub fn new() -> Self {
            Self::default()
        }

        /// Scores every ROI that is at least `k` cells tall and wide in the volume frame.
        ///
        /// With supervision, classification and segmentation losses are
        /// accumulated in input order and averaged independently. The segmentation
        /// loss is zero when no positive ROI is scored.
        pub fn forward(
            &self,
            volume: &ScoreVolume,
            rois: &[RoiBox],
            supervision: Option<&[RoiSupervision]>,
        ) -> Result<ScorerOutput> {
            if let Some(supervision) = supervision {
                ensure!(
                    supervision.len() == rois.len(),
                    "expect {} ROI supervision records, but get {}",
                    rois.len(),
                    supervision.len()
                );
            }

            let device = volume.device();
            let num_classes = volume.num_classes() as i32;
            let mut cls_losses = vec![];
            let mut seg_losses = vec![];
            let mut predictions = vec![];

            for (roi_index, roi) in rois.iter().enumerate() {
                let target = supervision.map(|supervision| &supervision[roi_index]);

                // (2, C+1, h, w)
                let roi_score = match volume.assemble_roi(roi)? {
                    Some(score) => score,
                    None => {
                        debug!(
                            "skip ROI {} {:?}: smaller than {} cells in the score volume",
                            roi_index,
                            roi.xyxy(),
                            volume.kernel_size()
                        );
                        continue;
                    }
                };
                let (_, class_dim, height, width) = roi_score.size4()?;

                // classification score: inside/outside max per pixel, averaged over pixels
                let cls_score = roi_score
                    .max_dim(0, false)
                    .0
                    .view([class_dim, height * width])
                    .mean_dim(&[1], false, Kind::Float);

                if let Some(target) = target {
                    ensure!(
                        (0..=num_classes).contains(&target.class),
                        "supervised class {} is out of range [0, {}]",
                        target.class,
                        num_classes
                    );
                    let target_tensor =
                        Tensor::of_slice(&[target.class as i64]).to_device(device);
                    cls_losses.push(
                        cls_score
                            .view([1, class_dim])
                            .cross_entropy_for_logits(&target_tensor),
                    );

                    if target.is_positive() {
                        let segmentation = target.segmentation.as_ref().ok_or_else(|| {
                            format_err!("positive ROI {} has no segmentation", roi_index)
                        })?;
                        seg_losses.push(segmentation_loss(
                            &roi_score.select(1, target.class as i64),
                            segmentation,
                        )?);
                    }
                }

                // the synchronization point: predictions move to the host
                let class_scores = cls_score.to_host_1d()?;
                let (class, confidence) = arg_max(&class_scores)?;
                let mask_prob = roi_score
                    .select(1, class as i64)
                    .softmax(0, Kind::Float)
                    .select(0, INSIDE)
                    .to_host_2d()?;

                predictions.push(RoiPrediction {
                    roi_index,
                    roi: *roi,
                    class: class as i32,
                    class_scores,
                    confidence,
                    mask_prob,
                    target_class: target.map(|target| target.class),
                });
            }

            let num_cls_samples = cls_losses.len();
            let num_seg_samples = seg_losses.len();
            let loss = supervision.map(|_| {
                let loss_cls = mean_loss(cls_losses, device);
                let loss_seg = mean_loss(seg_losses, device);
                ScorerLoss {
                    loss: &loss_cls + &loss_seg,
                    loss_cls,
                    loss_seg,
                }
            });

            debug!(
                "scored {} of {} ROIs, {} with segmentation targets",
                predictions.len(),
                rois.len(),
                num_seg_samples
            );

            Ok(ScorerOutput {
                loss,
                num_cls_samples,
                num_seg_samples,
                predictions,
            })
        }
    }

    /// Two-way inside/outside cross-entropy averaged over pixels.
    fn segmentation_loss(io_score: &Tensor, segmentation: &Array2<bool>) -> Result<Tensor> {
        let (_, height, width) = io_score.size3()?;
        let target = label::resize(segmentation.view(), height as usize, width as usize)?;
        let target: Vec<i64> = target.iter().map(|&inside| inside as i64).collect();
        let target = Tensor::of_slice(&target).to_device(io_score.device());

        let logits = io_score.view([2, height * width]).transpose(0, 1);
        Ok(logits.cross_entropy_for_logits(&target))
    }

    /// Averages a list of scalar losses in list order, or zero if empty.
    fn mean_loss(losses: Vec<Tensor>, device: Device) -> Tensor {
        let count = losses.len();
        let sum = losses.into_iter().reduce(|lhs, rhs| lhs + rhs);
        match sum {
            Some(sum) => sum / count as f64,
            None => Tensor::zeros(&[], (Kind::Float, device)),
        }
    }

    /// The first maximal entry of a score vector.
    fn arg_max(scores: &Array1<f32>) -> Result<(usize, R64)> {
        let (index, &score) = scores
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, &f32)>, (index, score)| match best {
                Some((_, best_score)) if score <= best_score => best,
                _ => Some((index, score)),
            })
            .ok_or_else(|| format_err!("empty classification score"))?;
        let confidence =
            R64::try_new(score as f64).ok_or_else(|| format_err!("NaN detected in class scores"))?;
        Ok((index, confidence))
    }
}
