//! Labeling, scoring, aggregation and reporting on a precomputed score volume.

use crate::{
    aggregate::{InstanceAggregator, InstanceAggregatorInit, InstanceMaps},
    common::*,
    labeler::{RegionProposalLabeler, RegionProposalLabelerInit, RoiSupervision},
    metrics,
    report::{self, Report},
    sampler::{PositiveNegativeSampler, PositiveNegativeSamplerInit},
    scorer::{RoiPrediction, RoiScorer, ScorerLoss},
    tensor::ToHost,
    volume::ScoreVolume,
};

/// Ground-truth label maps of one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundTruth {
    /// Class per pixel, `0` for background and `-1` for ignored pixels.
    pub class_map: Array2<i32>,
    /// Instance id per pixel, `-1` outside any instance.
    pub instance_map: Array2<i32>,
}

impl GroundTruth {
    pub fn new(class_map: Array2<i32>, instance_map: Array2<i32>) -> Result<Self> {
        label::ensure_same_shape(class_map.view(), instance_map.view())?;
        Ok(Self {
            class_map,
            instance_map,
        })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.class_map.dim()
    }
}

/// The result of one forward call with a non-empty ROI set.
#[derive(Debug)]
pub struct FcisOutput {
    /// Training losses, present with ground truth.
    pub loss: Option<ScorerLoss>,
    /// Supervision of every input ROI, present with ground truth.
    pub supervision: Option<Vec<RoiSupervision>>,
    /// Predictions of scored ROIs. ROIs skipped for their size are absent.
    pub predictions: Vec<RoiPrediction>,
    /// The aggregated class and instance label maps.
    pub maps: InstanceMaps,
    /// Scalar losses and metrics, present with ground truth.
    pub report: Option<Report>,
}

#[derive(Debug, Clone, Default)]
pub struct FcisHeadInit {
    pub labeler: RegionProposalLabelerInit,
    pub sampler: PositiveNegativeSamplerInit,
    pub aggregator: InstanceAggregatorInit,
}

impl FcisHeadInit {
    pub fn build(self) -> Result<FcisHead> {
        let Self {
            labeler,
            sampler,
            aggregator,
        } = self;

        Ok(FcisHead {
            labeler: labeler.build()?,
            sampler: sampler.build()?,
            scorer: RoiScorer::new(),
            aggregator: aggregator.build()?,
        })
    }
}

/// Turns a score volume and ROIs into losses, predictions and label maps.
#[derive(Debug, Clone)]
pub struct FcisHead {
    labeler: RegionProposalLabeler,
    sampler: PositiveNegativeSampler,
    scorer: RoiScorer,
    aggregator: InstanceAggregator,
}

impl FcisHead {
    /// Selects a balanced subset of ROIs for training, keeping the sampled order.
    pub fn sample_rois(&self, rois: &[RoiBox], ground_truth: &GroundTruth) -> Result<Vec<RoiBox>> {
        let supervision = self.labeler.label(
            rois,
            ground_truth.instance_map.view(),
            ground_truth.class_map.view(),
        )?;
        let is_positive: Vec<bool> = supervision.iter().map(|sup| sup.is_positive()).collect();
        let rois = self
            .sampler
            .sample(&is_positive)
            .into_iter()
            .map(|index| rois[index])
            .collect();
        Ok(rois)
    }

    /// Runs the head on one image of size `image_hw`.
    ///
    /// Returns `Ok(None)` when `rois` is empty. Boxes outside the image and
    /// ground truth of the wrong size are errors.
    pub fn forward(
        &self,
        volume: &ScoreVolume,
        image_hw: [usize; 2],
        ground_truth: Option<&GroundTruth>,
        rois: &[RoiBox],
    ) -> Result<Option<FcisOutput>> {
        if rois.is_empty() {
            debug!("no ROIs given, nothing to do");
            return Ok(None);
        }

        let [height, width] = image_hw;
        for roi in rois {
            roi.ensure_within(height as i64, width as i64)?;
        }
        if let Some(ground_truth) = ground_truth {
            ensure!(
                ground_truth.dim() == (height, width),
                "ground truth size {:?} differs from the image size {:?}",
                ground_truth.dim(),
                (height, width)
            );
        }

        let supervision = ground_truth
            .map(|ground_truth| {
                self.labeler.label(
                    rois,
                    ground_truth.instance_map.view(),
                    ground_truth.class_map.view(),
                )
            })
            .transpose()?;

        let output = self
            .scorer
            .forward(volume, rois, supervision.as_deref())?;
        if supervision.is_some() && output.num_seg_samples == 0 {
            warn!("no positive ROI is scored, the segmentation loss is zero");
        }

        let maps = self.aggregator.aggregate(&output.predictions, height, width)?;

        let report = match (ground_truth, &output.loss) {
            (Some(ground_truth), Some(loss)) => Some(Self::report(
                volume.num_classes(),
                ground_truth,
                loss,
                &output.predictions,
                &maps,
            )?),
            _ => None,
        };

        Ok(Some(FcisOutput {
            loss: output.loss,
            supervision,
            predictions: output.predictions,
            maps,
            report,
        }))
    }

    fn report(
        num_classes: usize,
        ground_truth: &GroundTruth,
        loss: &ScorerLoss,
        predictions: &[RoiPrediction],
        maps: &InstanceMaps,
    ) -> Result<Report> {
        let (predicted, truth): (Vec<i32>, Vec<i32>) = predictions
            .iter()
            .filter_map(|prediction| Some((prediction.class, prediction.target_class?)))
            .unzip();
        let label_score = metrics::label_accuracy_score(
            ground_truth.class_map.view(),
            maps.class_map.view(),
            num_classes + 1,
        )?;
        let instance_score = metrics::instance_label_accuracy_score(
            ground_truth.instance_map.view(),
            maps.instance_map.view(),
        )?;

        let mut report = Report::new();
        report.insert(report::LOSS, Some(loss.loss.to_host_scalar()? as f64))?;
        report.insert(report::LOSS_CLS, Some(loss.loss_cls.to_host_scalar()? as f64))?;
        report.insert(report::LOSS_SEG, Some(loss.loss_seg.to_host_scalar()? as f64))?;
        report.insert(report::ACCURACY, metrics::accuracy(&predicted, &truth)?)?;
        report.insert(report::CLS_IU, label_score.mean_iu)?;
        report.insert(report::INS_IU, instance_score)?;
        Ok(report)
    }
}
