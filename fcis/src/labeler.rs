//! Ground-truth assignment of region proposals.

use crate::common::*;
use label::InstanceLabel;

pub use region_proposal_labeler::*;
pub use roi_supervision::*;

mod roi_supervision {
    use super::*;

    /// The supervision target of one region proposal.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RoiSupervision {
        /// The class in `[0, C]`, zero for background.
        pub class: i32,
        /// The binary instance mask cropped to the ROI pixel extent.
        /// Present only for positive ROIs.
        pub segmentation: Option<Array2<bool>>,
    }

    impl RoiSupervision {
        pub fn background() -> Self {
            Self {
                class: BACKGROUND,
                segmentation: None,
            }
        }

        pub fn is_positive(&self) -> bool {
            self.class != BACKGROUND
        }
    }
}

mod region_proposal_labeler {
    use super::*;

    #[derive(Debug, Clone)]
    pub struct RegionProposalLabelerInit {
        /// A ROI is positive when its best IoU with an instance box exceeds this value.
        pub fg_iou_threshold: R64,
    }

    impl Default for RegionProposalLabelerInit {
        fn default() -> Self {
            Self {
                fg_iou_threshold: r64(0.5),
            }
        }
    }

    impl RegionProposalLabelerInit {
        pub fn build(self) -> Result<RegionProposalLabeler> {
            let Self { fg_iou_threshold } = self;
            ensure!(
                (0.0..=1.0).contains(&fg_iou_threshold.raw()),
                "fg_iou_threshold must be in range [0, 1]"
            );
            Ok(RegionProposalLabeler {
                fg_iou_threshold: fg_iou_threshold.raw(),
            })
        }
    }

    /// Assigns every ROI the class of its best-overlapping ground-truth instance.
    #[derive(Debug, Clone)]
    pub struct RegionProposalLabeler {
        fg_iou_threshold: f64,
    }

    impl RegionProposalLabeler {
        /// Labels ROIs against instance and class grids of the same image.
        ///
        /// Classes come from the grids only. A ROI whose best overlap does not
        /// exceed the threshold is background and carries no segmentation.
        pub fn label(
            &self,
            rois: &[RoiBox],
            instance_map: ArrayView2<i32>,
            class_map: ArrayView2<i32>,
        ) -> Result<Vec<RoiSupervision>> {
            let instances = label::instance_labels(instance_map, class_map)?;
            let (height, width) = instance_map.dim();

            rois.iter()
                .map(|roi| {
                    roi.ensure_within(height as i64, width as i64)?;

                    let supervision = match best_overlap(roi, &instances) {
                        Some((iou, instance)) if iou > self.fg_iou_threshold => {
                            let id = instance.id;
                            let segmentation =
                                label::crop(instance_map, roi)?.mapv(|value| value == id);

                            RoiSupervision {
                                class: instance.label.class,
                                segmentation: Some(segmentation),
                            }
                        }
                        _ => RoiSupervision::background(),
                    };
                    Ok(supervision)
                })
                .collect()
        }
    }

    /// Finds the instance with the largest IoU. Ties go to the first instance.
    fn best_overlap<'a>(
        roi: &RoiBox,
        instances: &'a [InstanceLabel],
    ) -> Option<(f64, &'a InstanceLabel)> {
        instances.iter().fold(None, |best, instance| {
            let iou = roi.iou_with(&instance.label.rect);
            match best {
                Some((best_iou, _)) if iou <= best_iou => best,
                _ => Some((iou, instance)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_instance_image() -> (Array2<i32>, Array2<i32>) {
        let mut instance_map = Array2::from_elem((64, 64), IGNORE);
        let mut class_map = Array2::from_elem((64, 64), BACKGROUND);

        instance_map.slice_mut(s![10..50, 10..50]).fill(0);
        class_map.slice_mut(s![10..50, 10..50]).fill(2);

        // a second instance overlapping the first one
        instance_map.slice_mut(s![40..60, 40..60]).fill(1);
        class_map.slice_mut(s![40..60, 40..60]).fill(1);

        (instance_map, class_map)
    }

    #[test]
    fn proposal_on_instance_box_takes_its_class() -> Result<()> {
        let (instance_map, class_map) = two_instance_image();
        let labeler = RegionProposalLabelerInit::default().build()?;

        let rois = vec![
            RoiBox::try_from_xyxy([10, 10, 50, 50])?,
            RoiBox::try_from_xyxy([40, 40, 60, 60])?,
        ];
        let labels = labeler.label(&rois, instance_map.view(), class_map.view())?;

        assert_eq!(labels[0].class, 2);
        let segmentation = labels[0].segmentation.as_ref().unwrap();
        assert_eq!(segmentation.dim(), (40, 40));
        // the overlapped corner belongs to the second instance
        assert!(segmentation[[0, 0]]);
        assert!(!segmentation[[39, 39]]);
        assert_eq!(segmentation.iter().filter(|&&inside| inside).count(), 1600 - 100);

        assert_eq!(labels[1].class, 1);
        assert!(labels[1].segmentation.as_ref().unwrap().iter().all(|&inside| inside));
        Ok(())
    }

    #[test]
    fn proposal_outside_instances_is_background() -> Result<()> {
        let (instance_map, class_map) = two_instance_image();
        let labeler = RegionProposalLabelerInit::default().build()?;

        let rois = vec![
            RoiBox::try_from_xyxy([0, 0, 8, 8])?,
            // IoU = 400 / 1600 with the first instance
            RoiBox::try_from_xyxy([10, 10, 30, 30])?,
        ];
        let labels = labeler.label(&rois, instance_map.view(), class_map.view())?;

        assert_eq!(labels[0], RoiSupervision::background());
        assert_eq!(labels[1], RoiSupervision::background());
        Ok(())
    }

    #[test]
    fn proposal_outside_image_fails() -> Result<()> {
        let (instance_map, class_map) = two_instance_image();
        let labeler = RegionProposalLabelerInit::default().build()?;
        let rois = vec![RoiBox::try_from_xyxy([30, 30, 70, 50])?];
        assert!(labeler
            .label(&rois, instance_map.view(), class_map.view())
            .is_err());
        Ok(())
    }

    #[test]
    fn invalid_threshold() {
        let init = RegionProposalLabelerInit {
            fg_iou_threshold: r64(1.5),
        };
        assert!(init.build().is_err());
    }
}
