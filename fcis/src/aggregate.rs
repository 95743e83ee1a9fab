//! Greedy merging of per-ROI predictions into instance label maps.

use crate::{common::*, scorer::RoiPrediction};

pub use canvas::*;
pub use instance_aggregator::*;

mod canvas {
    use super::*;

    /// A detected object instance in the final label maps.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Instance {
        pub id: i32,
        /// The class of the ROI that opened the instance.
        pub class: i32,
        /// The number of pixels carrying the instance id.
        pub num_pixels: usize,
    }

    /// The class and instance label maps of one image.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct InstanceMaps {
        pub class_map: Array2<i32>,
        pub instance_map: Array2<i32>,
        pub instances: Vec<Instance>,
    }

    /// Label canvases painted in a fixed order.
    #[derive(Debug, Clone)]
    pub struct Canvas {
        class_map: Array2<i32>,
        instance_map: Array2<i32>,
        instance_classes: BTreeMap<i32, i32>,
    }

    impl Canvas {
        /// Creates canvases filled with background class and ignored instance.
        pub fn new(height: usize, width: usize) -> Self {
            Self {
                class_map: Array2::from_elem((height, width), BACKGROUND),
                instance_map: Array2::from_elem((height, width), IGNORE),
                instance_classes: BTreeMap::new(),
            }
        }

        /// Writes `class` and `instance_id` wherever `mask` is set inside `roi`.
        ///
        /// Pixels painted earlier are overwritten, including pixels of other instances.
        pub fn paint(
            &mut self,
            roi: &RoiBox,
            mask: &Array2<bool>,
            class: i32,
            instance_id: i32,
        ) -> Result<()> {
            let (height, width) = self.class_map.dim();
            roi.ensure_within(height as i64, width as i64)?;
            ensure!(
                mask.dim() == (roi.h() as usize, roi.w() as usize),
                "mask shape {:?} does not match box {:?}",
                mask.dim(),
                roi.xyxy()
            );

            let [t, l, b, r] = roi.tlbr().map(|value| value as usize);
            Zip::from(self.class_map.slice_mut(s![t..b, l..r]))
                .and(self.instance_map.slice_mut(s![t..b, l..r]))
                .and(mask)
                .for_each(|class_pixel, instance_pixel, &inside| {
                    if inside {
                        *class_pixel = class;
                        *instance_pixel = instance_id;
                    }
                });

            self.instance_classes.entry(instance_id).or_insert(class);
            Ok(())
        }

        pub fn finish(self) -> InstanceMaps {
            let Self {
                class_map,
                instance_map,
                instance_classes,
            } = self;

            let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
            instance_map
                .iter()
                .filter(|&&id| id != IGNORE)
                .for_each(|&id| *counts.entry(id).or_default() += 1);

            let instances = counts
                .into_iter()
                .map(|(id, num_pixels)| Instance {
                    id,
                    class: instance_classes.get(&id).copied().unwrap_or(BACKGROUND),
                    num_pixels,
                })
                .collect();

            InstanceMaps {
                class_map,
                instance_map,
                instances,
            }
        }
    }
}

mod instance_aggregator {
    use super::*;

    #[derive(Debug, Clone)]
    pub struct InstanceAggregatorInit {
        /// Two ROIs are the same instance when their IoU exceeds this value.
        pub merge_iou_threshold: R64,
        /// A pixel is inside the mask when its inside probability exceeds this value.
        pub mask_threshold: R64,
    }

    impl Default for InstanceAggregatorInit {
        fn default() -> Self {
            Self {
                merge_iou_threshold: r64(0.3),
                mask_threshold: r64(0.5),
            }
        }
    }

    impl InstanceAggregatorInit {
        pub fn build(self) -> Result<InstanceAggregator> {
            let Self {
                merge_iou_threshold,
                mask_threshold,
            } = self;

            ensure!(
                (0.0..=1.0).contains(&merge_iou_threshold.raw()),
                "merge_iou_threshold must be in range [0, 1]"
            );
            ensure!(
                (0.0..=1.0).contains(&mask_threshold.raw()),
                "mask_threshold must be in range [0, 1]"
            );

            Ok(InstanceAggregator {
                merge_iou_threshold: merge_iou_threshold.raw(),
                mask_threshold: mask_threshold.raw(),
            })
        }
    }

    /// Merges independent ROI predictions into consistent label maps.
    #[derive(Debug, Clone)]
    pub struct InstanceAggregator {
        merge_iou_threshold: f64,
        mask_threshold: f64,
    }

    impl InstanceAggregator {
        /// Paints non-background predictions in descending confidence order.
        ///
        /// A ROI joins the existing instance it overlaps most when that IoU exceeds
        /// the merge threshold, the earliest one on ties, and is painted with the
        /// class of that instance. Otherwise it opens a new instance whose id is its
        /// position among the non-background predictions in input order. Later, less
        /// confident ROIs overwrite earlier ones where their masks overlap.
        pub fn aggregate(
            &self,
            predictions: &[RoiPrediction],
            height: usize,
            width: usize,
        ) -> Result<InstanceMaps> {
            let mut canvas = Canvas::new(height, width);
            // (box, instance id, instance class) of every painted ROI
            let mut existing: Vec<(RoiBox, i32, i32)> = vec![];

            let mut ordered: Vec<(usize, &RoiPrediction)> = predictions
                .iter()
                .filter(|prediction| prediction.class != BACKGROUND)
                .enumerate()
                .collect();
            // stable: equal confidences keep input order
            ordered.sort_by(|(_, lhs), (_, rhs)| rhs.confidence.cmp(&lhs.confidence));

            for (kept_index, prediction) in ordered {
                let roi = &prediction.roi;
                let best = existing.iter().fold(None, |best, (other, id, class)| {
                    let iou = roi.iou_with(other);
                    match best {
                        Some((best_iou, _, _)) if iou <= best_iou => best,
                        _ => Some((iou, *id, *class)),
                    }
                });

                let (instance_id, class) = match best {
                    Some((iou, id, class)) if iou > self.merge_iou_threshold => (id, class),
                    _ => (kept_index as i32, prediction.class),
                };
                existing.push((*roi, instance_id, class));

                let mask = self.binarize(prediction)?;
                canvas.paint(roi, &mask, class, instance_id)?;
            }

            let maps = canvas.finish();
            debug!(
                "aggregated {} predictions into {} instances",
                predictions.len(),
                maps.instances.len()
            );
            Ok(maps)
        }

        /// Thresholds the mask probability and resizes it to the ROI pixel extent.
        pub fn binarize(&self, prediction: &RoiPrediction) -> Result<Array2<bool>> {
            let threshold = self.mask_threshold as f32;
            let mask = prediction.mask_prob.mapv(|prob| prob > threshold);
            let size = prediction.roi.to_hw();
            label::resize(mask.view(), size.h() as usize, size.w() as usize)
        }
    }
}
