//! Accuracy and IoU metrics on ROI classes and label maps.

use crate::common::*;
use std::collections::HashMap;

/// Scores of a predicted class map against the truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelAccuracy {
    /// Pixel accuracy.
    pub accuracy: Option<f64>,
    /// Per-class pixel accuracy averaged over classes present in the truth.
    pub class_accuracy: Option<f64>,
    /// IoU averaged over classes present in either map.
    pub mean_iu: Option<f64>,
    /// IoU weighted by the class frequency in the truth.
    pub fw_iu: Option<f64>,
    /// Per-class IoU, `None` for classes absent from both maps.
    pub class_iu: Vec<Option<f64>>,
}

/// The fraction of equal entries, or `None` on empty input.
pub fn accuracy(predicted: &[i32], truth: &[i32]) -> Result<Option<f64>> {
    ensure!(
        predicted.len() == truth.len(),
        "expect equal lengths, but get {} predictions and {} labels",
        predicted.len(),
        truth.len()
    );
    if truth.is_empty() {
        return Ok(None);
    }

    let num_correct = izip!(predicted, truth)
        .filter(|(predicted, truth)| predicted == truth)
        .count();
    Ok(Some(num_correct as f64 / truth.len() as f64))
}

/// Computes pixel accuracy and IoU scores from a confusion histogram.
///
/// Pixels whose true label lies outside `[0, num_classes)` are ignored, as are
/// pixels with an out-of-range prediction.
pub fn label_accuracy_score(
    truth: ArrayView2<i32>,
    predicted: ArrayView2<i32>,
    num_classes: usize,
) -> Result<LabelAccuracy> {
    label::ensure_same_shape(truth, predicted)?;
    ensure!(num_classes > 0, "num_classes must be positive");

    let in_range = |value: i32| value >= 0 && (value as usize) < num_classes;
    let mut hist = Array2::<f64>::zeros((num_classes, num_classes));
    Zip::from(&truth).and(&predicted).for_each(|&truth, &predicted| {
        if in_range(truth) && in_range(predicted) {
            hist[[truth as usize, predicted as usize]] += 1.0;
        }
    });

    let total = hist.sum();
    let diag: Vec<f64> = (0..num_classes).map(|class| hist[[class, class]]).collect();
    let true_counts: Vec<f64> = hist.sum_axis(ndarray::Axis(1)).to_vec();
    let pred_counts: Vec<f64> = hist.sum_axis(ndarray::Axis(0)).to_vec();

    let accuracy = (total > 0.0).then(|| diag.iter().sum::<f64>() / total);
    let class_accuracy = mean_defined(
        izip!(&diag, &true_counts).map(|(&diag, &count)| (count > 0.0).then(|| diag / count)),
    );
    let class_iu: Vec<Option<f64>> = izip!(&diag, &true_counts, &pred_counts)
        .map(|(&diag, &true_count, &pred_count)| {
            let union = true_count + pred_count - diag;
            (union > 0.0).then(|| diag / union)
        })
        .collect();
    let mean_iu = mean_defined(class_iu.iter().copied());
    let fw_iu = (total > 0.0).then(|| {
        izip!(&true_counts, &class_iu)
            .filter_map(|(&count, iu)| Some(count / total * (*iu)?))
            .sum::<f64>()
    });

    Ok(LabelAccuracy {
        accuracy,
        class_accuracy,
        mean_iu,
        fw_iu,
        class_iu,
    })
}

/// The mean over true instances of the best mask IoU with any predicted instance.
///
/// Negative ids mark pixels outside any instance. Returns `None` when the
/// truth has no instance.
pub fn instance_label_accuracy_score(
    truth: ArrayView2<i32>,
    predicted: ArrayView2<i32>,
) -> Result<Option<f64>> {
    label::ensure_same_shape(truth, predicted)?;

    let mut true_counts: BTreeMap<i32, usize> = BTreeMap::new();
    let mut pred_counts: HashMap<i32, usize> = HashMap::new();
    let mut intersections: HashMap<(i32, i32), usize> = HashMap::new();

    Zip::from(&truth).and(&predicted).for_each(|&truth, &predicted| {
        if truth >= 0 {
            *true_counts.entry(truth).or_default() += 1;
        }
        if predicted >= 0 {
            *pred_counts.entry(predicted).or_default() += 1;
        }
        if truth >= 0 && predicted >= 0 {
            *intersections.entry((truth, predicted)).or_default() += 1;
        }
    });

    if true_counts.is_empty() {
        return Ok(None);
    }

    let sum_iu: f64 = true_counts
        .iter()
        .map(|(&true_id, &true_count)| {
            pred_counts
                .iter()
                .map(|(&pred_id, &pred_count)| {
                    let inter = intersections.get(&(true_id, pred_id)).copied().unwrap_or(0);
                    inter as f64 / (true_count + pred_count - inter) as f64
                })
                .fold(0.0, f64::max)
        })
        .sum();

    Ok(Some(sum_iu / true_counts.len() as f64))
}

fn mean_defined(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / count as f64)
}
