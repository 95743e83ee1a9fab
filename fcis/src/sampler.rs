//! Positive/negative ROI balancing.

use crate::common::*;

#[derive(Debug, Clone)]
pub struct PositiveNegativeSamplerInit {
    /// The number of negatives drawn per positive.
    pub negative_ratio: R64,
    /// The least number of negatives drawn, if available.
    pub min_negatives: usize,
    /// Seeds the sampler. Each call is reseeded, making the output reproducible.
    pub seed: Option<u64>,
}

impl Default for PositiveNegativeSamplerInit {
    fn default() -> Self {
        Self {
            negative_ratio: r64(1.0),
            min_negatives: 1,
            seed: None,
        }
    }
}

impl PositiveNegativeSamplerInit {
    pub fn build(self) -> Result<PositiveNegativeSampler> {
        let Self {
            negative_ratio,
            min_negatives,
            seed,
        } = self;
        ensure!(negative_ratio >= 0.0, "negative_ratio must be non-negative");

        Ok(PositiveNegativeSampler {
            negative_ratio: negative_ratio.raw(),
            min_negatives,
            seed,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PositiveNegativeSampler {
    negative_ratio: f64,
    min_negatives: usize,
    seed: Option<u64>,
}

impl PositiveNegativeSampler {
    /// Selects indices of a balanced ROI subset.
    ///
    /// All positive indices come first in ascending order, followed by the
    /// sampled negative indices in ascending order.
    pub fn sample(&self, is_positive: &[bool]) -> Vec<usize> {
        let (positives, negatives): (Vec<usize>, Vec<usize>) =
            (0..is_positive.len()).partition(|&index| is_positive[index]);

        let num_negatives = ((self.negative_ratio * positives.len() as f64) as usize)
            .max(self.min_negatives)
            .min(negatives.len());

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut selected: Vec<usize> =
            rand::seq::index::sample(&mut rng, negatives.len(), num_negatives)
                .into_iter()
                .map(|index| negatives[index])
                .collect();
        selected.sort_unstable();

        debug!(
            "sampled {} positive and {} negative ROIs out of {}",
            positives.len(),
            selected.len(),
            is_positive.len()
        );

        positives.into_iter().chain(selected).collect()
    }
}
