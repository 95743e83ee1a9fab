//! Model and head configuration format.

use crate::{
    aggregate::InstanceAggregatorInit, assemble::ChannelLayout, common::*, head::FcisHeadInit,
    labeler::RegionProposalLabelerInit, sampler::PositiveNegativeSamplerInit,
};

pub use aggregator::*;
pub use labeler::*;
pub use model::*;
pub use sampler::*;

/// The main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    #[serde(default)]
    pub labeler: LabelerConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = json5::from_str(&text)
            .with_context(|| format!("unable to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn head_init(&self) -> FcisHeadInit {
        FcisHeadInit {
            labeler: (&self.labeler).into(),
            sampler: (&self.sampler).into(),
            aggregator: (&self.aggregator).into(),
        }
    }
}

mod model {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ModelConfig {
        /// The number of foreground classes.
        pub num_classes: usize,
        /// The number of cells per side of the position-sensitive grid.
        #[serde(default = "default_kernel_size")]
        pub kernel_size: usize,
        #[serde(default)]
        pub channel_layout: ChannelLayout,
        #[serde(with = "tch_serde::serde_device", default = "default_device")]
        pub device: Device,
    }

    fn default_kernel_size() -> usize {
        7
    }

    fn default_device() -> Device {
        Device::Cpu
    }
}

mod labeler {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LabelerConfig {
        pub fg_iou_threshold: R64,
    }

    impl Default for LabelerConfig {
        fn default() -> Self {
            let RegionProposalLabelerInit { fg_iou_threshold } = Default::default();
            Self { fg_iou_threshold }
        }
    }

    impl From<&LabelerConfig> for RegionProposalLabelerInit {
        fn from(from: &LabelerConfig) -> Self {
            Self {
                fg_iou_threshold: from.fg_iou_threshold,
            }
        }
    }
}

mod sampler {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SamplerConfig {
        pub negative_ratio: R64,
        pub min_negatives: usize,
        #[serde(default)]
        pub seed: Option<u64>,
    }

    impl Default for SamplerConfig {
        fn default() -> Self {
            let PositiveNegativeSamplerInit {
                negative_ratio,
                min_negatives,
                seed,
            } = Default::default();
            Self {
                negative_ratio,
                min_negatives,
                seed,
            }
        }
    }

    impl From<&SamplerConfig> for PositiveNegativeSamplerInit {
        fn from(from: &SamplerConfig) -> Self {
            Self {
                negative_ratio: from.negative_ratio,
                min_negatives: from.min_negatives,
                seed: from.seed,
            }
        }
    }
}

mod aggregator {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AggregatorConfig {
        pub merge_iou_threshold: R64,
        pub mask_threshold: R64,
    }

    impl Default for AggregatorConfig {
        fn default() -> Self {
            let InstanceAggregatorInit {
                merge_iou_threshold,
                mask_threshold,
            } = Default::default();
            Self {
                merge_iou_threshold,
                mask_threshold,
            }
        }
    }

    impl From<&AggregatorConfig> for InstanceAggregatorInit {
        fn from(from: &AggregatorConfig) -> Self {
            Self {
                merge_iou_threshold: from.merge_iou_threshold,
                mask_threshold: from.mask_threshold,
            }
        }
    }
}
