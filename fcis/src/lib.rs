//! Region-to-instance inference and training engine for fully convolutional
//! instance segmentation.
//!
//! A dense position-sensitive score volume and a set of region proposals are
//! turned into per-proposal classification and mask predictions, training
//! losses, and a globally consistent pair of class and instance label maps.

mod common;
pub mod aggregate;
pub mod assemble;
pub mod config;
pub mod head;
pub mod labeler;
pub mod metrics;
pub mod model;
pub mod proposal;
pub mod report;
pub mod sampler;
pub mod scorer;
pub mod tensor;
pub mod volume;

pub use aggregate::*;
pub use assemble::*;
pub use head::*;
pub use labeler::*;
pub use model::*;
pub use proposal::*;
pub use report::*;
pub use sampler::*;
pub use scorer::*;
pub use volume::*;
