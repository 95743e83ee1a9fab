pub use anyhow::{ensure, Result};
pub use bbox::{prelude::*, TLBR};
pub use ndarray::{s, Array2, ArrayView2};
pub use std::collections::BTreeMap;
