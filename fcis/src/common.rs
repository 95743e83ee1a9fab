pub use anyhow::{bail, ensure, format_err, Context as _, Result};
pub use bbox::{prelude::*, RoiBox, TLBR};
pub use getset::{CopyGetters, Getters};
pub use indexmap::IndexMap;
pub use itertools::{izip, Itertools as _};
pub use label::{BACKGROUND, IGNORE};
pub use log::{debug, info, warn};
pub use ndarray::{s, Array1, Array2, ArrayD, ArrayView2, IxDyn, Zip};
pub use noisy_float::prelude::*;
pub use rand::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Borrow,
    collections::BTreeMap,
    fmt::Debug,
    path::Path,
};
pub use tch::{
    nn::{self, Module as _},
    Device, Kind, Tensor,
};
pub use tch_tensor_like::TensorLike;
