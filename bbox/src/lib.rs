//! Safe bounding box types and functions.

mod common;

pub use rect::*;
pub mod rect;

pub use tlbr::*;
pub mod tlbr;

pub use hw::*;
pub mod hw;

pub use roi::*;
pub mod roi;

pub mod prelude {
    pub use crate::rect::{Rect, RectNum};
}
