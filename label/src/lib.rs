//! Label types and host-side label grid utilities.

mod common;

pub use grid::*;
pub mod grid;

pub use instance::*;
pub mod instance;

use bbox::Rect;

/// The value marking ignored pixels in class and instance grids.
pub const IGNORE: i32 = -1;

/// The background class.
pub const BACKGROUND: i32 = 0;

/// A rectangle annotated with a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label<R, C>
where
    R: Rect,
{
    pub rect: R,
    pub class: C,
}
