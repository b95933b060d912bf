//! Landmark dataset: loading, label indexing and the train/validation split.

mod labels;
mod sample;
mod split;

pub use labels::*;
pub use sample::*;
pub use split::*;
