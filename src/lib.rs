//! Sign-letter classifier training on hand landmarks.
//!
//! A 63-value landmark vector (21 keypoints × x/y/z) is classified into a single letter
//! by a small feedforward network (`feedforward`). `pipeline::run` loads a captured
//! dataset (`dataset`), trains with early stopping, reports validation `metrics` and
//! writes the weights in the JSON layout the browser client consumes (`export`).

pub mod dataset;
pub mod error;
pub mod export;
pub mod feedforward;
pub mod metrics;
pub mod pipeline;

pub use error::{Error, Result};
pub use export::BrowserModel;
pub use pipeline::{run, RunSummary, TrainConfig};
