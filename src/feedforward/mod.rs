//! Feedforward neural network with backpropagation-based Adam training

mod adam;
mod net;
mod trainer;

pub use adam::*;
pub use net::*;
pub use trainer::*;
