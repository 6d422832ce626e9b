pub mod errors;
mod gates;
mod measurements;
mod noise;
mod state;
pub mod utils;

pub use gates::Gate;
pub use measurements::{Measurement, MeasurementResult};
pub use noise::NoiseChannel;
pub use state::QuantumState;
