//! Signal processing: per-burst ToF estimation and velocity decomposition.

pub mod tof;
pub mod velocity;

pub use tof::{Calibration, Crossing, TofDiagnostics, TofEstimate, TofEstimator};
pub use velocity::{decompose, path_velocity, CardinalVelocity};
