//! # Chirp Anemometer Core Library
//!
//! Signal-processing core of an ultrasonic room anemometer. Four transducers sit on
//! the vertices of a regular tetrahedron; each chirp is transmitted by one of them
//! (the primary) and received by the other three. From the raw IQ bursts this crate
//! estimates the pairwise time of flight, turns ToF asymmetries into air velocities
//! along each path, and combines the six paths into a 3-axis velocity.
//!
//! ## Crate Structure
//!
//! - **`config`**: Figment-loaded settings, including every constant that depends on
//!   the sensor hardware revision. See `config::AnemometerConfig`.
//! - **`error`**: `AnemometerError` for centralised error handling, and
//!   `DegenerateBurst` for bursts that carry no usable timing.
//! - **`geometry`**: the immutable tetrahedral layout (`Geometry`) and the fixed-size
//!   `Mat4` used for every pairwise quantity.
//! - **`device`**: per-device measurement state and the `DeviceRegistry` that owns it.
//! - **`dsp`**: the half-maximum ToF estimator and the velocity decomposer.
//! - **`transport`**: the input event and output sink contracts with the sensor network,
//!   plus synthetic burst generation.
//! - **`output`**: output records and the rate-limited diagnostic annotation.
//! - **`processor`**: `BurstProcessor`, the end-to-end per-event pipeline.
//! - **`worker`**: the tokio task that drains an event channel through the processor.
//! - **`logging`**: tracing subscriber setup.

pub mod config;
pub mod device;
pub mod dsp;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod output;
pub mod processor;
pub mod transport;
pub mod worker;

pub use config::AnemometerConfig;
pub use error::{AnemometerError, AppResult, DegenerateBurst};
pub use processor::BurstProcessor;
