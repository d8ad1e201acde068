//! Half-maximum time-of-flight estimation on one 16-sample burst.
//!
//! The chip returns a coarsely sampled matched-filter response. The arrival time is
//! taken as the point where the response first rises through half of its peak
//! magnitude, refined to sub-sample resolution by linear interpolation between the
//! two samples bracketing that point.
//!
//! The threshold search runs on squared magnitudes with integer arithmetic, which is
//! how a resource-constrained target would do it: half of the linear magnitude is a
//! quarter of the squared magnitude, so no square root is needed until the two
//! bracketing samples are known.

use crate::config::EstimatorConfig;
use crate::error::DegenerateBurst;
use crate::transport::{IqSample, SAMPLES_PER_BURST};
use num_complex::Complex;

/// Squared magnitudes of one burst.
pub type MagnitudeSquared = [u64; SAMPLES_PER_BURST];

/// Calibration scalars accompanying one burst.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Raw sampling-frequency register from the payload header
    pub sample_freq_factor: u16,
    /// Calibration resolution of the receiving port
    pub cal_resolution: u32,
    /// Calibration pulse width in nanoseconds
    pub cal_pulse_width_ns: u32,
}

/// The half-maximum crossing located in a burst.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    /// Last sample below the threshold before the crossing
    pub less_index: usize,
    /// First sample above the threshold
    pub greater_index: usize,
    /// Fractional sample index of the crossing
    pub lerp_index: f64,
}

/// Observability data produced alongside a ToF.
///
/// Not part of the correctness contract; dumped at debug level when enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct TofDiagnostics {
    /// Crossing found in the burst
    pub crossing: Crossing,
    /// Effective sampling frequency
    pub frequency: f64,
    /// Crossing index at a nominal 50 us per sample, in microseconds
    pub coarse_tof_us: f64,
    /// Linear magnitude of each sample
    pub magnitudes: [f64; SAMPLES_PER_BURST],
}

/// Result of a successful estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct TofEstimate {
    /// Time of flight in seconds, always positive and finite
    pub tof_seconds: f64,
    /// Supporting values
    pub diagnostics: TofDiagnostics,
}

impl TofEstimate {
    /// Time of flight in microseconds.
    pub fn tof_us(&self) -> f64 {
        self.tof_seconds * 1.0e6
    }
}

/// Squared magnitude of every sample, accumulated in 64 bits.
pub fn magnitude_squared(samples: &[IqSample; SAMPLES_PER_BURST]) -> MagnitudeSquared {
    let mut mag2 = [0u64; SAMPLES_PER_BURST];
    for (out, sample) in mag2.iter_mut().zip(samples) {
        let wide = Complex::new(i64::from(sample.re), i64::from(sample.im));
        *out = wide.norm_sqr().unsigned_abs();
    }
    mag2
}

/// Locate the half-maximum crossing of a squared-magnitude sequence.
///
/// `greater_index` is the first sample strictly above a quarter of the peak;
/// `less_index` is the last sample strictly below it seen before that. Samples equal
/// to the threshold are neither.
pub fn half_max_crossing(mag2: &MagnitudeSquared) -> Result<Crossing, DegenerateBurst> {
    let mag_max = mag2.iter().copied().max().unwrap_or(0);
    if mag_max == 0 {
        return Err(DegenerateBurst::NoSignal);
    }

    let quarter = mag_max / 4;
    let mut less_index = 0;
    let mut greater_index = None;
    for (i, &m) in mag2.iter().enumerate() {
        if m < quarter {
            less_index = i;
        }
        if m > quarter {
            greater_index = Some(i);
            break;
        }
    }
    let greater_index = greater_index.ok_or(DegenerateBurst::NoThresholdCrossing)?;

    let less_val = (mag2[less_index] as f64).sqrt();
    let greater_val = (mag2[greater_index] as f64).sqrt();
    let half_val = (quarter as f64).sqrt();

    let span = greater_val - less_val;
    if span == 0.0 {
        return Err(DegenerateBurst::FlatInterpolation {
            less_index,
            greater_index,
        });
    }

    Ok(Crossing {
        less_index,
        greater_index,
        lerp_index: less_index as f64 + (half_val - less_val) / span,
    })
}

/// Half-maximum ToF estimator with fixed per-sensor-class constants.
#[derive(Debug, Clone, PartialEq)]
pub struct TofEstimator {
    count_offset: f64,
    tof_scale: f64,
    freq_factor_divisor: f64,
}

impl TofEstimator {
    /// Create an estimator from its configuration section.
    pub fn new(config: &EstimatorConfig) -> Self {
        Self {
            count_offset: f64::from(config.count_offset),
            tof_scale: config.tof_scale,
            freq_factor_divisor: config.freq_factor_divisor,
        }
    }

    /// Effective sampling frequency for a burst.
    pub fn frequency(&self, calibration: &Calibration) -> f64 {
        f64::from(calibration.sample_freq_factor) / self.freq_factor_divisor
            * f64::from(calibration.cal_resolution)
            / (f64::from(calibration.cal_pulse_width_ns) / 1000.0)
    }

    /// Estimate the time of flight of one burst.
    ///
    /// Fails instead of returning a zero, negative or non-finite value.
    pub fn estimate(
        &self,
        samples: &[IqSample; SAMPLES_PER_BURST],
        calibration: &Calibration,
    ) -> Result<TofEstimate, DegenerateBurst> {
        let mag2 = magnitude_squared(samples);
        let crossing = half_max_crossing(&mag2)?;

        let frequency = self.frequency(calibration);
        if !(frequency.is_finite() && frequency > 0.0) {
            return Err(DegenerateBurst::NonPositiveFrequency(frequency));
        }

        let tof_seconds = (crossing.lerp_index + self.count_offset) / frequency * self.tof_scale;
        if !(tof_seconds.is_finite() && tof_seconds > 0.0) {
            return Err(DegenerateBurst::NonPositiveTof(tof_seconds));
        }

        let mut magnitudes = [0.0; SAMPLES_PER_BURST];
        for (out, &m) in magnitudes.iter_mut().zip(&mag2) {
            *out = (m as f64).sqrt();
        }

        Ok(TofEstimate {
            tof_seconds,
            diagnostics: TofDiagnostics {
                crossing,
                frequency,
                coarse_tof_us: crossing.lerp_index * 50.0,
                magnitudes,
            },
        })
    }
}
