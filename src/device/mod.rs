//! Per-device measurement state.
//!
//! Each anemometer keeps its own ToF and path-velocity matrices, updated
//! incrementally one receiving pair at a time, and a chain of cardinal-velocity
//! stages:
//!
//! ```text
//! raw --(- offset)--> calibrated --(filter)--> filtered
//! ```
//!
//! The offset starts at zero and the filter is a pass-through; both stages are kept
//! explicit so a later zero-wind calibration or smoothing step has a place to live.

pub mod registry;

pub use registry::{DeviceRegistry, SharedDeviceState};

use crate::dsp::velocity::{decompose, path_velocity, CardinalVelocity};
use crate::geometry::{Geometry, Mat4};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable identifier of one physical unit (usually its MAC address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Outcome of writing one ToF into the matrices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathUpdate {
    /// New path velocity `velocity[tx][rx]`, m/s
    pub velocity: f64,
    /// The reciprocal ToF was never measured or is older than the staleness window
    pub stale_reciprocal: bool,
}

/// Mutable measurement record of one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    tof_us: Mat4,
    velocity: Mat4,
    refreshed_at: Mat4<Option<u64>>,
    raw: CardinalVelocity,
    offset: CardinalVelocity,
    calibrated: CardinalVelocity,
    filtered: CardinalVelocity,
    sample_count: u64,
    stale_reciprocal_count: u64,
}

impl DeviceState {
    /// Fresh state: nominal ToF everywhere, sentinel diagonal, zero velocities.
    pub fn new(geometry: &Geometry) -> Self {
        Self {
            tof_us: geometry.initial_tof_matrix(),
            velocity: Mat4::default(),
            refreshed_at: Mat4::default(),
            raw: CardinalVelocity::default(),
            offset: CardinalVelocity::default(),
            calibrated: CardinalVelocity::default(),
            filtered: CardinalVelocity::default(),
            sample_count: 0,
            stale_reciprocal_count: 0,
        }
    }

    /// Store a new ToF for `tx -> rx` and refresh that path's velocity.
    ///
    /// The reciprocal direction is read as stored. It counts as stale when it has
    /// never been measured or was last written `stale_after` or more bursts ago.
    pub fn record_tof(
        &mut self,
        geometry: &Geometry,
        tx: usize,
        rx: usize,
        tof_us: f64,
        stale_after: u64,
    ) -> PathUpdate {
        self.tof_us[(tx, rx)] = tof_us;
        self.refreshed_at[(tx, rx)] = Some(self.sample_count);

        let velocity = path_velocity(geometry, &self.tof_us, tx, rx);
        self.velocity[(tx, rx)] = velocity;

        let stale_reciprocal = match self.refreshed_at[(rx, tx)] {
            None => true,
            Some(at) => self.sample_count.saturating_sub(at) >= stale_after,
        };
        if stale_reciprocal {
            self.stale_reciprocal_count += 1;
        }

        PathUpdate {
            velocity,
            stale_reciprocal,
        }
    }

    /// Close the current burst: recompute every cardinal stage and count the sample.
    pub fn complete_burst(&mut self, geometry: &Geometry) -> CardinalVelocity {
        self.raw = decompose(&self.velocity, geometry);
        self.calibrated = self.raw - self.offset;
        self.filtered = self.filter(self.calibrated);
        self.sample_count += 1;
        self.filtered
    }

    // Pass-through until temporal smoothing exists.
    fn filter(&self, calibrated: CardinalVelocity) -> CardinalVelocity {
        calibrated
    }

    /// Replace the stored zero-wind offset.
    pub fn set_offset(&mut self, offset: CardinalVelocity) {
        self.offset = offset;
    }

    /// ToF matrix, microseconds.
    pub fn tof_us(&self) -> &Mat4 {
        &self.tof_us
    }

    /// Path velocity matrix, m/s.
    pub fn velocity(&self) -> &Mat4 {
        &self.velocity
    }

    /// Cardinal velocity before offset correction.
    pub fn raw_velocity(&self) -> CardinalVelocity {
        self.raw
    }

    /// Stored offset.
    pub fn offset(&self) -> CardinalVelocity {
        self.offset
    }

    /// Raw velocity minus offset.
    pub fn calibrated_velocity(&self) -> CardinalVelocity {
        self.calibrated
    }

    /// Output of the filter stage.
    pub fn filtered_velocity(&self) -> CardinalVelocity {
        self.filtered
    }

    /// Number of bursts processed.
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Path velocities computed from a stale reciprocal ToF.
    pub fn stale_reciprocal_count(&self) -> u64 {
        self.stale_reciprocal_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeometryConfig;
    use crate::geometry::TRANSDUCERS;

    fn geometry() -> Geometry {
        Geometry::from_config(&GeometryConfig::default()).unwrap()
    }

    #[test]
    fn test_new_state() {
        let geometry = geometry();
        let state = DeviceState::new(&geometry);
        assert_eq!(state.sample_count(), 0);
        assert_eq!(state.filtered_velocity(), CardinalVelocity::default());
        for i in 0..TRANSDUCERS {
            assert!(state.tof_us()[(i, i)] > 0.0);
        }
    }

    #[test]
    fn test_record_tof_uses_stored_reciprocal() {
        let geometry = geometry();
        let mut state = DeviceState::new(&geometry);

        let update = state.record_tof(&geometry, 0, 1, 150.0, 4);
        let expected = 0.5 * (60_000.0 / 150.0 - 60_000.0 / 174.92);
        assert!((update.velocity - expected).abs() < 1e-9);
        assert!(update.stale_reciprocal, "reciprocal never measured");
        assert_eq!(state.tof_us()[(0, 1)], 150.0);
        assert_eq!(state.velocity()[(1, 0)], 0.0);
        state.complete_burst(&geometry);

        let update = state.record_tof(&geometry, 1, 0, 200.0, 4);
        assert!(!update.stale_reciprocal);
        assert!((update.velocity - 0.5 * (300.0 - 400.0)).abs() < 1e-9);
        assert_eq!(state.stale_reciprocal_count(), 1);
    }

    #[test]
    fn test_reciprocal_goes_stale() {
        let geometry = geometry();
        let mut state = DeviceState::new(&geometry);
        state.record_tof(&geometry, 1, 0, 170.0, 2);
        state.complete_burst(&geometry);
        state.complete_burst(&geometry);
        // written at burst 0, now at burst 2
        let update = state.record_tof(&geometry, 0, 1, 170.0, 2);
        assert!(update.stale_reciprocal);
    }

    #[test]
    fn test_stages_pass_through() {
        let geometry = geometry();
        let mut state = DeviceState::new(&geometry);
        state.record_tof(&geometry, 0, 1, 150.0, 4);
        state.record_tof(&geometry, 1, 0, 200.0, 4);
        let filtered = state.complete_burst(&geometry);

        assert_eq!(state.sample_count(), 1);
        assert_eq!(state.offset(), CardinalVelocity::default());
        assert_eq!(state.calibrated_velocity(), state.raw_velocity());
        assert_eq!(filtered, state.raw_velocity());
        assert!(filtered.y > 0.0);
    }

    #[test]
    fn test_offset_is_subtracted() {
        let geometry = geometry();
        let mut state = DeviceState::new(&geometry);
        state.set_offset(CardinalVelocity::new(0.1, 0.2, 0.3));
        let filtered = state.complete_burst(&geometry);
        assert_eq!(filtered, CardinalVelocity::new(-0.1, -0.2, -0.3));
    }
}
