//! Path velocities and their projection onto the cardinal axes.
//!
//! A sound path `i -> j` is slowed or sped up by the air moving along it. With the
//! one-way ToF measured in both directions, the classic transit-time formula gives the
//! air velocity along the path:
//!
//! ```text
//! v[i][j] = 0.5 * (s[i][j] / tof[i][j] - s[j][i] / tof[j][i])
//! ```
//!
//! With separations in microns and ToF in microseconds the result is in m/s.
//!
//! The cardinal estimate for axis `k` is a weighted average of all path velocities,
//! each weighted by its path's projection onto `k`. Both the velocity matrix and the
//! weight tensor are antisymmetric, so every unordered pair contributes twice to the
//! numerator, once per direction; the denominator from
//! [`Geometry::axis_denominator`] counts each pair twice as well.

use crate::geometry::{Axis, Geometry, Mat4};
use serde::{Deserialize, Serialize};
use std::ops::{Index, Sub};

/// Air velocity along the room axes, in m/s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CardinalVelocity {
    /// Velocity along x
    pub x: f64,
    /// Velocity along y
    pub y: f64,
    /// Velocity along z
    pub z: f64,
}

impl CardinalVelocity {
    /// Vector from components.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    fn from_fn(mut f: impl FnMut(Axis) -> f64) -> Self {
        Self {
            x: f(Axis::X),
            y: f(Axis::Y),
            z: f(Axis::Z),
        }
    }
}

impl Index<Axis> for CardinalVelocity {
    type Output = f64;

    fn index(&self, axis: Axis) -> &f64 {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }
}

impl Sub for CardinalVelocity {
    type Output = CardinalVelocity;

    fn sub(self, rhs: CardinalVelocity) -> CardinalVelocity {
        CardinalVelocity::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Air velocity along path `tx -> rx` from the currently stored ToF matrix.
///
/// The reciprocal entry `tof[rx][tx]` is used as stored, even if it predates the
/// entry just written.
pub fn path_velocity(geometry: &Geometry, tof_us: &Mat4, tx: usize, rx: usize) -> f64 {
    0.5 * (geometry.separation(tx, rx) / tof_us[(tx, rx)]
        - geometry.separation(rx, tx) / tof_us[(rx, tx)])
}

/// Weighted average of the path velocities along each cardinal axis.
pub fn decompose(velocity: &Mat4, geometry: &Geometry) -> CardinalVelocity {
    CardinalVelocity::from_fn(|axis| {
        let weights = geometry.axis_weights(axis);
        let numerator: f64 = velocity
            .entries()
            .map(|(i, j, v)| v * weights[(i, j)])
            .sum();
        numerator / geometry.axis_denominator(axis)
    })
}
