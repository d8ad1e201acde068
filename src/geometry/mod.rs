//! Tetrahedral transducer geometry.
//!
//! The sensor head is a regular tetrahedron with one transducer per vertex. Each
//! ordered transducer pair `(i, j)` defines a sound path; [`Geometry`] holds the
//! immutable description of those paths shared by every device:
//!
//! - `port_to_index`: physical port number to matrix index (fixed by wiring)
//! - `separation`: path length in microns, symmetric with a zero diagonal
//! - `axis_weight`: per cardinal axis, how strongly each path projects onto that axis
//!
//! The axis weights are derived once from three angles of the tetrahedron. They are
//! antisymmetric under a pair swap (`w[k][j][i] == -w[k][i][j]`) because reversing a
//! path reverses its projection. They are deliberately not normalised per path; the
//! [velocity decomposer](crate::dsp::velocity) divides by the per-axis
//! [`Geometry::axis_denominator`] instead.

pub mod matrix;

pub use matrix::{canonical_pairs, Mat4, TRANSDUCERS};

use crate::config::GeometryConfig;
use crate::error::{AnemometerError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Denominators smaller than this are treated as zero.
const DENOMINATOR_EPSILON: f64 = 1.0e-9;

/// Cardinal axis of the room frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Horizontal axis through the base edge
    X,
    /// Horizontal axis perpendicular to X
    Y,
    /// Vertical axis
    Z,
}

impl Axis {
    /// All axes in storage order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Storage index of this axis.
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "x"),
            Axis::Y => write!(f, "y"),
            Axis::Z => write!(f, "z"),
        }
    }
}

/// Immutable transducer layout shared by every device.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    port_to_index: [usize; TRANSDUCERS],
    separation: Mat4,
    axis_weight: [Mat4; 3],
    axis_denominator: [f64; 3],
    initial_tof_us: f64,
    diagonal_tof_us: f64,
}

impl Geometry {
    /// Build the geometry described by a configuration section.
    ///
    /// Fails with [`AnemometerError::Geometry`] if the port mapping is not a
    /// permutation or an axis would receive no weight at all.
    pub fn from_config(config: &GeometryConfig) -> AppResult<Self> {
        let separation = Mat4::with_diagonal(config.separation_um, 0.0);
        let axis_weight = tetrahedral_axis_weights(
            config.edge_angle_deg,
            config.elevation_angle_deg,
            config.azimuth_angle_deg,
        );
        Self::from_parts(
            config.port_to_index,
            separation,
            axis_weight,
            config.initial_tof_us,
            config.diagonal_tof_us,
        )
    }

    /// Build a geometry from explicit tensors, checking every invariant.
    pub fn from_parts(
        port_to_index: [usize; TRANSDUCERS],
        separation: Mat4,
        axis_weight: [Mat4; 3],
        initial_tof_us: f64,
        diagonal_tof_us: f64,
    ) -> AppResult<Self> {
        let mut seen = [false; TRANSDUCERS];
        for (port, &index) in port_to_index.iter().enumerate() {
            if index >= TRANSDUCERS || seen[index] {
                return Err(AnemometerError::Geometry(format!(
                    "port_to_index {:?} is not a permutation of 0..{} (port {} maps to {})",
                    port_to_index, TRANSDUCERS, port, index
                )));
            }
            seen[index] = true;
        }

        for (i, j, s) in separation.entries() {
            if i == j && s != 0.0 {
                return Err(AnemometerError::Geometry(format!(
                    "separation[{i}][{i}] must be zero, got {s}"
                )));
            }
            if s != separation[(j, i)] {
                return Err(AnemometerError::Geometry(format!(
                    "separation is not symmetric at ({i}, {j})"
                )));
            }
        }

        for axis in Axis::ALL {
            let w = &axis_weight[axis.index()];
            for (i, j, value) in w.entries() {
                if value != -w[(j, i)] {
                    return Err(AnemometerError::Geometry(format!(
                        "axis {axis} weight is not antisymmetric at ({i}, {j})"
                    )));
                }
            }
        }

        if diagonal_tof_us.is_nan() || diagonal_tof_us <= 0.0 {
            return Err(AnemometerError::Geometry(format!(
                "diagonal ToF sentinel must be strictly positive, got {diagonal_tof_us}"
            )));
        }

        let mut axis_denominator = [0.0; 3];
        for axis in Axis::ALL {
            let w = &axis_weight[axis.index()];
            let denominator: f64 = canonical_pairs().map(|(i, j)| w[(i, j)] - w[(j, i)]).sum();
            if !denominator.is_finite() || denominator.abs() < DENOMINATOR_EPSILON {
                return Err(AnemometerError::Geometry(format!(
                    "axis {axis} has a zero weight denominator"
                )));
            }
            axis_denominator[axis.index()] = denominator;
        }

        Ok(Self {
            port_to_index,
            separation,
            axis_weight,
            axis_denominator,
            initial_tof_us,
            diagonal_tof_us,
        })
    }

    /// Matrix index wired to a physical port.
    pub fn index_of_port(&self, port: usize) -> usize {
        self.port_to_index[port]
    }

    /// Path length between two transducers, in microns.
    pub fn separation(&self, i: usize, j: usize) -> f64 {
        self.separation[(i, j)]
    }

    /// Projection weight of path `(i, j)` onto `axis`.
    pub fn axis_weight(&self, axis: Axis, i: usize, j: usize) -> f64 {
        self.axis_weight[axis.index()][(i, j)]
    }

    /// Full weight tensor for one axis.
    pub fn axis_weights(&self, axis: Axis) -> &Mat4 {
        &self.axis_weight[axis.index()]
    }

    /// Normalising denominator of `axis`, never zero.
    pub fn axis_denominator(&self, axis: Axis) -> f64 {
        self.axis_denominator[axis.index()]
    }

    /// ToF matrix a newly seen device starts from, in microseconds.
    pub fn initial_tof_matrix(&self) -> Mat4 {
        Mat4::with_diagonal(self.initial_tof_us, self.diagonal_tof_us)
    }
}

/// Projection weights of the six tetrahedron edges onto x, y and z.
///
/// Vertices 0 and 1 span the base edge along y, vertex 2 closes the base triangle
/// and vertex 3 is the apex. Only the canonical `i < j` entries are computed here;
/// the lower triangle is their negation.
fn tetrahedral_axis_weights(edge_deg: f64, elevation_deg: f64, azimuth_deg: f64) -> [Mat4; 3] {
    let edge = edge_deg.to_radians();
    let elevation = elevation_deg.to_radians();
    let azimuth = azimuth_deg.to_radians();

    let mut w = [Mat4::default(); 3];

    let x = &mut w[Axis::X.index()];
    x[(0, 2)] = edge.cos();
    x[(1, 2)] = edge.cos();
    x[(0, 3)] = elevation.cos() * azimuth.sin();
    x[(1, 3)] = elevation.cos() * azimuth.sin();
    x[(2, 3)] = -elevation.cos();

    let y = &mut w[Axis::Y.index()];
    y[(0, 1)] = 1.0;
    y[(0, 2)] = edge.sin();
    y[(0, 3)] = elevation.cos() * azimuth.cos();
    y[(1, 2)] = -edge.sin();
    y[(1, 3)] = -elevation.cos() * azimuth.cos();

    let z = &mut w[Axis::Z.index()];
    z[(0, 3)] = elevation.sin();
    z[(1, 3)] = elevation.sin();
    z[(2, 3)] = elevation.sin();

    for tensor in w.iter_mut() {
        for (i, j) in canonical_pairs() {
            tensor[(j, i)] = -tensor[(i, j)];
        }
    }
    w
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> Geometry {
        Geometry::from_config(&GeometryConfig::default()).unwrap()
    }

    #[test]
    fn test_axis_weights_are_antisymmetric() {
        let geometry = reference();
        for axis in Axis::ALL {
            for i in 0..TRANSDUCERS {
                assert_eq!(geometry.axis_weight(axis, i, i), 0.0);
                for j in 0..TRANSDUCERS {
                    assert_eq!(
                        geometry.axis_weight(axis, j, i),
                        -geometry.axis_weight(axis, i, j),
                        "axis {axis} pair ({i}, {j})"
                    );
                }
            }
        }
    }

    #[test]
    fn test_separation_invariants() {
        let geometry = reference();
        for i in 0..TRANSDUCERS {
            assert_eq!(geometry.separation(i, i), 0.0);
            for j in 0..TRANSDUCERS {
                assert_eq!(geometry.separation(i, j), geometry.separation(j, i));
            }
        }
        assert_eq!(geometry.separation(0, 1), 60_000.0);
    }

    #[test]
    fn test_reference_weights() {
        let geometry = reference();
        let cos30 = 30f64.to_radians().cos();
        assert!((geometry.axis_weight(Axis::X, 0, 2) - cos30).abs() < 1e-12);
        assert_eq!(geometry.axis_weight(Axis::Y, 0, 1), 1.0);
        assert_eq!(geometry.axis_weight(Axis::Z, 0, 1), 0.0);
        assert!((geometry.axis_weight(Axis::Z, 2, 3) - 54.74f64.to_radians().sin()).abs() < 1e-12);
    }

    #[test]
    fn test_denominators_nonzero() {
        let geometry = reference();
        for axis in Axis::ALL {
            assert!(geometry.axis_denominator(axis).abs() > 1e-3);
        }
        // y: 1 + sin30 + cos(e)cos60 - sin30 - cos(e)cos60, doubled
        assert!((geometry.axis_denominator(Axis::Y) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_port_mapping() {
        let geometry = reference();
        assert_eq!(geometry.index_of_port(0), 1);
        assert_eq!(geometry.index_of_port(1), 3);
        assert_eq!(geometry.index_of_port(2), 0);
        assert_eq!(geometry.index_of_port(3), 2);
    }

    #[test]
    fn test_non_permutation_rejected() {
        let mut config = GeometryConfig::default();
        config.port_to_index = [0, 0, 1, 2];
        let err = Geometry::from_config(&config).unwrap_err();
        assert!(matches!(err, AnemometerError::Geometry(_)));

        config.port_to_index = [0, 1, 2, 4];
        assert!(Geometry::from_config(&config).is_err());
    }

    #[test]
    fn test_zero_denominator_rejected() {
        let weights = [Mat4::default(); 3];
        let err = Geometry::from_parts(
            [0, 1, 2, 3],
            Mat4::with_diagonal(1.0, 0.0),
            weights,
            1.0,
            1e-12,
        )
        .unwrap_err();
        assert!(err.to_string().contains("zero weight denominator"));
    }

    #[test]
    fn test_symmetric_weights_rejected() {
        let mut weights = [Mat4::default(); 3];
        weights[0][(0, 1)] = 1.0;
        weights[0][(1, 0)] = 1.0;
        assert!(Geometry::from_parts(
            [0, 1, 2, 3],
            Mat4::with_diagonal(1.0, 0.0),
            weights,
            1.0,
            1e-12,
        )
        .is_err());
    }

    #[test]
    fn test_initial_tof_matrix_has_positive_diagonal() {
        let tof = reference().initial_tof_matrix();
        for i in 0..TRANSDUCERS {
            assert!(tof[(i, i)] > 0.0);
        }
        assert_eq!(tof[(0, 1)], 174.92);
    }
}
