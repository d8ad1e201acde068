//! Fixed-size 4×4 matrix indexed by transducer.

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Number of transducers on the sensor head.
pub const TRANSDUCERS: usize = 4;

/// A 4×4 matrix over transducer pairs, row = source, column = destination.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mat4<T = f64>(pub [[T; TRANSDUCERS]; TRANSDUCERS]);

impl<T: Copy> Mat4<T> {
    /// Matrix with every entry set to `value`.
    pub fn splat(value: T) -> Self {
        Self([[value; TRANSDUCERS]; TRANSDUCERS])
    }

    /// Matrix with `off_diagonal` everywhere except the diagonal, which holds `diagonal`.
    pub fn with_diagonal(off_diagonal: T, diagonal: T) -> Self {
        let mut m = Self::splat(off_diagonal);
        for i in 0..TRANSDUCERS {
            m.0[i][i] = diagonal;
        }
        m
    }

    /// Iterate over all `(i, j, value)` entries in row-major order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..TRANSDUCERS)
            .flat_map(|i| (0..TRANSDUCERS).map(move |j| (i, j)))
            .map(|(i, j)| (i, j, self.0[i][j]))
    }
}

impl<T: Copy + Default> Default for Mat4<T> {
    fn default() -> Self {
        Self::splat(T::default())
    }
}

impl<T> Index<(usize, usize)> for Mat4<T> {
    type Output = T;

    fn index(&self, (i, j): (usize, usize)) -> &T {
        &self.0[i][j]
    }
}

impl<T> IndexMut<(usize, usize)> for Mat4<T> {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        &mut self.0[i][j]
    }
}

/// Iterate over the six unordered transducer pairs in canonical `i < j` orientation.
pub fn canonical_pairs() -> impl Iterator<Item = (usize, usize)> {
    (0..TRANSDUCERS).flat_map(|i| ((i + 1)..TRANSDUCERS).map(move |j| (i, j)))
}
