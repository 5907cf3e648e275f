//! Vector representation and the pairwise distance functions the graph is
//! parameterized over.
//!
//! The index itself never chooses a distance function; it is injected by
//! the caller as any type implementing [`DistanceFn`]. [`Euclidean`] and
//! [`Cosine`] are provided as the two pre-built options the source ships.

use std::fmt;

/// A single real-valued vector component.
pub type Scalar = f64;

/// An ordered, fixed-length sequence of [`Scalar`] components. Immutable
/// once it has been inserted into a [`crate::Collection`].
#[derive(Debug, Clone, PartialEq)]
pub struct Vector(Vec<Scalar>);

impl Vector {
    pub fn new(components: Vec<Scalar>) -> Self {
        Self(components)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Scalar] {
        &self.0
    }

    /// L2 norm, `sqrt(sum(x_i^2))`.
    pub fn magnitude(&self) -> Scalar {
        self.0.iter().map(|x| x * x).sum::<Scalar>().sqrt()
    }
}

impl From<Vec<Scalar>> for Vector {
    fn from(components: Vec<Scalar>) -> Self {
        Self::new(components)
    }
}

impl std::ops::Index<usize> for Vector {
    type Output = Scalar;

    fn index(&self, idx: usize) -> &Scalar {
        &self.0[idx]
    }
}

/// Diagnostic rendering only; never parsed back.
impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}

/// A pure, injected `(Vector, Vector) -> Scalar` used to rank nodes by
/// proximity. Smaller is nearer, except for [`Cosine`] — see its docs.
///
/// `Copy` because every layer and every heap in the graph carries its own
/// instance; implementors are expected to be zero-sized or otherwise cheap
/// to duplicate. No `Send`/`Sync` bound since this index is not
/// thread-safe by design.
pub trait DistanceFn: Copy {
    fn distance(&self, a: &[Scalar], b: &[Scalar]) -> Scalar;
}

impl<F> DistanceFn for F
where
    F: Fn(&[Scalar], &[Scalar]) -> Scalar + Copy,
{
    fn distance(&self, a: &[Scalar], b: &[Scalar]) -> Scalar {
        self(a, b)
    }
}

/// `sqrt(sum((a_i - b_i)^2))`, using the shorter length if the inputs
/// differ (callers are expected to supply equal-length vectors).
#[derive(Debug, Clone, Copy, Default)]
pub struct Euclidean;

impl DistanceFn for Euclidean {
    #[tracing::instrument(skip_all)]
    fn distance(&self, a: &[Scalar], b: &[Scalar]) -> Scalar {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<Scalar>()
            .sqrt()
    }
}

/// `(a . b) / (|a| |b|)`.
///
/// This returns a *similarity* in `[-1, 1]`, higher meaning closer — the
/// inverse sense of every other distance in this crate, which treats
/// smaller as nearer. Combined with [`crate::heap::KClosest`]'s
/// smaller-is-closer selection, using `Cosine` directly inverts the
/// notion of "nearest". This is the upstream source's behavior and is
/// preserved here as-is rather than silently sign-inverted; wrap it
/// (`|a, b| -Cosine.distance(a, b)`) if you need smaller-is-closer
/// semantics.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cosine;

impl DistanceFn for Cosine {
    #[tracing::instrument(skip_all)]
    fn distance(&self, a: &[Scalar], b: &[Scalar]) -> Scalar {
        let dot: Scalar = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let mag_a = a.iter().map(|x| x * x).sum::<Scalar>().sqrt();
        let mag_b = b.iter().map(|x| x * x).sum::<Scalar>().sqrt();
        dot / (mag_a * mag_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_of_identical_vectors_is_zero() {
        let a = [1.0, 2.0, 3.0];
        assert_eq!(Euclidean.distance(&a, &a), 0.0);
    }

    #[test]
    fn euclidean_matches_known_triangle() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert_eq!(Euclidean.distance(&a, &b), 5.0);
    }

    #[test]
    fn cosine_of_identical_direction_is_one() {
        let a = [1.0, 0.0];
        let b = [2.0, 0.0];
        assert!((Cosine.distance(&a, &b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cosine_of_orthogonal_is_zero() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!(Cosine.distance(&a, &b).abs() < 1e-12);
    }

    #[test]
    fn vector_magnitude_is_l2_norm() {
        let v = Vector::new(vec![3.0, 4.0]);
        assert_eq!(v.magnitude(), 5.0);
    }

    #[test]
    fn vector_display_is_diagnostic_only() {
        let v = Vector::new(vec![1.0, 2.0]);
        assert_eq!(v.to_string(), "Vector(1, 2)");
    }
}
