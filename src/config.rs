//! A small struct-literal configuration surface for building a
//! [`Collection`].

use rand::rngs::ThreadRng;
use rand::Rng;

use crate::collection::Collection;
use crate::distance::DistanceFn;

/// Parameters for [`Collection::from_config`].
#[derive(Debug, Clone, Copy)]
pub struct HnswConfig {
    /// Number of layers, top to bottom. Must be at least 1.
    pub layer_count: usize,
    /// Fixed vector length every inserted item must match.
    pub dimension: usize,
    /// Target per-node neighbor fan-out (`M`).
    pub connectivity: usize,
    /// Overfetch multiplier for the bottom layer's beam expansion (`P`).
    pub prefetch_factor: usize,
}

impl<D: DistanceFn> Collection<D, ThreadRng> {
    pub fn from_config(config: HnswConfig, distance: D) -> Self {
        Self::new(
            config.layer_count,
            config.dimension,
            distance,
            config.connectivity,
            config.prefetch_factor,
        )
    }
}

impl<D: DistanceFn, R: Rng> Collection<D, R> {
    pub fn from_config_with_rng(config: HnswConfig, distance: D, rng: R) -> Self {
        Self::with_rng(
            config.layer_count,
            config.dimension,
            distance,
            config.connectivity,
            config.prefetch_factor,
            rng,
        )
    }
}
