//! Coordinator over the layer stack: id issuance, dimension validation,
//! insert fan-out, top-down search descent, and removal fan-out.

use std::cell::RefCell;

use rand::rngs::ThreadRng;
use rand::Rng;

use crate::distance::DistanceFn;
use crate::layer::Layer;
use crate::node::{Node, NodeId};

/// Coordinates `L` [`Layer`]s sharing one distance function and dimension.
///
/// `R` is the RNG used for the uniformly random insertion-layer pick and
/// for each layer's random entry-point selection. It is injectable (see
/// [`Collection::with_rng`]) so tests can seed it for reproducible runs,
/// per the source's documented need for deterministic neighbor-scan
/// ordering in tests. Interior mutability (`RefCell`) lets read-only
/// search methods take `&self` while still advancing RNG state; this is
/// sound only because the index is single-threaded by design.
pub struct Collection<D: DistanceFn, R: Rng> {
    layers: Vec<Layer<D>>,
    id_counter: u64,
    connectivity: usize,
    prefetch_factor: usize,
    dimension: usize,
    rng: RefCell<R>,
}

impl<D: DistanceFn> Collection<D, ThreadRng> {
    /// Builds a collection backed by the thread-local RNG. Panics if
    /// `layer_count` is zero.
    pub fn new(
        layer_count: usize,
        dimension: usize,
        distance: D,
        connectivity: usize,
        prefetch_factor: usize,
    ) -> Self {
        Self::with_rng(
            layer_count,
            dimension,
            distance,
            connectivity,
            prefetch_factor,
            rand::thread_rng(),
        )
    }
}

impl<D: DistanceFn, R: Rng> Collection<D, R> {
    /// Builds a collection with an explicit RNG source. Panics if
    /// `layer_count` is zero, matching the source's `panic("nLayers must
    /// be > 0")`.
    pub fn with_rng(
        layer_count: usize,
        dimension: usize,
        distance: D,
        connectivity: usize,
        prefetch_factor: usize,
        rng: R,
    ) -> Self {
        if layer_count == 0 {
            panic!("layer_count must be > 0");
        }
        let layers = (0..layer_count).map(|_| Layer::new(distance)).collect();
        Self {
            layers,
            id_counter: 0,
            connectivity,
            prefetch_factor,
            dimension,
            rng: RefCell::new(rng),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Inserts `vector`/`payload` as a fresh node. Panics with the exact
    /// message `"Vector dimension must be {D}"` if the vector's length
    /// does not match the collection's dimension — this string is part
    /// of the contract and is asserted verbatim by callers.
    #[tracing::instrument(skip_all)]
    pub fn add(&mut self, vector: Vec<f64>, payload: Vec<u8>) -> NodeId {
        if vector.len() != self.dimension {
            panic!("Vector dimension must be {}", self.dimension);
        }

        let insert_idx = if self.layers[0].is_empty() {
            0
        } else {
            self.rng.borrow_mut().gen_range(0..self.layers.len())
        };

        let id = NodeId(self.id_counter);
        self.id_counter += 1;

        for i in insert_idx..self.layers.len() {
            self.layers[i].add(
                id,
                vector.clone(),
                payload.clone(),
                self.connectivity,
                &mut *self.rng.borrow_mut(),
            );
        }

        let last = self.layers.len() - 1;
        for i in insert_idx..self.layers.len() {
            if i != last {
                self.layers[i].set_next_level(id, Some(id));
            }
        }

        id
    }

    /// Top-down descent per §4.5: greedy-nearest on the top layer, then
    /// `NearestFrom` across layers `1..L-1` following `next_level` links,
    /// then a beam-expansion top-k on the bottom layer.
    ///
    /// When `L == 1` the top layer and the bottom layer are the same
    /// layer, so `top_id` is used directly as the bottom layer's seed
    /// instead of hopping through a `next_level` link that cannot exist.
    ///
    /// The bottom layer's K-Closest target is the descended entry node's
    /// vector, not `query` itself — a documented limitation of the
    /// source this preserves rather than silently fixes (see crate docs).
    #[tracing::instrument(skip_all)]
    pub fn n_nearest(&self, query: &[f64], n: usize) -> Vec<&Node> {
        if self.layers[0].is_empty() {
            return Vec::new();
        }

        let top_id = match self.layers[0].nearest(query, &mut *self.rng.borrow_mut()) {
            Some(id) => id,
            None => return Vec::new(),
        };
        let mut node = self
            .layers[0]
            .get(top_id)
            .expect("nearest returned a live id");

        let last = self.layers.len() - 1;
        for layer in self.layers.iter().take(last).skip(1) {
            let start = match node.next_level() {
                Some(id) => id,
                None => return Vec::new(),
            };
            let found = match layer.nearest_from(query, start) {
                Some(id) => id,
                None => return Vec::new(),
            };
            node = layer.get(found).expect("nearest_from returned a live id");
        }

        let seed = if last == 0 {
            // The top layer and the bottom layer are the same layer, so
            // `node` is already the bottom-layer entry point; there is no
            // layer below it for `next_level` to point into.
            top_id
        } else {
            match node.next_level() {
                Some(id) => id,
                None => return Vec::new(),
            }
        };

        let ids = self.layers[last].n_nearest(seed, n, self.prefetch_factor);
        ids.into_iter()
            .filter_map(|id| self.layers[last].get(id))
            .collect()
    }

    /// Removes `id` from every layer it appears in and returns whether it
    /// was present in at least one. Every layer is always checked — a
    /// node may legitimately live in only some layers, and skipping
    /// layers once one hit is found would leave it dangling in the rest.
    #[tracing::instrument(skip_all)]
    pub fn remove(&mut self, id: NodeId) -> bool {
        let mut removed_anywhere = false;
        for layer in self.layers.iter_mut() {
            let removed_here = layer.remove(id);
            removed_anywhere = removed_anywhere || removed_here;
        }
        removed_anywhere
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::Euclidean;
    use pretty_assertions::assert_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn collection(layer_count: usize, dimension: usize) -> Collection<Euclidean, SmallRng> {
        Collection::with_rng(
            layer_count,
            dimension,
            Euclidean,
            5,
            3,
            SmallRng::seed_from_u64(11),
        )
    }

    #[test]
    #[should_panic(expected = "Vector dimension must be 5")]
    fn add_panics_on_dimension_mismatch() {
        let mut c = collection(3, 5);
        c.add(vec![1.0, 2.0, 3.0], vec![]);
    }

    #[test]
    #[should_panic(expected = "layer_count must be > 0")]
    fn new_panics_on_zero_layers() {
        Collection::with_rng(0, 3, Euclidean, 5, 3, SmallRng::seed_from_u64(1));
    }

    #[test]
    fn ids_are_strictly_increasing_and_never_reused() {
        let mut c = collection(3, 2);
        let a = c.add(vec![0.0, 0.0], vec![]);
        let b = c.add(vec![1.0, 1.0], vec![]);
        assert!(b.0 > a.0);
        c.remove(a);
        let d = c.add(vec![2.0, 2.0], vec![]);
        assert!(d.0 > b.0);
    }

    #[test]
    fn removal_reduces_recall_set() {
        let mut c = collection(3, 3);
        let v1 = c.add(vec![1.0, 0.0, 1.0], b"v1".to_vec());
        let _v2 = c.add(vec![1.0, 0.0, 2.0], b"v2".to_vec());
        let v3 = c.add(vec![-1.0, 1.0, 0.0], b"v3".to_vec());

        let found = c.n_nearest(&[0.0, 0.0, 0.0], 3);
        assert_eq!(found.len(), 3);

        assert!(c.remove(v3));

        let after = c.n_nearest(&[0.0, 0.0, 0.0], 3);
        assert!(after.len() <= 2);
        assert!(!after.iter().any(|n| n.id() == v3));
        assert!(after.iter().any(|n| n.id() == v1));
    }

    #[test]
    fn single_layer_collection_still_searches() {
        let mut c = collection(1, 2);
        let v1 = c.add(vec![0.0, 0.0], b"v1".to_vec());
        let _v2 = c.add(vec![10.0, 10.0], b"v2".to_vec());

        let found = c.n_nearest(&[0.0, 0.0], 1);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), v1);
    }

    #[test]
    fn layer_removal_bookkeeping_preserves_untouched_nodes() {
        let mut c = collection(2, 2);
        let id1 = c.add(vec![0.0, 0.0], b"one".to_vec());
        let id2 = c.add(vec![1.0, 0.0], b"two".to_vec());
        let id3 = c.add(vec![2.0, 0.0], b"three".to_vec());
        let id4 = c.add(vec![3.0, 0.0], b"four".to_vec());

        assert!(c.remove(id1));
        assert!(c.remove(id3));
        assert!(!c.remove(id1));

        let found2 = c.n_nearest(&[1.0, 0.0], 10);
        assert!(found2.iter().any(|n| n.id() == id2 && n.value() == b"two"));
        let found4 = c.n_nearest(&[3.0, 0.0], 10);
        assert!(found4.iter().any(|n| n.id() == id4 && n.value() == b"four"));
        assert!(!found2.iter().any(|n| n.id() == id1));
        assert!(!found4.iter().any(|n| n.id() == id3));
    }
}
