//! One level of the hierarchy: a node arena, its reverse index, and the
//! greedy-descent / beam-expansion search that operate over it.

use std::io::{Read, Write};

use rand::Rng;

use crate::distance::DistanceFn;
use crate::error::Error;
use crate::heap::KClosest;
use crate::node::{read_i32, Node, NodeId, NodeIdHashMap, NodeIdHashSet};

/// Overfetch factor `Layer::add` uses for the beam expansion it runs to
/// find neighbor candidates for a freshly inserted node.
const ADD_OVERFETCH: usize = 3;

/// Arena of nodes for one graph level plus the reverse index that lets
/// [`NodeId`]s resolve to positions in `nodes`.
///
/// Neighbor relationships resolve through [`NodeId`] lookups into `rindex`
/// rather than direct references, which keeps the arena a plain `Vec` with
/// no concurrent map needed since this index is single-threaded.
#[derive(Debug, Clone)]
pub struct Layer<D: DistanceFn> {
    nodes: Vec<Node>,
    rindex: NodeIdHashMap<usize>,
    distance: D,
}

impl<D: DistanceFn> Layer<D> {
    pub fn new(distance: D) -> Self {
        Self {
            nodes: Vec::new(),
            rindex: NodeIdHashMap::default(),
            distance,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.rindex.get(&id).map(|&idx| &self.nodes[idx])
    }

    fn index_of(&self, id: NodeId) -> Option<usize> {
        self.rindex.get(&id).copied()
    }

    fn link(&mut self, a: NodeId, b: NodeId) {
        if a == b {
            return;
        }
        if let Some(idx) = self.index_of(a) {
            self.nodes[idx].neighbors.insert(b);
        }
        if let Some(idx) = self.index_of(b) {
            self.nodes[idx].neighbors.insert(a);
        }
    }

    /// Appends a node with the given id, linking it to up to `m` neighbors
    /// found by descending to an entry point and beam-expanding from
    /// there. The first node ever added to an empty layer gets no
    /// neighbors.
    #[tracing::instrument(skip_all)]
    pub fn add<R: Rng + ?Sized>(
        &mut self,
        id: NodeId,
        vector: Vec<f64>,
        value: Vec<u8>,
        m: usize,
        rng: &mut R,
    ) -> NodeId {
        if self.nodes.is_empty() {
            self.push_node(Node::new(id, vector, value));
            return id;
        }

        let entry = self
            .nearest_internal(&vector, rng)
            .expect("non-empty layer always has an entry point");
        let neighbor_ids = self.n_nearest(entry, m, ADD_OVERFETCH);

        self.push_node(Node::new(id, vector, value));
        for neighbor_id in neighbor_ids {
            self.link(id, neighbor_id);
        }
        id
    }

    fn push_node(&mut self, node: Node) {
        let idx = self.nodes.len();
        self.rindex.insert(node.id, idx);
        self.nodes.push(node);
    }

    /// Points the node's `next_level` slot at the same-id node one layer
    /// down. Used by `Collection::add` once the node has been inserted
    /// into every layer it participates in.
    pub(crate) fn set_next_level(&mut self, id: NodeId, next: Option<NodeId>) {
        if let Some(idx) = self.index_of(id) {
            self.nodes[idx].next_level = next;
        }
    }

    /// Greedy descent from a uniformly random start node.
    pub fn nearest<R: Rng + ?Sized>(&self, query: &[f64], rng: &mut R) -> Option<NodeId> {
        self.nearest_internal(query, rng)
    }

    fn nearest_internal<R: Rng + ?Sized>(&self, query: &[f64], rng: &mut R) -> Option<NodeId> {
        if self.nodes.is_empty() {
            return None;
        }
        let start_idx = rng.gen_range(0..self.nodes.len());
        let start = self.nodes[start_idx].id;
        self.nearest_from(query, start)
    }

    /// Greedy descent per §4.4.1. Each pass walks the *original* current
    /// node's neighbor set (captured once at the start of the pass, even
    /// though `current`/`distance` may move mid-pass) comparing each
    /// unvisited neighbor against the running, progressively tightening
    /// distance; using `<=` so ties still drive progress. A neighbor is
    /// marked visited the moment it is scanned, whether or not it causes
    /// a move, so the last neighbor in scan order to beat the
    /// already-tightened threshold is the one the pass lands on.
    pub fn nearest_from(&self, query: &[f64], start: NodeId) -> Option<NodeId> {
        let mut current = self.index_of(start)?;
        let mut distance = self.distance.distance(self.nodes[current].vector(), query);
        let mut visited = NodeIdHashSet::default();
        visited.insert(self.nodes[current].id);

        loop {
            let pass_neighbors: Vec<NodeId> = self.nodes[current].neighbor_ids().collect();
            let mut updated = false;

            for neighbor_id in pass_neighbors {
                if visited.contains(&neighbor_id) {
                    continue;
                }
                visited.insert(neighbor_id);
                let idx = match self.index_of(neighbor_id) {
                    Some(i) => i,
                    None => continue,
                };
                let d = self.distance.distance(self.nodes[idx].vector(), query);
                if d <= distance {
                    distance = d;
                    current = idx;
                    updated = true;
                }
            }

            if !updated {
                break;
            }
        }

        Some(self.nodes[current].id)
    }

    /// Beam expansion per §4.4.2: capacity-bounded BFS over neighbor
    /// edges seeded at `start`, collecting up to `n * overfetch` unique
    /// nodes, then reduced to the top `n` closest to `start`'s own vector
    /// (not an external query — this is the documented contract, not a
    /// bug).
    #[tracing::instrument(skip_all)]
    pub fn n_nearest(&self, start: NodeId, n: usize, overfetch: usize) -> Vec<NodeId> {
        if n == 0 {
            return Vec::new();
        }
        let start_idx = match self.index_of(start) {
            Some(idx) => idx,
            None => return Vec::new(),
        };
        let capacity = n.saturating_mul(overfetch).max(1);

        let mut collected = vec![start];
        let mut visited = NodeIdHashSet::default();
        visited.insert(start);
        let mut frontier = 0;

        'bfs: while frontier < collected.len() && collected.len() < capacity {
            let pass_end = collected.len();
            while frontier < pass_end {
                let current_id = collected[frontier];
                frontier += 1;
                let idx = match self.index_of(current_id) {
                    Some(i) => i,
                    None => continue,
                };
                for neighbor_id in self.nodes[idx].neighbor_ids() {
                    if visited.insert(neighbor_id) {
                        collected.push(neighbor_id);
                        if collected.len() >= capacity {
                            break 'bfs;
                        }
                    }
                }
            }
        }

        let target = self.nodes[start_idx].vector().to_vec();
        let mut selector = KClosest::new(n);
        for id in collected {
            if let Some(idx) = self.index_of(id) {
                let d = self.distance.distance(self.nodes[idx].vector(), &target);
                selector.push(id, d);
            }
        }

        let mut result = Vec::with_capacity(selector.len());
        while let Some((id, _)) = selector.pop_farthest() {
            result.push(id);
        }
        result
    }

    /// Swap-remove the node, fix the reverse index for whichever node was
    /// moved into the vacated slot, and scrub the dead id out of every
    /// remaining neighbor set.
    #[tracing::instrument(skip_all)]
    pub fn remove(&mut self, id: NodeId) -> bool {
        let idx = match self.rindex.remove(&id) {
            Some(i) => i,
            None => return false,
        };

        let removed = self.nodes.swap_remove(idx);
        if idx < self.nodes.len() {
            let moved_id = self.nodes[idx].id;
            self.rindex.insert(moved_id, idx);
        }

        for neighbor_id in removed.neighbor_ids() {
            if let Some(nidx) = self.index_of(neighbor_id) {
                self.nodes[nidx].neighbors.remove(&id);
            }
        }

        true
    }

    /// On failure, the returned error carries how many bytes had already
    /// been written before the sink failed (`Error::SerializeIo`),
    /// mirroring the source's `(bytesWritten, error)` return pair —
    /// partial writes are not self-healing, so callers discard them.
    #[tracing::instrument(skip_all)]
    pub fn serialize(&self, w: &mut impl Write) -> Result<usize, Error> {
        let mut size = 0usize;
        if let Err(source) = w.write_all(&(self.nodes.len() as i32).to_le_bytes()) {
            return Err(Error::SerializeIo { written: size, source });
        }
        size += 4;
        for node in &self.nodes {
            match node.serialize(w) {
                Ok(n) => size += n,
                Err(source) => return Err(Error::SerializeIo { written: size, source }),
            }
        }
        Ok(size)
    }

    /// Reads a layer snapshot. Neighbor ids are linked in a final pass
    /// once every node has been read, restoring the symmetric-neighbor
    /// invariant; ids that do not resolve to any node in this layer are
    /// dropped rather than rejected, per the snapshot format's tolerance
    /// for dangling references.
    #[tracing::instrument(skip_all)]
    pub fn deserialize(
        r: &mut impl Read,
        distance: D,
        next_layer: Option<&Layer<D>>,
    ) -> Result<Self, Error> {
        let count = read_i32(r)?;
        if count < 0 {
            return Err(Error::MalformedSnapshot {
                reason: format!("negative node count: {count}"),
            });
        }

        let mut layer = Layer {
            nodes: Vec::with_capacity(count as usize),
            rindex: NodeIdHashMap::default(),
            distance,
        };

        for _ in 0..count {
            let mut node = Node::deserialize(r)?;
            if let Some(next) = next_layer {
                if next.get(node.id).is_some() {
                    node.next_level = Some(node.id);
                }
            }
            layer.push_node(node);
        }

        let ids: Vec<NodeId> = layer.nodes.iter().map(|n| n.id).collect();
        for id in ids {
            let idx = layer.index_of(id).expect("id was just collected from nodes");
            let neighbor_ids: Vec<NodeId> = layer.nodes[idx].neighbors.iter().copied().collect();
            for neighbor_id in neighbor_ids {
                match layer.index_of(neighbor_id) {
                    Some(nidx) => {
                        layer.nodes[nidx].neighbors.insert(id);
                    }
                    None => {
                        layer.nodes[idx].neighbors.remove(&neighbor_id);
                    }
                }
            }
        }

        Ok(layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::Euclidean;
    use pretty_assertions::assert_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(7)
    }

    #[test]
    fn first_add_to_empty_layer_gets_no_neighbors() {
        let mut layer = Layer::new(Euclidean);
        let mut rng = rng();
        layer.add(NodeId(1), vec![0.0, 0.0], vec![], 5, &mut rng);
        let node = layer.get(NodeId(1)).unwrap();
        assert_eq!(node.neighbor_ids().count(), 0);
    }

    #[test]
    fn add_links_neighbors_symmetrically() {
        let mut layer = Layer::new(Euclidean);
        let mut rng = rng();
        layer.add(NodeId(1), vec![0.0, 0.0], vec![], 5, &mut rng);
        layer.add(NodeId(2), vec![1.0, 0.0], vec![], 5, &mut rng);

        let a = layer.get(NodeId(1)).unwrap();
        let b = layer.get(NodeId(2)).unwrap();
        assert!(a.neighbor_ids().any(|id| id == NodeId(2)));
        assert!(b.neighbor_ids().any(|id| id == NodeId(1)));
    }

    #[test]
    fn nearest_from_descends_toward_closer_neighbor() {
        let mut layer = Layer::new(Euclidean);
        let mut rng = rng();
        layer.add(NodeId(1), vec![0.0], vec![], 5, &mut rng);
        layer.add(NodeId(2), vec![10.0], vec![], 5, &mut rng);
        layer.add(NodeId(3), vec![20.0], vec![], 5, &mut rng);

        let found = layer.nearest_from(&[21.0], NodeId(1)).unwrap();
        assert_eq!(found, NodeId(3));
    }

    #[test]
    fn remove_scrubs_dead_id_from_every_neighbor() {
        let mut layer = Layer::new(Euclidean);
        let mut rng = rng();
        layer.add(NodeId(1), vec![0.0], vec![], 5, &mut rng);
        layer.add(NodeId(2), vec![1.0], vec![], 5, &mut rng);
        layer.add(NodeId(3), vec![2.0], vec![], 5, &mut rng);

        assert!(layer.remove(NodeId(2)));
        assert!(layer.get(NodeId(2)).is_none());
        for id in [NodeId(1), NodeId(3)] {
            let node = layer.get(id).unwrap();
            assert!(!node.neighbor_ids().any(|n| n == NodeId(2)));
        }
    }

    #[test]
    fn remove_miss_returns_false() {
        let mut layer: Layer<Euclidean> = Layer::new(Euclidean);
        assert!(!layer.remove(NodeId(42)));
    }

    #[test]
    fn remove_fixes_rindex_for_swapped_in_node() {
        let mut layer = Layer::new(Euclidean);
        let mut rng = rng();
        layer.add(NodeId(1), vec![0.0], vec![], 5, &mut rng);
        layer.add(NodeId(2), vec![1.0], vec![], 5, &mut rng);
        layer.add(NodeId(3), vec![2.0], vec![], 5, &mut rng);

        layer.remove(NodeId(1));
        assert!(layer.get(NodeId(2)).is_some());
        assert!(layer.get(NodeId(3)).is_some());
        assert_eq!(layer.len(), 2);
    }

    #[test]
    fn serialize_then_deserialize_round_trips_node_set_and_neighbors() {
        let mut layer = Layer::new(Euclidean);
        let mut rng = rng();
        layer.add(NodeId(1), vec![0.0], vec![], 5, &mut rng);
        layer.add(NodeId(2), vec![1.0], vec![], 5, &mut rng);
        layer.add(NodeId(3), vec![2.0], vec![], 5, &mut rng);

        let mut buf = Vec::new();
        layer.serialize(&mut buf).unwrap();

        let restored: Layer<Euclidean> = Layer::deserialize(&mut &buf[..], Euclidean, None).unwrap();
        assert_eq!(restored.len(), layer.len());
        for id in [NodeId(1), NodeId(2), NodeId(3)] {
            let original = layer.get(id).unwrap();
            let copy = restored.get(id).unwrap();
            assert_eq!(original.vector(), copy.vector());
            let mut original_neighbors: Vec<NodeId> = original.neighbor_ids().collect();
            let mut copy_neighbors: Vec<NodeId> = copy.neighbor_ids().collect();
            original_neighbors.sort();
            copy_neighbors.sort();
            assert_eq!(original_neighbors, copy_neighbors);
        }
    }

    #[test]
    fn deserialize_drops_dangling_neighbor_ids() {
        // Hand-encode a single node that claims a neighbor id that does
        // not exist in the stream.
        let mut buf = Vec::new();
        buf.extend_from_slice(&1i32.to_le_bytes()); // node count
        buf.extend_from_slice(&1u64.to_le_bytes()); // id
        buf.extend_from_slice(&1i32.to_le_bytes()); // neighbor_count
        buf.extend_from_slice(&99u64.to_le_bytes()); // dangling neighbor id
        buf.extend_from_slice(&0i32.to_le_bytes()); // vector_len
        buf.extend_from_slice(&0i32.to_le_bytes()); // payload_len

        let layer: Layer<Euclidean> = Layer::deserialize(&mut &buf[..], Euclidean, None).unwrap();
        let node = layer.get(NodeId(1)).unwrap();
        assert_eq!(node.neighbor_ids().count(), 0);
    }

    #[test]
    fn deserialize_rejects_negative_node_count() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(-1i32).to_le_bytes());
        let err: Error = Layer::<Euclidean>::deserialize(&mut &buf[..], Euclidean, None).unwrap_err();
        assert!(matches!(err, Error::MalformedSnapshot { .. }));
    }
}
