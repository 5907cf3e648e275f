//! Graph vertices and their little-endian binary codec.

use std::io::{Read, Write};

use crate::error::Error;

/// Monotonically increasing, unique within one [`crate::Collection`]'s
/// lifetime. The same numeric id names the "same logical item" across
/// every layer it participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

/// A fast, non-cryptographic hasher for `NodeId`-keyed sets that never see
/// untrusted keys.
pub(crate) type NodeIdHashSet = std::collections::HashSet<NodeId, ahash::RandomState>;
pub(crate) type NodeIdHashMap<V> = std::collections::HashMap<NodeId, V, ahash::RandomState>;

/// A vertex in one [`crate::Layer`].
///
/// `neighbors` holds only ids, not references: per the arena discipline
/// this crate follows (see the crate-level docs), a node's neighbors are
/// resolved back to concrete data through the owning layer's `rindex`,
/// which breaks the ownership cycle a "real" pointer-neighbor graph would
/// otherwise require.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) vector: Vec<f64>,
    pub(crate) value: Vec<u8>,
    pub(crate) neighbors: NodeIdHashSet,
    pub(crate) next_level: Option<NodeId>,
}

impl Node {
    pub(crate) fn new(id: NodeId, vector: Vec<f64>, value: Vec<u8>) -> Self {
        Self {
            id,
            vector,
            value,
            neighbors: NodeIdHashSet::default(),
            next_level: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn vector(&self) -> &[f64] {
        &self.vector
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The node with the same id one layer down, if this node participates
    /// there.
    pub fn next_level(&self) -> Option<NodeId> {
        self.next_level
    }

    /// Ids of same-layer neighbors. Order is unspecified.
    pub fn neighbor_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.neighbors.iter().copied()
    }

    /// Little-endian wire format, exact field order:
    /// id (u64) · neighbor_count (i32) · neighbor_ids (neighbor_count x u64)
    /// · vector_len (i32) · vector_comps (vector_len x f64)
    /// · payload_len (i32) · payload_bytes
    pub(crate) fn serialize(&self, w: &mut impl Write) -> std::io::Result<usize> {
        let mut size = 0;

        w.write_all(&self.id.0.to_le_bytes())?;
        size += 8;

        w.write_all(&(self.neighbors.len() as i32).to_le_bytes())?;
        size += 4;

        for neighbor in &self.neighbors {
            w.write_all(&neighbor.0.to_le_bytes())?;
            size += 8;
        }

        w.write_all(&(self.vector.len() as i32).to_le_bytes())?;
        size += 4;

        for component in &self.vector {
            w.write_all(&component.to_le_bytes())?;
            size += 8;
        }

        w.write_all(&(self.value.len() as i32).to_le_bytes())?;
        size += 4;

        if !self.value.is_empty() {
            w.write_all(&self.value)?;
            size += self.value.len();
        }

        Ok(size)
    }

    /// Reconstructs a node with its neighbor id *keys* set but no
    /// guarantee those ids resolve within the enclosing layer yet — the
    /// caller (`Layer::deserialize`) links and prunes them.
    pub(crate) fn deserialize(r: &mut impl Read) -> Result<Self, Error> {
        let id = NodeId(read_u64(r)?);

        let neighbor_count = read_i32(r)?;
        if neighbor_count < 0 {
            return Err(Error::MalformedSnapshot {
                reason: format!("negative neighbor count: {neighbor_count}"),
            });
        }
        let mut neighbors = NodeIdHashSet::default();
        for _ in 0..neighbor_count {
            neighbors.insert(NodeId(read_u64(r)?));
        }

        let vector_len = read_i32(r)?;
        if vector_len < 0 {
            return Err(Error::MalformedSnapshot {
                reason: format!("negative vector length: {vector_len}"),
            });
        }
        let mut vector = Vec::with_capacity(vector_len as usize);
        for _ in 0..vector_len {
            vector.push(read_f64(r)?);
        }

        let payload_len = read_i32(r)?;
        if payload_len < 0 {
            return Err(Error::MalformedSnapshot {
                reason: format!("negative payload length: {payload_len}"),
            });
        }
        let mut value = vec![0u8; payload_len as usize];
        if payload_len > 0 {
            r.read_exact(&mut value)?;
        }

        Ok(Self {
            id,
            vector,
            value,
            neighbors,
            next_level: None,
        })
    }
}

fn read_u64(r: &mut impl Read) -> std::io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn read_i32(r: &mut impl Read) -> std::io::Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f64(r: &mut impl Read) -> std::io::Result<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serialize_then_deserialize_round_trips_id_vector_payload_and_neighbors() {
        let mut node = Node::new(NodeId(1), vec![1.0, 2.0, 3.0, 4.0], b"payload".to_vec());
        node.neighbors.insert(NodeId(2));
        node.neighbors.insert(NodeId(3));

        let mut buf = Vec::new();
        node.serialize(&mut buf).unwrap();

        let decoded = Node::deserialize(&mut &buf[..]).unwrap();

        assert_eq!(decoded.id, NodeId(1));
        assert_eq!(decoded.vector, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(decoded.value, b"payload".to_vec());
        assert!(decoded.neighbors.contains(&NodeId(2)));
        assert!(decoded.neighbors.contains(&NodeId(3)));
        assert_eq!(decoded.neighbors.len(), 2);
    }

    #[test]
    fn deserialize_rejects_negative_neighbor_count() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u64.to_le_bytes()); // id
        buf.extend_from_slice(&(-1i32).to_le_bytes()); // neighbor_count
        let err = Node::deserialize(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, Error::MalformedSnapshot { .. }));
    }

    #[test]
    fn deserialize_surfaces_io_error_on_truncation() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u64.to_le_bytes()); // id only, nothing else
        let err = Node::deserialize(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn empty_payload_round_trips_as_empty() {
        let node = Node::new(NodeId(9), vec![], vec![]);
        let mut buf = Vec::new();
        node.serialize(&mut buf).unwrap();
        let decoded = Node::deserialize(&mut &buf[..]).unwrap();
        assert!(decoded.value.is_empty());
        assert!(decoded.vector.is_empty());
    }
}
