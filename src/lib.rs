//! An in-memory, single-threaded approximate nearest-neighbor index built
//! as a hierarchical small-world graph.
//!
//! A [`Collection`] owns a stack of [`Layer`]s. Inserting a vector picks a
//! random layer index and links the new node into every layer from there
//! down to the bottom; searching descends the stack greedily before
//! running a bounded beam expansion on the bottom layer.
//!
//! Two deliberate quirks are documented rather than silently fixed (see
//! [`Collection::n_nearest`] and [`Cosine`]): the bottom layer's top-k
//! target is the descended entry node, not the caller's query, and
//! `Cosine` returns a similarity, not a distance.

mod collection;
mod config;
mod distance;
mod error;
mod heap;
mod layer;
mod node;

pub use collection::Collection;
pub use config::HnswConfig;
pub use distance::{Cosine, DistanceFn, Euclidean, Scalar, Vector};
pub use error::Error;
pub use heap::KClosest;
pub use layer::Layer;
pub use node::{Node, NodeId};
