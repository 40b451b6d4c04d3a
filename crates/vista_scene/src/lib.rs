//! # Vista Scene - Project Scene Graph
//!
//! A hierarchical model of geospatial scene content: point-cloud references,
//! points of interest, folders, media, viewpoints, polygons and the like.
//!
//! ## Key Concepts
//!
//! - **SceneTree**: arena of nodes with a single root and a constrained
//!   editing API (create, move, remove) that never leaves a broken tree
//! - **SceneNode**: identity, type, name, URI, visibility, bounds, geometry
//!   and metadata, plus id links to parent, first child and next sibling
//! - **MetadataTable**: typed per-node key/value annotations
//! - **Document**: GeoJSON-like JSON encoding with round-trip fidelity

pub mod document;
pub mod geometry;
pub mod metadata;
pub mod node;
pub mod node_type;
pub mod tree;
mod validation;

pub use document::{decode, encode, EncodeOptions, DOCUMENT_VERSION, MAX_DOCUMENT_DEPTH};
pub use geometry::{BoundingBox, Geometry, GeometryType};
pub use metadata::{MetadataKind, MetadataTable, MetadataValue};
pub use node::SceneNode;
pub use node_type::{NodeKind, NodeType, MAX_TYPE_LEN};
pub use tree::{DetachedSubtree, SceneTree, UserData};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::geometry::{BoundingBox, GeometryType};
    pub use crate::metadata::{MetadataKind, MetadataTable, MetadataValue};
    pub use crate::node::SceneNode;
    pub use crate::node_type::{NodeKind, NodeType};
    pub use crate::tree::{DetachedSubtree, SceneTree};
    pub use vista_core::prelude::*;
}
