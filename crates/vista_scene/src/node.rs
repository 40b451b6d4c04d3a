//! Scene nodes
//!
//! A [`SceneNode`] is plain data plus three index links into the arena that
//! owns it. Nodes are only mutated through [`SceneTree`](crate::SceneTree),
//! which keeps the links consistent.

use vista_core::{NodeId, Timestamp};

use crate::geometry::{BoundingBox, Geometry, GeometryType};
use crate::metadata::MetadataTable;
use crate::node_type::NodeType;

/// A single element of the project tree
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub(crate) id: NodeId,
    pub(crate) node_type: NodeType,
    pub(crate) name: String,
    pub(crate) uri: Option<String>,
    pub(crate) visible: bool,
    pub(crate) last_update: Timestamp,
    pub(crate) bounding_box: Option<BoundingBox>,
    pub(crate) geometry: Geometry,
    pub(crate) metadata: MetadataTable,

    pub(crate) parent: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) next_sibling: Option<NodeId>,
}

impl SceneNode {
    pub(crate) fn new(id: NodeId, node_type: NodeType, name: String, uri: Option<String>) -> Self {
        Self {
            id,
            node_type,
            name,
            uri,
            visible: true,
            last_update: Timestamp::now(),
            bounding_box: None,
            geometry: Geometry::none(),
            metadata: MetadataTable::new(),
            parent: None,
            first_child: None,
            next_sibling: None,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_update = Timestamp::now();
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Time of the last mutation of this node
    pub fn last_update(&self) -> Timestamp {
        self.last_update
    }

    pub fn bounding_box(&self) -> Option<&BoundingBox> {
        self.bounding_box.as_ref()
    }

    pub fn has_bounding_box(&self) -> bool {
        self.bounding_box.is_some()
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn geometry_type(&self) -> GeometryType {
        self.geometry.geometry_type()
    }

    pub fn coordinates(&self) -> &[[f64; 3]] {
        self.geometry.coordinates()
    }

    pub fn metadata(&self) -> &MetadataTable {
        &self.metadata
    }

    /// Parent link; `None` for the root of a tree or a detached subtree
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn first_child(&self) -> Option<NodeId> {
        self.first_child
    }

    pub fn next_sibling(&self) -> Option<NodeId> {
        self.next_sibling
    }

    /// Compare everything except identity, timestamps and links
    pub fn same_content(&self, other: &SceneNode) -> bool {
        self.node_type == other.node_type
            && self.name == other.name
            && self.uri == other.uri
            && self.visible == other.visible
            && self.bounding_box == other.bounding_box
            && self.geometry == other.geometry
            && self.metadata == other.metadata
    }
}

/// Derive a display name from a resource locator or, failing that, a type
pub(crate) fn derive_name(uri: Option<&str>, node_type: &NodeType) -> String {
    uri.and_then(|u| {
        let path = u.split(['?', '#']).next().unwrap_or(u);
        path.rsplit(['/', '\\'])
            .find(|segment| !segment.is_empty())
            .map(str::to_string)
    })
    .unwrap_or_else(|| node_type.as_str().to_string())
}
