//! Scene tree
//!
//! [`SceneTree`] owns every node of a project in an arena keyed by
//! [`NodeId`]. Parent, first-child and next-sibling relationships are stored
//! as ids, so structural edits are index updates and cycle checks are a walk
//! up the parent links bounded by the arena size.
//!
//! All structural operations validate fully before touching any link. A
//! failed call leaves the tree exactly as it was.
//!
//! # Usage
//!
//! ```ignore
//! let mut tree = SceneTree::new("Project");
//! let layers = tree.create_node(tree.root(), NodeKind::Folder, Some("Layers"), None)?;
//! let cloud = tree.create_node(layers, NodeKind::PointCloud, None, Some("https://host/Melbourne.uds"))?;
//! tree.set_metadata(cloud, "resolution", 0.05)?;
//! ```

use std::any::Any;
use std::collections::{HashMap, HashSet};

use vista_core::{NodeId, SceneError, SceneResult};

use crate::geometry::{BoundingBox, Geometry, GeometryType};
use crate::metadata::{MetadataTable, MetadataValue};
use crate::node::{derive_name, SceneNode};
use crate::node_type::{NodeKind, NodeType};
use crate::validation;

/// Opaque application data attached to a node
pub type UserData = Box<dyn Any + Send>;

/// A rooted, acyclic tree of scene nodes
pub struct SceneTree {
    nodes: HashMap<NodeId, SceneNode>,
    root: NodeId,
    user_data: HashMap<NodeId, UserData>,
    revision: u64,
    saved_revision: u64,
}

impl SceneTree {
    /// Create a tree holding a single root folder
    pub fn new(name: impl Into<String>) -> Self {
        let node_type = NodeType::from(NodeKind::Folder);
        let mut name = name.into();
        if name.is_empty() {
            name = derive_name(None, &node_type);
        }
        let root = SceneNode::new(NodeId::new(), node_type, name, None);
        Self::from_root(root)
    }

    /// Start a tree from an already-built root node
    pub(crate) fn from_root(mut root: SceneNode) -> Self {
        root.parent = None;
        root.next_sibling = None;
        root.first_child = None;
        let root_id = root.id;
        let mut nodes = HashMap::new();
        nodes.insert(root_id, root);
        Self {
            nodes,
            root: root_id,
            user_data: HashMap::new(),
            revision: 0,
            saved_revision: 0,
        }
    }

    /// Id of the root node
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &SceneNode {
        // The root is inserted at construction and can never be removed
        &self.nodes[&self.root]
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of nodes, including the root
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check if anything changed since the last load or save
    pub fn has_unsaved_changes(&self) -> bool {
        self.revision != self.saved_revision
    }

    /// Clear the unsaved-changes flag after a successful save
    pub fn mark_saved(&mut self) {
        self.saved_revision = self.revision;
    }

    /// Counter bumped by every mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Record that the state at `revision` reached a store
    ///
    /// Edits made after that revision keep the tree dirty.
    pub fn mark_saved_at(&mut self, revision: u64) {
        if revision > self.saved_revision && revision <= self.revision {
            self.saved_revision = revision;
        }
    }

    fn get(&self, id: NodeId) -> SceneResult<&SceneNode> {
        self.nodes
            .get(&id)
            .ok_or_else(|| SceneError::not_found(format!("node {} is not in this tree", id)))
    }

    fn get_mut(&mut self, id: NodeId) -> SceneResult<&mut SceneNode> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| SceneError::not_found(format!("node {} is not in this tree", id)))
    }

    fn touch(&mut self, id: NodeId) -> SceneResult<()> {
        self.get_mut(id)?.touch();
        self.revision += 1;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Structural edits
    // ------------------------------------------------------------------

    /// Create a node as the last child of `parent`
    ///
    /// When `name` is omitted or empty it is derived from the last path
    /// segment of `uri`, or from the type string.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if `parent` is not in this tree or the type string
    /// is empty or too long. A custom type spelled like a well-known one is
    /// stored as the well-known type.
    pub fn create_node(
        &mut self,
        parent: NodeId,
        node_type: impl Into<NodeType>,
        name: Option<&str>,
        uri: Option<&str>,
    ) -> SceneResult<NodeId> {
        let node_type = node_type.into().canonical()?;
        if !self.contains(parent) {
            return Err(SceneError::invalid(format!(
                "parent {} does not belong to this tree",
                parent
            )));
        }
        let uri = uri.filter(|u| !u.is_empty()).map(str::to_string);
        let name = match name {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => derive_name(uri.as_deref(), &node_type),
        };

        let id = NodeId::new();
        self.nodes.insert(id, SceneNode::new(id, node_type, name, uri));
        self.link(parent, id, None)?;
        self.touch(parent)?;
        Ok(id)
    }

    /// Move `node` from `current_parent` to `new_parent`
    ///
    /// With `insert_before` set, `node` is placed directly in front of that
    /// child of `new_parent`. Otherwise it becomes the last child.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `node` is not a child of `current_parent`
    /// - `NotAllowed` if `new_parent` is not in this tree, or is `node` or
    ///   one of its descendants
    /// - `InvalidParameter` if `insert_before` is not a child of `new_parent`
    pub fn move_child(
        &mut self,
        current_parent: NodeId,
        new_parent: NodeId,
        node: NodeId,
        insert_before: Option<NodeId>,
    ) -> SceneResult<()> {
        self.expect_child(current_parent, node)?;
        if !self.contains(new_parent) {
            return Err(SceneError::not_allowed(format!(
                "new parent {} is not in this tree",
                new_parent
            )));
        }
        if node == new_parent || self.is_ancestor(new_parent, node) {
            return Err(SceneError::not_allowed(format!(
                "moving {} under {} would create a cycle",
                node, new_parent
            )));
        }
        if let Some(before) = insert_before {
            if before == node && new_parent == current_parent {
                // Already directly in front of itself
                return Ok(());
            }
            if self.node(before).and_then(|n| n.parent) != Some(new_parent) {
                return Err(SceneError::invalid(format!(
                    "{} is not a child of {}",
                    before, new_parent
                )));
            }
        }

        self.unlink(node)?;
        self.link(new_parent, node, insert_before)?;
        self.touch(node)?;
        self.touch(current_parent)?;
        self.touch(new_parent)?;
        log::debug!("Moved node {} from {} to {}", node, current_parent, new_parent);
        Ok(())
    }

    /// Detach `node` and its whole subtree from the tree
    ///
    /// The detached nodes, and any user data attached to them, move into the
    /// returned [`DetachedSubtree`]. The tree keeps no reference to them.
    ///
    /// # Errors
    ///
    /// `NotFound` if `node` is not currently a child of `parent`.
    pub fn remove_child(&mut self, parent: NodeId, node: NodeId) -> SceneResult<DetachedSubtree> {
        self.expect_child(parent, node)?;

        let mut ids = vec![node];
        ids.extend(self.descendants(node));

        self.unlink(node)?;
        self.touch(parent)?;

        let mut nodes = HashMap::with_capacity(ids.len());
        let mut user_data = HashMap::new();
        for id in ids {
            if let Some(n) = self.nodes.remove(&id) {
                nodes.insert(id, n);
            }
            if let Some(data) = self.user_data.remove(&id) {
                user_data.insert(id, data);
            }
        }
        log::debug!("Removed subtree of {} node(s) rooted at {}", nodes.len(), node);

        Ok(DetachedSubtree {
            nodes,
            root: node,
            user_data,
        })
    }

    /// Graft a previously detached subtree back under `parent`
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` if `parent` is not in this tree or `insert_before`
    ///   is not a child of `parent`
    /// - `NotAllowed` if any id of the subtree is already in use here
    pub fn attach_subtree(
        &mut self,
        parent: NodeId,
        subtree: DetachedSubtree,
        insert_before: Option<NodeId>,
    ) -> SceneResult<NodeId> {
        if !self.contains(parent) {
            return Err(SceneError::invalid(format!(
                "parent {} does not belong to this tree",
                parent
            )));
        }
        if let Some(before) = insert_before {
            if self.node(before).and_then(|n| n.parent) != Some(parent) {
                return Err(SceneError::invalid(format!(
                    "{} is not a child of {}",
                    before, parent
                )));
            }
        }
        if let Some(clash) = subtree.nodes.keys().find(|id| self.contains(**id)) {
            return Err(SceneError::not_allowed(format!(
                "node {} already exists in this tree",
                clash
            )));
        }

        let root = subtree.root;
        self.nodes.extend(subtree.nodes);
        self.user_data.extend(subtree.user_data);
        self.link(parent, root, insert_before)?;
        self.touch(parent)?;
        Ok(root)
    }

    fn expect_child(&self, parent: NodeId, node: NodeId) -> SceneResult<()> {
        match self.nodes.get(&node) {
            Some(n) if n.parent == Some(parent) => Ok(()),
            _ => Err(SceneError::not_found(format!(
                "{} is not a child of {}",
                node, parent
            ))),
        }
    }

    /// Splice `node` out of its parent's sibling chain
    fn unlink(&mut self, node: NodeId) -> SceneResult<()> {
        let (parent, next) = {
            let n = self.get(node)?;
            (n.parent, n.next_sibling)
        };
        let Some(parent) = parent else {
            return Ok(());
        };

        if self.get(parent)?.first_child == Some(node) {
            self.get_mut(parent)?.first_child = next;
        } else {
            let prev = self
                .sibling_chain(parent)
                .into_iter()
                .find(|id| self.nodes.get(id).and_then(|n| n.next_sibling) == Some(node));
            if let Some(prev) = prev {
                self.get_mut(prev)?.next_sibling = next;
            }
        }

        let n = self.get_mut(node)?;
        n.parent = None;
        n.next_sibling = None;
        Ok(())
    }

    /// Splice a parentless `node` into `parent`'s chain
    fn link(&mut self, parent: NodeId, node: NodeId, before: Option<NodeId>) -> SceneResult<()> {
        let chain = self.sibling_chain(parent);
        let first = self.get(parent)?.first_child;
        match before {
            Some(before) if first == Some(before) => {
                self.get_mut(node)?.next_sibling = Some(before);
                self.get_mut(parent)?.first_child = Some(node);
            }
            Some(before) => {
                let prev = chain
                    .iter()
                    .copied()
                    .find(|id| self.nodes.get(id).and_then(|n| n.next_sibling) == Some(before));
                let prev = prev.ok_or_else(|| {
                    SceneError::invalid(format!("{} is not a child of {}", before, parent))
                })?;
                self.get_mut(node)?.next_sibling = Some(before);
                self.get_mut(prev)?.next_sibling = Some(node);
            }
            None => match chain.last() {
                Some(&last) => self.get_mut(last)?.next_sibling = Some(node),
                None => self.get_mut(parent)?.first_child = Some(node),
            },
        }
        self.get_mut(node)?.parent = Some(parent);
        Ok(())
    }

    /// Child ids of `parent` in sibling order, bounded by the arena size
    fn sibling_chain(&self, parent: NodeId) -> Vec<NodeId> {
        sibling_chain(&self.nodes, parent)
    }

    /// Check if `ancestor` is a strict ancestor of `node`
    pub fn is_ancestor(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.nodes.get(&node).and_then(|n| n.parent);
        let mut steps = 0;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                break;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    // ------------------------------------------------------------------
    // Field setters
    // ------------------------------------------------------------------

    pub fn set_visibility(&mut self, id: NodeId, visible: bool) -> SceneResult<()> {
        self.get_mut(id)?.visible = visible;
        self.touch(id)
    }

    pub fn set_name(&mut self, id: NodeId, name: &str) -> SceneResult<()> {
        if name.is_empty() {
            return Err(SceneError::invalid("node name must not be empty"));
        }
        self.get_mut(id)?.name = name.to_string();
        self.touch(id)
    }

    /// Set or clear the resource locator; an empty string clears it
    pub fn set_uri(&mut self, id: NodeId, uri: Option<&str>) -> SceneResult<()> {
        self.get_mut(id)?.uri = uri.filter(|u| !u.is_empty()).map(str::to_string);
        self.touch(id)
    }

    pub fn set_bounding_box(&mut self, id: NodeId, bounds: BoundingBox) -> SceneResult<()> {
        // Fields are public, so re-check what the caller handed in
        let bounds = BoundingBox::new(bounds.min, bounds.max)?;
        self.get_mut(id)?.bounding_box = Some(bounds);
        self.touch(id)
    }

    pub fn clear_bounding_box(&mut self, id: NodeId) -> SceneResult<()> {
        self.get_mut(id)?.bounding_box = None;
        self.touch(id)
    }

    /// Replace a node's geometry from a flat `[x, y, z, ...]` buffer
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if `coords.len() != count * 3`, a value is not
    /// finite, or `count` does not suit `geometry_type`.
    pub fn set_geometry(
        &mut self,
        id: NodeId,
        geometry_type: GeometryType,
        count: usize,
        coords: &[f64],
    ) -> SceneResult<()> {
        self.get(id)?;
        let geometry = Geometry::from_flat(geometry_type, count, coords)?;
        self.get_mut(id)?.geometry = geometry;
        self.touch(id)
    }

    pub fn set_metadata(
        &mut self,
        id: NodeId,
        key: &str,
        value: impl Into<MetadataValue>,
    ) -> SceneResult<()> {
        self.get_mut(id)?.metadata.set(key, value)?;
        self.touch(id)
    }

    /// Edit a node's metadata table in place
    ///
    /// The edit is all or nothing: if `f` fails the table is put back as it
    /// was. The node only counts as changed when the table differs afterwards.
    pub fn update_metadata<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut MetadataTable) -> SceneResult<R>,
    ) -> SceneResult<R> {
        let node = self.get_mut(id)?;
        let before = node.metadata.clone();
        match f(&mut node.metadata) {
            Ok(result) => {
                if node.metadata != before {
                    self.touch(id)?;
                }
                Ok(result)
            }
            Err(e) => {
                node.metadata = before;
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    /// Child ids in order, captured at call time
    pub fn child_ids(&self, id: NodeId) -> Vec<NodeId> {
        self.sibling_chain(id)
    }

    /// Iterate over the children of `id` in order
    ///
    /// Yields nothing for an unknown id. Call again to restart.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &SceneNode> + '_ {
        self.sibling_chain(id)
            .into_iter()
            .filter_map(move |child| self.nodes.get(&child))
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.sibling_chain(id).len()
    }

    /// Visit each child of `id`, allowing the visitor to edit the tree
    ///
    /// The child list is captured before the first visit. Children removed
    /// from the tree before they are reached are skipped; children added
    /// during the walk are not visited. The first visitor error stops the
    /// walk and is returned.
    pub fn for_each_child<F>(&mut self, id: NodeId, mut visitor: F) -> SceneResult<()>
    where
        F: FnMut(&mut SceneTree, NodeId) -> SceneResult<()>,
    {
        self.get(id)?;
        for child in self.sibling_chain(id) {
            if !self.contains(child) {
                continue;
            }
            visitor(self, child)?;
        }
        Ok(())
    }

    /// All descendants of `id` in depth-first pre-order, excluding `id`
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        descendants(&self.nodes, id)
    }

    /// Ancestors of `id`, nearest first, ending at the root
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut current = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(parent) = current {
            if result.len() >= self.nodes.len() {
                break;
            }
            result.push(parent);
            current = self.nodes.get(&parent).and_then(|n| n.parent);
        }
        result
    }

    /// Depth of `id` below the root (root is 0)
    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).len()
    }

    /// Find the first node (pre-order from the root) with the given name
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        std::iter::once(self.root)
            .chain(self.descendants(self.root))
            .find(|id| self.nodes.get(id).map(|n| n.name.as_str()) == Some(name))
    }

    /// Compare two trees ignoring ids and timestamps
    pub fn same_content(&self, other: &SceneTree) -> bool {
        same_subtree(self, self.root, other, other.root)
    }

    // ------------------------------------------------------------------
    // User data
    // ------------------------------------------------------------------

    /// Attach user data to a node, returning whatever was attached before
    pub fn set_user_data(&mut self, id: NodeId, data: UserData) -> SceneResult<Option<UserData>> {
        self.get(id)?;
        Ok(self.user_data.insert(id, data))
    }

    pub fn user_data<T: Any>(&self, id: NodeId) -> Option<&T> {
        self.user_data.get(&id).and_then(|d| d.downcast_ref::<T>())
    }

    pub fn user_data_mut<T: Any>(&mut self, id: NodeId) -> Option<&mut T> {
        self.user_data.get_mut(&id).and_then(|d| d.downcast_mut::<T>())
    }

    /// Release a node's user data back to the caller
    pub fn take_user_data(&mut self, id: NodeId) -> Option<UserData> {
        self.user_data.remove(&id)
    }

    /// Number of nodes that still hold user data
    pub fn user_data_count(&self) -> usize {
        self.user_data.len()
    }

    /// Drop all user data, returning how many nodes held some
    pub fn clear_user_data(&mut self) -> usize {
        let count = self.user_data.len();
        self.user_data.clear();
        count
    }

    // ------------------------------------------------------------------
    // Internal construction
    // ------------------------------------------------------------------

    /// Append a fully built node under `parent` without touching timestamps
    pub(crate) fn insert_loaded(&mut self, parent: NodeId, mut node: SceneNode) -> SceneResult<()> {
        if self.contains(node.id) {
            return Err(SceneError::parse(format!("duplicate node id {}", node.id)));
        }
        node.parent = None;
        node.first_child = None;
        node.next_sibling = None;
        let id = node.id;
        self.nodes.insert(id, node);
        self.link(parent, id, None)
    }

    /// Verify the structural invariants
    ///
    /// Exactly one root, every node reachable from it exactly once, no
    /// cycles, and every parent link agreeing with the sibling chains.
    pub fn check_invariants(&self) -> SceneResult<()> {
        validation::check_structure(&self.nodes, self.root)
    }
}

impl std::fmt::Debug for SceneTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneTree")
            .field("root", &self.root)
            .field("len", &self.nodes.len())
            .field("user_data", &self.user_data.len())
            .field("revision", &self.revision)
            .finish()
    }
}

/// A subtree removed from a [`SceneTree`]
///
/// Owns its nodes and their user data. It can be inspected, have its user
/// data released, be grafted back with [`SceneTree::attach_subtree`], or
/// simply be dropped.
pub struct DetachedSubtree {
    nodes: HashMap<NodeId, SceneNode>,
    root: NodeId,
    user_data: HashMap<NodeId, UserData>,
}

impl DetachedSubtree {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &SceneNode> + '_ {
        sibling_chain(&self.nodes, id)
            .into_iter()
            .filter_map(move |child| self.nodes.get(&child))
    }

    pub fn child_ids(&self, id: NodeId) -> Vec<NodeId> {
        sibling_chain(&self.nodes, id)
    }

    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        descendants(&self.nodes, id)
    }

    pub fn user_data<T: Any>(&self, id: NodeId) -> Option<&T> {
        self.user_data.get(&id).and_then(|d| d.downcast_ref::<T>())
    }

    pub fn take_user_data(&mut self, id: NodeId) -> Option<UserData> {
        self.user_data.remove(&id)
    }

    pub fn user_data_count(&self) -> usize {
        self.user_data.len()
    }

    pub fn check_invariants(&self) -> SceneResult<()> {
        validation::check_structure(&self.nodes, self.root)
    }
}

impl std::fmt::Debug for DetachedSubtree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetachedSubtree")
            .field("root", &self.root)
            .field("len", &self.nodes.len())
            .field("user_data", &self.user_data.len())
            .finish()
    }
}

pub(crate) fn sibling_chain(nodes: &HashMap<NodeId, SceneNode>, parent: NodeId) -> Vec<NodeId> {
    let mut chain = Vec::new();
    let mut current = nodes.get(&parent).and_then(|n| n.first_child);
    while let Some(id) = current {
        if chain.len() >= nodes.len() {
            break;
        }
        chain.push(id);
        current = nodes.get(&id).and_then(|n| n.next_sibling);
    }
    chain
}

fn descendants(nodes: &HashMap<NodeId, SceneNode>, id: NodeId) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<NodeId> = sibling_chain(nodes, id).into_iter().rev().collect();
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        result.push(current);
        stack.extend(sibling_chain(nodes, current).into_iter().rev());
    }
    result
}

fn same_subtree(a: &SceneTree, a_id: NodeId, b: &SceneTree, b_id: NodeId) -> bool {
    let (Some(na), Some(nb)) = (a.node(a_id), b.node(b_id)) else {
        return false;
    };
    if !na.same_content(nb) {
        return false;
    }
    let ca = a.child_ids(a_id);
    let cb = b.child_ids(b_id);
    ca.len() == cb.len()
        && ca
            .iter()
            .zip(cb.iter())
            .all(|(x, y)| same_subtree(a, *x, b, *y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (SceneTree, NodeId, NodeId, NodeId) {
        let mut tree = SceneTree::new("Project");
        let root = tree.root();
        let a = tree.create_node(root, NodeKind::Folder, Some("A"), None).unwrap();
        let b = tree.create_node(root, NodeKind::Folder, Some("B"), None).unwrap();
        let c = tree.create_node(root, NodeKind::Folder, Some("C"), None).unwrap();
        (tree, a, b, c)
    }

    fn names(tree: &SceneTree, id: NodeId) -> Vec<String> {
        tree.children(id).map(|n| n.name().to_string()).collect()
    }

    #[test]
    fn test_new_tree_has_single_root() {
        let tree = SceneTree::new("Project");
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root_node().name(), "Project");
        assert_eq!(tree.root_node().parent(), None);
        assert!(!tree.has_unsaved_changes());
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_create_appends_in_order() {
        let (tree, ..) = sample();
        assert_eq!(names(&tree, tree.root()), vec!["A", "B", "C"]);
        assert!(tree.has_unsaved_changes());
    }

    #[test]
    fn test_create_rejects_foreign_parent() {
        let mut tree = SceneTree::new("Project");
        let err = tree
            .create_node(NodeId::new(), NodeKind::Folder, None, None)
            .unwrap_err();
        assert_eq!(err.kind(), vista_core::ErrorKind::InvalidParameter);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_create_rejects_bad_custom_type() {
        let mut tree = SceneTree::new("Project");
        let root = tree.root();
        assert!(tree
            .create_node(root, NodeType::Custom(String::new()), None, None)
            .is_err());
        assert!(tree
            .create_node(root, NodeType::Custom("WayTooLong".into()), None, None)
            .is_err());
    }

    #[test]
    fn test_create_touches_parent() {
        let mut tree = SceneTree::new("Project");
        let root = tree.root();
        let before = tree.root_node().last_update();
        let child = tree.create_node(root, NodeKind::Media, None, None).unwrap();
        assert!(tree.root_node().last_update() > before);
        assert_eq!(tree.node(child).unwrap().name(), "Media");
    }

    #[test]
    fn test_move_before_sibling() {
        let (mut tree, a, _b, c) = sample();
        let root = tree.root();
        tree.move_child(root, root, c, Some(a)).unwrap();
        assert_eq!(names(&tree, root), vec!["C", "A", "B"]);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_move_to_end() {
        let (mut tree, a, ..) = sample();
        let root = tree.root();
        tree.move_child(root, root, a, None).unwrap();
        assert_eq!(names(&tree, root), vec!["B", "C", "A"]);
    }

    #[test]
    fn test_move_into_other_parent() {
        let (mut tree, a, b, _c) = sample();
        let root = tree.root();
        tree.move_child(root, a, b, None).unwrap();
        assert_eq!(names(&tree, root), vec!["A", "C"]);
        assert_eq!(names(&tree, a), vec!["B"]);
        assert_eq!(tree.node(b).unwrap().parent(), Some(a));
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_move_under_self_rejected() {
        let (mut tree, a, ..) = sample();
        let root = tree.root();
        let err = tree.move_child(root, a, a, None).unwrap_err();
        assert_eq!(err.kind(), vista_core::ErrorKind::NotAllowed);
    }

    #[test]
    fn test_move_wrong_current_parent() {
        let (mut tree, a, b, _c) = sample();
        let err = tree.move_child(a, a, b, None).unwrap_err();
        assert_eq!(err.kind(), vista_core::ErrorKind::NotFound);
    }

    #[test]
    fn test_move_insert_before_foreign_child() {
        let (mut tree, a, b, _c) = sample();
        let root = tree.root();
        let inner = tree.create_node(a, NodeKind::Folder, Some("inner"), None).unwrap();
        let err = tree.move_child(root, root, b, Some(inner)).unwrap_err();
        assert_eq!(err.kind(), vista_core::ErrorKind::InvalidParameter);
        assert_eq!(names(&tree, root), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_remove_returns_subtree() {
        let (mut tree, a, ..) = sample();
        let root = tree.root();
        let inner = tree.create_node(a, NodeKind::PointOfInterest, Some("pin"), None).unwrap();

        let detached = tree.remove_child(root, a).unwrap();
        assert_eq!(detached.len(), 2);
        assert_eq!(detached.root(), a);
        assert!(detached.contains(inner));
        assert!(!tree.contains(a));
        assert!(!tree.contains(inner));
        detached.check_invariants().unwrap();
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_remove_not_child() {
        let (mut tree, a, b, _) = sample();
        let err = tree.remove_child(a, b).unwrap_err();
        assert_eq!(err.kind(), vista_core::ErrorKind::NotFound);
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_user_data_moves_with_subtree() {
        let (mut tree, a, b, _) = sample();
        let root = tree.root();
        tree.set_user_data(a, Box::new(7u32)).unwrap();
        tree.set_user_data(b, Box::new("keep")).unwrap();

        let mut detached = tree.remove_child(root, a).unwrap();
        assert_eq!(tree.user_data_count(), 1);
        assert_eq!(detached.user_data::<u32>(a), Some(&7));
        assert!(detached.take_user_data(a).is_some());
        assert_eq!(detached.user_data_count(), 0);
    }

    #[test]
    fn test_attach_subtree_restores_nodes() {
        let (mut tree, a, b, _c) = sample();
        let root = tree.root();
        let detached = tree.remove_child(root, a).unwrap();
        tree.attach_subtree(b, detached, None).unwrap();
        assert_eq!(tree.node(a).unwrap().parent(), Some(b));
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_setters_validate() {
        let (mut tree, a, ..) = sample();
        assert!(tree.set_name(a, "").is_err());
        assert!(tree
            .set_geometry(a, GeometryType::Point, 1, &[1.0, 2.0])
            .is_err());
        assert_eq!(tree.node(a).unwrap().geometry_type(), GeometryType::None);

        tree.set_geometry(a, GeometryType::Point, 1, &[1.0, 2.0, 3.0])
            .unwrap();
        assert_eq!(tree.node(a).unwrap().coordinates(), &[[1.0, 2.0, 3.0]]);

        let bad = BoundingBox {
            min: [1.0, 0.0, 0.0],
            max: [0.0, 1.0, 1.0],
        };
        assert!(tree.set_bounding_box(a, bad).is_err());
        assert!(!tree.node(a).unwrap().has_bounding_box());
    }

    #[test]
    fn test_setters_update_timestamp() {
        let (mut tree, a, ..) = sample();
        let before = tree.node(a).unwrap().last_update();
        tree.set_visibility(a, false).unwrap();
        let after = tree.node(a).unwrap().last_update();
        assert!(after > before);
        assert!(!tree.node(a).unwrap().is_visible());
    }

    #[test]
    fn test_mark_saved_clears_dirty() {
        let (mut tree, a, ..) = sample();
        tree.mark_saved();
        assert!(!tree.has_unsaved_changes());
        tree.set_metadata(a, "k", 1).unwrap();
        assert!(tree.has_unsaved_changes());
    }

    #[test]
    fn test_mark_saved_at_older_revision() {
        let (mut tree, a, ..) = sample();
        let captured = tree.revision();
        tree.set_name(a, "renamed").unwrap();
        tree.mark_saved_at(captured);
        assert!(tree.has_unsaved_changes());

        tree.mark_saved_at(tree.revision());
        assert!(!tree.has_unsaved_changes());
    }

    #[test]
    fn test_update_metadata() {
        let (mut tree, a, ..) = sample();
        let len = tree
            .update_metadata(a, |m| {
                m.set_bool("x", true)?;
                m.set_int("y", 2)?;
                Ok(m.len())
            })
            .unwrap();
        assert_eq!(len, 2);
        assert!(tree.node(a).unwrap().metadata().get_bool("x", false));
    }

    #[test]
    fn test_update_metadata_only_touches_on_change() {
        let (mut tree, a, ..) = sample();
        tree.set_metadata(a, "x", true).unwrap();
        tree.mark_saved();
        let revision = tree.revision();
        let stamp = tree.node(a).unwrap().last_update();

        let len = tree.update_metadata(a, |m| Ok(m.len())).unwrap();
        assert_eq!(len, 1);
        assert_eq!(tree.revision(), revision);
        assert!(!tree.has_unsaved_changes());

        let err = tree
            .update_metadata(a, |m| {
                m.set_int("y", 2)?;
                m.set_double("z", f64::NAN)
            })
            .unwrap_err();
        assert_eq!(err.kind(), vista_core::ErrorKind::InvalidParameter);
        let node = tree.node(a).unwrap();
        assert!(!node.metadata().contains_key("y"));
        assert_eq!(node.last_update(), stamp);
        assert_eq!(tree.revision(), revision);

        tree.update_metadata(a, |m| m.set_int("y", 2)).unwrap();
        assert!(tree.revision() > revision);
        assert!(tree.has_unsaved_changes());
    }

    #[test]
    fn test_for_each_child_skips_removed() {
        let (mut tree, _a, b, _c) = sample();
        let root = tree.root();
        let mut visited = Vec::new();
        tree.for_each_child(root, |t, id| {
            visited.push(t.node(id).map(|n| n.name().to_string()));
            if t.node(id).map(|n| n.name()) == Some("A") {
                t.remove_child(root, b)?;
                t.create_node(root, NodeKind::Folder, Some("D"), None)?;
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(
            visited,
            vec![Some("A".to_string()), Some("C".to_string())]
        );
        assert_eq!(names(&tree, root), vec!["A", "C", "D"]);
    }

    #[test]
    fn test_ancestors_and_descendants() {
        let (mut tree, a, ..) = sample();
        let root = tree.root();
        let x = tree.create_node(a, NodeKind::Folder, Some("x"), None).unwrap();
        let y = tree.create_node(x, NodeKind::Folder, Some("y"), None).unwrap();
        assert_eq!(tree.ancestors(y), vec![x, a, root]);
        assert_eq!(tree.depth(y), 3);
        assert_eq!(tree.descendants(a), vec![x, y]);
        assert!(tree.is_ancestor(y, a));
        assert!(!tree.is_ancestor(a, y));
        assert_eq!(tree.find_by_name("y"), Some(y));
    }
}
