//! Structural invariant checks
//!
//! Used by [`SceneTree::check_invariants`](crate::SceneTree::check_invariants)
//! and after decoding a document. The walk is bounded by the arena size so a
//! corrupted sibling chain cannot loop forever.

use std::collections::{HashMap, HashSet};

use vista_core::{NodeId, SceneError, SceneResult};

use crate::node::SceneNode;

pub(crate) fn check_structure(nodes: &HashMap<NodeId, SceneNode>, root: NodeId) -> SceneResult<()> {
    let root_node = nodes
        .get(&root)
        .ok_or_else(|| SceneError::not_allowed(format!("root {} is missing", root)))?;
    if root_node.parent.is_some() {
        return Err(SceneError::not_allowed("root node has a parent"));
    }
    if root_node.next_sibling.is_some() {
        return Err(SceneError::not_allowed("root node has a sibling"));
    }

    for (id, node) in nodes {
        if node.id != *id {
            return Err(SceneError::not_allowed(format!(
                "node stored under {} reports id {}",
                id, node.id
            )));
        }
        match node.parent {
            None if *id != root => {
                return Err(SceneError::not_allowed(format!(
                    "node {} has no parent but is not the root",
                    id
                )));
            }
            Some(parent) if !nodes.contains_key(&parent) => {
                return Err(SceneError::not_allowed(format!(
                    "node {} points at missing parent {}",
                    id, parent
                )));
            }
            _ => {}
        }
    }

    // Walk from the root; every node must be reached exactly once and every
    // child must point back at the parent whose chain holds it
    let mut visited = HashSet::with_capacity(nodes.len());
    visited.insert(root);
    let mut stack = vec![root];
    while let Some(parent) = stack.pop() {
        let mut current = nodes.get(&parent).and_then(|n| n.first_child);
        while let Some(child) = current {
            let child_node = nodes.get(&child).ok_or_else(|| {
                SceneError::not_allowed(format!("{} links to missing child {}", parent, child))
            })?;
            if child_node.parent != Some(parent) {
                return Err(SceneError::not_allowed(format!(
                    "{} is chained under {} but its parent link disagrees",
                    child, parent
                )));
            }
            if !visited.insert(child) {
                return Err(SceneError::not_allowed(format!(
                    "{} is reachable more than once",
                    child
                )));
            }
            stack.push(child);
            current = child_node.next_sibling;
        }
    }

    if visited.len() != nodes.len() {
        return Err(SceneError::not_allowed(format!(
            "{} node(s) are not reachable from the root",
            nodes.len() - visited.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_type::NodeKind;

    fn node(id: NodeId, parent: Option<NodeId>) -> SceneNode {
        let mut n = SceneNode::new(id, NodeKind::Folder.into(), id.to_string(), None);
        n.parent = parent;
        n
    }

    #[test]
    fn test_single_root_passes() {
        let root = NodeId::new();
        let mut nodes = HashMap::new();
        nodes.insert(root, node(root, None));
        assert!(check_structure(&nodes, root).is_ok());
    }

    #[test]
    fn test_orphan_detected() {
        let root = NodeId::new();
        let orphan = NodeId::new();
        let mut nodes = HashMap::new();
        nodes.insert(root, node(root, None));
        nodes.insert(orphan, node(orphan, Some(root)));
        // Parent link set, but never chained under the root
        assert!(check_structure(&nodes, root).is_err());
    }

    #[test]
    fn test_sibling_loop_detected() {
        let root = NodeId::new();
        let a = NodeId::new();
        let b = NodeId::new();
        let mut nodes = HashMap::new();
        let mut r = node(root, None);
        r.first_child = Some(a);
        let mut na = node(a, Some(root));
        na.next_sibling = Some(b);
        let mut nb = node(b, Some(root));
        nb.next_sibling = Some(a);
        nodes.insert(root, r);
        nodes.insert(a, na);
        nodes.insert(b, nb);
        assert!(check_structure(&nodes, root).is_err());
    }

    #[test]
    fn test_parent_mismatch_detected() {
        let root = NodeId::new();
        let a = NodeId::new();
        let b = NodeId::new();
        let mut nodes = HashMap::new();
        let mut r = node(root, None);
        r.first_child = Some(a);
        let mut na = node(a, Some(root));
        na.next_sibling = Some(b);
        nodes.insert(root, r);
        nodes.insert(a, na);
        nodes.insert(b, node(b, Some(a)));
        assert!(check_structure(&nodes, root).is_err());
    }
}
