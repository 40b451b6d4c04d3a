//! Plain-text tree listing

use std::fmt::Write;

use vista_core::NodeId;
use vista_scene::{GeometryType, SceneTree};

/// One line per node, indented by depth
pub fn tree(tree: &SceneTree) -> String {
    let mut out = String::new();
    let mut stack: Vec<(NodeId, usize)> = vec![(tree.root(), 0)];

    while let Some((id, depth)) = stack.pop() {
        let Some(node) = tree.node(id) else { continue };
        let _ = write!(
            out,
            "{:indent$}{} [{}]",
            "",
            node.name(),
            node.node_type().as_str(),
            indent = depth * 2
        );
        if let Some(uri) = node.uri() {
            let _ = write!(out, " {}", uri);
        }
        if !node.is_visible() {
            out.push_str(" (hidden)");
        }
        if node.geometry_type() != GeometryType::None {
            let _ = write!(
                out,
                " {:?}x{}",
                node.geometry_type(),
                node.coordinates().len()
            );
        }
        let keys: Vec<&str> = node.metadata().iter().map(|(key, _)| key).collect();
        if !keys.is_empty() {
            let _ = write!(out, " {{{}}}", keys.join(", "));
        }
        out.push('\n');

        let children = tree.child_ids(id);
        for child in children.into_iter().rev() {
            stack.push((child, depth + 1));
        }
    }
    out
}
