//! Scene document codec
//!
//! Trees are stored as a GeoJSON-like JSON document. Every node is a
//! `Feature` carrying its type string, name, URI and visibility in
//! `properties`, an optional six-value `bbox`, an optional `geometry`,
//! its typed `metadata`, and an ordered list of `children`:
//!
//! ```json
//! {
//!   "version": 1,
//!   "root": {
//!     "type": "Feature",
//!     "id": "5b1f...",
//!     "properties": { "itemtype": "Folder", "name": "Project", "visible": true, "lastUpdate": 1700000000.0 },
//!     "geometry": null,
//!     "children": [ ... ]
//!   }
//! }
//! ```
//!
//! Decoding builds the whole tree before returning it. A malformed document
//! yields `Parse` and never a partially populated tree.
//!
//! Nodes may sit at most [`MAX_DOCUMENT_DEPTH`] levels below the root. Each
//! level costs two JSON containers plus a few inside the node, and the cap
//! keeps every document `encode` writes inside `serde_json`'s nesting limit.

use serde::{Deserialize, Serialize};
use vista_core::{NodeId, SceneError, SceneResult, Timestamp};

use crate::geometry::{BoundingBox, Geometry, GeometryType};
use crate::metadata::MetadataTable;
use crate::node::SceneNode;
use crate::node_type::NodeType;
use crate::tree::SceneTree;

/// Document format version written by [`encode`]
pub const DOCUMENT_VERSION: u32 = 1;

/// Deepest level below the root a document may hold
pub const MAX_DOCUMENT_DEPTH: usize = 48;

const FEATURE: &str = "Feature";

/// Options for [`encode`]
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeOptions {
    /// Indent the output for humans
    pub pretty: bool,
}

#[derive(Serialize, Deserialize)]
struct Document {
    version: u32,
    root: Feature,
}

#[derive(Deserialize)]
struct Header {
    version: Option<u32>,
}

#[derive(Serialize, Deserialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: String,
    id: NodeId,
    properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bbox: Option<BoundingBox>,
    #[serde(default)]
    geometry: Option<GeometryObject>,
    #[serde(default, skip_serializing_if = "MetadataTable::is_empty")]
    metadata: MetadataTable,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<Feature>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Properties {
    itemtype: NodeType,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uri: Option<String>,
    #[serde(default = "default_visible")]
    visible: bool,
    #[serde(default)]
    last_update: Timestamp,
}

fn default_visible() -> bool {
    true
}

#[derive(Serialize, Deserialize)]
struct GeometryObject {
    #[serde(rename = "type")]
    geometry_type: GeometryType,
    #[serde(default)]
    coordinates: Vec<[f64; 3]>,
}

/// Serialize a tree to document bytes
///
/// # Errors
///
/// `InvalidParameter` if a node is deeper than [`MAX_DOCUMENT_DEPTH`]. Nothing
/// is produced in that case, so a save never writes a document that cannot
/// be read back.
pub fn encode(tree: &SceneTree, options: &EncodeOptions) -> SceneResult<Vec<u8>> {
    let doc = Document {
        version: DOCUMENT_VERSION,
        root: to_feature(tree, tree.root(), 0)?,
    };
    let result = if options.pretty {
        serde_json::to_vec_pretty(&doc)
    } else {
        serde_json::to_vec(&doc)
    };
    result.map_err(|e| SceneError::invalid(format!("cannot encode scene: {}", e)))
}

/// Build a tree from document bytes
///
/// The returned tree has no unsaved changes and keeps the stored ids and
/// update times.
pub fn decode(bytes: &[u8]) -> SceneResult<SceneTree> {
    let header: Header = serde_json::from_slice(bytes)
        .map_err(|e| SceneError::parse(format!("malformed scene document: {}", e)))?;
    match header.version {
        Some(DOCUMENT_VERSION) => {}
        Some(other) => {
            return Err(SceneError::parse(format!(
                "unsupported document version {}",
                other
            )))
        }
        None => return Err(SceneError::parse("document has no version")),
    }

    let doc: Document = serde_json::from_slice(bytes)
        .map_err(|e| SceneError::parse(format!("malformed scene document: {}", e)))?;

    let Feature {
        kind,
        id,
        properties,
        bbox,
        geometry,
        metadata,
        children,
    } = doc.root;
    let root = to_node(&kind, id, properties, bbox, geometry, metadata)?;
    let mut tree = SceneTree::from_root(root);

    // Depth-first with an explicit stack, children kept in document order
    let mut pending: Vec<(NodeId, std::vec::IntoIter<Feature>)> = vec![(id, children.into_iter())];
    while let Some((parent, mut rest)) = pending.pop() {
        let Some(feature) = rest.next() else {
            continue;
        };
        pending.push((parent, rest));
        if pending.len() > MAX_DOCUMENT_DEPTH {
            return Err(SceneError::parse(format!(
                "document nests deeper than {} levels",
                MAX_DOCUMENT_DEPTH
            )));
        }

        let Feature {
            kind,
            id,
            properties,
            bbox,
            geometry,
            metadata,
            children,
        } = feature;
        let node = to_node(&kind, id, properties, bbox, geometry, metadata)?;
        tree.insert_loaded(parent, node)?;
        pending.push((id, children.into_iter()));
    }

    tree.check_invariants()
        .map_err(|e| SceneError::parse(format!("document is not a valid tree: {}", e)))?;
    tree.mark_saved();
    log::debug!("Decoded scene document with {} node(s)", tree.len());
    Ok(tree)
}

fn to_feature(tree: &SceneTree, id: NodeId, depth: usize) -> SceneResult<Feature> {
    if depth > MAX_DOCUMENT_DEPTH {
        return Err(SceneError::invalid(format!(
            "node {} is nested deeper than {} levels",
            id, MAX_DOCUMENT_DEPTH
        )));
    }
    let node = tree
        .node(id)
        .ok_or_else(|| SceneError::not_found(format!("node {} is not in this tree", id)))?;
    let geometry = (!node.geometry().is_none()).then(|| GeometryObject {
        geometry_type: node.geometry_type(),
        coordinates: node.coordinates().to_vec(),
    });
    let children = tree
        .child_ids(id)
        .into_iter()
        .map(|child| to_feature(tree, child, depth + 1))
        .collect::<SceneResult<Vec<_>>>()?;

    Ok(Feature {
        kind: FEATURE.to_string(),
        id,
        properties: Properties {
            itemtype: node.node_type().clone(),
            name: node.name().to_string(),
            uri: node.uri().map(str::to_string),
            visible: node.is_visible(),
            last_update: node.last_update(),
        },
        bbox: node.bounding_box().copied(),
        geometry,
        metadata: node.metadata().clone(),
        children,
    })
}

fn to_node(
    kind: &str,
    id: NodeId,
    properties: Properties,
    bbox: Option<BoundingBox>,
    geometry: Option<GeometryObject>,
    metadata: MetadataTable,
) -> SceneResult<SceneNode> {
    if kind != FEATURE {
        return Err(SceneError::parse(format!(
            "node {} has type '{}', expected '{}'",
            id, kind, FEATURE
        )));
    }
    let geometry = match geometry {
        Some(g) => Geometry::new(g.geometry_type, g.coordinates)
            .map_err(|e| SceneError::parse(format!("node {}: {}", id, e)))?,
        None => Geometry::none(),
    };

    let mut node = SceneNode::new(id, properties.itemtype, properties.name, properties.uri);
    node.visible = properties.visible;
    node.last_update = properties.last_update;
    node.bounding_box = bbox;
    node.geometry = geometry;
    node.metadata = metadata;
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_type::NodeKind;
    use vista_core::ErrorKind;

    #[test]
    fn test_single_node_roundtrip() {
        let tree = SceneTree::new("Project");
        let bytes = encode(&tree, &EncodeOptions::default()).unwrap();
        let back = decode(&bytes).unwrap();
        assert!(tree.same_content(&back));
        assert_eq!(back.root(), tree.root());
        assert!(!back.has_unsaved_changes());
    }

    #[test]
    fn test_geometry_null_when_absent() {
        let tree = SceneTree::new("Project");
        let bytes = encode(&tree, &EncodeOptions::default()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["root"]["geometry"], serde_json::Value::Null);
        assert_eq!(value["root"]["properties"]["itemtype"], "Folder");
        assert_eq!(value["version"], DOCUMENT_VERSION);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let err = decode(br#"{"version": 99, "root": {}}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
        let err = decode(br#"{"root": {}}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
    }

    #[test]
    fn test_garbage_rejected() {
        assert_eq!(decode(b"not json").unwrap_err().kind(), ErrorKind::ParseError);
        assert_eq!(decode(b"").unwrap_err().kind(), ErrorKind::ParseError);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut tree = SceneTree::new("Project");
        let root = tree.root();
        let a = tree.create_node(root, NodeKind::Folder, Some("A"), None).unwrap();
        let bytes = encode(&tree, &EncodeOptions::default()).unwrap();

        let text = String::from_utf8(bytes).unwrap();
        let text = text.replace(&a.to_string(), &root.to_string());
        assert_eq!(
            decode(text.as_bytes()).unwrap_err().kind(),
            ErrorKind::ParseError
        );
    }

    #[test]
    fn test_invalid_geometry_rejected() {
        let id = NodeId::new();
        let doc = format!(
            r#"{{"version":1,"root":{{"type":"Feature","id":"{}",
            "properties":{{"itemtype":"POI","name":"pin"}},
            "geometry":{{"type":"Point","coordinates":[]}}}}}}"#,
            id
        );
        assert_eq!(decode(doc.as_bytes()).unwrap_err().kind(), ErrorKind::ParseError);
    }

    #[test]
    fn test_defaults_applied() {
        let id = NodeId::new();
        let doc = format!(
            r#"{{"version":1,"root":{{"type":"Feature","id":"{}",
            "properties":{{"itemtype":"Sensor","name":"s"}}}}}}"#,
            id
        );
        let tree = decode(doc.as_bytes()).unwrap();
        let root = tree.root_node();
        assert!(root.is_visible());
        assert_eq!(root.node_type().as_str(), "Sensor");
        assert!(root.node_type().is_custom());
    }

    #[test]
    fn test_pretty_output_is_indented() {
        let tree = SceneTree::new("Project");
        let bytes = encode(&tree, &EncodeOptions { pretty: true }).unwrap();
        assert!(String::from_utf8(bytes).unwrap().contains("\n  "));
    }
}
