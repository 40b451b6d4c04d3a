//! Node type tags
//!
//! A node's type is either one of the well-known kinds or a free-form custom
//! tag. Both are written to documents as the same short type string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use vista_core::SceneError;

/// Longest type string a document may carry
pub const MAX_TYPE_LEN: usize = 7;

/// The closed set of well-known node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A point cloud model
    PointCloud,
    /// A point, line or region describing a location of interest
    PointOfInterest,
    /// A folder of other nodes
    Folder,
    /// An image, movie, audio file or other media object
    Media,
    /// A camera location and orientation
    Viewpoint,
    /// Visualisation settings (intensity, map height, ...)
    VisualisationSettings,
    /// An indexed 3D scene layer dataset
    IndexedSceneLayer,
    /// A region describing a body of water
    Water,
    /// A point to generate a view shed from
    ViewShed,
    /// A polygon model
    Polygon,
    /// A query filter applied to every point cloud in the scene
    QueryFilter,
    /// A collection of places grouped together at a distance
    Places,
    /// A height measurement
    HeightMeasurement,
    /// A transit feed
    TransitFeed,
    /// A lasso selection folder
    LassoSelection,
    /// A group of query nodes shown as one node
    QueryGroup,
}

impl NodeKind {
    /// Every well-known kind
    pub const ALL: [NodeKind; 16] = [
        Self::PointCloud,
        Self::PointOfInterest,
        Self::Folder,
        Self::Media,
        Self::Viewpoint,
        Self::VisualisationSettings,
        Self::IndexedSceneLayer,
        Self::Water,
        Self::ViewShed,
        Self::Polygon,
        Self::QueryFilter,
        Self::Places,
        Self::HeightMeasurement,
        Self::TransitFeed,
        Self::LassoSelection,
        Self::QueryGroup,
    ];

    /// The type string written to documents
    pub const fn type_str(&self) -> &'static str {
        match self {
            Self::PointCloud => "UDS",
            Self::PointOfInterest => "POI",
            Self::Folder => "Folder",
            Self::Media => "Media",
            Self::Viewpoint => "Camera",
            Self::VisualisationSettings => "VizSet",
            Self::IndexedSceneLayer => "I3S",
            Self::Water => "Water",
            Self::ViewShed => "ViewMap",
            Self::Polygon => "Polygon",
            Self::QueryFilter => "QFilter",
            Self::Places => "Places",
            Self::HeightMeasurement => "MHeight",
            Self::TransitFeed => "GTFS",
            Self::LassoSelection => "LNode",
            Self::QueryGroup => "QGroup",
        }
    }

    fn from_type_str(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.type_str() == s)
    }
}

/// Type of a scene node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeType {
    WellKnown(NodeKind),
    Custom(String),
}

impl NodeType {
    /// The type string written to documents
    pub fn as_str(&self) -> &str {
        match self {
            Self::WellKnown(kind) => kind.type_str(),
            Self::Custom(s) => s,
        }
    }

    /// The well-known kind, if this is not a custom type
    pub fn kind(&self) -> Option<NodeKind> {
        match self {
            Self::WellKnown(kind) => Some(*kind),
            Self::Custom(_) => None,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }

    /// Check that a custom type string is non-empty and fits the limit
    pub fn validate(&self) -> Result<(), SceneError> {
        match self {
            Self::WellKnown(_) => Ok(()),
            Self::Custom(s) if s.is_empty() => {
                Err(SceneError::invalid("node type must not be empty"))
            }
            Self::Custom(s) if s.len() > MAX_TYPE_LEN => Err(SceneError::invalid(format!(
                "custom node type '{}' is longer than {} bytes",
                s, MAX_TYPE_LEN
            ))),
            Self::Custom(_) => Ok(()),
        }
    }

    /// Validate, folding a custom string that names a well-known type into
    /// that type so a node reads back exactly as it was written
    pub fn canonical(self) -> Result<Self, SceneError> {
        match self {
            Self::Custom(s) => s.parse(),
            known => Ok(known),
        }
    }
}

impl From<NodeKind> for NodeType {
    fn from(kind: NodeKind) -> Self {
        Self::WellKnown(kind)
    }
}

impl FromStr for NodeType {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(kind) = NodeKind::from_type_str(s) {
            return Ok(Self::WellKnown(kind));
        }
        let custom = Self::Custom(s.to_string());
        custom.validate()?;
        Ok(custom)
    }
}

impl TryFrom<&str> for NodeType {
    type Error = SceneError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NodeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
