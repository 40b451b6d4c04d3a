//! Node geometry and bounds

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use vista_core::{SceneError, SceneResult};

/// Kind of geometry attached to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GeometryType {
    /// No geometry
    #[default]
    None,
    /// A single 3D position
    Point,
    /// Several independent positions
    MultiPoint,
    /// An open line
    LineString,
    /// Several lines; usually represented by children
    MultiLineString,
    /// A closed outer ring; interior islands may be children
    Polygon,
    /// Several polygons; usually represented by children
    MultiPolygon,
    /// A mix of geometries; usually represented by children
    GeometryCollection,
}

impl GeometryType {
    /// Check a coordinate count against what this geometry type accepts
    fn check_count(&self, count: usize) -> SceneResult<()> {
        let ok = match self {
            Self::None => count == 0,
            Self::Point => count == 1,
            Self::LineString => count >= 2,
            Self::Polygon => count >= 3,
            Self::MultiPoint
            | Self::MultiLineString
            | Self::MultiPolygon
            | Self::GeometryCollection => true,
        };
        if ok {
            Ok(())
        } else {
            Err(SceneError::invalid(format!(
                "{:?} geometry cannot have {} coordinate(s)",
                self, count
            )))
        }
    }
}

/// Geometry payload of a node: a type tag plus its ordered positions
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Geometry {
    geometry_type: GeometryType,
    coordinates: Vec<[f64; 3]>,
}

impl Geometry {
    /// A node without geometry
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from typed positions
    pub fn new(geometry_type: GeometryType, coordinates: Vec<[f64; 3]>) -> SceneResult<Self> {
        geometry_type.check_count(coordinates.len())?;
        if coordinates.iter().flatten().any(|c| !c.is_finite()) {
            return Err(SceneError::invalid("geometry coordinates must be finite"));
        }
        Ok(Self {
            geometry_type,
            coordinates,
        })
    }

    /// Build from a flat `[x0, y0, z0, ..., xn, yn, zn]` buffer
    ///
    /// `flat.len()` must equal `count * 3`.
    pub fn from_flat(geometry_type: GeometryType, count: usize, flat: &[f64]) -> SceneResult<Self> {
        let expected = count
            .checked_mul(3)
            .ok_or_else(|| SceneError::invalid("geometry count overflows"))?;
        if flat.len() != expected {
            return Err(SceneError::invalid(format!(
                "expected {} values for {} coordinate(s), got {}",
                expected,
                count,
                flat.len()
            )));
        }
        let coordinates = flat.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
        Self::new(geometry_type, coordinates)
    }

    pub fn geometry_type(&self) -> GeometryType {
        self.geometry_type
    }

    pub fn coordinates(&self) -> &[[f64; 3]] {
        &self.coordinates
    }

    /// Number of positions
    pub fn count(&self) -> usize {
        self.coordinates.len()
    }

    /// Positions as a flat `[x, y, z, ...]` buffer
    pub fn to_flat(&self) -> Vec<f64> {
        self.coordinates.iter().flatten().copied().collect()
    }

    pub fn is_none(&self) -> bool {
        self.geometry_type == GeometryType::None
    }
}

/// Axis-aligned bounds of a node
///
/// Serialized as `[west, south, floor, east, north, ceiling]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    /// Create a box, rejecting non-finite or inverted bounds
    pub fn new(min: [f64; 3], max: [f64; 3]) -> SceneResult<Self> {
        if min.iter().chain(max.iter()).any(|v| !v.is_finite()) {
            return Err(SceneError::invalid("bounding box values must be finite"));
        }
        if (0..3).any(|i| min[i] > max[i]) {
            return Err(SceneError::invalid("bounding box min must not exceed max"));
        }
        Ok(Self { min, max })
    }

    /// Create from the six-value array layout
    pub fn from_array(values: [f64; 6]) -> SceneResult<Self> {
        Self::new(
            [values[0], values[1], values[2]],
            [values[3], values[4], values[5]],
        )
    }

    pub fn to_array(&self) -> [f64; 6] {
        [
            self.min[0], self.min[1], self.min[2], self.max[0], self.max[1], self.max[2],
        ]
    }

    pub fn center(&self) -> [f64; 3] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        ]
    }

    pub fn contains(&self, point: [f64; 3]) -> bool {
        (0..3).all(|i| point[i] >= self.min[i] && point[i] <= self.max[i])
    }
}

impl Serialize for BoundingBox {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_array().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BoundingBox {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = <[f64; 6]>::deserialize(deserializer)?;
        Self::from_array(values).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flat_checks_length() {
        let ok = Geometry::from_flat(GeometryType::LineString, 2, &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(ok.unwrap().coordinates(), &[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]);

        let short = Geometry::from_flat(GeometryType::LineString, 2, &[0.0, 0.0, 0.0, 1.0]);
        assert!(short.is_err());
    }

    #[test]
    fn test_count_rules() {
        assert!(Geometry::new(GeometryType::Point, vec![[1.0, 2.0, 3.0]]).is_ok());
        assert!(Geometry::new(GeometryType::Point, vec![]).is_err());
        assert!(Geometry::new(GeometryType::LineString, vec![[0.0; 3]]).is_err());
        assert!(Geometry::new(GeometryType::Polygon, vec![[0.0; 3]; 2]).is_err());
        assert!(Geometry::new(GeometryType::None, vec![[0.0; 3]]).is_err());
        assert!(Geometry::new(GeometryType::MultiPoint, vec![]).is_ok());
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(Geometry::new(GeometryType::Point, vec![[f64::NAN, 0.0, 0.0]]).is_err());
    }

    #[test]
    fn test_to_flat() {
        let g = Geometry::new(GeometryType::MultiPoint, vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(g.to_flat(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(g.count(), 2);
    }

    #[test]
    fn test_bounding_box_validation() {
        assert!(BoundingBox::new([0.0; 3], [1.0; 3]).is_ok());
        assert!(BoundingBox::new([2.0, 0.0, 0.0], [1.0; 3]).is_err());
        assert!(BoundingBox::new([0.0; 3], [f64::INFINITY, 1.0, 1.0]).is_err());
    }

    #[test]
    fn test_bounding_box_array_layout() {
        let bb = BoundingBox::new([1.0, 2.0, 3.0], [4.0, 5.0, 6.0]).unwrap();
        assert_eq!(serde_json::to_string(&bb).unwrap(), "[1.0,2.0,3.0,4.0,5.0,6.0]");
        assert_eq!(bb.center(), [2.5, 3.5, 4.5]);
        assert!(bb.contains([2.0, 3.0, 4.0]));
        assert!(!bb.contains([0.0, 3.0, 4.0]));
    }
}
