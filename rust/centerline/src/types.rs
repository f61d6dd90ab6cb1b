// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Feature model consumed and produced by the pipeline
//!
//! The shapes mirror GeoJSON (`FeatureCollection` → `Feature` → typed
//! geometry) so collections can be read and written with `serde_json`
//! directly. Only `LineString` geometries take part in processing; every
//! other geometry kind is carried through untouched.

use nalgebra::Point2;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Free-form feature properties
pub type Properties = Map<String, Value>;

/// A coordinate tuple `(x, y[, z])`
///
/// Z is carried through the pipeline but never takes part in a decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }

    pub fn to_nalgebra(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    pub fn from_nalgebra(p: &Point2<f64>, z: Option<f64>) -> Self {
        Self { x: p.x, y: p.y, z }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl TryFrom<Vec<f64>> for Position {
    type Error = Error;

    fn try_from(ordinates: Vec<f64>) -> Result<Self> {
        match ordinates.as_slice() {
            [x, y] => Ok(Self::new(*x, *y)),
            [x, y, z, ..] => Ok(Self::with_z(*x, *y, *z)),
            _ => Err(Error::InvalidPosition(ordinates.len())),
        }
    }
}

impl From<Position> for Vec<f64> {
    fn from(p: Position) -> Self {
        match p.z {
            Some(z) => vec![p.x, p.y, z],
            None => vec![p.x, p.y],
        }
    }
}

/// Axis-aligned 2D bounds, serialized as GeoJSON `[min_x, min_y, max_x, max_y]`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Box spanning two corner points given in any order
    pub fn from_points(a: &Point2<f64>, b: &Point2<f64>) -> Self {
        Self {
            min_x: a.x.min(b.x),
            min_y: a.y.min(b.y),
            max_x: a.x.max(b.x),
            max_y: a.y.max(b.y),
        }
    }

    /// Bounds of a coordinate list, `None` when it is empty
    pub fn from_positions(positions: &[Position]) -> Option<Self> {
        let first = positions.first()?;
        let mut bbox = Self {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in &positions[1..] {
            bbox.min_x = bbox.min_x.min(p.x);
            bbox.min_y = bbox.min_y.min(p.y);
            bbox.max_x = bbox.max_x.max(p.x);
            bbox.max_y = bbox.max_y.max(p.y);
        }
        Some(bbox)
    }

    /// Square box of half-width `radius` centered on `center`
    pub fn around(center: &Point2<f64>, radius: f64) -> Self {
        Self {
            min_x: center.x - radius,
            min_y: center.y - radius,
            max_x: center.x + radius,
            max_y: center.y + radius,
        }
    }

    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }

    pub fn min_corner(&self) -> [f64; 2] {
        [self.min_x, self.min_y]
    }

    pub fn max_corner(&self) -> [f64; 2] {
        [self.max_x, self.max_y]
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(b: [f64; 4]) -> Self {
        Self {
            min_x: b[0],
            min_y: b[1],
            max_x: b[2],
            max_y: b[3],
        }
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.min_x, b.min_y, b.max_x, b.max_y]
    }
}

/// Typed geometry of a feature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
}

impl Geometry {
    /// Coordinates of a line geometry
    pub fn as_line(&self) -> Option<&[Position]> {
        match self {
            Geometry::LineString(coords) => Some(coords),
            _ => None,
        }
    }

    pub fn as_line_mut(&mut self) -> Option<&mut Vec<Position>> {
        match self {
            Geometry::LineString(coords) => Some(coords),
            _ => None,
        }
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        match self {
            Geometry::Point(p) => BoundingBox::from_positions(std::slice::from_ref(p)),
            Geometry::LineString(coords) => BoundingBox::from_positions(coords),
            Geometry::MultiLineString(parts) | Geometry::Polygon(parts) => {
                let all: Vec<Position> = parts.iter().flatten().copied().collect();
                BoundingBox::from_positions(&all)
            }
        }
    }
}

/// A single geometry with identity and properties
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub geometry: Geometry,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        let bbox = geometry.bbox();
        Self {
            id: None,
            geometry,
            properties: Properties::new(),
            bbox,
        }
    }

    /// New line feature with its bounding box filled in
    pub fn line(coords: Vec<Position>) -> Self {
        Self::new(Geometry::LineString(coords))
    }

    pub fn line_coordinates(&self) -> Option<&[Position]> {
        self.geometry.as_line()
    }

    /// Identifier stored under the `"id"` property, if any
    ///
    /// Numeric ids are rendered as strings.
    pub fn property_id(&self) -> Option<String> {
        match self.properties.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Drawing layer recorded by the CAD import
    pub fn layer(&self) -> Option<&str> {
        self.properties.get("layer").and_then(Value::as_str)
    }

    pub fn refresh_bbox(&mut self) {
        self.bbox = self.geometry.bbox();
    }
}

/// Ordered collection of features
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    /// Number of features with line geometry
    pub fn line_count(&self) -> usize {
        self.features
            .iter()
            .filter(|f| f.line_coordinates().is_some())
            .count()
    }

    /// Keep only the features drawn on `layer`
    pub fn retain_layer(&mut self, layer: &str) {
        self.features.retain(|f| f.layer() == Some(layer));
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }
}

impl FromIterator<Feature> for FeatureCollection {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self {
            features: iter.into_iter().collect(),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Properties, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Properties>::deserialize(deserializer)?.unwrap_or_default())
}
