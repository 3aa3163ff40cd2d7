//! Vector features with numeric attributes, convertible to GeoJSON

use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Int(i64),
    Float(f64),
    String(String),
}

impl From<&AttributeValue> for serde_json::Value {
    fn from(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::Null => serde_json::Value::Null,
            AttributeValue::Int(v) => serde_json::Value::from(*v),
            // Non-finite floats have no JSON form and become null
            AttributeValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            AttributeValue::String(v) => serde_json::Value::String(v.clone()),
        }
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    /// Feature geometry
    pub geometry: Option<Geometry<f64>>,
    /// Feature attributes, keyed by field name
    pub properties: BTreeMap<String, AttributeValue>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: BTreeMap::new(),
        }
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Builder form of `set_property`
    pub fn with_property(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.set_property(key, value);
        self
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }

    fn to_geojson(&self) -> geojson::Feature {
        let geometry = self
            .geometry
            .as_ref()
            .map(|g| geojson::Geometry::new(geojson::Value::from(g)));
        let properties: geojson::JsonObject = self
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
            .collect();

        geojson::Feature {
            bbox: None,
            geometry,
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

/// Collection of features
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self { features: Vec::new() }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Convert to a GeoJSON feature collection
    pub fn to_geojson(&self) -> geojson::FeatureCollection {
        geojson::FeatureCollection {
            bbox: None,
            features: self.features.iter().map(Feature::to_geojson).collect(),
            foreign_members: None,
        }
    }
}

impl FromIterator<Feature> for FeatureCollection {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self {
            features: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{polygon, Geometry};

    #[test]
    fn test_geojson_properties() {
        let cell = polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)];
        let feature = Feature::new(Geometry::Polygon(cell))
            .with_property("ID", AttributeValue::Int(3))
            .with_property("PredDef", AttributeValue::Float(1.5))
            .with_property("Residual", AttributeValue::Float(f64::NAN));

        let fc: FeatureCollection = std::iter::once(feature).collect();
        let gj = fc.to_geojson();
        assert_eq!(gj.features.len(), 1);

        let props = gj.features[0].properties.as_ref().unwrap();
        assert_eq!(props["ID"], serde_json::json!(3));
        assert_eq!(props["PredDef"], serde_json::json!(1.5));
        assert!(props["Residual"].is_null());
        assert!(gj.features[0].geometry.is_some());
    }
}
