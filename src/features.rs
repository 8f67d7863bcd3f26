use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::RouteGuideError;
use crate::geo::Bounds;
use crate::routeguide::{Feature, Point};

const BUNDLED_DB: &str = include_str!("../data/route_guide_db.json");

#[derive(Deserialize)]
struct FeatureRecord {
    #[serde(default)]
    name: String,
    #[serde(default)]
    location: LocationRecord,
}

#[derive(Default, Deserialize)]
struct LocationRecord {
    #[serde(default)]
    latitude: i32,
    #[serde(default)]
    longitude: i32,
}

impl From<FeatureRecord> for Feature {
    fn from(record: FeatureRecord) -> Self {
        Feature {
            name: record.name,
            location: Some(Point {
                latitude: record.location.latitude,
                longitude: record.location.longitude,
            }),
        }
    }
}

/// Whether a feature is named. Unnamed features stand for "nothing here".
pub fn exists(feature: &Feature) -> bool {
    !feature.name.is_empty()
}

/// Immutable list of known features, shared read-only by all calls.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    features: Vec<Feature>,
}

impl FeatureTable {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    /// Parse a JSON array of `{"location": {...}, "name": "..."}` records.
    pub fn from_json(json: &str) -> Result<Self, RouteGuideError> {
        let records: Vec<FeatureRecord> = serde_json::from_str(json)?;
        Ok(Self::new(records.into_iter().map(Feature::from).collect()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RouteGuideError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| RouteGuideError::FeatureDbIo {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_json(&json)?;
        info!(path = %path.display(), features = table.len(), "Loaded feature database");
        Ok(table)
    }

    /// The feature database compiled into the binary.
    pub fn bundled() -> Result<Self, RouteGuideError> {
        Self::from_json(BUNDLED_DB)
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// First feature located exactly at `location`.
    pub fn find(&self, location: &Point) -> Option<&Feature> {
        self.features
            .iter()
            .find(|feature| feature.location.as_ref() == Some(location))
    }

    /// The feature at `location`, or an unnamed feature at that location.
    pub fn check_feature(&self, location: &Point) -> Feature {
        self.find(location).cloned().unwrap_or_else(|| Feature {
            name: String::new(),
            location: Some(*location),
        })
    }

    /// Named features inside `bounds`, in table order.
    pub fn within(&self, bounds: Bounds) -> impl Iterator<Item = &Feature> + '_ {
        self.features.iter().filter(move |feature| {
            exists(feature)
                && feature
                    .location
                    .as_ref()
                    .is_some_and(|location| bounds.contains(location))
        })
    }
}
