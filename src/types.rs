//! Data model shared by the sync pipeline.
//!
//! The persisted types serialize as GeoJSON: a `FeatureCollection` of
//! `LineString` features. Field names and nesting are read by generic
//! geospatial tools and must not change.

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;

/// Name used when the remote activity has no display name.
pub const DEFAULT_ACTIVITY_NAME: &str = "Unnamed run";

// ============================================================================
// Identifiers
// ============================================================================

/// Stable remote activity identifier.
///
/// The remote service hands out integers, but documents written by other
/// tools may carry string ids. Both round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActivityId {
    Numeric(u64),
    Text(String),
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityId::Numeric(id) => write!(f, "{}", id),
            ActivityId::Text(id) => f.write_str(id),
        }
    }
}

impl From<u64> for ActivityId {
    fn from(id: u64) -> Self {
        ActivityId::Numeric(id)
    }
}

impl From<&str> for ActivityId {
    fn from(id: &str) -> Self {
        ActivityId::Text(id.to_string())
    }
}

// ============================================================================
// Remote Listing
// ============================================================================

/// One entry of the remote activity listing.
///
/// Only the fields the pipeline consumes are kept; everything else in the
/// listing payload is ignored. Missing or null numbers read as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteActivitySummary {
    pub activity_id: ActivityId,
    #[serde(default)]
    pub activity_name: Option<String>,
    /// Remote-local start time, e.g. "2024-03-01 07:12:33"
    #[serde(default)]
    pub start_time_local: Option<String>,
    /// Distance in meters
    #[serde(default)]
    pub distance: Option<f64>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Average speed in m/s
    #[serde(default)]
    pub average_speed: Option<f64>,
}

impl RemoteActivitySummary {
    pub fn new(activity_id: impl Into<ActivityId>) -> Self {
        Self {
            activity_id: activity_id.into(),
            activity_name: None,
            start_time_local: None,
            distance: None,
            duration: None,
            average_speed: None,
        }
    }

    pub fn name(&self) -> &str {
        self.activity_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_ACTIVITY_NAME)
    }

    pub fn start_time(&self) -> &str {
        self.start_time_local.as_deref().unwrap_or("")
    }

    pub fn distance_m(&self) -> f64 {
        self.distance.unwrap_or(0.0)
    }

    pub fn duration_s(&self) -> f64 {
        self.duration.unwrap_or(0.0)
    }

    pub fn avg_speed_m_s(&self) -> f64 {
        self.average_speed.unwrap_or(0.0)
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// A WGS84 position in decimal degrees.
///
/// Serialized as a GeoJSON position, `[longitude, latitude]`. Positions
/// read with a third (altitude) component keep only the first two.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[f64; 2]")]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Both components within the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        (-180.0..=180.0).contains(&self.longitude) && (-90.0..=90.0).contains(&self.latitude)
    }
}

impl From<[f64; 2]> for GeoPoint {
    fn from([longitude, latitude]: [f64; 2]) -> Self {
        GeoPoint::new(longitude, latitude)
    }
}

impl TryFrom<Vec<f64>> for GeoPoint {
    type Error = String;

    fn try_from(position: Vec<f64>) -> Result<Self, Self::Error> {
        match position[..] {
            [longitude, latitude, ..] => Ok(GeoPoint::new(longitude, latitude)),
            _ => Err(format!("position needs 2 components, got {}", position.len())),
        }
    }
}

impl From<GeoPoint> for [f64; 2] {
    fn from(point: GeoPoint) -> Self {
        [point.longitude, point.latitude]
    }
}

/// Ordered track points in recording order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackGeometry(pub Vec<GeoPoint>);

impl TrackGeometry {
    /// Minimum points for a track to be worth persisting.
    pub const MIN_POINTS: usize = 2;

    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, point: GeoPoint) {
        self.0.push(point);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.0
    }

    /// A track with fewer than two points cannot form a line.
    pub fn is_usable(&self) -> bool {
        self.0.len() >= Self::MIN_POINTS
    }
}

impl FromIterator<GeoPoint> for TrackGeometry {
    fn from_iter<I: IntoIterator<Item = GeoPoint>>(iter: I) -> Self {
        TrackGeometry(iter.into_iter().collect())
    }
}

// ============================================================================
// Persisted GeoJSON Types
// ============================================================================

/// GeoJSON `type` member written for the dataset document.
pub const FEATURE_COLLECTION: &str = "FeatureCollection";

/// GeoJSON `LineString` geometry object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "LineString")]
pub struct LineStringGeometry {
    pub coordinates: TrackGeometry,
}

/// Properties stored alongside each route.
///
/// Null values written by other tools read as empty / zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    pub id: ActivityId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// YYYY-MM-DD bucket of the start time
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub distance_km: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration_min: f64,
    /// Minutes per km, "M:SS"
    #[serde(default, deserialize_with = "null_as_default")]
    pub pace: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub avg_speed_kmh: f64,
    /// Keys written by other tools
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A route produced by this run, before it joins the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    pub geometry: LineStringGeometry,
    pub properties: FeatureProperties,
}

impl Feature {
    pub fn id(&self) -> &ActivityId {
        &self.properties.id
    }

    pub fn coordinates(&self) -> &TrackGeometry {
        &self.geometry.coordinates
    }
}

/// A feature as it sits in the dataset document.
///
/// Held as raw JSON and written back exactly as read: members this crate
/// does not model (feature `id`, `bbox`, altitude, foreign properties) and
/// values it would reject survive every rewrite. Only `properties.id` is
/// interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredFeature(serde_json::Value);

impl StoredFeature {
    /// The activity identifier, if the feature carries a usable one.
    pub fn id(&self) -> Option<ActivityId> {
        let id = self.0.get("properties")?.get("id")?;
        ActivityId::deserialize(id).ok()
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Typed view of the feature, if it has the shape this crate writes.
    pub fn to_feature(&self) -> Option<Feature> {
        serde_json::from_value(self.0.clone()).ok()
    }
}

impl From<serde_json::Value> for StoredFeature {
    fn from(value: serde_json::Value) -> Self {
        StoredFeature(value)
    }
}

impl TryFrom<&Feature> for StoredFeature {
    type Error = serde_json::Error;

    fn try_from(feature: &Feature) -> Result<Self, Self::Error> {
        serde_json::to_value(feature).map(StoredFeature)
    }
}

/// The whole local dataset, a GeoJSON `FeatureCollection`.
///
/// Any `type` value is accepted on read and [`FEATURE_COLLECTION`] is always
/// written. Top-level members other than `features` are kept.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawDataset")]
pub struct Dataset {
    pub features: Vec<StoredFeature>,
    pub foreign_members: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct RawDataset {
    #[serde(default, deserialize_with = "null_as_default")]
    features: Vec<StoredFeature>,
    #[serde(flatten)]
    foreign_members: serde_json::Map<String, serde_json::Value>,
}

impl From<RawDataset> for Dataset {
    fn from(raw: RawDataset) -> Self {
        Dataset {
            features: raw.features,
            foreign_members: raw
                .foreign_members
                .into_iter()
                .filter(|(key, _)| key != "type")
                .collect(),
        }
    }
}

impl Serialize for Dataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.foreign_members.len() + 2))?;
        map.serialize_entry("type", FEATURE_COLLECTION)?;
        for (key, value) in &self.foreign_members {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry("features", &self.features)?;
        map.end()
    }
}

impl Dataset {
    /// Dataset holding `features`, in order.
    pub fn from_features(features: &[Feature]) -> serde_json::Result<Self> {
        let features = features
            .iter()
            .map(StoredFeature::try_from)
            .collect::<serde_json::Result<Vec<_>>>()?;
        Ok(Self {
            features,
            foreign_members: serde_json::Map::new(),
        })
    }

    /// Append one new route after all existing ones.
    pub fn push(&mut self, feature: &Feature) -> serde_json::Result<()> {
        self.features.push(StoredFeature::try_from(feature)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Identifiers already present locally.
    ///
    /// Features without a readable `properties.id` contribute nothing.
    pub fn ids(&self) -> HashSet<ActivityId> {
        self.features.iter().filter_map(StoredFeature::id).collect()
    }
}
