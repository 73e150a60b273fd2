//! The Earth Observation Provider boundary.
//!
//! Everything that touches pixels goes through [`EarthObservationProvider`].
//! Calls are blocking; a provider applies its own request timeout and reports
//! expiry as [`CanopyError::Provider`](crate::CanopyError::Provider).

pub mod expr;
pub mod local;

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use geo::{MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};

use crate::config::RandomForestParams;
use crate::error::Result;
use crate::geometry::{BBox, ProviderGeometry};
use crate::samples::PointFeature;

pub use expr::{BandExpr, BandStackSpec, NamedBand, RasterExpr};
pub use local::{Catalog, CatalogScene, LocalProvider};

// ── Handles ───────────────────────────────────────────────────────────────

/// Opaque reference to an image (band stack or categorical raster) held by
/// the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageHandle(pub String);

/// Opaque reference to a trained classifier held by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelHandle(pub String);

impl fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Request / response types ──────────────────────────────────────────────

/// Archive query: scenes of one collection intersecting `region`, acquired
/// in `[start, end)`, with cloud cover strictly below `max_cloud_percent`.
#[derive(Debug, Clone)]
pub struct SceneQuery {
    pub collection: String,
    pub region: BBox,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub max_cloud_percent: f64,
}

/// Per-scene archive metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMetadata {
    pub id: String,
    pub collection: String,
    pub acquired: NaiveDate,
    pub spacecraft: String,
    pub cloud_cover: f64,
    pub wrs_path: u32,
    pub wrs_row: u32,
}

/// Metadata plus footprint, as returned by the batched fallback query.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneInfo {
    pub metadata: SceneMetadata,
    pub footprint: Polygon<f64>,
}

/// Physical scene(s) an image is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SceneSource {
    Single(String),
    /// Two adjacent rows; `second` is drawn on top where both have data.
    Mosaic { first: String, second: String },
}

/// A buffered training sample.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRegion {
    pub geometry: Polygon<f64>,
    pub class: u8,
}

/// One extracted training pixel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelRow {
    pub class: u8,
    pub values: Vec<f64>,
}

/// Pixel values extracted under training regions, columns in band order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PixelTable {
    pub band_names: Vec<String>,
    pub rows: Vec<PixelRow>,
}

impl PixelTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct class ordinals present in the table.
    pub fn classes(&self) -> Vec<u8> {
        let mut classes: Vec<u8> = self.rows.iter().map(|r| r.class).collect();
        classes.sort_unstable();
        classes.dedup();
        classes
    }
}

/// (reference, predicted) ordinals at one validation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassPair {
    pub reference: u8,
    pub predicted: u8,
}

/// Area reductions over a categorical raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    /// Pixel area summed per raster value.
    AreaByClass,
    /// Pixel area of one raster value only.
    AreaOfClass(i32),
}

/// Raster value → area in m².
pub type ClassAreas = BTreeMap<i32, f64>;

/// A geometry to reduce over, tagged with the caller's index.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionFeature {
    pub index: usize,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureReduction {
    pub index: usize,
    pub areas: ClassAreas,
}

/// Rendering parameters for a quick-look thumbnail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisParams {
    pub bands: Vec<String>,
    pub min: f64,
    pub max: f64,
    pub gamma: Option<f64>,
    pub palette: Vec<String>,
}

impl VisParams {
    /// Categorical rendering of values `min..=max` with one colour each.
    pub fn categorical(min: i32, max: i32, palette: &[&str]) -> Self {
        Self {
            bands: Vec::new(),
            min: min as f64,
            max: max as f64,
            gamma: None,
            palette: palette.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// GeoTIFF export request.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub name: String,
    pub region: MultiPolygon<f64>,
    pub scale_m: f64,
    pub crs: String,
}

// ── Trait ─────────────────────────────────────────────────────────────────

/// Capability interface of the imagery backend.
///
/// Implementations must be usable from two threads at once: the two analysis
/// periods may run concurrently.
pub trait EarthObservationProvider: Send + Sync {
    /// Scenes matching `query`, ascending by cloud cover, at most `limit`.
    fn query_scenes(&self, query: &SceneQuery, limit: usize) -> Result<Vec<SceneMetadata>>;

    /// True when the scene's real footprint contains `region` within
    /// `max_error_m` metres.
    fn footprint_contains(
        &self,
        scene_id: &str,
        region: &ProviderGeometry,
        max_error_m: f64,
    ) -> Result<bool>;

    /// Metadata and footprints for up to `limit` scenes in one round trip.
    fn scenes_batch_info(&self, query: &SceneQuery, limit: usize) -> Result<Vec<SceneInfo>>;

    fn evaluate_band_algebra(&self, source: &SceneSource, spec: &BandStackSpec) -> Result<ImageHandle>;

    /// Band values of every pixel under each region, labelled with its class.
    fn sample_regions(
        &self,
        stack: &ImageHandle,
        regions: &[LabeledRegion],
        scale_m: f64,
    ) -> Result<PixelTable>;

    fn train_classifier(&self, table: &PixelTable, params: &RandomForestParams) -> Result<ModelHandle>;

    /// Predicted ordinal per pixel of `stack`, clipped to `clip`.
    fn classify(
        &self,
        model: &ModelHandle,
        stack: &ImageHandle,
        clip: &ProviderGeometry,
    ) -> Result<ImageHandle>;

    fn evaluate_raster(&self, expr: &RasterExpr) -> Result<ImageHandle>;

    /// Raster value at each point; points on masked pixels are dropped.
    fn sample_classes(
        &self,
        raster: &ImageHandle,
        points: &[PointFeature],
        scale_m: f64,
    ) -> Result<Vec<ClassPair>>;

    fn reduce_region(
        &self,
        raster: &ImageHandle,
        region: &ProviderGeometry,
        reducer: Reducer,
        scale_m: f64,
    ) -> Result<ClassAreas>;

    /// One request reducing every feature; results keep the feature indices.
    fn reduce_regions(
        &self,
        raster: &ImageHandle,
        features: &[RegionFeature],
        reducer: Reducer,
        scale_m: f64,
    ) -> Result<Vec<FeatureReduction>>;

    fn thumbnail_url(&self, image: &ImageHandle, vis: &VisParams) -> Result<String>;

    fn download_url(&self, image: &ImageHandle, request: &DownloadRequest) -> Result<String>;
}
