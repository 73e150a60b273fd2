//! In-memory provider backed by a scene catalog of per-band grids.
//!
//! All scenes share one [`GridFrame`]. Pixels outside a scene's footprint are
//! masked at load time. Images, categorical rasters and models live in maps
//! keyed by generated handles for the lifetime of the provider.
//!
//! Every operation runs at the catalog's native resolution; the `scale_m`
//! arguments are accepted for interface parity and ignored.
//!
//! Long operations (training, classification, sampling, reductions) run
//! against the configured request timeout and fail with a provider error once
//! it has elapsed.

mod forest;

pub use forest::RandomForest;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use geo::{BooleanOps, BoundingRect, Centroid, Contains, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};

use super::{
    BandStackSpec, ClassAreas, ClassPair, DownloadRequest, EarthObservationProvider,
    FeatureReduction, ImageHandle, LabeledRegion, ModelHandle, PixelRow, PixelTable, RasterExpr,
    Reducer, RegionFeature, SceneInfo, SceneMetadata, SceneQuery, SceneSource, VisParams,
};
use crate::config::{ProviderConfig, RandomForestParams};
use crate::error::{CanopyError, Result};
use crate::geometry::{planar_area_m2, polygon_from_rings, BBox, LonLat, ProviderGeometry, UtmZone};
use crate::raster::{Grid, GridFrame};
use crate::samples::PointFeature;

// ── Catalog ───────────────────────────────────────────────────────────────

/// One archived scene: metadata, footprint rings and raw band values
/// (row-major over the catalog frame, row 0 south).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogScene {
    pub metadata: SceneMetadata,
    pub footprint: Vec<Vec<[f64; 2]>>,
    pub bands: BTreeMap<String, Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub frame: GridFrame,
    pub scenes: Vec<CatalogScene>,
}

impl Catalog {
    pub fn new(frame: GridFrame) -> Self {
        Self {
            frame,
            scenes: Vec::new(),
        }
    }

    pub fn push(&mut self, scene: CatalogScene) {
        self.scenes.push(scene);
    }
}

struct LoadedScene {
    metadata: SceneMetadata,
    footprint: Polygon<f64>,
    bands: BTreeMap<String, Grid>,
}

/// A set of named bands on the catalog frame.
#[derive(Debug, Clone)]
struct Image {
    bands: Vec<(String, Grid)>,
}

impl Image {
    fn categorical(grid: Grid) -> Self {
        Self {
            bands: vec![("classification".into(), grid)],
        }
    }

    fn first(&self) -> Option<&Grid> {
        self.bands.first().map(|(_, g)| g)
    }

    /// All band values at a cell, or None if any band is masked there.
    fn pixel(&self, row: usize, col: usize) -> Option<Vec<f64>> {
        let mut values = Vec::with_capacity(self.bands.len());
        for (_, g) in &self.bands {
            let v = g.get(row, col);
            if v.is_nan() {
                return None;
            }
            values.push(v as f64);
        }
        Some(values)
    }
}

// ── Deadline ──────────────────────────────────────────────────────────────

/// Request timeout for one provider operation, started when the call begins.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    operation: &'static str,
    started: Instant,
    limit: Duration,
}

impl Deadline {
    fn start(operation: &'static str, limit: Duration) -> Self {
        Self {
            operation,
            started: Instant::now(),
            limit,
        }
    }

    /// Err once the limit has elapsed. A zero limit is always expired.
    pub(crate) fn check(&self) -> Result<()> {
        let elapsed = self.started.elapsed();
        if elapsed >= self.limit {
            tracing::warn!(operation = self.operation, ?elapsed, limit = ?self.limit, "provider request timed out");
            return Err(CanopyError::provider(
                self.operation,
                format!("request timed out after {}s", self.limit.as_secs()),
            ));
        }
        Ok(())
    }
}

// ── Provider ──────────────────────────────────────────────────────────────

pub struct LocalProvider {
    frame: GridFrame,
    scenes: Vec<LoadedScene>,
    images: Mutex<HashMap<ImageHandle, Image>>,
    models: Mutex<HashMap<ModelHandle, RandomForest>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl LocalProvider {
    /// Provider with the default request timeout.
    pub fn new(catalog: Catalog) -> Result<Self> {
        Self::with_config(catalog, &ProviderConfig::default())
    }

    pub fn with_config(catalog: Catalog, config: &ProviderConfig) -> Result<Self> {
        let frame = catalog.frame;
        if frame.is_empty() {
            return Err(CanopyError::Config("catalog frame has no cells".into()));
        }
        let mut scenes = Vec::with_capacity(catalog.scenes.len());
        for scene in catalog.scenes {
            let footprint = polygon_from_rings(&scene.footprint)?;
            let mut bands = BTreeMap::new();
            for (name, values) in scene.bands {
                if values.len() != frame.len() {
                    return Err(CanopyError::Config(format!(
                        "scene {} band {name}: {} values for a {}x{} frame",
                        scene.metadata.id,
                        values.len(),
                        frame.width,
                        frame.height
                    )));
                }
                let mut grid = Grid { frame, data: values };
                mask_outside(&mut grid, &footprint);
                bands.insert(name, grid);
            }
            scenes.push(LoadedScene {
                metadata: scene.metadata,
                footprint,
                bands,
            });
        }
        tracing::debug!(scenes = scenes.len(), width = frame.width, height = frame.height, "local catalog loaded");
        Ok(Self {
            frame,
            scenes,
            images: Mutex::new(HashMap::new()),
            models: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    pub fn frame(&self) -> GridFrame {
        self.frame
    }

    /// Copy of one band of a stored image.
    pub fn image_band(&self, image: &ImageHandle, band: usize) -> Result<Grid> {
        let images = lock(&self.images, "image_band")?;
        images
            .get(image)
            .and_then(|img| img.bands.get(band))
            .map(|(_, g)| g.clone())
            .ok_or_else(|| CanopyError::provider("image_band", format!("no band {band} on image {image}")))
    }

    fn deadline(&self, op: &'static str) -> Deadline {
        Deadline::start(op, self.timeout)
    }

    fn next_handle(&self, kind: &str) -> String {
        format!("{kind}-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn store_image(&self, image: Image, op: &'static str) -> Result<ImageHandle> {
        let handle = ImageHandle(self.next_handle("image"));
        lock(&self.images, op)?.insert(handle.clone(), image);
        Ok(handle)
    }

    fn scene(&self, id: &str, op: &'static str) -> Result<&LoadedScene> {
        self.scenes
            .iter()
            .find(|s| s.metadata.id == id)
            .ok_or_else(|| CanopyError::provider(op, format!("unknown scene {id}")))
    }

    fn matching(&self, query: &SceneQuery) -> Vec<&LoadedScene> {
        let mut hits: Vec<&LoadedScene> = self
            .scenes
            .iter()
            .filter(|s| {
                let m = &s.metadata;
                m.collection == query.collection
                    && m.acquired >= query.start
                    && m.acquired < query.end
                    && m.cloud_cover < query.max_cloud_percent
                    && s.footprint
                        .bounding_rect()
                        .map(BBox::from_rect)
                        .is_some_and(|b| intersects(&b, &query.region))
            })
            .collect();
        hits.sort_by(|a, b| a.metadata.cloud_cover.total_cmp(&b.metadata.cloud_cover));
        hits
    }

    /// Raw bands for a single scene or a two-scene mosaic.
    fn source_bands(&self, source: &SceneSource) -> Result<BTreeMap<String, Grid>> {
        const OP: &str = "evaluate_band_algebra";
        match source {
            SceneSource::Single(id) => Ok(self.scene(id, OP)?.bands.clone()),
            SceneSource::Mosaic { first, second } => {
                let mut bands = self.scene(first, OP)?.bands.clone();
                for (name, top) in &self.scene(second, OP)?.bands {
                    match bands.get_mut(name) {
                        Some(base) => {
                            *base = base.zip_with(top, |b, t| if t.is_nan() { b } else { t });
                        }
                        None => {
                            bands.insert(name.clone(), top.clone());
                        }
                    }
                }
                Ok(bands)
            }
        }
    }

    fn eval_raster(&self, expr: &RasterExpr, images: &HashMap<ImageHandle, Image>) -> Result<Grid> {
        const OP: &str = "evaluate_raster";
        Ok(match expr {
            RasterExpr::Source(handle) => images
                .get(handle)
                .and_then(Image::first)
                .cloned()
                .ok_or_else(|| CanopyError::provider(OP, format!("unknown image {handle}")))?,
            RasterExpr::Constant(v) => Grid::filled(self.frame, *v as f32),
            RasterExpr::Remap { input, from, to, default } => {
                if from.len() != to.len() {
                    return Err(CanopyError::provider(OP, "remap lists differ in length"));
                }
                self.eval_raster(input, images)?.map(|v| {
                    if v.is_nan() {
                        return v;
                    }
                    from.iter()
                        .position(|&f| f as f32 == v)
                        .map_or(*default as f32, |i| to[i] as f32)
                })
            }
            RasterExpr::Eq(a, b) => {
                let (a, b) = (self.eval_raster(a, images)?, self.eval_raster(b, images)?);
                a.zip_with(&b, |x, y| if x.is_nan() || y.is_nan() { f32::NAN } else { (x == y) as u8 as f32 })
            }
            RasterExpr::And(a, b) => {
                let (a, b) = (self.eval_raster(a, images)?, self.eval_raster(b, images)?);
                a.zip_with(&b, |x, y| {
                    if x.is_nan() || y.is_nan() {
                        f32::NAN
                    } else {
                        (x != 0.0 && y != 0.0) as u8 as f32
                    }
                })
            }
            RasterExpr::Where { base, condition, value } => {
                let base = self.eval_raster(base, images)?;
                let cond = self.eval_raster(condition, images)?;
                let value = *value as f32;
                base.zip_with(&cond, |b, c| if !c.is_nan() && c != 0.0 { value } else { b })
            }
            RasterExpr::Clip { input, region } => {
                let mut grid = self.eval_raster(input, images)?;
                mask_outside(&mut grid, region);
                grid
            }
        })
    }

    fn reduce(&self, grid: &Grid, region: &MultiPolygon<f64>, reducer: Reducer) -> ClassAreas {
        let mut areas = ClassAreas::new();
        if let Reducer::AreaOfClass(k) = reducer {
            areas.insert(k, 0.0);
        }
        for (row, col) in cells_in(&self.frame, region) {
            let v = grid.get(row, col);
            if v.is_nan() {
                continue;
            }
            let value = v.round() as i32;
            let keep = match reducer {
                Reducer::AreaByClass => true,
                Reducer::AreaOfClass(k) => k == value,
            };
            if keep {
                *areas.entry(value).or_insert(0.0) += self.frame.cell_area_m2(row);
            }
        }
        areas
    }
}

impl EarthObservationProvider for LocalProvider {
    fn query_scenes(&self, query: &SceneQuery, limit: usize) -> Result<Vec<SceneMetadata>> {
        Ok(self
            .matching(query)
            .into_iter()
            .take(limit)
            .map(|s| s.metadata.clone())
            .collect())
    }

    fn footprint_contains(&self, scene_id: &str, region: &ProviderGeometry, max_error_m: f64) -> Result<bool> {
        let footprint = MultiPolygon::new(vec![self.scene(scene_id, "footprint_contains")?.footprint.clone()]);
        let outside = region.polygons().difference(&footprint);
        let centre = region.centroid().unwrap_or_else(|| region.bounds().center());
        let zone = UtmZone::for_lon_lat(centre.lon, centre.lat);
        // Uncovered area may not exceed a square of the tolerance.
        Ok(planar_area_m2(&outside, zone) <= max_error_m * max_error_m)
    }

    fn scenes_batch_info(&self, query: &SceneQuery, limit: usize) -> Result<Vec<SceneInfo>> {
        Ok(self
            .matching(query)
            .into_iter()
            .take(limit)
            .map(|s| SceneInfo {
                metadata: s.metadata.clone(),
                footprint: s.footprint.clone(),
            })
            .collect())
    }

    fn evaluate_band_algebra(&self, source: &SceneSource, spec: &BandStackSpec) -> Result<ImageHandle> {
        let raw = self.source_bands(source)?;
        let mut needed = Vec::new();
        for band in &spec.bands {
            band.expr.source_bands(&mut needed);
        }
        if let Some(missing) = needed.iter().find(|n| !raw.contains_key(n.as_str())) {
            return Err(CanopyError::provider(
                "evaluate_band_algebra",
                format!("band {missing} not present in {source:?}"),
            ));
        }

        let bands = spec
            .bands
            .iter()
            .map(|band| {
                let grid = Grid::from_fn(self.frame, |r, c| {
                    let lookup = |name: &str| {
                        raw.get(name)
                            .map(|g| g.get(r, c))
                            .filter(|v| !v.is_nan())
                            .map(f64::from)
                    };
                    band.expr.eval(&lookup).map_or(f32::NAN, |v| v as f32)
                });
                (band.name.clone(), grid)
            })
            .collect();
        self.store_image(Image { bands }, "evaluate_band_algebra")
    }

    fn sample_regions(&self, stack: &ImageHandle, regions: &[LabeledRegion], _scale_m: f64) -> Result<PixelTable> {
        let deadline = self.deadline("sample_regions");
        let images = lock(&self.images, "sample_regions")?;
        let image = images
            .get(stack)
            .ok_or_else(|| CanopyError::provider("sample_regions", format!("unknown image {stack}")))?;

        let mut table = PixelTable {
            band_names: image.bands.iter().map(|(n, _)| n.clone()).collect(),
            rows: Vec::new(),
        };
        for region in regions {
            deadline.check()?;
            let mp = MultiPolygon::new(vec![region.geometry.clone()]);
            let mut cells = cells_in(&self.frame, &mp);
            // Regions smaller than a pixel still yield the pixel under their centre.
            if cells.is_empty() {
                if let Some(c) = region.geometry.centroid() {
                    cells.extend(self.frame.locate(LonLat::new(c.x(), c.y())));
                }
            }
            for (row, col) in cells {
                if let Some(values) = image.pixel(row, col) {
                    table.rows.push(PixelRow {
                        class: region.class,
                        values,
                    });
                }
            }
        }
        Ok(table)
    }

    fn train_classifier(&self, table: &PixelTable, params: &RandomForestParams) -> Result<ModelHandle> {
        let forest = RandomForest::fit(table, params, &self.deadline("train_classifier"))?;
        let handle = ModelHandle(self.next_handle("model"));
        lock(&self.models, "train_classifier")?.insert(handle.clone(), forest);
        Ok(handle)
    }

    fn classify(&self, model: &ModelHandle, stack: &ImageHandle, clip: &ProviderGeometry) -> Result<ImageHandle> {
        const OP: &str = "classify";
        let deadline = self.deadline(OP);
        let grid = {
            let models = lock(&self.models, OP)?;
            let forest = models
                .get(model)
                .ok_or_else(|| CanopyError::provider(OP, format!("unknown model {model}")))?;
            let images = lock(&self.images, OP)?;
            let image = images
                .get(stack)
                .ok_or_else(|| CanopyError::provider(OP, format!("unknown image {stack}")))?;
            if image.bands.len() != forest.n_features() {
                return Err(CanopyError::provider(
                    OP,
                    format!("model expects {} bands, image has {}", forest.n_features(), image.bands.len()),
                ));
            }
            let mut grid = Grid::from_fn(self.frame, |r, c| {
                image.pixel(r, c).map_or(f32::NAN, |v| forest.predict(&v) as f32)
            });
            deadline.check()?;
            mask_outside(&mut grid, clip.polygons());
            grid
        };
        self.store_image(Image::categorical(grid), OP)
    }

    fn evaluate_raster(&self, expr: &RasterExpr) -> Result<ImageHandle> {
        let grid = {
            let images = lock(&self.images, "evaluate_raster")?;
            self.eval_raster(expr, &images)?
        };
        self.store_image(Image::categorical(grid), "evaluate_raster")
    }

    fn sample_classes(&self, raster: &ImageHandle, points: &[PointFeature], _scale_m: f64) -> Result<Vec<ClassPair>> {
        let grid = self.image_band(raster, 0)?;
        Ok(points
            .iter()
            .filter_map(|p| {
                grid.sample(p.location).map(|v| ClassPair {
                    reference: p.class,
                    predicted: v.round() as u8,
                })
            })
            .collect())
    }

    fn reduce_region(
        &self,
        raster: &ImageHandle,
        region: &ProviderGeometry,
        reducer: Reducer,
        _scale_m: f64,
    ) -> Result<ClassAreas> {
        let deadline = self.deadline("reduce_region");
        let grid = self.image_band(raster, 0)?;
        let areas = self.reduce(&grid, region.polygons(), reducer);
        deadline.check()?;
        Ok(areas)
    }

    fn reduce_regions(
        &self,
        raster: &ImageHandle,
        features: &[RegionFeature],
        reducer: Reducer,
        _scale_m: f64,
    ) -> Result<Vec<FeatureReduction>> {
        let deadline = self.deadline("reduce_regions");
        let grid = self.image_band(raster, 0)?;
        features
            .iter()
            .map(|f| {
                deadline.check()?;
                Ok(FeatureReduction {
                    index: f.index,
                    areas: self.reduce(&grid, &f.geometry, reducer),
                })
            })
            .collect()
    }

    fn thumbnail_url(&self, image: &ImageHandle, vis: &VisParams) -> Result<String> {
        if !lock(&self.images, "thumbnail_url")?.contains_key(image) {
            return Err(CanopyError::provider("thumbnail_url", format!("unknown image {image}")));
        }
        Ok(format!(
            "local://thumbnail/{image}?bands={}&min={}&max={}&palette={}",
            vis.bands.join(","),
            vis.min,
            vis.max,
            vis.palette.join(",").replace('#', "")
        ))
    }

    fn download_url(&self, image: &ImageHandle, request: &DownloadRequest) -> Result<String> {
        if !lock(&self.images, "download_url")?.contains_key(image) {
            return Err(CanopyError::provider("download_url", format!("unknown image {image}")));
        }
        Ok(format!(
            "local://download/{image}/{}.tif?crs={}&scale={}",
            request.name, request.crs, request.scale_m
        ))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────

fn lock<'a, T>(m: &'a Mutex<T>, op: &'static str) -> Result<MutexGuard<'a, T>> {
    m.lock().map_err(|_| CanopyError::provider(op, "provider state lock poisoned"))
}

fn intersects(a: &BBox, b: &BBox) -> bool {
    a.min_lon <= b.max_lon && a.max_lon >= b.min_lon && a.min_lat <= b.max_lat && a.max_lat >= b.min_lat
}

/// Cells whose centre falls inside `region`.
fn cells_in(frame: &GridFrame, region: &MultiPolygon<f64>) -> Vec<(usize, usize)> {
    let Some(rect) = region.bounding_rect() else {
        return Vec::new();
    };
    let bbox = BBox::from_rect(rect);
    let mut cells = Vec::new();
    for row in 0..frame.height {
        for col in 0..frame.width {
            let p = frame.cell_center(row, col);
            if bbox.contains_point(p) && region.contains(&Point::new(p.lon, p.lat)) {
                cells.push((row, col));
            }
        }
    }
    cells
}

fn mask_outside<G: Contains<Point<f64>>>(grid: &mut Grid, region: &G) {
    let frame = grid.frame;
    for row in 0..frame.height {
        for col in 0..frame.width {
            let p = frame.cell_center(row, col);
            if !region.contains(&Point::new(p.lon, p.lat)) {
                grid.set(row, col, f32::NAN);
            }
        }
    }
}
