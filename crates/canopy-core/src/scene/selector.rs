use chrono::{Months, NaiveDate};
use geo::{BooleanOps, BoundingRect, MultiPolygon};

use super::{Scene, SensorGeneration};
use crate::config::SearchConfig;
use crate::error::{CanopyError, Result};
use crate::geometry::{BBox, ProviderGeometry};
use crate::provider::{EarthObservationProvider, SceneInfo, SceneQuery, SceneSource};

/// Progress of one scene search.
///
/// The primary pass walks every preferred collection before the fallback
/// pass starts; the index is the position in the preference list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Primary(usize),
    Fallback(usize),
    Exhausted,
}

/// Finds the best scene, or a two-row mosaic, covering a region.
pub struct SceneSelector<'a, P: EarthObservationProvider + ?Sized> {
    provider: &'a P,
    config: &'a SearchConfig,
}

impl<'a, P: EarthObservationProvider + ?Sized> SceneSelector<'a, P> {
    pub fn new(provider: &'a P, config: &'a SearchConfig) -> Self {
        Self { provider, config }
    }

    /// Acquisition window `[target - before, target + after)`.
    pub fn window(&self, target: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
        let start = target.checked_sub_months(Months::new(self.config.months_before));
        let end = target.checked_add_months(Months::new(self.config.months_after));
        match (start, end) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(CanopyError::Config(format!("search window around {target} is out of range"))),
        }
    }

    pub fn select(&self, target: NaiveDate, region: &ProviderGeometry, max_cloud_percent: f64) -> Result<Scene> {
        let generations = SensorGeneration::preference_for(target);
        let (start, end) = self.window(target)?;
        let query = |g: SensorGeneration| SceneQuery {
            collection: g.collection_id().to_string(),
            region: region.bounds(),
            start,
            end,
            max_cloud_percent,
        };

        let mut state = SearchState::Primary(0);
        loop {
            tracing::debug!(%target, ?state, "scene search");
            state = match state {
                SearchState::Primary(i) if i < generations.len() => {
                    let g = generations[i];
                    if let Some(scene) = self.primary(g, &query(g), region)? {
                        tracing::info!(%target, scene = %scene.id, cloud = scene.cloud_cover, sensor = %g, "scene selected");
                        return Ok(scene);
                    }
                    SearchState::Primary(i + 1)
                }
                SearchState::Primary(_) => {
                    tracing::info!(%target, "no single scene covers the region, trying adjacent-row mosaics");
                    SearchState::Fallback(0)
                }
                SearchState::Fallback(i) if i < generations.len() => {
                    let g = generations[i];
                    if let Some(scene) = self.fallback(g, &query(g), region)? {
                        tracing::info!(%target, scene = %scene.id, cloud = scene.cloud_cover, sensor = %g, "mosaic selected");
                        return Ok(scene);
                    }
                    SearchState::Fallback(i + 1)
                }
                SearchState::Fallback(_) => SearchState::Exhausted,
                SearchState::Exhausted => {
                    tracing::warn!(%target, "no coverage found");
                    return Err(CanopyError::NoCoverageFound {
                        target,
                        collections: generations.iter().map(|g| g.collection_id().to_string()).collect(),
                    });
                }
            };
        }
    }

    fn primary(&self, g: SensorGeneration, query: &SceneQuery, region: &ProviderGeometry) -> Result<Option<Scene>> {
        let candidates = self.provider.query_scenes(query, self.config.primary_candidates)?;
        for meta in candidates.iter().take(self.config.primary_candidates) {
            if self.provider.footprint_contains(&meta.id, region, self.config.max_error_m)? {
                return Ok(Some(Scene::single(meta, g)));
            }
            tracing::debug!(scene = %meta.id, "footprint does not contain region");
        }
        Ok(None)
    }

    fn fallback(&self, g: SensorGeneration, query: &SceneQuery, region: &ProviderGeometry) -> Result<Option<Scene>> {
        let infos = self.provider.scenes_batch_info(query, self.config.fallback_candidates)?;
        if infos.len() < 2 {
            return Ok(None);
        }
        Ok(find_adjacent_pair(infos, &region.bounds()).map(|(first, second)| mosaic(&first, &second, g)))
    }
}

/// First pair of same-overpass scenes on adjacent rows whose joint bounding
/// box covers `target`. Groups are visited in order of first appearance.
pub(crate) fn find_adjacent_pair(infos: Vec<SceneInfo>, target: &BBox) -> Option<(SceneInfo, SceneInfo)> {
    let mut groups: Vec<((u32, NaiveDate), Vec<SceneInfo>)> = Vec::new();
    for info in infos {
        let key = (info.metadata.wrs_path, info.metadata.acquired);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(info),
            None => groups.push((key, vec![info])),
        }
    }

    for (_, mut members) in groups {
        if members.len() < 2 {
            continue;
        }
        members.sort_by_key(|m| m.metadata.wrs_row);
        for j in 0..members.len() - 1 {
            let (a, b) = (&members[j], &members[j + 1]);
            if a.metadata.wrs_row.abs_diff(b.metadata.wrs_row) != 1 {
                continue;
            }
            let (Some(ra), Some(rb)) = (a.footprint.bounding_rect(), b.footprint.bounding_rect()) else {
                continue;
            };
            if BBox::from_rect(ra).union(&BBox::from_rect(rb)).covers(target) {
                return Some((a.clone(), b.clone()));
            }
        }
    }
    None
}

fn mosaic(first: &SceneInfo, second: &SceneInfo, sensor: SensorGeneration) -> Scene {
    let (a, b) = (&first.metadata, &second.metadata);
    let footprint = MultiPolygon::new(vec![first.footprint.clone()])
        .union(&MultiPolygon::new(vec![second.footprint.clone()]));
    Scene {
        id: format!("{}+{}", a.id, b.id),
        acquired: a.acquired,
        sensor,
        spacecraft: a.spacecraft.clone(),
        cloud_cover: a.cloud_cover.max(b.cloud_cover),
        collection: a.collection.clone(),
        footprint: Some(footprint),
        source: SceneSource::Mosaic {
            first: a.id.clone(),
            second: b.id.clone(),
        },
    }
}
