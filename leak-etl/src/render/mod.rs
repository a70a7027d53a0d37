//! Per-city map documents built from stored measurements.

pub mod html;

use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
};

use leak_client::{domain::Photo, Store, StoreError};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::transform::coerce::normalize_text;

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error(
        "render: no measurements for city '{city}' (cities with data: {})",
        city_list(.available)
    )]
    NoData { city: String, available: Vec<String> },
    #[error("render: {0}")]
    Store(#[from] StoreError),
    #[error("render: failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn city_list(cities: &[String]) -> String {
    if cities.is_empty() {
        "none".to_string()
    } else {
        cities.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapArtifact {
    pub city: String,
    pub path: PathBuf,
    pub marker_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedCity {
    pub city: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct RenderAllReport {
    pub artifacts: Vec<MapArtifact>,
    pub skipped: Vec<SkippedCity>,
}

/// File name for a city's map: the name lowercased with every run of other
/// characters folded into `_`.
pub fn map_file_name(city: &str) -> String {
    let mut slug = String::with_capacity(city.len());
    for ch in city.trim().chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_');
    let slug = if slug.is_empty() { "unnamed" } else { slug };
    format!("{slug}_map.html")
}

pub struct MapRenderer {
    store: Store,
    output_dir: PathBuf,
}

impl MapRenderer {
    pub fn new(store: Store, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Render the map for `requested`, matched case-insensitively with
    /// whitespace collapsed against the cities that have measurements.
    pub async fn render_city(&self, requested: &str) -> Result<MapArtifact, RenderError> {
        let wanted = normalize_text(requested).to_lowercase();
        let available = self.store.measurement_cities().await?;
        let Some(city) = available
            .iter()
            .find(|c| normalize_text(c).to_lowercase() == wanted)
            .cloned()
        else {
            return Err(RenderError::NoData {
                city: requested.to_string(),
                available,
            });
        };
        let city = city.as_str();

        let measurements = self.store.measurements_for_city(city).await?;
        if measurements.is_empty() {
            return Err(RenderError::NoData {
                city: city.to_string(),
                available,
            });
        }

        let mut photos: HashMap<String, Photo> = HashMap::new();
        for id in measurements.iter().filter_map(|m| m.photo_id.as_deref()) {
            if photos.contains_key(id) {
                continue;
            }
            match self.store.photo(id).await? {
                Some(photo) => {
                    photos.insert(id.to_string(), photo);
                }
                None => tracing::warn!(city, photo_id = id, "measurement references a missing photo"),
            }
        }

        let generated_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string());
        let document = html::render_document(
            city,
            &measurements,
            |m| m.photo_id.as_deref().and_then(|id| photos.get(id)),
            &generated_at,
        );

        let path = self.output_dir.join(map_file_name(city));
        let io_err = |source| RenderError::Io {
            path: path.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.output_dir).await.map_err(io_err)?;
        tokio::fs::write(&path, document).await.map_err(io_err)?;

        metrics::counter!("maps_rendered_total").increment(1);
        tracing::info!(city, markers = measurements.len(), path = %path.display(), "rendered map");

        Ok(MapArtifact {
            city: city.to_string(),
            marker_count: measurements.len(),
            path,
        })
    }

    /// Render every known city. Cities without measurements are skipped and
    /// reported; any other failure on one city does not stop the others.
    pub async fn render_all(&self) -> Result<RenderAllReport, RenderError> {
        let mut cities: BTreeSet<String> = self
            .store
            .cities()
            .await?
            .into_iter()
            .map(|c| c.city)
            .collect();
        cities.extend(self.store.measurement_cities().await?);

        let mut report = RenderAllReport::default();
        for city in cities {
            match self.render_city(&city).await {
                Ok(artifact) => report.artifacts.push(artifact),
                Err(e @ RenderError::NoData { .. }) => {
                    tracing::info!(city = %city, "no measurements, skipping map");
                    report.skipped.push(SkippedCity {
                        city,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::error!(city = %city, error = %e, "failed to render map");
                    report.skipped.push(SkippedCity {
                        city,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }
}
