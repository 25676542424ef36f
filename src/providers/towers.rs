use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tokio::task;
use tracing::{debug, info, instrument};

use super::{TowerProvider, build_http_client};
use crate::config::TowerConfig;
use crate::models::{BoundingBox, RadioType, TowerRecord};
use crate::proximity::evenly_spaced;
use crate::{CellwayError, Result};

/// Tower as the tower service and route backends serialize it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TowerWire {
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(default)]
    radio: Option<String>,
    #[serde(default)]
    mcc: u32,
    #[serde(default)]
    net: u32,
    #[serde(default)]
    area: u32,
    #[serde(default)]
    cell: u64,
    average_signal: Option<f64>,
    range: Option<f64>,
    updated: Option<i64>,
}

impl From<TowerWire> for TowerRecord {
    fn from(wire: TowerWire) -> Self {
        TowerRecord {
            lat: wire.lat,
            lon: wire.lon,
            radio_type: RadioType::from(wire.radio.as_deref().unwrap_or("")),
            mcc: wire.mcc,
            net: wire.net,
            area: wire.area,
            cell: wire.cell,
            average_signal_dbm: signal_dbm(wire.average_signal),
            range_meters: wire.range.filter(|r| r.is_finite() && *r >= 0.0).map(|r| r as u32),
            last_updated_epoch: wire.updated,
        }
    }
}

/// OpenCelliD uses 0 for "never measured"
fn signal_dbm(value: Option<f64>) -> Option<i32> {
    value
        .filter(|v| v.is_finite() && *v != 0.0)
        .map(|v| v.round() as i32)
}

#[derive(Debug, Deserialize)]
struct TowersBody {
    towers: Vec<TowerWire>,
    #[serde(default)]
    total: Option<usize>,
    #[serde(default)]
    source: Option<String>,
}

/// Tower provider backed by the tower service's HTTP API
pub struct HttpTowerProvider {
    client: ClientWithMiddleware,
    base_url: String,
}

impl HttpTowerProvider {
    pub fn new(config: &TowerConfig, max_retries: u32) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config.timeout_seconds, max_retries)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request_url(&self, bounds: &BoundingBox) -> String {
        format!(
            "{}/towers?min_lat={}&min_lng={}&max_lat={}&max_lng={}",
            self.base_url, bounds.min_lat, bounds.min_lng, bounds.max_lat, bounds.max_lng
        )
    }
}

#[async_trait]
impl TowerProvider for HttpTowerProvider {
    #[instrument(skip(self))]
    async fn fetch_towers(&self, bounds: &BoundingBox) -> Result<Vec<TowerRecord>> {
        let response = self
            .client
            .get(self.request_url(bounds))
            .send()
            .await
            .map_err(|e| CellwayError::provider(format!("Tower request failed: {e}")))?
            .error_for_status()
            .map_err(|e| CellwayError::provider(format!("Tower service error: {e}")))?;

        let body: TowersBody = response
            .json()
            .await
            .map_err(|e| CellwayError::provider(format!("Unreadable tower response: {e}")))?;

        debug!(
            "Tower service returned {} towers (total {:?}, source {:?})",
            body.towers.len(),
            body.total,
            body.source
        );
        Ok(body.towers.into_iter().map(Into::into).collect())
    }
}

/// One row of an OpenCelliD export
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CsvRow {
    radio: String,
    mcc: u32,
    net: u32,
    area: u32,
    cell: u64,
    lon: Option<f64>,
    lat: Option<f64>,
    range: Option<f64>,
    updated: Option<i64>,
    average_signal: Option<f64>,
}

impl From<CsvRow> for TowerRecord {
    fn from(row: CsvRow) -> Self {
        TowerRecord {
            lat: row.lat,
            lon: row.lon,
            radio_type: RadioType::from(row.radio.as_str()),
            mcc: row.mcc,
            net: row.net,
            area: row.area,
            cell: row.cell,
            average_signal_dbm: signal_dbm(row.average_signal),
            range_meters: row.range.filter(|r| r.is_finite() && *r >= 0.0).map(|r| r as u32),
            last_updated_epoch: row.updated,
        }
    }
}

/// Tower provider reading a local OpenCelliD CSV export.
///
/// The file is parsed once on first use. Each query returns at most
/// `max_towers` records; larger hits are thinned with an evenly spaced,
/// deterministic sample.
pub struct CsvTowerProvider {
    path: PathBuf,
    max_towers: usize,
    towers: OnceCell<Arc<Vec<TowerRecord>>>,
}

impl CsvTowerProvider {
    #[must_use]
    pub fn new(config: &TowerConfig) -> Self {
        Self {
            path: PathBuf::from(&config.csv_path),
            max_towers: config.max_towers,
            towers: OnceCell::new(),
        }
    }

    async fn all_towers(&self) -> Result<Arc<Vec<TowerRecord>>> {
        self.towers
            .get_or_try_init(|| async {
                let path = self.path.clone();
                let towers = task::spawn_blocking(move || read_towers(&path))
                    .await
                    .map_err(|e| CellwayError::provider(format!("Tower loader panicked: {e}")))??;
                info!("Loaded {} towers from {}", towers.len(), self.path.display());
                Ok::<_, CellwayError>(Arc::new(towers))
            })
            .await
            .cloned()
    }
}

fn read_towers(path: &Path) -> Result<Vec<TowerRecord>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        CellwayError::provider(format!("Cannot open tower file {}: {e}", path.display()))
    })?;

    let mut towers = Vec::new();
    let mut skipped = 0usize;
    for row in reader.deserialize::<CsvRow>() {
        match row {
            Ok(row) => towers.push(row.into()),
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!("Skipped {} malformed tower rows", skipped);
    }
    Ok(towers)
}

#[async_trait]
impl TowerProvider for CsvTowerProvider {
    #[instrument(skip(self))]
    async fn fetch_towers(&self, bounds: &BoundingBox) -> Result<Vec<TowerRecord>> {
        let all = self.all_towers().await?;
        let inside: Vec<TowerRecord> = all
            .iter()
            .filter(|t| {
                t.coordinate()
                    .is_some_and(|c| bounds.contains(c.lat, c.lng))
            })
            .cloned()
            .collect();

        if inside.len() > self.max_towers {
            debug!(
                "Found {} towers in bounds, sampling down to {}",
                inside.len(),
                self.max_towers
            );
            return Ok(evenly_spaced(&inside, self.max_towers));
        }
        Ok(inside)
    }
}
