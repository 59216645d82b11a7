use super::SensorSource;
use crate::config::ApiConfig;
use crate::error::{CropError, Result};
use crate::models::{IdealConditionsTable, SensorReading, TimestampedReading};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;

/// Client for the sensor gateway: latest reading, reading history and the
/// ideal-conditions table.
#[derive(Clone)]
pub struct SensorApiClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl SensorApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| CropError::UpstreamUnavailable(format!("{}: {}", path, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CropError::UpstreamUnavailable(format!(
                "{} returned {}: {}",
                path, status, body
            )));
        }

        response.json::<T>().await.map_err(|e| {
            CropError::UpstreamUnavailable(format!("failed to parse {} response: {}", path, e))
        })
    }

    pub async fn fetch_latest(&self) -> Result<SensorReading> {
        self.get_json("latest_sensor_data").await
    }

    /// Full stored history, oldest first as the gateway returns it.
    pub async fn fetch_history(&self) -> Result<Vec<TimestampedReading>> {
        self.get_json("sensor_data_history").await
    }

    pub async fn fetch_ideal_conditions(&self) -> Result<IdealConditionsTable> {
        let value: serde_json::Value = self.get_json("ideal_conditions").await?;
        IdealConditionsTable::from_json(value)
    }

    pub async fn test_connection(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.url("ideal_conditions"))
            .send()
            .await
            .map_err(|e| CropError::UpstreamUnavailable(format!("sensor API: {}", e)))?;

        Ok(response.status().is_success())
    }
}

impl SensorSource for SensorApiClient {
    async fn fetch_latest(&self) -> Result<SensorReading> {
        SensorApiClient::fetch_latest(self).await
    }
}

/// Read an ideal-conditions document exported to disk.
pub async fn load_ideal_conditions_file(path: &Path) -> Result<IdealConditionsTable> {
    let json = tokio::fs::read_to_string(path).await.map_err(|e| {
        CropError::UpstreamUnavailable(format!("failed to read {}: {}", path.display(), e))
    })?;
    IdealConditionsTable::from_json_str(&json)
}
