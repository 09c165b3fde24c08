//! Bureau of Labor Statistics time-series client.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use chrono::{Datelike, Utc};
use reqwest::Client;
use tracing::debug;

use super::error::{GatewayError, GatewayResult};
use super::types::{BlsRequest, BlsResponse, BlsSeries, EconomicObservation};
use super::EconomicDataProvider;

const BLS_API_URL: &str = "https://api.bls.gov/publicAPI/v2/timeseries/data/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(10);

pub struct BlsClient {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl BlsClient {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_url(BLS_API_URL.to_string(), api_key)
    }

    pub fn with_url(url: String, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url,
            api_key,
        })
    }

    async fn fetch(&self, request: &BlsRequest) -> GatewayResult<BlsResponse> {
        let response = self.client.post(&self.url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}

/// Monthly observations, oldest first, limited to the last `months`.
///
/// The API lists newest first and includes an annual-average period (M13)
/// that is dropped here. Unparseable values are skipped.
fn observations_from_series(series: BlsSeries, months: u32) -> Vec<EconomicObservation> {
    let mut observations: Vec<EconomicObservation> = series
        .data
        .into_iter()
        .filter(|point| point.period != "M13")
        .filter_map(|point| {
            let value = point.value.trim().parse::<f64>().ok()?;
            Some(EconomicObservation {
                date: format!("{}-{}", point.year, point.period),
                value,
            })
        })
        .collect();

    observations.reverse();
    let keep = months as usize;
    if observations.len() > keep {
        observations.drain(..observations.len() - keep);
    }
    observations
}

#[async_trait]
impl EconomicDataProvider for BlsClient {
    async fn series(
        &self,
        series_id: &str,
        months: u32,
    ) -> GatewayResult<Vec<EconomicObservation>> {
        let end_year = Utc::now().year();
        let start_year = end_year - (months as i32 + 11) / 12;

        let request = BlsRequest {
            series_id: vec![series_id.to_string()],
            start_year: start_year.to_string(),
            end_year: end_year.to_string(),
            registration_key: self.api_key.clone(),
        };

        debug!(series = %series_id, start_year, end_year, "Fetching BLS series");

        let policy = ExponentialBackoff {
            max_elapsed_time: Some(MAX_RETRY_ELAPSED),
            ..Default::default()
        };
        let request = &request;
        let response = backoff::future::retry(policy, move || async move {
            self.fetch(request)
                .await
                .map_err(GatewayError::into_backoff)
        })
        .await?;

        if response.status != "REQUEST_SUCCEEDED" {
            return Err(GatewayError::Malformed(format!(
                "{}: {}",
                response.status,
                response.message.join("; ")
            )));
        }

        let series = response
            .results
            .and_then(|r| r.series.into_iter().find(|s| s.series_id == series_id))
            .ok_or_else(|| GatewayError::NotFound(format!("series {}", series_id)))?;

        Ok(observations_from_series(series, months))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::BlsDataPoint;

    fn point(year: &str, period: &str, value: &str) -> BlsDataPoint {
        BlsDataPoint {
            year: year.to_string(),
            period: period.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_observations_are_chronological_and_bounded() {
        let series = BlsSeries {
            series_id: "LNS14000000".to_string(),
            data: vec![
                point("2024", "M13", "4.0"),
                point("2024", "M03", "3.9"),
                point("2024", "M02", "-"),
                point("2024", "M01", "3.7"),
                point("2023", "M12", "3.7"),
            ],
        };

        let obs = observations_from_series(series, 2);
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].date, "2024-M01");
        assert_eq!(obs[1].date, "2024-M03");
        assert_eq!(obs[1].value, 3.9);
    }
}
