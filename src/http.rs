//! HTTP client for the fitness API with request pacing.
//!
//! This module provides activity fetching for building the local run
//! cache:
//! - OAuth token refresh
//! - Day-by-day activity listing (newest first)
//! - TCX export download, single or batched with bounded concurrency
//! - Automatic retry with exponential backoff on 429 and transport errors

use std::time::{Duration, Instant};

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{ElevationError, Result};

const DEFAULT_BASE_URL: &str = "https://api.fitbit.com";
const TOKEN_URL: &str = "https://api.fitbit.com/oauth2/token";

// Pacing and retry settings
const REQUEST_PACING: Duration = Duration::from_secs(2);
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const TCX_CONCURRENCY: usize = 4;

/// Per-run summary as reported by the daily activity listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub date: NaiveDate,
    pub activity_id: i64,
    /// Distance in miles, as the API reports it
    pub distance_mi: f64,
    /// Duration in milliseconds
    pub duration_ms: i64,
    pub steps: u32,
    pub calories: u32,
}

/// OAuth credentials for the fitness API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct DailyActivitiesResponse {
    #[serde(default)]
    activities: Vec<ApiActivity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiActivity {
    #[serde(default)]
    activity_parent_name: String,
    #[serde(default)]
    log_id: i64,
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: i64,
    #[serde(default)]
    steps: u32,
    #[serde(default)]
    calories: u32,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
}

/// Activity fetcher for the fitness API.
///
/// Owns its credentials and HTTP connection pool; there is no module-level
/// state. Requests are paced and retried with exponential backoff so long
/// backfills survive the API's rate limits.
pub struct ActivityClient {
    client: Client,
    base_url: String,
    credentials: ApiCredentials,
    last_request: Option<Instant>,
}

impl ActivityClient {
    /// Create a new client with the given credentials.
    pub fn new(credentials: ApiCredentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ElevationError::HttpError {
                message: format!("failed to create HTTP client: {}", e),
                status_code: None,
            })?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials,
            last_request: None,
        })
    }

    /// Override the API base URL (used by tests against a local server).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Exchange the refresh token for a fresh token pair and store it.
    pub async fn refresh_tokens(&mut self) -> Result<()> {
        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.credentials.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ElevationError::HttpError {
                message: format!("token refresh failed: {}", e),
                status_code: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ElevationError::HttpError {
                message: "token refresh rejected".to_string(),
                status_code: Some(status.as_u16()),
            });
        }

        let tokens: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| ElevationError::HttpError {
                    message: format!("malformed token response: {}", e),
                    status_code: None,
                })?;

        self.credentials.access_token = tokens.access_token;
        self.credentials.refresh_token = tokens.refresh_token;
        info!("[ActivityClient] Access token refreshed");
        Ok(())
    }

    /// Fetch run summaries for every day in `[start, end]`, newest first.
    ///
    /// Days that keep failing after retries are skipped with a warning so a
    /// long backfill is not lost to one bad day. Runs with zero distance
    /// (no GPS data) are dropped.
    pub async fn fetch_runs(&mut self, start: NaiveDate, end: NaiveDate) -> Result<Vec<RunSummary>> {
        let mut runs = Vec::new();
        let mut requests = 0u32;
        let started = Instant::now();

        let mut current = end;
        while current >= start {
            match self.fetch_day(current).await {
                Ok(Some(run)) => runs.push(run),
                Ok(None) => debug!("[ActivityClient] No run on {}", current),
                Err(e) => warn!("[ActivityClient] Skipping {}: {}", current, e),
            }
            requests += 1;

            match current.pred_opt() {
                Some(previous) => current = previous,
                None => break,
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        info!(
            "[ActivityClient] Fetched {} runs over {} days in {:.1}s",
            runs.len(),
            requests,
            elapsed
        );
        Ok(runs)
    }

    /// Fetch one day's listing and pick its first run with a non-zero
    /// distance (zero-distance entries have no usable GPS trace).
    async fn fetch_day(&mut self, date: NaiveDate) -> Result<Option<RunSummary>> {
        let url = format!(
            "{}/1/user/-/activities/date/{}.json",
            self.base_url, date
        );
        let body = self.get_with_retry(&url).await?;

        let listing: DailyActivitiesResponse =
            serde_json::from_str(&body).map_err(|e| ElevationError::HttpError {
                message: format!("malformed activity listing for {}: {}", date, e),
                status_code: None,
            })?;

        let run = listing
            .activities
            .into_iter()
            .find(|a| a.activity_parent_name == "Run" && a.distance > 0.0);

        Ok(run.map(|a| RunSummary {
            date,
            activity_id: a.log_id,
            distance_mi: a.distance,
            duration_ms: a.duration,
            steps: a.steps,
            calories: a.calories,
        }))
    }

    /// Download the TCX export for one activity.
    pub async fn fetch_tcx(&mut self, activity_id: i64) -> Result<String> {
        let url = format!("{}/1/user/-/activities/{}.tcx", self.base_url, activity_id);
        self.get_with_retry(&url).await
    }

    /// Download TCX exports for several activities with bounded concurrency.
    ///
    /// Results come back in input order; a failed download yields an `Err`
    /// in its slot rather than aborting the batch.
    pub async fn fetch_tcx_batch(&self, activity_ids: &[i64]) -> Vec<Result<String>> {
        let total = activity_ids.len();
        info!(
            "[ActivityClient] Downloading {} TCX exports ({} concurrent)",
            total, TCX_CONCURRENCY
        );

        stream::iter(activity_ids.iter().copied())
            .map(|id| {
                let url = format!("{}/1/user/-/activities/{}.tcx", self.base_url, id);
                let client = self.client.clone();
                let token = self.credentials.access_token.clone();
                async move { get_once(&client, &url, &token).await }
            })
            .buffered(TCX_CONCURRENCY)
            .collect()
            .await
    }

    /// GET with bearer auth, pacing, and bounded retry on 429/transport
    /// errors.
    async fn get_with_retry(&mut self, url: &str) -> Result<String> {
        let mut retries = 0u32;

        loop {
            self.pace().await;

            match get_once(&self.client, url, &self.credentials.access_token).await {
                Ok(body) => return Ok(body),
                Err(ElevationError::HttpError {
                    message,
                    status_code: Some(429),
                }) => {
                    retries += 1;
                    if retries > MAX_RETRIES {
                        return Err(ElevationError::HttpError {
                            message: format!("rate limited after {} retries", MAX_RETRIES),
                            status_code: Some(429),
                        });
                    }
                    warn!(
                        "[ActivityClient] 429 ({}), retry {} after {:?}",
                        message, retries, RATE_LIMIT_BACKOFF
                    );
                    tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
                }
                Err(ElevationError::HttpError {
                    message,
                    status_code: None,
                }) => {
                    retries += 1;
                    if retries > MAX_RETRIES {
                        return Err(ElevationError::HttpError {
                            message,
                            status_code: None,
                        });
                    }
                    let backoff = Duration::from_millis(500 * (1 << retries));
                    warn!(
                        "[ActivityClient] Transport error ({}), retry {} after {:?}",
                        message, retries, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Keep a fixed gap between consecutive requests.
    async fn pace(&mut self) {
        if let Some(last) = self.last_request {
            let since = last.elapsed();
            if since < REQUEST_PACING {
                tokio::time::sleep(REQUEST_PACING - since).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

async fn get_once(client: &Client, url: &str, token: &str) -> Result<String> {
    let response = client
        .get(url)
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| ElevationError::HttpError {
            message: e.to_string(),
            status_code: None,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ElevationError::HttpError {
            message: format!("GET {} failed", url),
            status_code: Some(status.as_u16()),
        });
    }

    response.text().await.map_err(|e| ElevationError::HttpError {
        message: format!("failed to read body from {}: {}", url, e),
        status_code: None,
    })
}
