//! HTTP client for the Garmin Connect API.
//!
//! Requests are issued one at a time, from a private current-thread tokio
//! runtime, so callers see a plain blocking [`ActivitySource`]:
//! - Dispatch rate limiting (spaces out request starts)
//! - Retry with exponential backoff on 429, and only on 429
//! - 401/403 surface as authentication errors

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use log::{debug, warn};
use reqwest::{Client, StatusCode};
use tokio::runtime::Runtime;
use tokio::sync::Mutex;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::sync::{ActivitySource, DownloadFormat};
use crate::types::{ActivityId, RemoteActivitySummary};

const MAX_RETRIES: u32 = 3;

/// Helper to calculate elapsed milliseconds from an Instant
#[inline]
fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Dispatch rate limiter - spaces out when requests START.
struct DispatchRateLimiter {
    next_dispatch: Mutex<Instant>,
    consecutive_429s: AtomicU32,
    interval: Duration,
}

impl DispatchRateLimiter {
    fn new(interval_ms: u64) -> Self {
        Self {
            next_dispatch: Mutex::new(Instant::now()),
            consecutive_429s: AtomicU32::new(0),
            interval: Duration::from_millis(interval_ms),
        }
    }

    /// Wait until this request may start, then reserve the next slot.
    async fn wait_for_dispatch_slot(&self) {
        let wait = {
            let mut next = self.next_dispatch.lock().await;
            let now = Instant::now();
            let dispatch_at = (*next).max(now);
            *next = dispatch_at + self.interval;
            dispatch_at - now
        };

        if !wait.is_zero() {
            debug!("[DispatchRateLimiter] Waiting {:?} for slot", wait);
            tokio::time::sleep(wait).await;
        }
    }

    fn record_success(&self) {
        self.consecutive_429s.store(0, Ordering::Relaxed);
    }

    fn record_429(&self) -> Duration {
        let count = self.consecutive_429s.fetch_add(1, Ordering::Relaxed) + 1;
        // Exponential backoff: 1s, 2s, 4s max
        let backoff = Duration::from_millis(500 * (1 << count.min(3)));
        warn!(
            "[DispatchRateLimiter] Got 429! Consecutive: {}, backing off {:?}",
            count, backoff
        );
        backoff
    }
}

/// Blocking Garmin Connect client authenticated with a ready-made header.
pub struct ConnectClient {
    client: Client,
    runtime: Runtime,
    base_url: String,
    auth_header: String,
    rate_limiter: DispatchRateLimiter,
}

impl ConnectClient {
    /// Create a client. `auth_header` is sent verbatim, e.g. "Bearer ...".
    pub fn new(config: &SyncConfig, auth_header: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .tcp_keepalive(Duration::from_secs(30))
            .user_agent(concat!("routesync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Http {
                message: format!("Failed to create HTTP client: {}", e),
                status_code: None,
            })?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        Ok(Self {
            client,
            runtime,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_header,
            rate_limiter: DispatchRateLimiter::new(config.min_request_interval_ms),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn activities_url(&self) -> String {
        format!(
            "{}/activitylist-service/activities/search/activities",
            self.base_url
        )
    }

    pub fn download_url(&self, activity_id: &ActivityId, format: DownloadFormat) -> String {
        match format {
            DownloadFormat::Original => format!(
                "{}/download-service/files/activity/{}",
                self.base_url, activity_id
            ),
        }
    }

    /// GET a URL and return the body, retrying only on 429.
    async fn get_bytes(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<u8>> {
        let mut retries = 0;
        let req_start = Instant::now();

        loop {
            self.rate_limiter.wait_for_dispatch_slot().await;

            let resp = self
                .client
                .get(url)
                .query(query)
                .header("Authorization", &self.auth_header)
                .header("DI-Backend", "connectapi.garmin.com")
                .send()
                .await
                .map_err(|e| SyncError::Http {
                    message: format!("Request error: {}", e),
                    status_code: None,
                })?;

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                retries += 1;
                if retries > MAX_RETRIES {
                    return Err(SyncError::Http {
                        message: "Max retries exceeded (429)".to_string(),
                        status_code: Some(status.as_u16()),
                    });
                }
                let wait = self.rate_limiter.record_429();
                warn!("[ConnectClient] 429 on {}, retry {} after {:?}", url, retries, wait);
                tokio::time::sleep(wait).await;
                continue;
            }
            self.rate_limiter.record_success();

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(SyncError::auth(format!(
                    "HTTP {} from {}; saved session expired or invalid",
                    status, url
                )));
            }
            if !status.is_success() {
                return Err(SyncError::Http {
                    message: format!("GET {} returned {}", url, status),
                    status_code: Some(status.as_u16()),
                });
            }

            let bytes = resp.bytes().await.map_err(|e| SyncError::Http {
                message: format!("Body download error: {}", e),
                status_code: Some(status.as_u16()),
            })?;
            debug!(
                "[ConnectClient] GET {} -> {:.1}KB ({} ms)",
                url,
                bytes.len() as f64 / 1024.0,
                elapsed_ms(req_start)
            );
            return Ok(bytes.to_vec());
        }
    }
}

impl ActivitySource for ConnectClient {
    fn list_activities(
        &self,
        offset: usize,
        limit: usize,
        activity_type: &str,
    ) -> Result<Vec<RemoteActivitySummary>> {
        let url = self.activities_url();
        let query = [
            ("start", offset.to_string()),
            ("limit", limit.to_string()),
            ("activityType", activity_type.to_string()),
        ];
        let body = self.runtime.block_on(self.get_bytes(&url, &query))?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn download_raw_track(
        &self,
        activity_id: &ActivityId,
        format: DownloadFormat,
    ) -> Result<Vec<u8>> {
        let url = self.download_url(activity_id, format);
        self.runtime
            .block_on(self.get_bytes(&url, &[]))
            .map_err(|e| match e {
                SyncError::Http { message, .. } => SyncError::Download {
                    activity_id: activity_id.to_string(),
                    message,
                },
                other => other,
            })
    }
}
