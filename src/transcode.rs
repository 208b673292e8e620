//! Activity transcoding: remote summary + raw track -> persisted [`Feature`].
//!
//! Download and decode failures are not errors at this level. They become a
//! [`SkipReason`], the activity is left out of this run and, since it never
//! reaches the dataset, is attempted again on the next run.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{debug, warn};
use thiserror::Error;

use crate::decode::decode_track;
use crate::sync::{ActivitySource, DownloadFormat};
use crate::types::{
    Feature, FeatureProperties, LineStringGeometry, RemoteActivitySummary, TrackGeometry,
};

/// Start-time layouts accepted besides RFC 3339, most specific first.
const START_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

// ============================================================================
// Outcomes
// ============================================================================

/// Why an activity produced no feature.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error("could not download GPS data: {0}")]
    DownloadFailed(String),
    #[error("could not decode GPS data: {0}")]
    Undecodable(String),
    #[error("no GPS data ({0} points)")]
    InsufficientPoints(usize),
}

/// Result of transcoding one activity.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeOutcome {
    Added(Feature),
    Skipped(SkipReason),
}

// ============================================================================
// Derived Fields
// ============================================================================

/// Derived, display-ready values for one activity.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityStats {
    pub date: String,
    pub distance_km: f64,
    pub duration_min: f64,
    pub pace: String,
    pub avg_speed_kmh: f64,
}

impl ActivityStats {
    pub fn from_summary(summary: &RemoteActivitySummary) -> Self {
        let distance_km = summary.distance_m() / 1000.0;
        let duration_min = summary.duration_s() / 60.0;

        Self {
            date: date_bucket(summary.start_time()),
            distance_km: round_to(distance_km, 2),
            duration_min: round_to(duration_min, 1),
            pace: format_pace(distance_km, duration_min),
            avg_speed_kmh: round_to(summary.avg_speed_m_s() * 3.6, 1),
        }
    }
}

/// Format minutes-per-km as "M:SS". Zero distance gives "0:00".
pub fn format_pace(distance_km: f64, duration_min: f64) -> String {
    let pace = if distance_km > 0.0 {
        duration_min / distance_km
    } else {
        0.0
    };
    if !pace.is_finite() || pace <= 0.0 {
        return "0:00".to_string();
    }

    let minutes = pace.trunc();
    let seconds = ((pace - minutes) * 60.0).trunc();
    format!("{}:{:02}", minutes as u64, seconds as u64)
}

/// YYYY-MM-DD bucket for a start timestamp.
///
/// Unparseable timestamps fall back to their first 10 characters.
pub fn date_bucket(start_time: &str) -> String {
    let start_time = start_time.trim();
    if start_time.is_empty() {
        return String::new();
    }

    match parse_start_date(start_time) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => {
            debug!("[date_bucket] Unparseable start time '{}'", start_time);
            start_time.chars().take(10).collect()
        }
    }
}

fn parse_start_date(start_time: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(start_time) {
        return Some(dt.date_naive());
    }
    START_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(start_time, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| NaiveDate::parse_from_str(start_time, "%Y-%m-%d").ok())
}

/// Exact halves round to even.
fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// Build the persisted feature, rejecting tracks that cannot form a line.
pub fn build_feature(
    summary: &RemoteActivitySummary,
    track: TrackGeometry,
) -> Result<Feature, SkipReason> {
    if !track.is_usable() {
        return Err(SkipReason::InsufficientPoints(track.len()));
    }

    let stats = ActivityStats::from_summary(summary);
    Ok(Feature {
        geometry: LineStringGeometry { coordinates: track },
        properties: FeatureProperties {
            id: summary.activity_id.clone(),
            name: summary.name().to_string(),
            date: stats.date,
            distance_km: stats.distance_km,
            duration_min: stats.duration_min,
            pace: stats.pace,
            avg_speed_kmh: stats.avg_speed_kmh,
            extra: serde_json::Map::new(),
        },
    })
}

// ============================================================================
// Transcoder
// ============================================================================

/// Downloads, decodes and converts one activity at a time.
///
/// No retries: a failure is final for the activity within the current run.
pub struct ActivityTranscoder<'a, S: ActivitySource + ?Sized> {
    source: &'a S,
}

impl<'a, S: ActivitySource + ?Sized> ActivityTranscoder<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    pub fn transcode(&self, summary: &RemoteActivitySummary) -> TranscodeOutcome {
        match self.try_transcode(summary) {
            Ok(feature) => {
                debug!(
                    "[ActivityTranscoder] {} ({}): {} points",
                    summary.activity_id,
                    summary.name(),
                    feature.coordinates().len()
                );
                TranscodeOutcome::Added(feature)
            }
            Err(reason) => {
                warn!(
                    "[ActivityTranscoder] Skipping {} ({}): {}",
                    summary.activity_id,
                    summary.name(),
                    reason
                );
                TranscodeOutcome::Skipped(reason)
            }
        }
    }

    fn try_transcode(&self, summary: &RemoteActivitySummary) -> Result<Feature, SkipReason> {
        let bytes = self
            .source
            .download_raw_track(&summary.activity_id, DownloadFormat::Original)
            .map_err(|e| SkipReason::DownloadFailed(e.to_string()))?;

        let track = decode_track(&bytes).map_err(|e| SkipReason::Undecodable(e.to_string()))?;

        build_feature(summary, track)
    }
}
