//! End-to-end incremental sync.
//!
//! ```text
//! Idle -> Listing -> Diffing -> Downloading -> Merging -> Persisted
//!            |           \
//!         Aborted      UpToDate (nothing new, no write)
//! ```
//!
//! Everything runs sequentially on the calling thread: listing pages, then one
//! download at a time in listing order, then a single merge + persist over
//! the whole delta. Killing the process mid-run leaves the previous document
//! untouched.

use std::sync::Arc;

use log::{debug, info};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::persistence::{DatasetStore, diff, merge};
use crate::transcode::{ActivityTranscoder, SkipReason, TranscodeOutcome};
use crate::types::{ActivityId, RemoteActivitySummary};

/// Default number of activities requested per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Default remote activity type filter.
pub const DEFAULT_ACTIVITY_TYPE: &str = "running";

// ============================================================================
// Remote Capability
// ============================================================================

/// Encoding requested for a raw track download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadFormat {
    /// The file as uploaded by the device (FIT, usually zipped)
    Original,
}

/// Authenticated access to the remote activity service.
///
/// Session handling lives entirely behind this trait.
pub trait ActivitySource {
    /// One page of activities. An empty page ends pagination.
    fn list_activities(
        &self,
        offset: usize,
        limit: usize,
        activity_type: &str,
    ) -> Result<Vec<RemoteActivitySummary>>;

    /// Raw track bytes for one activity.
    fn download_raw_track(
        &self,
        activity_id: &ActivityId,
        format: DownloadFormat,
    ) -> Result<Vec<u8>>;
}

impl<T: ActivitySource + ?Sized> ActivitySource for &T {
    fn list_activities(
        &self,
        offset: usize,
        limit: usize,
        activity_type: &str,
    ) -> Result<Vec<RemoteActivitySummary>> {
        (**self).list_activities(offset, limit, activity_type)
    }

    fn download_raw_track(
        &self,
        activity_id: &ActivityId,
        format: DownloadFormat,
    ) -> Result<Vec<u8>> {
        (**self).download_raw_track(activity_id, format)
    }
}

// ============================================================================
// State & Report
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Listing,
    Diffing,
    Downloading,
    Merging,
    /// Terminal: dataset written
    Persisted,
    /// Terminal: nothing new remotely, dataset untouched
    UpToDate,
    /// Terminal: listing failed, dataset untouched
    Aborted,
}

/// An activity that produced no feature this run.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedActivity {
    pub activity_id: ActivityId,
    pub name: String,
    pub reason: SkipReason,
}

/// Summary counts of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Activities returned by the remote listing
    pub total_remote: usize,
    /// Listed activities already in the dataset
    pub already_saved: usize,
    /// Features appended this run
    pub added: usize,
    /// Delta activities that produced no feature
    pub skipped: Vec<SkippedActivity>,
    /// Features in the dataset after the run
    pub total_features: usize,
}

impl SyncReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Nothing new was found remotely.
    pub fn is_up_to_date(&self) -> bool {
        self.added == 0 && self.skipped.is_empty()
    }
}

/// Progress callback: `(index, total, activity name)`, called before each download.
pub type ProgressCallback = Arc<dyn Fn(usize, usize, &str) + Send + Sync>;

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives one sync run against an [`ActivitySource`] and a [`DatasetStore`].
pub struct SyncOrchestrator<S: ActivitySource> {
    source: S,
    store: DatasetStore,
    page_size: usize,
    activity_type: String,
    phase: SyncPhase,
    on_progress: Option<ProgressCallback>,
}

impl<S: ActivitySource> SyncOrchestrator<S> {
    pub fn new(source: S, store: DatasetStore) -> Self {
        Self {
            source,
            store,
            page_size: DEFAULT_PAGE_SIZE,
            activity_type: DEFAULT_ACTIVITY_TYPE.to_string(),
            phase: SyncPhase::Idle,
            on_progress: None,
        }
    }

    pub fn from_config(source: S, config: &SyncConfig) -> Self {
        Self::new(source, config.store())
            .with_page_size(config.page_size)
            .with_activity_type(&config.activity_type)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_activity_type(mut self, activity_type: &str) -> Self {
        self.activity_type = activity_type.to_string();
        self
    }

    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    fn enter(&mut self, phase: SyncPhase) {
        debug!("[SyncOrchestrator] {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Page through the remote listing until an empty page comes back.
    pub fn fetch_all_activities(&mut self) -> Result<Vec<RemoteActivitySummary>> {
        self.enter(SyncPhase::Listing);

        let mut activities = Vec::new();
        let mut offset = 0;
        loop {
            debug!(
                "[SyncOrchestrator] Listing {} activities at offset {}",
                self.page_size, offset
            );
            let page = match self
                .source
                .list_activities(offset, self.page_size, &self.activity_type)
            {
                Ok(page) => page,
                Err(e) => {
                    self.enter(SyncPhase::Aborted);
                    return Err(SyncError::Listing {
                        offset,
                        source: Box::new(e),
                    });
                }
            };

            if page.is_empty() {
                break;
            }
            activities.extend(page);
            info!(
                "[SyncOrchestrator] Fetched {} activities so far...",
                activities.len()
            );
            offset += self.page_size;
        }

        info!(
            "[SyncOrchestrator] Found {} {} activities total",
            activities.len(),
            self.activity_type
        );
        Ok(activities)
    }

    /// Run one full sync. Only a listing failure or a failed write is an error.
    pub fn run(&mut self) -> Result<SyncReport> {
        self.phase = SyncPhase::Idle;
        let activities = self.fetch_all_activities()?;

        self.enter(SyncPhase::Diffing);
        let existing = self.store.load();
        let existing_ids = existing.ids();
        let delta = diff(&existing_ids, &activities);

        let mut report = SyncReport {
            total_remote: activities.len(),
            already_saved: activities.len() - delta.len(),
            total_features: existing.len(),
            ..SyncReport::default()
        };

        if delta.is_empty() {
            info!("[SyncOrchestrator] No new activities to download. Already up to date.");
            self.enter(SyncPhase::UpToDate);
            return Ok(report);
        }

        self.enter(SyncPhase::Downloading);
        info!(
            "[SyncOrchestrator] Downloading {} new GPS tracks (skipping {} already saved)...",
            delta.len(),
            report.already_saved
        );

        let transcoder = ActivityTranscoder::new(&self.source);
        let mut new_features = Vec::with_capacity(delta.len());
        for (index, summary) in delta.iter().enumerate() {
            if let Some(ref cb) = self.on_progress {
                cb(index + 1, delta.len(), summary.name());
            }

            match transcoder.transcode(summary) {
                TranscodeOutcome::Added(feature) => new_features.push(feature),
                TranscodeOutcome::Skipped(reason) => report.skipped.push(SkippedActivity {
                    activity_id: summary.activity_id.clone(),
                    name: summary.name().to_string(),
                    reason,
                }),
            }
        }

        self.enter(SyncPhase::Merging);
        report.added = new_features.len();
        let merged = merge(existing, &new_features)?;
        report.total_features = merged.len();
        self.store.persist(&merged)?;
        self.enter(SyncPhase::Persisted);

        info!(
            "[SyncOrchestrator] Added {} new routes ({} skipped). Total: {} routes",
            report.added,
            report.skipped_count(),
            report.total_features
        );
        Ok(report)
    }
}
