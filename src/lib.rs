//! # Routesync
//!
//! Incremental sync of running routes from Garmin Connect into a local
//! GeoJSON `FeatureCollection`.
//!
//! This crate provides:
//! - FIT track decoding, including ZIP-wrapped downloads
//! - Conversion of remote activities into GeoJSON features
//! - An append-only dataset store with atomic rewrites
//! - A sequential sync orchestrator over a pluggable [`ActivitySource`]
//! - A blocking HTTP client for the Garmin Connect API
//!
//! ## Quick Start
//!
//! ```no_run
//! use routesync::{ConnectClient, SyncConfig, SyncOrchestrator, load_auth_header};
//!
//! # fn main() -> routesync::Result<()> {
//! let config = SyncConfig::from_env()?;
//! let auth = load_auth_header(&config, |key| std::env::var(key).ok())?;
//! let client = ConnectClient::new(&config, auth)?;
//!
//! let report = SyncOrchestrator::from_config(client, &config).run()?;
//! println!("Added {} new routes", report.added);
//! # Ok(())
//! # }
//! ```

// Unified error handling
pub mod error;
pub use error::{Result, SyncError};

// Data model and GeoJSON types
pub mod types;
pub use types::{
    ActivityId, Dataset, Feature, FeatureProperties, GeoPoint, LineStringGeometry,
    RemoteActivitySummary, StoredFeature, TrackGeometry,
};

// FIT / ZIP track decoding
pub mod decode;
pub use decode::{decode_fit, decode_track, semicircles_to_degrees};

// Activity -> feature conversion
pub mod transcode;
pub use transcode::{ActivityTranscoder, SkipReason, TranscodeOutcome};

// GeoJSON dataset store
pub mod persistence;
pub use persistence::{DatasetStore, diff, merge};

// Sync orchestration
pub mod sync;
pub use sync::{
    ActivitySource, DownloadFormat, ProgressCallback, SyncOrchestrator, SyncPhase, SyncReport,
};

// Configuration and credentials
pub mod config;
pub use config::{SyncConfig, load_auth_header};

// HTTP client for Garmin Connect
pub mod http;
pub use http::ConnectClient;
