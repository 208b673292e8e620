//! Shared fixtures: a minimal FIT encoder and an in-memory activity source.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Cursor, Write};

use routesync::{ActivityId, ActivitySource, DownloadFormat, RemoteActivitySummary, SyncError};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

// ============================================================================
// FIT Encoding
// ============================================================================

const CRC_TABLE: [u16; 16] = [
    0x0000, 0xCC01, 0xD801, 0x1400, 0xF001, 0x3C00, 0x2800, 0xE401, 0xA001, 0x6C00, 0x7800,
    0xB401, 0x5000, 0x9C01, 0x8801, 0x4400,
];

fn fit_crc(bytes: &[u8]) -> u16 {
    let mut crc = 0u16;
    for &byte in bytes {
        let tmp = CRC_TABLE[(crc & 0xF) as usize];
        crc = (crc >> 4) & 0x0FFF;
        crc = crc ^ tmp ^ CRC_TABLE[(byte & 0xF) as usize];

        let tmp = CRC_TABLE[(crc & 0xF) as usize];
        crc = (crc >> 4) & 0x0FFF;
        crc = crc ^ tmp ^ CRC_TABLE[((byte >> 4) & 0xF) as usize];
    }
    crc
}

const GLOBAL_RECORD: u16 = 20;
const LOCAL_POSITIONED: u8 = 0;
const LOCAL_HEART_RATE: u8 = 1;
const BASE_SINT32: u8 = 0x85;
const BASE_UINT8: u8 = 0x02;

/// Degrees -> semicircles, inverse of the decoder's conversion.
pub fn degrees_to_semicircles(degrees: f64) -> i32 {
    (degrees * (2_147_483_648.0 / 180.0)).round() as i32
}

/// Builds a FIT activity stream of `record` messages.
pub struct FitBuilder {
    data: Vec<u8>,
}

impl FitBuilder {
    pub fn new() -> Self {
        let mut data = Vec::new();
        // record: position_lat (0), position_long (1)
        data.extend_from_slice(&[0x40 | LOCAL_POSITIONED, 0, 0]);
        data.extend_from_slice(&GLOBAL_RECORD.to_le_bytes());
        data.extend_from_slice(&[2, 0, 4, BASE_SINT32, 1, 4, BASE_SINT32]);
        // record: heart_rate (3) only
        data.extend_from_slice(&[0x40 | LOCAL_HEART_RATE, 0, 0]);
        data.extend_from_slice(&GLOBAL_RECORD.to_le_bytes());
        data.extend_from_slice(&[1, 3, 1, BASE_UINT8]);
        Self { data }
    }

    /// A record carrying a position, in decimal degrees.
    pub fn point(self, longitude: f64, latitude: f64) -> Self {
        self.point_semicircles(
            degrees_to_semicircles(longitude),
            degrees_to_semicircles(latitude),
        )
    }

    pub fn point_semicircles(mut self, longitude: i32, latitude: i32) -> Self {
        self.data.push(LOCAL_POSITIONED);
        self.data.extend_from_slice(&latitude.to_le_bytes());
        self.data.extend_from_slice(&longitude.to_le_bytes());
        self
    }

    /// A record without any position fields.
    pub fn no_position(mut self, heart_rate: u8) -> Self {
        self.data.push(LOCAL_HEART_RATE);
        self.data.push(heart_rate);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() + 16);
        out.push(14);
        out.push(0x10);
        out.extend_from_slice(&2132u16.to_le_bytes());
        out.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        out.extend_from_slice(b".FIT");
        let header_crc = fit_crc(&out);
        out.extend_from_slice(&header_crc.to_le_bytes());

        out.extend_from_slice(&self.data);
        let file_crc = fit_crc(&out);
        out.extend_from_slice(&file_crc.to_le_bytes());
        out
    }
}

/// FIT stream with `n` points walking east from (8.54, 47.37).
pub fn fit_track(n: usize) -> Vec<u8> {
    (0..n)
        .fold(FitBuilder::new(), |b, i| b.point(8.54 + i as f64 * 0.001, 47.37))
        .build()
}

/// Wrap members in a ZIP archive, in the order given.
pub fn zip_archive(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, contents) in members {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

// ============================================================================
// In-memory Activity Source
// ============================================================================

pub fn summary(id: u64, name: &str) -> RemoteActivitySummary {
    RemoteActivitySummary {
        activity_id: ActivityId::Numeric(id),
        activity_name: Some(name.to_string()),
        start_time_local: Some("2024-06-01 06:30:00".to_string()),
        distance: Some(5_000.0),
        duration: Some(1_500.0),
        average_speed: Some(3.33),
    }
}

/// Serves a fixed activity list and track bytes from memory.
#[derive(Default)]
pub struct FakeSource {
    pub activities: Vec<RemoteActivitySummary>,
    pub tracks: HashMap<ActivityId, Vec<u8>>,
    /// Listing calls at or past this offset fail
    pub fail_listing_from: Option<usize>,
    pub list_calls: RefCell<Vec<(usize, usize)>>,
    pub downloads: RefCell<Vec<ActivityId>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an activity with a usable zipped track.
    pub fn with_run(mut self, id: u64, name: &str) -> Self {
        let fit = fit_track(5);
        let member = format!("{}_ACTIVITY.fit", id);
        let archive = zip_archive(&[(member.as_str(), fit.as_slice())]);
        self.activities.push(summary(id, name));
        self.tracks.insert(ActivityId::Numeric(id), archive);
        self
    }

    /// Add an activity whose download fails.
    pub fn with_missing_track(mut self, id: u64, name: &str) -> Self {
        self.activities.push(summary(id, name));
        self
    }

    /// Add an activity with the given raw track bytes.
    pub fn with_track(mut self, id: u64, name: &str, bytes: Vec<u8>) -> Self {
        self.activities.push(summary(id, name));
        self.tracks.insert(ActivityId::Numeric(id), bytes);
        self
    }

    pub fn download_count(&self) -> usize {
        self.downloads.borrow().len()
    }
}

impl ActivitySource for FakeSource {
    fn list_activities(
        &self,
        offset: usize,
        limit: usize,
        _activity_type: &str,
    ) -> routesync::Result<Vec<RemoteActivitySummary>> {
        self.list_calls.borrow_mut().push((offset, limit));
        if self.fail_listing_from.is_some_and(|from| offset >= from) {
            return Err(SyncError::Http {
                message: "Service Unavailable".to_string(),
                status_code: Some(503),
            });
        }
        let end = (offset + limit).min(self.activities.len());
        Ok(self.activities.get(offset..end).unwrap_or_default().to_vec())
    }

    fn download_raw_track(
        &self,
        activity_id: &ActivityId,
        format: DownloadFormat,
    ) -> routesync::Result<Vec<u8>> {
        assert_eq!(format, DownloadFormat::Original);
        self.downloads.borrow_mut().push(activity_id.clone());
        self.tracks
            .get(activity_id)
            .cloned()
            .ok_or_else(|| SyncError::Download {
                activity_id: activity_id.to_string(),
                message: "HTTP 404 Not Found".to_string(),
            })
    }
}
