//! Track decoding: raw activity download -> ordered GPS points.
//!
//! The "original" download of an activity is a FIT file, usually wrapped in
//! a ZIP archive. Only `record` messages are inspected and only their
//! `position_lat` / `position_long` fields are read; every other message
//! and field is ignored.

use std::io::{Cursor, Read};

use fitparser::profile::MesgNum;
use fitparser::{FitDataRecord, Value};
use log::debug;
use zip::ZipArchive;

use crate::error::{Result, SyncError};
use crate::types::{GeoPoint, TrackGeometry};

/// Extension of the track member inside a downloaded archive.
pub const TRACK_FILE_EXTENSION: &str = ".fit";

/// Leading bytes of a ZIP local file header.
const ZIP_MAGIC: &[u8; 2] = b"PK";

/// Degrees per semicircle: a full circle spans the signed 32-bit range.
const DEGREES_PER_SEMICIRCLE: f64 = 180.0 / 2_147_483_648.0;

/// Convert a FIT semicircle value to decimal degrees.
#[inline]
pub fn semicircles_to_degrees(semicircles: i64) -> f64 {
    semicircles as f64 * DEGREES_PER_SEMICIRCLE
}

/// True if the buffer starts with the ZIP magic number.
#[inline]
pub fn is_zip_archive(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}

/// Decode a downloaded track, unwrapping a ZIP container if present.
///
/// An archive without a track member decodes to an empty geometry. A corrupt
/// archive or FIT stream is an error; callers treat it as "no geometry".
pub fn decode_track(bytes: &[u8]) -> Result<TrackGeometry> {
    if !is_zip_archive(bytes) {
        return decode_fit(bytes);
    }

    match extract_track_member(bytes)? {
        Some(member) => decode_fit(&member),
        None => {
            debug!("[decode_track] Archive has no {} member", TRACK_FILE_EXTENSION);
            Ok(TrackGeometry::new())
        }
    }
}

/// Read the first archive member whose name ends with [`TRACK_FILE_EXTENSION`].
pub fn extract_track_member(bytes: &[u8]) -> Result<Option<Vec<u8>>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| SyncError::decode(format!("invalid archive: {}", e)))?;

    for index in 0..archive.len() {
        let mut member = archive
            .by_index(index)
            .map_err(|e| SyncError::decode(format!("invalid archive member {}: {}", index, e)))?;

        if !member
            .name()
            .to_ascii_lowercase()
            .ends_with(TRACK_FILE_EXTENSION)
        {
            continue;
        }

        let mut contents = Vec::with_capacity(member.size() as usize);
        member
            .read_to_end(&mut contents)
            .map_err(|e| SyncError::decode(format!("unreadable member '{}': {}", member.name(), e)))?;
        debug!(
            "[extract_track_member] Using '{}' ({} bytes)",
            member.name(),
            contents.len()
        );
        return Ok(Some(contents));
    }

    Ok(None)
}

/// Decode a bare FIT stream into its track points.
pub fn decode_fit(bytes: &[u8]) -> Result<TrackGeometry> {
    let records = fitparser::from_bytes(bytes)
        .map_err(|e| SyncError::decode(format!("invalid FIT data: {}", e)))?;

    let track: TrackGeometry = records.iter().filter_map(record_position).collect();
    debug!(
        "[decode_fit] {} messages, {} positioned records",
        records.len(),
        track.len()
    );
    Ok(track)
}

/// Position of a `record` message, if it carries both coordinates.
fn record_position(record: &FitDataRecord) -> Option<GeoPoint> {
    if record.kind() != MesgNum::Record {
        return None;
    }

    let mut latitude = None;
    let mut longitude = None;
    for field in record.fields() {
        match field.name() {
            "position_lat" => latitude = semicircle_value(field.value()),
            "position_long" => longitude = semicircle_value(field.value()),
            _ => {}
        }
    }

    Some(GeoPoint::new(
        semicircles_to_degrees(longitude?),
        semicircles_to_degrees(latitude?),
    ))
}

fn semicircle_value(value: &Value) -> Option<i64> {
    match value {
        Value::SInt32(v) => Some(*v as i64),
        Value::SInt64(v) => Some(*v),
        Value::UInt32(v) => Some(*v as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-6;

    #[test]
    fn test_semicircle_conversion() {
        assert!((semicircles_to_degrees(0) - 0.0).abs() < TOLERANCE);
        assert!((semicircles_to_degrees(1 << 31) - 180.0).abs() < TOLERANCE);
        assert!((semicircles_to_degrees(1 << 30) - 90.0).abs() < TOLERANCE);
        assert!((semicircles_to_degrees(-(1 << 30)) + 90.0).abs() < TOLERANCE);
        assert!((semicircles_to_degrees(i32::MIN as i64) + 180.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_zip_magic_detection() {
        assert!(is_zip_archive(b"PK\x03\x04rest"));
        assert!(!is_zip_archive(b"\x0e\x10.FIT"));
        assert!(!is_zip_archive(b"P"));
        assert!(!is_zip_archive(b""));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = decode_track(b"definitely not a fit file").unwrap_err();
        assert!(matches!(err, SyncError::Decode { .. }));
    }

    #[test]
    fn test_truncated_archive_is_decode_error() {
        let err = decode_track(b"PK\x03\x04\x14\x00").unwrap_err();
        assert!(matches!(err, SyncError::Decode { .. }));
    }
}
