// THEORY:
// The `metadata` module is the timestamp-and-scale service. Each Position
// directory carries a `<Position>_Properties.xml` document describing the
// acquisition; the two facts the engine needs from it are the absolute
// timestamp of every frame and the pixel-to-micron scale.
//
// The documents follow the Leica LAS conventions: one
// `<TimeStamp HighInteger=".." LowInteger=".."/>` element per acquired frame
// (a Windows FILETIME split across two attributes, 100 ns ticks since
// 1601-01-01 UTC), and a `<DimensionDescription ... Voxel="..">` element
// carrying the microns-per-pixel factor. The elements are located by
// attribute scan rather than a full XML parse: the documents are
// machine-generated, and the scan keeps this service total over the many
// vendor variations of surrounding structure.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, TimeZone, Utc};
use regex::Regex;

use crate::core_modules::error::MetadataError;

static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<TimeStamp\b[^>]*\bHighInteger="(\d+)"[^>]*\bLowInteger="(\d+)""#)
        .expect("timestamp pattern is valid")
});

static SCALE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<DimensionDescription\b[^>]*\bVoxel="([0-9eE+.\-]+)""#)
        .expect("scale pattern is valid")
});

/// Start of the Windows FILETIME epoch.
static FILETIME_EPOCH: LazyLock<DateTime<Utc>> = LazyLock::new(|| {
    Utc.with_ymd_and_hms(1601, 1, 1, 0, 0, 0)
        .single()
        .expect("FILETIME epoch is representable")
});

/// Returns the absolute acquisition timestamp of `frame_index` (0-based)
/// from a Position's properties document.
pub fn get_time(metadata_path: &Path, frame_index: u32) -> Result<DateTime<Utc>, MetadataError> {
    let document = fs::read_to_string(metadata_path)?;

    let capture = TIMESTAMP_RE
        .captures_iter(&document)
        .nth(frame_index as usize)
        .ok_or_else(|| MetadataError::FrameOutOfRange {
            path: metadata_path.to_path_buf(),
            frame_index,
        })?;

    let high: u64 = parse_attr(&capture[1], metadata_path)?;
    let low: u64 = parse_attr(&capture[2], metadata_path)?;

    filetime_to_datetime((high << 32) | low).ok_or_else(|| MetadataError::Malformed {
        path: metadata_path.to_path_buf(),
        reason: format!("timestamp out of range: high={high} low={low}"),
    })
}

/// Returns the microns-per-pixel scale of a Position's properties document.
pub fn get_scale(metadata_path: &Path) -> Result<f64, MetadataError> {
    let document = fs::read_to_string(metadata_path)?;

    let capture = SCALE_RE
        .captures(&document)
        .ok_or_else(|| MetadataError::MissingScale {
            path: metadata_path.to_path_buf(),
        })?;

    capture[1]
        .parse::<f64>()
        .map_err(|e| MetadataError::Malformed {
            path: metadata_path.to_path_buf(),
            reason: format!("bad Voxel attribute {:?}: {e}", &capture[1]),
        })
}

/// Converts a FILETIME tick count (100 ns units since 1601-01-01 UTC) to a
/// UTC timestamp. `None` when the count does not fit the chrono range.
pub fn filetime_to_datetime(ticks: u64) -> Option<DateTime<Utc>> {
    let micros = i64::try_from(ticks / 10).ok()?;
    FILETIME_EPOCH.checked_add_signed(Duration::microseconds(micros))
}

fn parse_attr(text: &str, path: &Path) -> Result<u64, MetadataError> {
    text.parse::<u64>().map_err(|e| MetadataError::Malformed {
        path: path.to_path_buf(),
        reason: format!("bad integer attribute {text:?}: {e}"),
    })
}
