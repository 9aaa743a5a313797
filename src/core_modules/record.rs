// THEORY:
// The `record` module defines the fixed-width unit of result data. A
// `ResultRecord` holds the 5 measurements of one frame, each of which may be
// absent, and it is the ONLY thing that ever crosses the parallel/sequential
// phase boundary (serialized through the filesystem).
//
// Key architectural principles:
// 1.  **Fixed width**: a record always serializes to exactly 5 comma-separated
//     fields, empty or not. This is what pins the column width of the final
//     matrix — a failed frame occupies exactly as many columns as a
//     successful one.
// 2.  **Structured, not stringly**: fields are `Option<f64>` and serialization
//     emits the final on-disk form directly. There is no bracket/quote/space
//     stripping anywhere downstream, and therefore no repair pass.
// 3.  **Round-trip stability**: `to_line` and `from_line` are inverses, which
//     is what makes re-running the analyzer on identical inputs byte-stable.

use std::path::Path;

use crate::core_modules::error::AssemblyError;

/// Number of scalar fields in every record: elapsed minutes, fluorescence
/// ratio, POI aspect ratio, POI area, nucleus area.
pub const FIELD_COUNT: usize = 5;

/// The measurements of a single analyzed frame. Absent fields serialize as
/// the empty string.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultRecord {
    /// Minutes since the experiment's first frame, rounded to 3 decimals.
    pub elapsed_minutes: Option<f64>,
    /// Nuclear-to-cytoplasmic intensity ratio, rounded to 3 decimals.
    pub fluorescence_ratio: Option<f64>,
    /// Major/minor axis ratio of the dominant POI region.
    pub poi_aspect_ratio: Option<f64>,
    /// Micron-scaled area of the dominant POI region.
    pub poi_area: Option<f64>,
    /// Micron-scaled area of the dominant nucleus region.
    pub nuc_area: Option<f64>,
}

impl ResultRecord {
    /// The record written whenever a frame fails analysis: 5 empty fields.
    pub fn null() -> Self {
        Self::default()
    }

    fn fields(&self) -> [Option<f64>; FIELD_COUNT] {
        [
            self.elapsed_minutes,
            self.fluorescence_ratio,
            self.poi_aspect_ratio,
            self.poi_area,
            self.nuc_area,
        ]
    }

    /// Serializes to the single on-disk line: 5 comma-joined fields, no
    /// terminator.
    pub fn to_line(&self) -> String {
        self.fields()
            .iter()
            .map(|f| f.map(fmt_float).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parses a record file's contents back into a structured record,
    /// validating the fixed field count.
    pub fn from_line(line: &str, path: &Path) -> Result<Self, AssemblyError> {
        let raw: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
        if raw.len() != FIELD_COUNT {
            return Err(AssemblyError::MalformedRecord {
                path: path.to_path_buf(),
                field_count: raw.len(),
            });
        }

        let mut fields = [None; FIELD_COUNT];
        for (slot, text) in fields.iter_mut().zip(&raw) {
            if !text.is_empty() {
                *slot = Some(text.parse::<f64>().map_err(|_| {
                    AssemblyError::MalformedRecord {
                        path: path.to_path_buf(),
                        field_count: raw.len(),
                    }
                })?);
            }
        }

        Ok(Self {
            elapsed_minutes: fields[0],
            fluorescence_ratio: fields[1],
            poi_aspect_ratio: fields[2],
            poi_area: fields[3],
            nuc_area: fields[4],
        })
    }
}

/// Builds the matrix header: `Cell` followed by the 5 per-frame column names
/// for every frame index.
pub fn matrix_header(n_frames: u32) -> String {
    let mut header = String::from("Cell");
    for i in 0..n_frames {
        header.push_str(&format!(",t{i},f{i},ar{i},ca{i},na{i}"));
    }
    header
}

/// Rounds to 3 decimal places, the precision every derived metric is reported
/// at.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Formats a field value. The `{:?}` form keeps a trailing `.0` on whole
/// numbers (`0.0`, `150.0`), which the matrix format requires to distinguish
/// a measured zero from an empty field at a glance.
fn fmt_float(value: f64) -> String {
    format!("{value:?}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn null_record_is_five_empty_fields() {
        let line = ResultRecord::null().to_line();
        assert_eq!(line, ",,,,");
        assert_eq!(line.split(',').count(), FIELD_COUNT);
    }

    #[test]
    fn full_record_round_trips() {
        let record = ResultRecord {
            elapsed_minutes: Some(0.0),
            fluorescence_ratio: Some(0.25),
            poi_aspect_ratio: Some(1.333),
            poi_area: Some(113.6),
            nuc_area: Some(97.28),
        };
        let line = record.to_line();
        assert_eq!(line, "0.0,0.25,1.333,113.6,97.28");

        let parsed = ResultRecord::from_line(&line, &PathBuf::from("x.csv")).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.to_line(), line);
    }

    #[test]
    fn partial_record_keeps_width() {
        let record = ResultRecord {
            elapsed_minutes: Some(12.5),
            fluorescence_ratio: None,
            poi_aspect_ratio: Some(1.0),
            poi_area: Some(4.0),
            nuc_area: Some(9.0),
        };
        assert_eq!(record.to_line(), "12.5,,1.0,4.0,9.0");
    }

    #[test]
    fn wrong_field_count_is_rejected() {
        let err = ResultRecord::from_line("1.0,2.0,3.0", &PathBuf::from("x.csv"));
        assert!(matches!(
            err,
            Err(AssemblyError::MalformedRecord { field_count: 3, .. })
        ));
    }

    #[test]
    fn header_width_matches_rows() {
        let header = matrix_header(3);
        assert_eq!(header.split(',').count(), 1 + FIELD_COUNT * 3);
        assert!(header.starts_with("Cell,t0,f0,ar0,ca0,na0,t1"));
    }

    #[test]
    fn rounding_is_three_decimals() {
        assert_eq!(round3(0.123456), 0.123);
        assert_eq!(round3(50.0 / 200.0), 0.25);
        assert_eq!(round3(2.0005), 2.001);
    }
}
