// THEORY:
// The `FrameAnalyzer` is the unit of work of the entire engine. Given one
// frame key it drives the metadata and imaging services, derives the 5
// metrics, and leaves exactly one result record file behind — ALWAYS, no
// matter what went wrong upstream.
//
// Key architectural principles:
// 1.  **Failure containment**: every service failure (unreadable image,
//     malformed metadata, out-of-range frame) is caught at this boundary and
//     converted into a null record. One corrupt frame never aborts the batch,
//     and the fixed-width invariant of the matrix survives any failure mix.
// 2.  **Share nothing mutable**: an analyzer holds the read-only
//     configuration and the immutable experiment-wide first timestamp, both
//     captured before the worker pool starts. Invocations are independent,
//     safe to run in any order or in parallel, and idempotent.
// 3.  **Filesystem as the only channel**: the record file named by the frame
//     key is the sole output. No values are returned to the pool.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::core_modules::error::AnalysisError;
use crate::core_modules::frame::{FrameKey, frame_token};
use crate::core_modules::imaging;
use crate::core_modules::metadata;
use crate::core_modules::record::{ResultRecord, round3};
use crate::pipeline::AnalysisConfig;

/// Analyzes single frames against a fixed configuration and experiment
/// start time.
pub struct FrameAnalyzer {
    config: Arc<AnalysisConfig>,
    /// Timestamp of frame 0 of the first Position, captured once before the
    /// pool starts and never mutated.
    first_timestamp: DateTime<Utc>,
}

impl FrameAnalyzer {
    pub fn new(config: Arc<AnalysisConfig>, first_timestamp: DateTime<Utc>) -> Self {
        Self {
            config,
            first_timestamp,
        }
    }

    /// Analyzes one frame and writes its record file. Per-frame analysis
    /// failures are contained here (a null record is written and `Ok`
    /// returned); only the record write itself can fail.
    pub fn analyze(&self, key: &FrameKey) -> io::Result<()> {
        let analysis_start = Instant::now();
        info!("analyzing {}", key.display_name());

        let record = match self.measure(key) {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("ratio = 0: writing null values for {}", key.display_name());
                ResultRecord::null()
            }
            Err(err) => {
                warn!("{err}: writing null values for {}", key.display_name());
                ResultRecord::null()
            }
        };

        let record_path = key.record_path(&self.config.results_dir, self.config.n_frames);
        fs::write(&record_path, record.to_line())?;

        info!(
            "wrote {} in {:.3} minutes",
            record_path.display(),
            analysis_start.elapsed().as_secs_f64() / 60.0
        );
        Ok(())
    }

    /// Runs the measurement chain. `Err` covers every recoverable per-frame
    /// service failure; `Ok(None)` is the degenerate exact-zero ratio, which
    /// discards the attempt like a failure (kept for compatibility with the
    /// established matrix semantics even though it swallows a true zero
    /// signal).
    fn measure(&self, key: &FrameKey) -> Result<Option<ResultRecord>, AnalysisError> {
        let poi_path = key.channel_path(&self.config.poi_channel);
        let nuc_path = key.channel_path(&self.config.nuc_channel);
        let metadata_path = key.metadata_path();

        // --- 1. Masks, timestamp, scale ---
        // Any failure in this stage nullifies the frame.
        let poi_mask = imaging::mask_gen(&poi_path)?;
        let nuc_mask = imaging::mask_gen(&nuc_path)?;
        let timestamp = metadata::get_time(&metadata_path, key.frame_index)?;
        let scale = metadata::get_scale(&metadata_path)?;

        let elapsed = timestamp - self.first_timestamp;
        let elapsed_minutes = round3(elapsed.num_milliseconds() as f64 / 60_000.0);

        // --- 2. Segmentation & artifacts ---
        let segmentation = imaging::mask_segmenter(&nuc_mask, &poi_path)?;
        imaging::img_writer(&self.artifact_stem(key, "cyto"), &segmentation.cyto_image)?;
        imaging::img_writer(&self.artifact_stem(key, "nuc"), &segmentation.nuc_image)?;

        // --- 3. Fluorescence ratio ---
        let ratio = fluorescence_ratio(segmentation.nuc_sum, segmentation.cyto_sum);
        if ratio == Some(0.0) {
            return Ok(None);
        }

        // --- 4. Shape metrics ---
        let poi_label = imaging::img_labeler(&poi_mask);
        let poi_area = round3(imaging::area_measure(&poi_label) * scale);
        let poi_aspect_ratio = round3(imaging::aspect_ratio(&poi_label));
        let nuc_area = imaging::area_measure(&imaging::img_labeler(&nuc_mask)) * scale;

        Ok(Some(ResultRecord {
            elapsed_minutes: Some(elapsed_minutes),
            fluorescence_ratio: ratio,
            poi_aspect_ratio: Some(poi_aspect_ratio),
            poi_area: Some(poi_area),
            nuc_area: Some(nuc_area),
        }))
    }

    /// Artifact path stem, e.g. `Results/img/Position001_t03_cyto`.
    fn artifact_stem(&self, key: &FrameKey, kind: &str) -> PathBuf {
        self.config.img_dir().join(format!(
            "{}_t{}_{kind}",
            key.position,
            frame_token(key.frame_index, self.config.n_frames)
        ))
    }
}

/// Nuclear-to-cytoplasmic intensity ratio, rounded to 3 decimals. A zero
/// cytoplasm sum is an expected degenerate case and yields no value, never
/// an error.
pub fn fluorescence_ratio(nuc_sum: u64, cyto_sum: u64) -> Option<f64> {
    if cyto_sum == 0 {
        return None;
    }
    Some(round3(nuc_sum as f64 / cyto_sum as f64))
}
