// THEORY:
// The `pipeline` module is the final, top-level API for the entire analysis
// engine. It encapsulates the full run — discovery, fan-out, assembly — into
// a single, easy-to-use interface: build an `AnalysisConfig`, construct an
// `AnalysisPipeline`, call `run`.
//
// The run is a strict two-phase protocol:
// 1.  **Parallel produce**: every enumerated frame key is analyzed by the
//     worker pool, each task leaving exactly one record file behind. The
//     pool's barrier guarantees nothing is still writing when it returns.
// 2.  **Sequential coalesce**: the assembler folds every record file into
//     the final matrix in (position, frame) order and deletes the
//     intermediates.
//
// Everything the workers share — the configuration and the experiment-wide
// first-frame timestamp — is resolved here, once, before the pool starts,
// and is immutable from then on.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::core_modules::analyzer::FrameAnalyzer;
use crate::core_modules::assembler;
use crate::core_modules::enumerator;
use crate::core_modules::error::PipelineError;
use crate::core_modules::metadata;
use crate::parallel_pipeline::{WorkerPool, default_pool_size};

/// Configuration for one analysis run, allowing for tunable behavior.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Experiment root holding the `Position*` directories.
    pub experiment_root: PathBuf,
    /// Number of frames in every Position's sequence.
    pub n_frames: u32,
    /// Two-digit selector of the nucleus-marker (NLS) channel, e.g. `"01"`.
    pub nuc_channel: String,
    /// Two-digit selector of the protein-of-interest channel, e.g. `"00"`.
    pub poi_channel: String,
    /// Directory receiving record files, artifacts and the final matrix.
    pub results_dir: PathBuf,
}

impl AnalysisConfig {
    /// Directory receiving segmentation image artifacts.
    pub fn img_dir(&self) -> PathBuf {
        self.results_dir.join("img")
    }

    /// Path of the final matrix file.
    pub fn matrix_path(&self) -> PathBuf {
        self.results_dir.join("results.csv")
    }
}

/// What a completed run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub n_positions: usize,
    pub n_frames_analyzed: usize,
    pub matrix_path: PathBuf,
}

/// The main, top-level struct for the analysis engine.
pub struct AnalysisPipeline {
    config: Arc<AnalysisConfig>,
    pool_size: usize,
}

impl AnalysisPipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config: Arc::new(config),
            pool_size: default_pool_size(),
        }
    }

    /// Overrides the worker pool size (mainly for tests and benchmarks).
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    /// Runs the full two-phase analysis and returns what it produced.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        // --- 1. Position discovery ---
        let positions = enumerator::discover_positions(&self.config.experiment_root)?;
        if positions.is_empty() {
            return Err(PipelineError::NoPositions(
                self.config.experiment_root.clone(),
            ));
        }
        info!(
            "data location: {} ({} positions)",
            self.config.experiment_root.display(),
            positions.len()
        );

        // --- 2. First-frame timestamp ---
        // Captured once, shared read-only by every worker.
        let first_timestamp = metadata::get_time(&positions[0].metadata_path(), 0)
            .map_err(PipelineError::FirstTimestamp)?;

        // --- 3. Output directories ---
        fs::create_dir_all(&self.config.results_dir)?;
        fs::create_dir_all(self.config.img_dir())?;

        // --- 4. Frame enumeration ---
        let keys = enumerator::enumerate_frames(&self.config.experiment_root);
        let n_frames_analyzed = keys.len();
        info!(
            "enumerated {n_frames_analyzed} frame keys, analyzing on {} workers",
            self.pool_size
        );

        // --- 5. Parallel produce ---
        let analyzer = Arc::new(FrameAnalyzer::new(
            Arc::clone(&self.config),
            first_timestamp,
        ));
        let pool = WorkerPool::new(analyzer, self.pool_size);
        pool.run_to_completion(keys).await?;

        // --- 6. Sequential coalesce (strictly post-barrier) ---
        let matrix_path = assembler::assemble(&self.config, &positions)?;

        Ok(RunSummary {
            n_positions: positions.len(),
            n_frames_analyzed,
            matrix_path,
        })
    }
}
