use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nucleo_vision::core_modules::input::prompt_matching;
use nucleo_vision::pipeline::{AnalysisConfig, AnalysisPipeline};

#[tokio::main]
async fn main() -> ExitCode {
    // --- 1. Logging Setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // --- 2. Interactive Configuration ---
    let config = match gather_config() {
        Ok(config) => config,
        Err(err) => {
            error!("could not read run configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    // --- 3. Full Analysis Run ---
    let run_start = Instant::now();
    let pipeline = AnalysisPipeline::new(config);

    match pipeline.run().await {
        Ok(summary) => {
            info!(
                "analyzed {} frames across {} positions -> {}",
                summary.n_frames_analyzed,
                summary.n_positions,
                summary.matrix_path.display()
            );
            info!(
                "runtime: {:.3} hours",
                run_start.elapsed().as_secs_f64() / 3600.0
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("analysis failed: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Collects and validates the operator's answers before any processing
/// starts. Every answer is pattern-checked and re-prompted until valid.
fn gather_config() -> io::Result<AnalysisConfig> {
    let experiment_root = prompt_matching(
        "Enter the full filepath to the experiment directory containing Position directories with TIFFs: ",
        ".+",
        "Invalid filepath",
    )?;

    let n_frames = prompt_matching("Number of frames in a sequence: ", r"\d+", "Not an integer!")?
        .parse::<u32>()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

    let nuc_channel =
        prompt_matching("Which channel has the NLS protein? 0/1/2/3: ", "[0-3]", "Not a channel!")?;
    let poi_channel =
        prompt_matching("Which channel has the POI? 0/1/2/3: ", "[0-3]", "Not a channel!")?;

    Ok(AnalysisConfig {
        experiment_root: PathBuf::from(experiment_root),
        n_frames,
        nuc_channel: format!("{:0>2}", nuc_channel),
        poi_channel: format!("{:0>2}", poi_channel),
        results_dir: PathBuf::from("Results"),
    })
}
