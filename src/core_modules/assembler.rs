// THEORY:
// The `assembler` is the sequential half of the two-phase result protocol.
// It runs strictly after the worker pool's barrier, folds every per-frame
// record file into the final matrix in (position, frame) order, and consumes
// each file exactly once.
//
// Key architectural principles:
// 1.  **Post-barrier only**: the assembler deletes files as it reads them, so
//     it must never overlap the parallel phase — a pending write racing a
//     deletion would corrupt the one-slot-per-key protocol.
// 2.  **Fail loudly on missing slots**: a frame slot with no record file
//     means a worker never ran or died without writing. Emitting a short row
//     would silently violate the fixed row width, so the whole run aborts
//     instead.
// 3.  **Direct serialization**: records are parsed back into structured
//     values and re-emitted, so a row is in its final form the moment it is
//     written. There is no second formatting pass over the matrix file.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use tracing::info;

use crate::core_modules::error::AssemblyError;
use crate::core_modules::frame::{Position, record_filename};
use crate::core_modules::record::{ResultRecord, matrix_header};
use crate::pipeline::AnalysisConfig;

/// Folds all per-frame record files into `results.csv`: a header row, then
/// one row per Position of `ordinal` plus the 5 fields of every frame in
/// ascending frame order. Consumed record files are deleted. Returns the
/// matrix path.
pub fn assemble(config: &AnalysisConfig, positions: &[Position]) -> Result<PathBuf, AssemblyError> {
    let matrix_path = config.matrix_path();
    let mut writer = BufWriter::new(File::create(&matrix_path)?);
    writeln!(writer, "{}", matrix_header(config.n_frames))?;

    for (index, position) in positions.iter().enumerate() {
        let ordinal = index + 1;
        let mut row = Vec::with_capacity(1 + config.n_frames as usize);
        row.push(ordinal.to_string());

        for frame_index in 0..config.n_frames {
            let record_path = config
                .results_dir
                .join(record_filename(&position.name, frame_index, config.n_frames));

            let contents = fs::read_to_string(&record_path).map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    AssemblyError::MissingRecord {
                        position: position.name.clone(),
                        frame_index,
                        path: record_path.clone(),
                    }
                } else {
                    AssemblyError::Io(err)
                }
            })?;

            let record = ResultRecord::from_line(&contents, &record_path)?;
            fs::remove_file(&record_path)?;
            row.push(record.to_line());
        }

        writeln!(writer, "{}", row.join(","))?;
        info!("assembled row {ordinal} ({})", position.name);
    }

    writer.flush()?;
    info!("wrote {}", matrix_path.display());
    Ok(matrix_path)
}
