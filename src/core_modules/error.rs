// THEORY:
// Every layer of the engine has a distinct failure surface, and the error
// taxonomy mirrors the propagation policy rather than the module tree:
//
// 1.  **Service errors** (`MetadataError`, `ImagingError`): what the two
//     collaborator services can report for a single frame. These never travel
//     further than the `FrameAnalyzer` boundary.
// 2.  **Per-frame errors** (`AnalysisError`): the union the analyzer catches.
//     Catching one produces a null result record; it never aborts the batch.
// 3.  **Run-level errors** (`AssemblyError`, `PipelineError`): structural
//     inconsistencies and startup failures. These are fatal on purpose — a
//     missing record file at assembly time means a worker silently never ran,
//     and truncating the row would corrupt the matrix.

use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by the metadata service while reading a Position's
/// `*_Properties.xml` document.
#[derive(Error, Debug)]
pub enum MetadataError {
    /// The document holds fewer timestamp elements than the requested index.
    #[error("no timestamp for frame {frame_index} in {path}")]
    FrameOutOfRange { path: PathBuf, frame_index: u32 },

    /// The document carries no pixel-scale description.
    #[error("no micron scale in {path}")]
    MissingScale { path: PathBuf },

    /// An attribute was present but not interpretable.
    #[error("malformed metadata in {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("metadata io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by the imaging service.
#[derive(Error, Debug)]
pub enum ImagingError {
    /// The channel image was unreadable or corrupt.
    #[error("image decode error: {0}")]
    Decode(#[from] image::ImageError),

    /// The two channel images of a frame do not share dimensions.
    #[error("channel shape mismatch: mask is {mask_w}x{mask_h}, image is {img_w}x{img_h}")]
    ShapeMismatch {
        mask_w: u32,
        mask_h: u32,
        img_w: u32,
        img_h: u32,
    },
}

/// Anything the `FrameAnalyzer` can catch for a single frame. Contained at the
/// frame boundary: the analyzer converts these into a null result record.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Imaging(#[from] ImagingError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Consistency violations detected while folding record files into the matrix.
/// Always fatal for the run.
#[derive(Error, Debug)]
pub enum AssemblyError {
    /// A frame slot has no record file: its worker never ran or died silently.
    #[error("missing result record for {position} frame {frame_index} (expected {path})")]
    MissingRecord {
        position: String,
        frame_index: u32,
        path: PathBuf,
    },

    /// A record file exists but does not hold exactly the fixed field count.
    #[error("malformed result record at {path}: {field_count} fields")]
    MalformedRecord { path: PathBuf, field_count: usize },

    #[error("assembly io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal run-level failures surfaced by `AnalysisPipeline::run`.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The experiment root contains no `Position*` directories.
    #[error("no Position directories under {0}")]
    NoPositions(PathBuf),

    /// The experiment-wide first timestamp could not be established.
    #[error("cannot read first-frame timestamp: {0}")]
    FirstTimestamp(#[source] MetadataError),

    /// The worker pool shut down before all tasks were accepted.
    #[error("worker pool closed while tasks were pending")]
    PoolClosed,

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error("pipeline io error: {0}")]
    Io(#[from] std::io::Error),
}
