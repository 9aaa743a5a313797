// THEORY:
// The `frame` module defines the canonical identity of one unit of work. A
// `FrameKey` is a "dumb" data container: it names one (Position, frame index)
// pair and knows how to derive every path the analyzer needs from that
// identity. It performs no I/O and holds no pixel data.
//
// Key architectural principles:
// 1.  **Channel-agnostic**: the key is the image path prefix with the channel
//     suffix stripped, so both channel files of a frame reduce to the same
//     key and the enumerator can deduplicate on it.
// 2.  **Self-sufficient**: the two channel paths, the metadata document path,
//     and the result record path are all pure functions of the key plus
//     configuration. Workers share nothing else.
// 3.  **Partitioned output space**: every key owns exactly one uniquely-named
//     record slot, which is what makes the parallel phase lock-free.

use std::path::{Path, PathBuf};

/// One imaged field of the experiment, tracked across all of its frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    /// Directory name, e.g. `Position001`. Ascending name order defines the
    /// 1-based ordinal reported in the matrix.
    pub name: String,
    /// The Position's directory under the experiment root.
    pub dir: PathBuf,
}

impl Position {
    /// Path of this Position's metadata document.
    pub fn metadata_path(&self) -> PathBuf {
        properties_path(&self.dir, &self.name)
    }
}

/// Identity of one frame of one Position, shared by all of its channel files.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FrameKey {
    /// Full image path prefix with the `_ch<CC>.tif` suffix stripped, e.g.
    /// `<root>/Position001/Mark_and_Find_001_Position001_t03`.
    pub prefix: PathBuf,
    /// The owning Position's directory name, e.g. `Position001`.
    pub position: String,
    /// The owning Position's directory.
    pub position_dir: PathBuf,
    /// Frame index within the sequence, parsed from the `_t<NN>` token.
    pub frame_index: u32,
}

impl FrameKey {
    /// Path of one channel's image file for this frame. `channel` is the
    /// two-digit selector, e.g. `"01"`.
    pub fn channel_path(&self, channel: &str) -> PathBuf {
        let mut name = self.prefix.as_os_str().to_os_string();
        name.push(format!("_ch{channel}.tif"));
        PathBuf::from(name)
    }

    /// Path of the Position's metadata document.
    pub fn metadata_path(&self) -> PathBuf {
        properties_path(&self.position_dir, &self.position)
    }

    /// Path of this frame's result record file inside `results_dir`. The
    /// frame index is zero-padded to the width of `n_frames - 1` so the
    /// writer and the assembler always agree on the name.
    pub fn record_path(&self, results_dir: &Path, n_frames: u32) -> PathBuf {
        results_dir.join(record_filename(
            &self.position,
            self.frame_index,
            n_frames,
        ))
    }

    /// Short human-readable name used in logs, e.g. `Position001_t03`.
    pub fn display_name(&self) -> String {
        format!("{}_t{}", self.position, self.frame_index)
    }
}

/// Record file name for a (position, frame) slot. Shared by the analyzer
/// (writer) and the assembler (reader) so the slot naming cannot drift.
pub fn record_filename(position: &str, frame_index: u32, n_frames: u32) -> String {
    format!("{position}_t{}.csv", frame_token(frame_index, n_frames))
}

/// Zero-padded frame token, e.g. `03` for frame 3 of a 71-frame sequence.
/// The width is the digit count of the last index of the sequence, so every
/// slot name of a run sorts and aligns identically.
pub fn frame_token(frame_index: u32, n_frames: u32) -> String {
    let width = n_frames.saturating_sub(1).to_string().len();
    format!("{frame_index:0width$}")
}

/// Path of a Position's `MetaData/<Position>_Properties.xml` document.
pub fn properties_path(position_dir: &Path, position: &str) -> PathBuf {
    position_dir
        .join("MetaData")
        .join(format!("{position}_Properties.xml"))
}
