// THEORY:
// The `enumerator` module is the discovery stage. It owns two jobs: finding
// the Position directories of an experiment (in stable, ascending name order
// — their 1-based rank in that order is the ordinal the matrix reports), and
// reducing the channel image files under the experiment root into the
// deduplicated set of frame keys the worker pool fans out over.
//
// Key architectural principles:
// 1.  **Channel-agnostic reduction**: every `*_ch<CC>.tif` maps to its frame's
//     key by stripping the channel suffix, so a frame with both channels
//     present contributes exactly one unit of work.
// 2.  **Attempt, don't judge**: a key whose channel pair turns out to be
//     incomplete is still enumerated. The analyzer is the layer that fails
//     gracefully per frame; the enumerator would otherwise have to duplicate
//     its checks.
// 3.  **Deterministic output**: keys are collected through an ordered set, so
//     repeated runs enumerate identically and logs line up between runs. The
//     pool itself does not rely on any ordering.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;
use walkdir::WalkDir;

use crate::core_modules::frame::{FrameKey, Position};

static CHANNEL_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_ch\d+\.tif$").expect("channel suffix pattern is valid"));

static FRAME_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_t(\d+)$").expect("frame token pattern is valid"));

/// Discovers the experiment's Position directories, sorted by name. The
/// returned order defines each Position's 1-based ordinal in the final
/// matrix.
pub fn discover_positions(experiment_root: &Path) -> io::Result<Vec<Position>> {
    let mut positions = Vec::new();

    for entry in experiment_root.read_dir()? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("Position") {
            positions.push(Position {
                name,
                dir: entry.path(),
            });
        }
    }

    positions.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(positions)
}

/// Walks the experiment tree and reduces every channel TIFF into the
/// deduplicated, sorted set of frame keys.
pub fn enumerate_frames(experiment_root: &Path) -> Vec<FrameKey> {
    let mut prefixes: BTreeSet<PathBuf> = BTreeSet::new();

    for entry in WalkDir::new(experiment_root)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if !file_name.ends_with(".tif") {
            continue;
        }

        let stripped = CHANNEL_SUFFIX_RE.replace(&file_name, "").into_owned();
        let prefix = match entry.path().parent() {
            Some(parent) => parent.join(stripped),
            None => continue,
        };
        prefixes.insert(prefix);
    }

    prefixes
        .into_iter()
        .filter_map(|prefix| {
            let key = frame_key_from_prefix(&prefix);
            if key.is_none() {
                warn!("skipping {}: no _t<NN> frame token", prefix.display());
            }
            key
        })
        .collect()
}

/// Parses a channel-stripped path prefix into a frame key. `None` when the
/// file name carries no frame token.
fn frame_key_from_prefix(prefix: &Path) -> Option<FrameKey> {
    let stem = prefix.file_name()?.to_string_lossy();
    let capture = FRAME_TOKEN_RE.captures(&stem)?;
    let frame_index: u32 = capture[1].parse().ok()?;

    let position_dir = prefix.parent()?.to_path_buf();
    let position = position_dir.file_name()?.to_string_lossy().into_owned();

    Some(FrameKey {
        prefix: prefix.to_path_buf(),
        position,
        position_dir,
        frame_index,
    })
}
