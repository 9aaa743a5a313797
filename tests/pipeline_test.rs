// End-to-end runs over a synthetic experiment tree: two Positions, two
// frames, both channels rendered as real 16-bit TIFFs and the metadata
// documents carrying FILETIME timestamps — the same shape a microscope
// export has, scaled down to a few pixels.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, TimeZone, Utc};
use image::{ImageBuffer, Luma};

use nucleo_vision::core_modules::error::{AssemblyError, PipelineError};
use nucleo_vision::pipeline::{AnalysisConfig, AnalysisPipeline};

type Gray16 = ImageBuffer<Luma<u16>, Vec<u16>>;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 3, 9, 14, 0, 0).unwrap()
}

/// Windows FILETIME attribute pair for a timestamp.
fn filetime_parts(when: DateTime<Utc>) -> (u64, u64) {
    let epoch = Utc.with_ymd_and_hms(1601, 1, 1, 0, 0, 0).unwrap();
    let ticks = (when - epoch).num_microseconds().unwrap() as u64 * 10;
    (ticks >> 32, ticks & 0xFFFF_FFFF)
}

fn write_properties(position_dir: &Path, position: &str, timestamps: &[DateTime<Utc>]) {
    let meta_dir = position_dir.join("MetaData");
    fs::create_dir_all(&meta_dir).unwrap();

    let mut document = String::from("<Properties>\n");
    document.push_str(
        r#"  <DimensionDescription DimID="1" NumberOfElements="12" Voxel="0.5" Unit="um"/>"#,
    );
    document.push('\n');
    for ts in timestamps {
        let (high, low) = filetime_parts(*ts);
        document.push_str(&format!(
            "  <TimeStamp HighInteger=\"{high}\" LowInteger=\"{low}\"/>\n"
        ));
    }
    document.push_str("</Properties>\n");

    fs::write(meta_dir.join(format!("{position}_Properties.xml")), document).unwrap();
}

/// Renders one frame's channel pair: the nucleus channel is a bright 4x4
/// square on a black 12x12 field, the POI channel holds intensity 2 on the
/// square and 1 elsewhere (nuc_sum 32, cyto_sum 128, ratio 0.25).
fn write_frame(position_dir: &Path, position: &str, frame_index: u32, channels: &[&str]) {
    let inside = |x: u32, y: u32| (4..8).contains(&x) && (4..8).contains(&y);

    for &channel in channels {
        let image = match channel {
            "01" => Gray16::from_fn(12, 12, |x, y| Luma([if inside(x, y) { 40_000 } else { 0 }])),
            _ => Gray16::from_fn(12, 12, |x, y| Luma([if inside(x, y) { 2 } else { 1 }])),
        };
        image
            .save(position_dir.join(format!("seq_{position}_t{frame_index:02}_ch{channel}.tif")))
            .unwrap();
    }
}

fn config(root: &Path, results_dir: PathBuf) -> AnalysisConfig {
    AnalysisConfig {
        experiment_root: root.to_path_buf(),
        n_frames: 2,
        nuc_channel: "01".to_string(),
        poi_channel: "00".to_string(),
        results_dir,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn full_run_assembles_fixed_width_matrix() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("Mark_and_Find_001");

    for (position, offset_secs) in [("Position001", 0), ("Position002", 30)] {
        let position_dir = root.join(position);
        fs::create_dir_all(&position_dir).unwrap();
        let t0 = base_time() + Duration::seconds(offset_secs);
        write_properties(&position_dir, position, &[t0, t0 + Duration::seconds(60)]);
        write_frame(&position_dir, position, 0, &["00", "01"]);
        write_frame(&position_dir, position, 1, &["00", "01"]);
    }

    let config = config(&root, dir.path().join("Results"));
    let summary = AnalysisPipeline::new(config.clone())
        .with_pool_size(2)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.n_positions, 2);
    assert_eq!(summary.n_frames_analyzed, 4);

    let matrix = fs::read_to_string(&summary.matrix_path).unwrap();
    let lines: Vec<&str> = matrix.lines().collect();
    assert_eq!(lines.len(), 3);

    // Header and every row carry 1 + 5 * n_frames fields.
    for line in &lines {
        assert_eq!(line.split(',').count(), 11, "line was {line}");
    }
    assert_eq!(lines[0], "Cell,t0,f0,ar0,ca0,na0,t1,f1,ar1,ca1,na1");

    // Deterministic synthetic inputs: ratio 0.25, areas 16 px * 0.5 um/px,
    // square regions. Position002 started 30 s after the experiment.
    assert_eq!(lines[1], "1,0.0,0.25,1.0,8.0,8.0,1.0,0.25,1.0,8.0,8.0");
    assert_eq!(lines[2], "2,0.5,0.25,1.0,8.0,8.0,1.5,0.25,1.0,8.0,8.0");

    // Elapsed minutes are non-decreasing along each row.
    for line in &lines[1..] {
        let fields: Vec<&str> = line.split(',').collect();
        let t0: f64 = fields[1].parse().unwrap();
        let t1: f64 = fields[6].parse().unwrap();
        assert!(t1 >= t0);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn record_files_are_consumed_and_artifacts_kept() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("exp");
    let position_dir = root.join("Position001");
    fs::create_dir_all(&position_dir).unwrap();

    write_properties(
        &position_dir,
        "Position001",
        &[base_time(), base_time() + Duration::seconds(60)],
    );
    write_frame(&position_dir, "Position001", 0, &["00", "01"]);
    write_frame(&position_dir, "Position001", 1, &["00", "01"]);

    let config = config(&root, dir.path().join("Results"));
    AnalysisPipeline::new(config.clone())
        .with_pool_size(1)
        .run()
        .await
        .unwrap();

    // The per-frame record files were consumed; only the matrix remains.
    let leftovers: Vec<_> = fs::read_dir(&config.results_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers, ["results.csv"]);

    // Segmentation artifacts persist per frame.
    for frame in ["t0", "t1"] {
        for kind in ["cyto", "nuc"] {
            let artifact = config.img_dir().join(format!("Position001_{frame}_{kind}.png"));
            assert!(artifact.exists(), "missing {}", artifact.display());
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_frame_fills_its_slot_with_nulls() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("exp");
    let position_dir = root.join("Position001");
    fs::create_dir_all(&position_dir).unwrap();

    write_properties(
        &position_dir,
        "Position001",
        &[base_time(), base_time() + Duration::seconds(60)],
    );
    write_frame(&position_dir, "Position001", 0, &["00", "01"]);
    // Frame 1 has only the nucleus channel: its key enumerates, analysis
    // fails on the missing POI image, and a null record fills the slot.
    write_frame(&position_dir, "Position001", 1, &["01"]);

    let config = config(&root, dir.path().join("Results"));
    let summary = AnalysisPipeline::new(config)
        .with_pool_size(2)
        .run()
        .await
        .unwrap();

    let matrix = fs::read_to_string(&summary.matrix_path).unwrap();
    let row = matrix.lines().nth(1).unwrap();
    assert_eq!(row, "1,0.0,0.25,1.0,8.0,8.0,,,,,");
    assert_eq!(row.split(',').count(), 11);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_frame_slot_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("exp");
    let position_dir = root.join("Position001");
    fs::create_dir_all(&position_dir).unwrap();

    // n_frames is 2 but only frame 0 exists on disk: no worker ever runs
    // for frame 1, so its slot is empty and assembly must fail loudly.
    write_properties(&position_dir, "Position001", &[base_time()]);
    write_frame(&position_dir, "Position001", 0, &["00", "01"]);

    let config = config(&root, dir.path().join("Results"));
    let err = AnalysisPipeline::new(config)
        .with_pool_size(1)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Assembly(AssemblyError::MissingRecord { frame_index: 1, .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_experiment_root_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("exp");
    fs::create_dir_all(&root).unwrap();

    let config = config(&root, dir.path().join("Results"));
    let err = AnalysisPipeline::new(config).run().await.unwrap_err();
    assert!(matches!(err, PipelineError::NoPositions(_)));
}
