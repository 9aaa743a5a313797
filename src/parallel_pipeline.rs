// THEORY:
// The `parallel_pipeline` module executes the per-frame analysis over an
// embarrassingly parallel task set. Frames share nothing: each task reads
// its own inputs and writes its own uniquely-named record file, so the pool
// needs no locks, no shared buffers, and no result channel — only a way to
// know that EVERY submitted task has finished.
//
// Key architectural principles:
// 1.  **Bounded fan-out**: a fixed number of workers (defaulting to
//     `cores - 2`, leaving headroom for the host) each own a task channel; a
//     dispatcher distributes frame keys round-robin. A hung frame stalls one
//     worker slot, never the pool.
// 2.  **The barrier**: submission hands back one acknowledgement per task,
//     and `run_to_completion` awaits them all before returning. The
//     assembler deletes record files as it consumes them, so it must not
//     start while any task could still be writing.
// 3.  **No in-process results**: workers acknowledge completion, nothing
//     more. The filesystem is the only channel between the phases, and a
//     per-frame failure has already been converted to a null record by the
//     time the acknowledgement fires.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::error;

use crate::core_modules::analyzer::FrameAnalyzer;
use crate::core_modules::error::PipelineError;
use crate::core_modules::frame::FrameKey;

/// One unit of work handed to the pool: the frame to analyze and the
/// acknowledgement fired when it is done (successfully or not).
pub struct FrameTask {
    pub key: FrameKey,
    pub done: oneshot::Sender<()>,
}

/// A bounded pool of analysis workers fed by a round-robin dispatcher.
pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<FrameTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(analyzer: Arc<FrameAnalyzer>, pool_size: usize) -> Self {
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<FrameTask>();
        let mut workers = Vec::with_capacity(pool_size);

        // Create a single dispatcher that distributes tasks to workers.
        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..pool_size)
            .map(|_| mpsc::unbounded_channel::<FrameTask>())
            .unzip();

        // Spawn dispatcher.
        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % pool_size;
            }
        });

        // Spawn workers. Analysis is blocking work (decode + filesystem), so
        // each worker runs its current frame on the blocking thread pool and
        // awaits it, keeping effective parallelism at `pool_size`.
        for mut worker_receiver in worker_receivers {
            let worker_analyzer = Arc::clone(&analyzer);

            let worker = tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    let analyzer = Arc::clone(&worker_analyzer);
                    let key = task.key.clone();

                    let outcome = tokio::task::spawn_blocking(move || analyzer.analyze(&key)).await;
                    match outcome {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            error!(
                                "could not write record for {}: {err}",
                                task.key.display_name()
                            );
                        }
                        Err(err) => {
                            error!("analysis of {} aborted: {err}", task.key.display_name());
                        }
                    }

                    let _ = task.done.send(());
                }
            });

            workers.push(worker);
        }

        Self {
            task_sender,
            workers,
        }
    }

    /// Submits every frame key to the pool and blocks until all of them have
    /// been acknowledged. This is the hard barrier between the parallel and
    /// sequential phases.
    pub async fn run_to_completion(&self, keys: Vec<FrameKey>) -> Result<(), PipelineError> {
        let mut acknowledgements = Vec::with_capacity(keys.len());

        for key in keys {
            let (done, ack) = oneshot::channel();
            self.task_sender
                .send(FrameTask { key, done })
                .map_err(|_| PipelineError::PoolClosed)?;
            acknowledgements.push(ack);
        }

        futures::future::join_all(acknowledgements).await;
        Ok(())
    }
}

/// Default pool size: leave two cores free for the host system.
pub fn default_pool_size() -> usize {
    let cpu_count = num_cpus::get();
    if cpu_count > 2 { cpu_count - 2 } else { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use std::path::Path;

    use crate::pipeline::AnalysisConfig;

    fn config(root: &Path, n_frames: u32) -> Arc<AnalysisConfig> {
        Arc::new(AnalysisConfig {
            experiment_root: root.to_path_buf(),
            n_frames,
            nuc_channel: "01".to_string(),
            poi_channel: "00".to_string(),
            results_dir: root.join("Results"),
        })
    }

    fn key(root: &Path, position: &str, frame_index: u32) -> FrameKey {
        FrameKey {
            prefix: root
                .join(position)
                .join(format!("seq_{position}_t{frame_index}")),
            position: position.to_string(),
            position_dir: root.join(position),
            frame_index,
        }
    }

    #[test]
    fn pool_size_leaves_headroom() {
        assert!(default_pool_size() >= 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn every_key_produces_exactly_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), 4);
        fs::create_dir_all(&config.results_dir).unwrap();

        // No images or metadata exist, so every frame fails analysis — the
        // pool must still leave one (null) record per key behind the barrier.
        let keys: Vec<FrameKey> = (0..4).map(|i| key(dir.path(), "Position001", i)).collect();

        let analyzer = Arc::new(FrameAnalyzer::new(
            Arc::clone(&config),
            Utc.with_ymd_and_hms(2018, 3, 9, 14, 0, 0).unwrap(),
        ));
        let pool = WorkerPool::new(analyzer, 2);
        pool.run_to_completion(keys.clone()).await.unwrap();

        for key in &keys {
            let record_path = key.record_path(&config.results_dir, config.n_frames);
            let contents = fs::read_to_string(&record_path).unwrap();
            assert_eq!(contents, ",,,,");
        }
        assert_eq!(fs::read_dir(&config.results_dir).unwrap().count(), 4);
    }
}
