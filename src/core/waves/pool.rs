//! Bounded worker pool for wave decomposition.
//!
//! The decomposition is heavy vector DSP, so it runs on dedicated OS threads
//! kept off the async scheduler. Submission is fire-and-forget with a bounded
//! queue (overflow drops the newest job with a warning, never blocks the
//! request path). Completions are published on a process-wide channel
//! consumed by the event orchestrator; nothing flows back to the submitter.

use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::core::agents::SlotId;
use crate::core::workflow::models::MessageKind;

use super::decompose::{DecomposeError, DecomposeOutcome, decompose_audio_to_waves};

/// A decomposition job. Once submitted it is owned by the pool and is not
/// cancellable; its result always flows to the event orchestrator even if
/// the originating request has already returned.
#[derive(Debug, Clone)]
pub struct WaveJob {
    pub session_id: String,
    /// 1..=3 for turns, 4 for the summary clip.
    pub turn_index: u8,
    pub kind: MessageKind,
    /// Slot that produced the source clip (0 for the summary).
    pub source_slot_id: SlotId,
    pub agent_id: String,
    pub voice_profile: String,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    /// Artifact-relative form of `output_dir`, for wire payloads.
    pub output_rel_dir: String,
    /// One wave track is synthesised per entry.
    pub target_slots: Vec<SlotId>,
}

impl WaveJob {
    pub fn basename(&self) -> String {
        self.input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("clip")
            .to_string()
    }
}

/// One synthesised wave track, with both path forms for the renderer.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveTrack {
    pub wave_num: u8,
    pub target_slot_id: SlotId,
    pub path_abs: String,
    pub path_rel: String,
    pub freq_range_hz: (f32, f32),
    pub rmse: f32,
}

#[derive(Debug, Clone)]
pub struct WaveJobResult {
    pub job: WaveJob,
    pub tracks: Vec<WaveTrack>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: f64,
}

type WorkerTask = (
    WaveJob,
    oneshot::Sender<Result<DecomposeOutcome, DecomposeError>>,
);

type WorkerSender = mpsc::Sender<WorkerTask>;
type PoolReceiver = Arc<Mutex<mpsc::Receiver<WorkerSender>>>;

/// RAII guard holding a worker sender checked out from the pool. On drop it
/// returns the sender so the worker can be reused.
struct PooledWorkerSender {
    sender: Option<WorkerSender>,
    pool_tx: mpsc::Sender<WorkerSender>,
}

impl Drop for PooledWorkerSender {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = self.pool_tx.try_send(sender);
        }
    }
}

impl Deref for PooledWorkerSender {
    type Target = WorkerSender;
    fn deref(&self) -> &Self::Target {
        self.sender.as_ref().expect("sender is present until drop")
    }
}

pub struct WaveWorkerPool {
    job_tx: Option<mpsc::Sender<WaveJob>>,
}

impl WaveWorkerPool {
    /// A pool that drops every job (waves disabled or zero-capacity queue).
    pub fn disabled() -> Self {
        Self { job_tx: None }
    }

    /// Start worker threads and the dispatcher. Results are published on
    /// `results_tx`.
    pub fn start(
        config: &ServerConfig,
        results_tx: mpsc::UnboundedSender<WaveJobResult>,
    ) -> Self {
        if !config.waves_enabled {
            info!("Wave decomposition disabled (waves_enabled=false)");
            return Self::disabled();
        }
        if config.waves_queue_max_size == 0 {
            warn!("waves_queue_max_size=0: every decomposition job will be dropped");
            return Self::disabled();
        }

        // Never oversubscribe the machine: the DSP is pure CPU work.
        let max_workers = config.waves_max_workers.clamp(1, num_cpus::get().max(1));
        let job_timeout = Duration::from_secs_f64(config.waves_job_timeout_s);
        let processing_sr = config.waves_processing_sr;

        info!(
            "Starting WaveWorkerPool: workers={}, queue_size={}, timeout={:?}",
            max_workers, config.waves_queue_max_size, job_timeout
        );

        let (job_tx, mut job_rx) = mpsc::channel::<WaveJob>(config.waves_queue_max_size);
        let (pool_tx, pool_rx) = mpsc::channel::<WorkerSender>(max_workers);
        let pool_rx: PoolReceiver = Arc::new(Mutex::new(pool_rx));

        // Spawn a dedicated OS thread per worker; each registers its own
        // task sender into the checkout pool.
        for worker_id in 0..max_workers {
            let pool_tx = pool_tx.clone();
            std::thread::spawn(move || {
                let (task_tx, mut task_rx) = mpsc::channel::<WorkerTask>(1);
                if pool_tx.blocking_send(task_tx).is_err() {
                    return; // pool dropped before the worker came up
                }
                debug!("Wave worker {} started", worker_id);

                while let Some((job, result_tx)) = task_rx.blocking_recv() {
                    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        decompose_audio_to_waves(
                            &job.input_path,
                            &job.output_dir,
                            &job.target_slots,
                            processing_sr,
                        )
                    }));

                    let result = match outcome {
                        Ok(result) => result,
                        Err(panic_info) => {
                            let message = panic_info
                                .downcast_ref::<&str>()
                                .map(|s| s.to_string())
                                .or_else(|| panic_info.downcast_ref::<String>().cloned())
                                .unwrap_or_else(|| "unknown panic".to_string());
                            error!(
                                "Wave worker {} panicked (recovered): {}",
                                worker_id, message
                            );
                            Err(DecomposeError::Dsp(format!("worker panic: {message}")))
                        }
                    };

                    // The dispatcher may have timed out and gone away.
                    let _ = result_tx.send(result);
                }
                debug!("Wave worker {} stopped", worker_id);
            });
        }

        // Dispatcher: one supervision task per job applies the wall-clock
        // timeout and publishes the result.
        tokio::spawn(async move {
            while let Some(job) = job_rx.recv().await {
                let pool_tx = pool_tx.clone();
                let pool_rx = pool_rx.clone();
                let results_tx = results_tx.clone();
                tokio::spawn(async move {
                    let started = Instant::now();
                    let result =
                        run_job(job.clone(), pool_tx, pool_rx, job_timeout).await;
                    let duration_ms = started.elapsed().as_secs_f64() * 1_000.0;

                    let result = match result {
                        Ok(outcome) => {
                            info!(
                                "Decomposition complete: session={}, turn={}, file={}, rmse={:.4}, duration={:.0}ms",
                                job.session_id,
                                job.turn_index,
                                job.basename(),
                                outcome.rmse,
                                duration_ms
                            );
                            build_result(job, outcome, duration_ms)
                        }
                        Err(message) => {
                            warn!(
                                "Decomposition failed: session={}, turn={}, file={}, error={}",
                                job.session_id,
                                job.turn_index,
                                job.basename(),
                                message
                            );
                            WaveJobResult {
                                job,
                                tracks: Vec::new(),
                                success: false,
                                error: Some(message),
                                duration_ms,
                            }
                        }
                    };

                    let _ = results_tx.send(result);
                });
            }
        });

        Self {
            job_tx: Some(job_tx),
        }
    }

    /// Submit a job. Returns immediately; `false` means the job was dropped
    /// (queue full or pool disabled).
    pub fn submit(&self, job: WaveJob) -> bool {
        let Some(job_tx) = &self.job_tx else {
            debug!("Wave pool disabled, job dropped: {}", job.basename());
            return false;
        };
        match job_tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(
                    "Waves queue full, job dropped: session={}, turn={}, file={}",
                    job.session_id,
                    job.turn_index,
                    job.basename()
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!("Wave pool stopped, job dropped: {}", job.basename());
                false
            }
        }
    }
}

/// Check out a worker, hand it the job, and wait for completion under the
/// job timeout.
async fn run_job(
    job: WaveJob,
    pool_tx: mpsc::Sender<WorkerSender>,
    pool_rx: PoolReceiver,
    job_timeout: Duration,
) -> Result<DecomposeOutcome, String> {
    let sender = {
        let mut pool_rx = pool_rx.lock().await;
        match pool_rx.recv().await {
            Some(sender) => PooledWorkerSender {
                sender: Some(sender),
                pool_tx,
            },
            None => return Err("worker pool closed".to_string()),
        }
    };

    let (result_tx, result_rx) = oneshot::channel();
    sender
        .send((job, result_tx))
        .await
        .map_err(|_| "worker thread gone".to_string())?;

    match tokio::time::timeout(job_timeout, result_rx).await {
        Ok(Ok(Ok(outcome))) => Ok(outcome),
        Ok(Ok(Err(err))) => Err(err.to_string()),
        Ok(Err(_)) => Err("worker dropped the job".to_string()),
        Err(_) => Err(format!(
            "wave_timeout: exceeded {:.0}s",
            job_timeout.as_secs_f64()
        )),
    }
}

fn build_result(job: WaveJob, outcome: DecomposeOutcome, duration_ms: f64) -> WaveJobResult {
    let tracks = outcome
        .tracks
        .iter()
        .map(|track| {
            let file_name = track
                .path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            WaveTrack {
                wave_num: track.wave_num,
                target_slot_id: track.target_slot_id,
                path_abs: track.path.display().to_string(),
                path_rel: format!("{}/{file_name}", job.output_rel_dir),
                freq_range_hz: track.freq_range_hz,
                rmse: outcome.rmse,
            }
        })
        .collect();

    WaveJobResult {
        job,
        tracks,
        success: true,
        error: None,
        duration_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;
    use tempfile::tempdir;

    fn test_job(dir: &std::path::Path, targets: Vec<SlotId>) -> WaveJob {
        let input = dir.join("clip.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&input, spec).unwrap();
        for i in 0..4_000 {
            let t = i as f32 / 8_000.0;
            writer
                .write_sample(((2.0 * PI * 200.0 * t).sin() * 12_000.0) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();

        WaveJob {
            session_id: "test-session".to_string(),
            turn_index: 1,
            kind: MessageKind::Response,
            source_slot_id: 1,
            agent_id: "gpt-4o".to_string(),
            voice_profile: "calm_soothing".to_string(),
            input_path: input,
            output_dir: dir.join("waves"),
            output_rel_dir: "waves/sessions/test-session/turn_1".to_string(),
            target_slots: targets,
        }
    }

    #[tokio::test]
    async fn test_submit_and_receive_result() {
        let dir = tempdir().unwrap();
        let config = ServerConfig {
            waves_max_workers: 1,
            ..Default::default()
        };
        let (results_tx, mut results_rx) = mpsc::unbounded_channel();
        let pool = WaveWorkerPool::start(&config, results_tx);

        assert!(pool.submit(test_job(dir.path(), vec![1, 2])));

        let result = tokio::time::timeout(Duration::from_secs(30), results_rx.recv())
            .await
            .expect("result within timeout")
            .expect("channel open");
        assert!(result.success, "error: {:?}", result.error);
        assert_eq!(result.tracks.len(), 2);
        assert_eq!(result.tracks[0].target_slot_id, 1);
        assert_eq!(result.tracks[1].target_slot_id, 2);
        assert!(
            result.tracks[0]
                .path_rel
                .starts_with("waves/sessions/test-session/turn_1/")
        );
    }

    #[tokio::test]
    async fn test_zero_capacity_queue_drops_everything() {
        let dir = tempdir().unwrap();
        let config = ServerConfig {
            waves_queue_max_size: 0,
            ..Default::default()
        };
        let (results_tx, _results_rx) = mpsc::unbounded_channel();
        let pool = WaveWorkerPool::start(&config, results_tx);
        assert!(!pool.submit(test_job(dir.path(), vec![1, 2])));
    }

    #[tokio::test]
    async fn test_disabled_pool_drops_jobs() {
        let dir = tempdir().unwrap();
        let pool = WaveWorkerPool::disabled();
        assert!(!pool.submit(test_job(dir.path(), vec![1, 2])));
    }

    #[tokio::test]
    async fn test_missing_input_reports_failure() {
        let dir = tempdir().unwrap();
        let config = ServerConfig {
            waves_max_workers: 1,
            ..Default::default()
        };
        let (results_tx, mut results_rx) = mpsc::unbounded_channel();
        let pool = WaveWorkerPool::start(&config, results_tx);

        let mut job = test_job(dir.path(), vec![1, 2]);
        job.input_path = dir.path().join("missing.wav");
        assert!(pool.submit(job));

        let result = tokio::time::timeout(Duration::from_secs(10), results_rx.recv())
            .await
            .expect("result within timeout")
            .expect("channel open");
        assert!(!result.success);
        assert!(result.error.is_some());
        assert!(result.tracks.is_empty());
    }
}
