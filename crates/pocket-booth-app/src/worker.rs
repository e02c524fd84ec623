//! Background upload worker.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use pocket_booth_config::UploadConfig;
use pocket_booth_core::StripId;
use pocket_booth_upload::{UploadClient, UploadError, UploadReceipt};
use tracing::{info, warn};

/// One queued upload.
#[derive(Debug, Clone)]
pub(crate) struct UploadJob {
    pub strip: StripId,
    pub filename: String,
    pub jpeg: Vec<u8>,
    pub config: UploadConfig,
    pub key: String,
}

/// Result of one upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Strip the payload belongs to.
    pub strip: StripId,
    /// Remote file name.
    pub filename: String,
    /// Receipt or failure.
    pub result: Result<UploadReceipt, UploadError>,
}

enum WorkerCommand {
    Upload(Box<UploadJob>),
    Shutdown,
}

/// Owns the upload thread and its channels.
pub(crate) struct UploadWorker {
    command_tx: Sender<WorkerCommand>,
    outcome_rx: Receiver<UploadOutcome>,
    worker_join: Option<JoinHandle<()>>,
    in_flight: usize,
}

impl UploadWorker {
    pub(crate) fn spawn(client: UploadClient) -> std::io::Result<Self> {
        let (command_tx, command_rx) = mpsc::channel::<WorkerCommand>();
        let (outcome_tx, outcome_rx) = mpsc::channel::<UploadOutcome>();

        let worker_join = std::thread::Builder::new()
            .name("pocket-booth-upload-worker".to_string())
            .spawn(move || {
                while let Ok(command) = command_rx.recv() {
                    let job = match command {
                        WorkerCommand::Upload(job) => job,
                        WorkerCommand::Shutdown => break,
                    };

                    let result =
                        client.upload(&job.config, Some(&job.key), &job.jpeg, &job.filename);
                    if let Err(error) = &result {
                        warn!(
                            strip = %job.strip,
                            filename = %job.filename,
                            %error,
                            "upload failed; strip kept locally"
                        );
                    }
                    let outcome = UploadOutcome {
                        strip: job.strip,
                        filename: job.filename,
                        result,
                    };
                    if outcome_tx.send(outcome).is_err() {
                        break;
                    }
                }
            })?;

        info!("upload worker spawned");
        Ok(Self {
            command_tx,
            outcome_rx,
            worker_join: Some(worker_join),
            in_flight: 0,
        })
    }

    pub(crate) fn submit(&mut self, job: UploadJob) -> Result<(), UploadError> {
        self.command_tx
            .send(WorkerCommand::Upload(Box::new(job)))
            .map_err(|_| UploadError::Network("upload worker has stopped".to_string()))?;
        self.in_flight += 1;
        Ok(())
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Collects finished outcomes without blocking.
    pub(crate) fn poll(&mut self) -> Vec<UploadOutcome> {
        let outcomes: Vec<_> = self.outcome_rx.try_iter().collect();
        self.in_flight = self.in_flight.saturating_sub(outcomes.len());
        outcomes
    }

    /// Blocks until every submitted job finished or `timeout` elapses.
    pub(crate) fn wait(&mut self, timeout: Duration) -> Vec<UploadOutcome> {
        let deadline = Instant::now() + timeout;
        let mut outcomes = Vec::new();
        while self.in_flight > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.outcome_rx.recv_timeout(remaining) {
                Ok(outcome) => {
                    self.in_flight -= 1;
                    outcomes.push(outcome);
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(pending = self.in_flight, "timed out waiting for uploads");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.in_flight = 0;
                    break;
                }
            }
        }
        outcomes
    }

    fn shutdown(&mut self) {
        if let Some(worker_join) = self.worker_join.take() {
            let _ = self.command_tx.send(WorkerCommand::Shutdown);
            let _ = worker_join.join();
            info!("upload worker joined");
        }
    }
}

impl Drop for UploadWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
