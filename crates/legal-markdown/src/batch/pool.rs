use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info};

use crate::batch::job::{BatchJob, BatchJobResult};
use crate::error::LegalMarkdownError;
use crate::pipeline::{Pipeline, PipelineConfig, PipelineError};
use crate::steps::default_pipeline;

/// Builds one pipeline per worker.
pub type PipelineFactory = Arc<dyn Fn() -> Result<Pipeline, PipelineError> + Send + Sync>;

/// Worker pool over crossbeam channels. Every worker owns its own
/// pipeline, so metadata and field tracking never cross documents.
pub struct BatchProcessor {
    job_sender: Sender<BatchJob>,
    result_receiver: Receiver<BatchJobResult>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl BatchProcessor {
    /// Starts `worker_count` workers. The factory is tried once up front
    /// so a broken pipeline definition fails here, not inside a worker.
    pub fn new(worker_count: usize, factory: PipelineFactory) -> Result<Self, LegalMarkdownError> {
        if worker_count == 0 {
            return Err(LegalMarkdownError::Batch("worker_count must be > 0".to_string()));
        }
        factory()?;

        let (job_sender, job_receiver) = bounded::<BatchJob>(worker_count * 2);
        let (result_sender, result_receiver) = bounded::<BatchJobResult>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_factory = Arc::clone(&factory);

            let handle = thread::Builder::new()
                .name(format!("batch-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, job_rx, result_tx, shutdown_flag, worker_factory))
                .map_err(|e| LegalMarkdownError::Batch(format!("Failed to spawn worker: {}", e)))?;
            workers.push(handle);
        }

        info!("Started {} batch workers", worker_count);

        Ok(Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
        })
    }

    /// Workers running the built-in pipeline.
    pub fn with_default_pipeline(
        config: PipelineConfig,
        worker_count: usize,
    ) -> Result<Self, LegalMarkdownError> {
        let factory: PipelineFactory = Arc::new(move || default_pipeline(config.clone()));
        Self::new(worker_count, factory)
    }

    pub fn submit(&self, job: BatchJob) -> Result<(), LegalMarkdownError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(LegalMarkdownError::Batch("batch processor is shut down".to_string()));
        }
        self.job_sender
            .send(job)
            .map_err(|_| LegalMarkdownError::Batch("job channel closed".to_string()))
    }

    pub fn try_recv_result(&self) -> Option<BatchJobResult> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<BatchJobResult> {
        self.result_receiver.recv().ok()
    }

    /// Runs every job and returns the results in submission order.
    pub fn process_all(self, jobs: Vec<BatchJob>) -> Vec<BatchJobResult> {
        let order: HashMap<String, usize> = jobs
            .iter()
            .enumerate()
            .map(|(i, job)| (job.id.clone(), i))
            .collect();
        let expected = jobs.len();

        // feed from another thread so a full result channel cannot stall submission
        let sender = self.job_sender.clone();
        let feeder = thread::spawn(move || {
            for job in jobs {
                if sender.send(job).is_err() {
                    break;
                }
            }
        });

        let mut results = Vec::with_capacity(expected);
        while results.len() < expected {
            match self.result_receiver.recv() {
                Ok(result) => results.push(result),
                Err(_) => break,
            }
        }
        if feeder.join().is_err() {
            error!("Batch feeder thread panicked");
        }
        self.wait();

        results.sort_by_key(|r| order.get(&r.id).copied().unwrap_or(usize::MAX));
        results
    }

    pub fn shutdown(&self) {
        info!("Shutting down batch processor...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    pub fn wait(self) {
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All batch workers have stopped");
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<BatchJob>,
    result_sender: Sender<BatchJobResult>,
    shutdown: Arc<AtomicBool>,
    factory: PipelineFactory,
) {
    debug!("Worker {} started", worker_id);

    let pipeline = match factory() {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Worker {} could not build its pipeline: {}", worker_id, e);
            return;
        }
    };

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(job) => {
                debug!("Worker {} processing job {}", worker_id, job.id);
                let result = pipeline.execute(&job.content, job.metadata, job.options);
                let outcome = BatchJobResult { id: job.id, result };

                if let Err(e) = result_sender.send(outcome) {
                    error!("Worker {} failed to send result: {}", worker_id, e);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
