use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info};

use crate::error::WorkerError;
use crate::pipeline::{JobHandler, PipelineError};
use crate::worker::job::{Job, JobResult};

/// Fixed set of worker threads running a shared [`JobHandler`].
///
/// The job channel holds at most `worker_count` jobs, which together with the
/// caller keeping at most that many jobs in flight bounds the prefetch.
pub struct WorkerPool {
    job_sender: Sender<Job>,
    result_receiver: Receiver<JobResult>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    worker_count: usize,
}

impl WorkerPool {
    pub fn new(handler: Arc<dyn JobHandler>, worker_count: usize) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count must be greater than 0".to_string(),
            ));
        }

        let (job_sender, job_receiver) = bounded::<Job>(worker_count);
        let (result_sender, result_receiver) = bounded::<JobResult>(worker_count);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_handler = Arc::clone(&handler);

            let handle = thread::Builder::new()
                .name(format!("levelcheck-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(worker_id, job_rx, result_tx, shutdown_flag, worker_handler);
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
            worker_count,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn submit(&self, job: Job) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.job_sender
            .send(job)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn try_recv_result(&self) -> Option<JobResult> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<JobResult> {
        self.result_receiver.recv_timeout(timeout).ok()
    }

    /// Stops accepting new jobs. Jobs already queued still run.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Waits for every worker to exit after the queued jobs have drained.
    pub fn wait(self) {
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<Job>,
    result_sender: Sender<JobResult>,
    shutdown: Arc<AtomicBool>,
    handler: Arc<dyn JobHandler>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(job) => {
                debug!("Worker {} processing job {}", worker_id, job.job_id);

                let started = Instant::now();
                let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(job.job_id)))
                    .unwrap_or_else(|payload| {
                        let message = panic_message(payload.as_ref());
                        error!(
                            "Worker {} caught a panic in job {}: {}",
                            worker_id, job.job_id, message
                        );
                        Err(PipelineError::Panicked(message))
                    });
                let result = JobResult {
                    ticket: job.ticket,
                    job_id: job.job_id,
                    outcome,
                    elapsed: started.elapsed(),
                };

                if let Err(e) = result_sender.send(result) {
                    error!("Worker {} failed to send result: {}", worker_id, e);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if shutdown.load(Ordering::Relaxed) && job_receiver.is_empty() {
                    debug!("Worker {} received shutdown signal", worker_id);
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobId;
    use crate::pipeline::{JobOutcome, PipelineError};
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_worker_pool_creation() {
        let handler: Arc<dyn JobHandler> =
            Arc::new(|_id: JobId| -> Result<JobOutcome, PipelineError> { Ok(JobOutcome::Checked) });
        let pool = WorkerPool::new(handler, 2).unwrap();

        assert!(!pool.is_shutdown());
        assert_eq!(pool.worker_count(), 2);

        pool.shutdown();
        assert!(pool.is_shutdown());
        assert!(pool.submit(Job::new(1, JobId::new(1))).is_err());

        pool.wait();
    }

    #[test]
    fn test_zero_workers_rejected() {
        let handler: Arc<dyn JobHandler> =
            Arc::new(|_id: JobId| -> Result<JobOutcome, PipelineError> { Ok(JobOutcome::Checked) });
        assert!(matches!(
            WorkerPool::new(handler, 0),
            Err(WorkerError::SpawnFailed(_))
        ));
    }

    #[test]
    fn test_results_carry_tickets_and_outcomes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler: Arc<dyn JobHandler> =
            Arc::new(move |id: JobId| -> Result<JobOutcome, PipelineError> {
                counter.fetch_add(1, Ordering::SeqCst);
                if id.get() % 2 == 0 {
                    Ok(JobOutcome::Checked)
                } else {
                    Err(PipelineError::BadMessage(id.to_string()))
                }
            });
        let pool = WorkerPool::new(handler, 2).unwrap();

        let mut tickets = HashSet::new();
        for i in 0..4u64 {
            pool.submit(Job::new(100 + i, JobId::new(i as i64))).unwrap();
            let result = pool.recv_result_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(result.is_success(), result.job_id.get() % 2 == 0);
            tickets.insert(result.ticket);
        }

        assert_eq!(tickets, HashSet::from([100, 101, 102, 103]));
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_panicking_handler_reports_failure_and_worker_survives() {
        let handler: Arc<dyn JobHandler> =
            Arc::new(|id: JobId| -> Result<JobOutcome, PipelineError> {
                if id.get() == 1 {
                    panic!("handler blew up on {}", id);
                }
                Ok(JobOutcome::Checked)
            });
        let pool = WorkerPool::new(handler, 1).unwrap();

        pool.submit(Job::new(1, JobId::new(1))).unwrap();
        let result = pool.recv_result_timeout(Duration::from_secs(5)).unwrap();
        match result.outcome {
            Err(PipelineError::Panicked(message)) => assert!(message.contains("blew up on 1")),
            other => panic!("unexpected outcome: {:?}", other),
        }

        pool.submit(Job::new(2, JobId::new(2))).unwrap();
        let result = pool.recv_result_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result.ticket, 2);
        assert!(result.is_success());

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_queued_jobs_drain_after_shutdown() {
        let handler: Arc<dyn JobHandler> = Arc::new(|_id: JobId| -> Result<JobOutcome, PipelineError> {
            std::thread::sleep(Duration::from_millis(50));
            Ok(JobOutcome::Checked)
        });
        let pool = WorkerPool::new(handler, 1).unwrap();

        pool.submit(Job::new(1, JobId::new(1))).unwrap();
        pool.shutdown();

        let result = pool.recv_result_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result.ticket, 1);
        pool.wait();
    }
}
