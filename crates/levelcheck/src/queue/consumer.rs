use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::error::WorkerError;
use crate::job::JobId;
use crate::pipeline::JobHandler;
use crate::queue::{BrokerError, Delivery, QueueChannel, QueueConnector};
use crate::worker::{Job, JobResult, WorkerPool};

const DRAIN_POLL: Duration = Duration::from_millis(100);
const BACKOFF_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub queue: String,
    pub dead_letter_queue: String,
    /// Worker threads, and the most deliveries held unsettled at once.
    pub worker_count: usize,
    pub reconnect_backoff: Duration,
    pub receive_timeout: Duration,
}

impl ConsumerSettings {
    pub fn new(queue: impl Into<String>) -> Self {
        let queue = queue.into();
        Self {
            dead_letter_queue: format!("{}.dead", queue),
            queue,
            worker_count: 1,
            reconnect_backoff: Duration::from_secs(1),
            receive_timeout: Duration::from_secs(1),
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            queue: config.name.clone(),
            dead_letter_queue: config.dead_letter_queue(),
            worker_count: config.worker_count,
            reconnect_backoff: Duration::from_millis(config.reconnect_backoff_ms),
            receive_timeout: Duration::from_millis(config.receive_timeout_ms),
        }
    }
}

/// Counters reported when the consumer stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub acked: u64,
    pub requeued: u64,
    pub dead_lettered: u64,
    /// Results whose delivery belonged to a closed connection.
    pub stale: u64,
    pub connections: u64,
    pub connect_failures: u64,
}

/// Long-running queue consumer.
///
/// Each delivery is decoded to a [`JobId`] and handed to a [`WorkerPool`].
/// When the handler finishes, the delivery is settled on the connection that
/// received it:
///
/// - success: acknowledged
/// - transient failure: requeued for another attempt
/// - permanent failure: moved to the dead-letter queue
///
/// Bodies that do not decode to a job id are dead-lettered without reaching
/// the handler. A lost connection is reopened after `reconnect_backoff`;
/// anything it had not settled is redelivered by the broker.
pub struct Consumer {
    connector: Arc<dyn QueueConnector>,
    settings: ConsumerSettings,
    shutdown: Arc<AtomicBool>,
}

impl Consumer {
    pub fn new(connector: Arc<dyn QueueConnector>, settings: ConsumerSettings) -> Self {
        Self {
            connector,
            settings,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops [`Consumer::run`] when set.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn settings(&self) -> &ConsumerSettings {
        &self.settings
    }

    /// Consumes until the shutdown flag is set, then finishes the jobs already
    /// handed to workers and settles them before returning.
    pub fn run(&self, handler: Arc<dyn JobHandler>) -> Result<ConsumerStats, WorkerError> {
        let pool = WorkerPool::new(handler, self.settings.worker_count)?;
        let mut state = LoopState::new(&self.settings);

        info!(
            "Consuming '{}' from {} with {} worker(s)",
            self.settings.queue,
            self.connector.describe(),
            self.settings.worker_count
        );

        while !self.shutdown.load(Ordering::SeqCst) {
            while let Some(result) = pool.try_recv_result() {
                state.settle(result);
            }

            if state.channel.is_none() {
                match self.open_channel() {
                    Ok(channel) => {
                        state.stats.connections += 1;
                        state.channel = Some(channel);
                    }
                    Err(e) => {
                        state.stats.connect_failures += 1;
                        warn!(
                            "Broker connection failed, retrying in {:?}: {}",
                            self.settings.reconnect_backoff, e
                        );
                        self.backoff();
                        continue;
                    }
                }
            }

            if state.in_flight.len() >= self.settings.worker_count {
                if let Some(result) = pool.recv_result_timeout(self.settings.receive_timeout) {
                    state.settle(result);
                }
                continue;
            }

            let Some(channel) = state.channel.as_mut() else {
                continue;
            };

            match channel.receive(&self.settings.queue, self.settings.receive_timeout) {
                Ok(Some(delivery)) => {
                    state.stats.received += 1;
                    state.dispatch(delivery, &pool)?;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Lost broker connection: {}", e);
                    state.channel = None;
                    self.backoff();
                }
            }
        }

        info!(
            "Shutdown requested; waiting for {} in-flight job(s)",
            state.in_flight.len()
        );
        pool.shutdown();

        while !state.in_flight.is_empty() {
            if let Some(result) = pool.recv_result_timeout(DRAIN_POLL) {
                state.settle(result);
            }
        }

        pool.wait();

        let stats = state.stats.clone();
        info!(
            "Consumer stopped: {} received, {} acked, {} requeued, {} dead-lettered",
            stats.received, stats.acked, stats.requeued, stats.dead_lettered
        );
        Ok(stats)
    }

    fn open_channel(&self) -> Result<Box<dyn QueueChannel>, BrokerError> {
        let mut channel = self.connector.connect()?;
        channel.declare(&self.settings.queue)?;
        channel.declare(&self.settings.dead_letter_queue)?;
        channel.recover(&self.settings.queue)?;
        info!(
            "Connected to {} (generation {})",
            self.connector.describe(),
            channel.generation()
        );
        Ok(channel)
    }

    fn backoff(&self) {
        let until = Instant::now() + self.settings.reconnect_backoff;
        while Instant::now() < until && !self.shutdown.load(Ordering::SeqCst) {
            thread::sleep(BACKOFF_POLL.min(self.settings.reconnect_backoff));
        }
    }
}

enum Settlement {
    Ack,
    Requeue,
    DeadLetter,
}

struct LoopState<'a> {
    settings: &'a ConsumerSettings,
    channel: Option<Box<dyn QueueChannel>>,
    in_flight: HashMap<u64, Delivery>,
    next_ticket: u64,
    stats: ConsumerStats,
}

impl<'a> LoopState<'a> {
    fn new(settings: &'a ConsumerSettings) -> Self {
        Self {
            settings,
            channel: None,
            in_flight: HashMap::new(),
            next_ticket: 0,
            stats: ConsumerStats::default(),
        }
    }

    fn dispatch(&mut self, delivery: Delivery, pool: &WorkerPool) -> Result<(), WorkerError> {
        let job_id = match delivery.body.trim().parse::<JobId>() {
            Ok(id) => id,
            Err(e) => {
                warn!("Dead-lettering undecodable message {:?}: {}", delivery.body, e);
                self.apply(&delivery, Settlement::DeadLetter);
                return Ok(());
            }
        };

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        debug!("Dispatching job {} (delivery {})", job_id, delivery.tag);
        self.in_flight.insert(ticket, delivery);
        pool.submit(Job::new(ticket, job_id))
    }

    fn settle(&mut self, result: JobResult) {
        let Some(delivery) = self.in_flight.remove(&result.ticket) else {
            warn!("Result for unknown ticket {}", result.ticket);
            return;
        };

        let settlement = match &result.outcome {
            Ok(outcome) => {
                info!(
                    "Job {} finished ({:?}) in {:?}",
                    result.job_id, outcome, result.elapsed
                );
                Settlement::Ack
            }
            Err(e) if e.is_transient() => {
                warn!("Job {} hit a transient error, requeueing: {}", result.job_id, e);
                Settlement::Requeue
            }
            Err(e) => {
                error!("Job {} failed permanently: {}", result.job_id, e);
                Settlement::DeadLetter
            }
        };

        self.apply(&delivery, settlement);
    }

    fn apply(&mut self, delivery: &Delivery, settlement: Settlement) {
        let Some(channel) = self.channel.as_mut() else {
            self.stats.stale += 1;
            debug!("Delivery {} will be redelivered", delivery.tag);
            return;
        };
        if channel.generation() != delivery.generation {
            self.stats.stale += 1;
            debug!(
                "Delivery {} belongs to closed connection generation {}",
                delivery.tag, delivery.generation
            );
            return;
        }

        let result = match settlement {
            Settlement::Ack => channel.ack(delivery).map(|_| self.stats.acked += 1),
            Settlement::Requeue => channel
                .nack(delivery, true)
                .map(|_| self.stats.requeued += 1),
            Settlement::DeadLetter => channel
                .dead_letter(delivery, &self.settings.dead_letter_queue)
                .map(|_| self.stats.dead_lettered += 1),
        };

        if let Err(e) = result {
            warn!("Failed to settle delivery {}: {}", delivery.tag, e);
            if e.is_connection_error() {
                self.stats.stale += 1;
                self.channel = None;
            }
        }
    }
}
