use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::debug;

use crate::queue::{BrokerError, Delivery, QueueChannel, QueueConnector};

/// In-process broker with the same settlement semantics as the Redis
/// transport. Clones share state.
///
/// Unsettled deliveries go back to the head of their queue when the channel
/// that received them is dropped or severed.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<BrokerState>,
    changed: Condvar,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<String>>,
    unacked: HashMap<(u64, u64), Delivery>,
    live: HashSet<u64>,
    generation: u64,
    next_tag: u64,
    failing_connects: usize,
    connect_attempts: usize,
    stats: BrokerStats,
}

/// Settlement counters, for assertions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub published: usize,
    pub delivered: usize,
    pub acked: usize,
    pub requeued: usize,
    pub discarded: usize,
    pub dead_lettered: usize,
    /// Deliveries returned because their connection went away.
    pub returned: usize,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BrokerState>, BrokerError> {
        self.shared.state.lock().map_err(|_| BrokerError::LockPoisoned)
    }

    /// Makes the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        if let Ok(mut state) = self.lock() {
            state.failing_connects = count;
        }
    }

    pub fn connect_attempts(&self) -> usize {
        self.lock().map(|s| s.connect_attempts).unwrap_or(0)
    }

    /// Publishes without opening a channel.
    pub fn push(&self, queue: &str, body: &str) {
        if let Ok(mut state) = self.lock() {
            state
                .queues
                .entry(queue.to_string())
                .or_default()
                .push_back(body.to_string());
            state.stats.published += 1;
        }
        self.shared.changed.notify_all();
    }

    /// Messages waiting in `queue`, next delivery first.
    pub fn messages(&self, queue: &str) -> Vec<String> {
        self.lock()
            .ok()
            .and_then(|s| s.queues.get(queue).map(|q| q.iter().cloned().collect()))
            .unwrap_or_default()
    }

    pub fn unacked_count(&self) -> usize {
        self.lock().map(|s| s.unacked.len()).unwrap_or(0)
    }

    pub fn stats(&self) -> BrokerStats {
        self.lock().map(|s| s.stats.clone()).unwrap_or_default()
    }

    /// Drops every open connection, as a broker restart would. Their
    /// unsettled deliveries return to the head of their queues and further
    /// operations on the severed channels fail.
    pub fn sever_connections(&self) {
        if let Ok(mut state) = self.lock() {
            let live: Vec<u64> = state.live.drain().collect();
            for generation in live {
                return_unacked(&mut state, generation);
            }
        }
        self.shared.changed.notify_all();
    }

    /// Blocks until `condition` holds on the current stats or `timeout` passes.
    pub fn wait_for<F>(&self, timeout: Duration, condition: F) -> bool
    where
        F: Fn(&BrokerStats) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let Ok(mut state) = self.lock() else {
            return false;
        };

        loop {
            if condition(&state.stats) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = match self.shared.changed.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(_) => return false,
            };
        }
    }
}

fn return_unacked(state: &mut BrokerState, generation: u64) {
    let mut returned: Vec<Delivery> = state
        .unacked
        .iter()
        .filter(|((g, _), _)| *g == generation)
        .map(|(_, d)| d.clone())
        .collect();
    state.unacked.retain(|(g, _), _| *g != generation);

    // Oldest delivery ends up at the head.
    returned.sort_by_key(|d| std::cmp::Reverse(d.tag));
    for delivery in returned {
        state
            .queues
            .entry(delivery.queue.clone())
            .or_default()
            .push_front(delivery.body);
        state.stats.returned += 1;
    }
}

impl QueueConnector for MemoryBroker {
    fn connect(&self) -> Result<Box<dyn QueueChannel>, BrokerError> {
        let mut state = self.lock()?;
        state.connect_attempts += 1;

        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(BrokerError::Connection("connection refused".to_string()));
        }

        state.generation += 1;
        let generation = state.generation;
        state.live.insert(generation);
        debug!("Opened in-memory broker connection {}", generation);

        Ok(Box::new(MemoryChannel {
            broker: self.clone(),
            generation,
        }))
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}

struct MemoryChannel {
    broker: MemoryBroker,
    generation: u64,
}

impl MemoryChannel {
    fn live_state(&self) -> Result<MutexGuard<'_, BrokerState>, BrokerError> {
        let state = self.broker.lock()?;
        if !state.live.contains(&self.generation) {
            return Err(BrokerError::Connection("connection closed".to_string()));
        }
        Ok(state)
    }

    fn take_unacked(
        &self,
        state: &mut BrokerState,
        delivery: &Delivery,
    ) -> Result<Delivery, BrokerError> {
        state
            .unacked
            .remove(&(self.generation, delivery.tag))
            .ok_or(BrokerError::UnknownDelivery(delivery.tag))
    }
}

impl QueueChannel for MemoryChannel {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn declare(&mut self, queue: &str) -> Result<(), BrokerError> {
        let mut state = self.live_state()?;
        state.queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    fn recover(&mut self, _queue: &str) -> Result<usize, BrokerError> {
        // Dropped channels return their deliveries immediately.
        self.live_state().map(|_| 0)
    }

    fn publish(&mut self, queue: &str, body: &str) -> Result<(), BrokerError> {
        {
            let mut state = self.live_state()?;
            state
                .queues
                .entry(queue.to_string())
                .or_default()
                .push_back(body.to_string());
            state.stats.published += 1;
        }
        self.broker.shared.changed.notify_all();
        Ok(())
    }

    fn receive(
        &mut self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<Delivery>, BrokerError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.live_state()?;

        loop {
            if !state.live.contains(&self.generation) {
                return Err(BrokerError::Connection("connection closed".to_string()));
            }

            if let Some(body) = state.queues.get_mut(queue).and_then(|q| q.pop_front()) {
                state.next_tag += 1;
                let delivery = Delivery {
                    tag: state.next_tag,
                    queue: queue.to_string(),
                    body,
                    generation: self.generation,
                };
                state
                    .unacked
                    .insert((self.generation, delivery.tag), delivery.clone());
                state.stats.delivered += 1;
                return Ok(Some(delivery));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            state = self
                .broker
                .shared
                .changed
                .wait_timeout(state, deadline - now)
                .map_err(|_| BrokerError::LockPoisoned)?
                .0;
        }
    }

    fn ack(&mut self, delivery: &Delivery) -> Result<(), BrokerError> {
        {
            let mut state = self.live_state()?;
            self.take_unacked(&mut state, delivery)?;
            state.stats.acked += 1;
        }
        self.broker.shared.changed.notify_all();
        Ok(())
    }

    fn nack(&mut self, delivery: &Delivery, requeue: bool) -> Result<(), BrokerError> {
        {
            let mut state = self.live_state()?;
            let delivery = self.take_unacked(&mut state, delivery)?;
            if requeue {
                state
                    .queues
                    .entry(delivery.queue)
                    .or_default()
                    .push_front(delivery.body);
                state.stats.requeued += 1;
            } else {
                state.stats.discarded += 1;
            }
        }
        self.broker.shared.changed.notify_all();
        Ok(())
    }

    fn dead_letter(
        &mut self,
        delivery: &Delivery,
        dead_letter_queue: &str,
    ) -> Result<(), BrokerError> {
        {
            let mut state = self.live_state()?;
            let delivery = self.take_unacked(&mut state, delivery)?;
            state
                .queues
                .entry(dead_letter_queue.to_string())
                .or_default()
                .push_back(delivery.body);
            state.stats.dead_lettered += 1;
        }
        self.broker.shared.changed.notify_all();
        Ok(())
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        if let Ok(mut state) = self.broker.lock() {
            if state.live.remove(&self.generation) {
                return_unacked(&mut state, self.generation);
            }
        }
        self.broker.shared.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUEUE: &str = "audio_processing";
    const WAIT: Duration = Duration::from_millis(50);

    #[test]
    fn test_publish_and_receive_in_order() {
        let broker = MemoryBroker::new();
        let mut channel = broker.connect().unwrap();
        channel.declare(QUEUE).unwrap();
        channel.publish(QUEUE, "1").unwrap();
        channel.publish(QUEUE, "2").unwrap();

        let first = channel.receive(QUEUE, WAIT).unwrap().unwrap();
        let second = channel.receive(QUEUE, WAIT).unwrap().unwrap();
        assert_eq!(first.body, "1");
        assert_eq!(second.body, "2");
        assert_ne!(first.tag, second.tag);
        assert!(channel.receive(QUEUE, WAIT).unwrap().is_none());
    }

    #[test]
    fn test_ack_removes_and_double_ack_fails() {
        let broker = MemoryBroker::new();
        broker.push(QUEUE, "7");
        let mut channel = broker.connect().unwrap();

        let delivery = channel.receive(QUEUE, WAIT).unwrap().unwrap();
        assert_eq!(broker.unacked_count(), 1);
        channel.ack(&delivery).unwrap();
        assert_eq!(broker.unacked_count(), 0);
        assert!(matches!(
            channel.ack(&delivery),
            Err(BrokerError::UnknownDelivery(_))
        ));
    }

    #[test]
    fn test_requeue_puts_message_at_head() {
        let broker = MemoryBroker::new();
        broker.push(QUEUE, "1");
        broker.push(QUEUE, "2");
        let mut channel = broker.connect().unwrap();

        let delivery = channel.receive(QUEUE, WAIT).unwrap().unwrap();
        channel.nack(&delivery, true).unwrap();
        assert_eq!(broker.messages(QUEUE), vec!["1", "2"]);
        assert_eq!(broker.stats().requeued, 1);
    }

    #[test]
    fn test_dead_letter_moves_message() {
        let broker = MemoryBroker::new();
        broker.push(QUEUE, "abc");
        let mut channel = broker.connect().unwrap();

        let delivery = channel.receive(QUEUE, WAIT).unwrap().unwrap();
        channel.dead_letter(&delivery, "audio_processing.dead").unwrap();
        assert!(broker.messages(QUEUE).is_empty());
        assert_eq!(broker.messages("audio_processing.dead"), vec!["abc"]);
    }

    #[test]
    fn test_drop_returns_unacked_deliveries() {
        let broker = MemoryBroker::new();
        broker.push(QUEUE, "1");
        broker.push(QUEUE, "2");
        broker.push(QUEUE, "3");

        {
            let mut channel = broker.connect().unwrap();
            channel.receive(QUEUE, WAIT).unwrap().unwrap();
            channel.receive(QUEUE, WAIT).unwrap().unwrap();
        }

        assert_eq!(broker.messages(QUEUE), vec!["1", "2", "3"]);
        assert_eq!(broker.stats().returned, 2);
    }

    #[test]
    fn test_severed_channel_fails_and_returns_deliveries() {
        let broker = MemoryBroker::new();
        broker.push(QUEUE, "1");
        let mut channel = broker.connect().unwrap();
        let delivery = channel.receive(QUEUE, WAIT).unwrap().unwrap();

        broker.sever_connections();

        assert!(channel.ack(&delivery).unwrap_err().is_connection_error());
        assert!(channel.receive(QUEUE, WAIT).unwrap_err().is_connection_error());
        assert_eq!(broker.messages(QUEUE), vec!["1"]);
    }

    #[test]
    fn test_failing_connects() {
        let broker = MemoryBroker::new();
        broker.fail_next_connects(2);

        assert!(broker.connect().is_err());
        assert!(broker.connect().is_err());
        assert!(broker.connect().is_ok());
        assert_eq!(broker.connect_attempts(), 3);
    }

    #[test]
    fn test_receive_wakes_on_publish() {
        let broker = MemoryBroker::new();
        let publisher = broker.clone();
        let mut channel = broker.connect().unwrap();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            publisher.push(QUEUE, "42");
        });

        let delivery = channel.receive(QUEUE, Duration::from_secs(5)).unwrap();
        assert_eq!(delivery.map(|d| d.body), Some("42".to_string()));
        handle.join().unwrap();
    }
}
