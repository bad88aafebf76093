//! Durable work-queue transport.
//!
//! Message bodies are decimal job ids with no envelope. A delivery stays
//! owned by the connection that received it until it is acknowledged,
//! requeued or dead-lettered; deliveries left unsettled when a connection
//! goes away are redelivered by the broker.

use std::time::Duration;

pub mod consumer;
pub mod error;
pub mod memory;
pub mod producer;
pub mod redis;

pub use consumer::{Consumer, ConsumerSettings, ConsumerStats};
pub use error::BrokerError;
pub use memory::{BrokerStats, MemoryBroker};
pub use producer::{publish, publish_job};
pub use self::redis::RedisConnector;

/// One received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Unique per connection.
    pub tag: u64,
    pub queue: String,
    pub body: String,
    /// Generation of the connection that received the message.
    pub generation: u64,
}

/// An open connection to the broker.
pub trait QueueChannel: Send {
    /// Identifies this connection; a reconnect yields a new generation.
    fn generation(&self) -> u64;

    /// Ensures the queue exists. Idempotent.
    fn declare(&mut self, queue: &str) -> Result<(), BrokerError>;

    /// Returns unsettled messages left over by an earlier connection of this
    /// consumer to the queue. Returns how many were moved back.
    fn recover(&mut self, queue: &str) -> Result<usize, BrokerError>;

    fn publish(&mut self, queue: &str, body: &str) -> Result<(), BrokerError>;

    /// Waits up to `timeout` for the next message.
    fn receive(&mut self, queue: &str, timeout: Duration)
        -> Result<Option<Delivery>, BrokerError>;

    fn ack(&mut self, delivery: &Delivery) -> Result<(), BrokerError>;

    /// Negative acknowledgement. With `requeue` the message is delivered again,
    /// otherwise it is discarded.
    fn nack(&mut self, delivery: &Delivery, requeue: bool) -> Result<(), BrokerError>;

    /// Moves the message to `dead_letter_queue` and removes it from its queue.
    fn dead_letter(&mut self, delivery: &Delivery, dead_letter_queue: &str)
        -> Result<(), BrokerError>;
}

/// Opens broker connections.
pub trait QueueConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn QueueChannel>, BrokerError>;

    /// Connection target for logs, without credentials.
    fn describe(&self) -> String;
}
