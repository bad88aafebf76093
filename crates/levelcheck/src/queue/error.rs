use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Invalid broker URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Broker connection failed: {0}")]
    Connection(String),

    #[error("Broker command failed: {0}")]
    Command(String),

    #[error("Unknown delivery tag {0}")]
    UnknownDelivery(u64),

    #[error("Broker lock poisoned")]
    LockPoisoned,
}

impl BrokerError {
    pub fn is_connection_error(&self) -> bool {
        matches!(self, BrokerError::Connection(_))
    }
}

impl From<redis::RedisError> for BrokerError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout()
        {
            BrokerError::Connection(e.to_string())
        } else {
            BrokerError::Command(e.to_string())
        }
    }
}
