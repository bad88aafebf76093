use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, info};
use redis::{cmd, Client, Commands, Connection};

use crate::config::QueueConfig;
use crate::queue::{BrokerError, Delivery, QueueChannel, QueueConnector};
use crate::sanitize::redact_url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Slack on top of a blocking receive before the socket read gives up.
const READ_TIMEOUT_SLACK: Duration = Duration::from_secs(5);
/// Redis treats a zero blocking timeout as "wait forever".
const MIN_BLOCK_SECS: f64 = 0.01;

/// Redis list transport.
///
/// Producers `LPUSH` onto the queue list. A consumer moves each message with
/// `BLMOVE` into its own processing list `<queue>:processing:<consumer>`, where
/// it stays until settled. Anything left there by a dead connection is moved
/// back by [`QueueChannel::recover`] on the next connect.
pub struct RedisConnector {
    client: Client,
    url: String,
    consumer_name: String,
    generation: AtomicU64,
}

impl RedisConnector {
    pub fn new(url: &str, consumer_name: &str) -> Result<Self, BrokerError> {
        let client = Client::open(url).map_err(|e| BrokerError::InvalidUrl {
            url: redact_url(url),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            url: url.to_string(),
            consumer_name: consumer_name.to_string(),
            generation: AtomicU64::new(0),
        })
    }

    pub fn from_config(config: &QueueConfig) -> Result<Self, BrokerError> {
        Self::new(&config.url, &config.consumer_name)
    }
}

impl QueueConnector for RedisConnector {
    fn connect(&self) -> Result<Box<dyn QueueChannel>, BrokerError> {
        let conn = self.client.get_connection_with_timeout(CONNECT_TIMEOUT)?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Opened broker connection generation {}", generation);

        Ok(Box::new(RedisChannel {
            conn,
            consumer_name: self.consumer_name.clone(),
            generation,
            next_tag: 0,
        }))
    }

    fn describe(&self) -> String {
        redact_url(&self.url)
    }
}

struct RedisChannel {
    conn: Connection,
    consumer_name: String,
    generation: u64,
    next_tag: u64,
}

impl RedisChannel {
    fn processing_list(&self, queue: &str) -> String {
        format!("{}:processing:{}", queue, self.consumer_name)
    }
}

impl QueueChannel for RedisChannel {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn declare(&mut self, _queue: &str) -> Result<(), BrokerError> {
        // Lists come into existence on first push; only check the link.
        let _: String = cmd("PING").query(&mut self.conn)?;
        Ok(())
    }

    fn recover(&mut self, queue: &str) -> Result<usize, BrokerError> {
        let processing = self.processing_list(queue);
        let mut moved = 0;

        loop {
            let body: Option<String> = cmd("LMOVE")
                .arg(&processing)
                .arg(queue)
                .arg("LEFT")
                .arg("RIGHT")
                .query(&mut self.conn)?;
            if body.is_none() {
                break;
            }
            moved += 1;
        }

        if moved > 0 {
            info!(
                "Returned {} unsettled message(s) from {} to {}",
                moved, processing, queue
            );
        }
        Ok(moved)
    }

    fn publish(&mut self, queue: &str, body: &str) -> Result<(), BrokerError> {
        let _: i64 = self.conn.lpush(queue, body)?;
        Ok(())
    }

    fn receive(
        &mut self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<Delivery>, BrokerError> {
        let processing = self.processing_list(queue);
        self.conn.set_read_timeout(Some(timeout + READ_TIMEOUT_SLACK))?;

        let body: Option<String> = cmd("BLMOVE")
            .arg(queue)
            .arg(&processing)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(timeout.as_secs_f64().max(MIN_BLOCK_SECS))
            .query(&mut self.conn)?;

        Ok(body.map(|body| {
            self.next_tag += 1;
            Delivery {
                tag: self.next_tag,
                queue: queue.to_string(),
                body,
                generation: self.generation,
            }
        }))
    }

    fn ack(&mut self, delivery: &Delivery) -> Result<(), BrokerError> {
        let processing = self.processing_list(&delivery.queue);
        let removed: i64 = self.conn.lrem(&processing, 1, &delivery.body)?;
        if removed == 0 {
            return Err(BrokerError::UnknownDelivery(delivery.tag));
        }
        Ok(())
    }

    fn nack(&mut self, delivery: &Delivery, requeue: bool) -> Result<(), BrokerError> {
        let processing = self.processing_list(&delivery.queue);

        if requeue {
            // Back onto the consuming end so it is delivered next.
            redis::pipe()
                .atomic()
                .cmd("LREM")
                .arg(&processing)
                .arg(1)
                .arg(&delivery.body)
                .ignore()
                .cmd("RPUSH")
                .arg(&delivery.queue)
                .arg(&delivery.body)
                .ignore()
                .query::<()>(&mut self.conn)?;
        } else {
            let _: i64 = self.conn.lrem(&processing, 1, &delivery.body)?;
        }
        Ok(())
    }

    fn dead_letter(
        &mut self,
        delivery: &Delivery,
        dead_letter_queue: &str,
    ) -> Result<(), BrokerError> {
        let processing = self.processing_list(&delivery.queue);

        redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(&processing)
            .arg(1)
            .arg(&delivery.body)
            .ignore()
            .cmd("LPUSH")
            .arg(dead_letter_queue)
            .arg(&delivery.body)
            .ignore()
            .query::<()>(&mut self.conn)?;
        Ok(())
    }
}
