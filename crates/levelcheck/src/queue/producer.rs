use log::{error, info};

use crate::job::JobId;
use crate::queue::{BrokerError, QueueConnector};

/// Publishes `job_id` as a message on `queue` over a fresh connection.
pub fn publish_job(
    connector: &dyn QueueConnector,
    queue: &str,
    job_id: JobId,
) -> Result<(), BrokerError> {
    let mut channel = connector.connect()?;
    channel.declare(queue)?;
    channel.publish(queue, &job_id.to_string())?;
    info!("Published job {} to '{}'", job_id, queue);
    Ok(())
}

/// Fire-and-forget variant: failures are logged, not returned.
///
/// A record whose publish failed stays `Saved` until it is published again.
pub fn publish(connector: &dyn QueueConnector, queue: &str, job_id: JobId) {
    if let Err(e) = publish_job(connector, queue, job_id) {
        error!(
            "Failed to publish job {} to '{}' on {}: {}",
            job_id,
            queue,
            connector.describe(),
            e
        );
    }
}
