//! Redis-backed job submitter (pushes onto `<namespace>:queue:<name>`).

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::failures::redis_list::DEFAULT_NAMESPACE;

use super::submitter::{JobSubmitter, SubmitError, Submission};

#[derive(Debug, Clone)]
pub struct RedisSubmitter {
    client: Arc<redis::Client>,
    namespace: String,
}

impl RedisSubmitter {
    pub fn new(redis_url: impl AsRef<str>, namespace: Option<&str>) -> Result<Self, SubmitError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| SubmitError::Connection(e.to_string()))?;

        Ok(Self::with_client(Arc::new(client), namespace))
    }

    pub fn with_client(client: Arc<redis::Client>, namespace: Option<&str>) -> Self {
        Self {
            client,
            namespace: namespace.unwrap_or(DEFAULT_NAMESPACE).to_string(),
        }
    }

    fn queue_key(&self, queue: &str) -> String {
        format!("{}:queue:{}", self.namespace, queue)
    }

    fn queues_key(&self) -> String {
        format!("{}:queues", self.namespace)
    }
}

impl JobSubmitter for RedisSubmitter {
    #[instrument(skip(self, args), fields(namespace = %self.namespace), err)]
    fn submit(&self, queue: &str, class: &str, args: &[Value]) -> Result<(), SubmitError> {
        let item = Submission {
            queue: queue.to_string(),
            class: class.to_string(),
            args: args.to_vec(),
        }
        .queue_item()?;

        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| SubmitError::Connection(e.to_string()))?;

        // Register the queue and push the job in one MULTI/EXEC.
        redis::pipe()
            .atomic()
            .cmd("SADD")
            .arg(self.queues_key())
            .arg(queue)
            .ignore()
            .cmd("RPUSH")
            .arg(self.queue_key(queue))
            .arg(&item)
            .ignore()
            .query::<()>(&mut conn)
            .map_err(|e| SubmitError::Command(format!("enqueue failed: {}", e)))?;

        debug!(queue, class, "job resubmitted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_namespace() {
        let submitter = RedisSubmitter::new("redis://127.0.0.1:6379", Some("app")).unwrap();
        assert_eq!(submitter.queue_key("mail"), "app:queue:mail");
        assert_eq!(submitter.queues_key(), "app:queues");
    }
}
