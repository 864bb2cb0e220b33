//! Publisher whose results follow a script, recording every call.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sourced_outbox::{Headers, OutboxPublisher, PublishError};

/// One scripted publish result.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    FailConnection(&'static str),
    Reject(&'static str),
    /// Sleep, then succeed.
    Delay(Duration),
    /// Never complete.
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedCall {
    pub topic: String,
    pub body: Vec<u8>,
    pub headers: Headers,
}

/// Runs one [`Step`] per call, then `fallback` once the script is used up.
/// Clones share the script and the call log.
#[derive(Clone)]
pub struct ScriptedPublisher {
    script: Arc<Mutex<VecDeque<Step>>>,
    fallback: Step,
    calls: Arc<Mutex<Vec<PublishedCall>>>,
}

impl Default for ScriptedPublisher {
    fn default() -> Self {
        Self::always(Step::Succeed)
    }
}

impl ScriptedPublisher {
    pub fn always(step: Step) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: step,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn scripted(steps: impl IntoIterator<Item = Step>) -> Self {
        let publisher = Self::default();
        publisher.script.lock().unwrap().extend(steps);
        publisher
    }

    pub fn calls(&self) -> Vec<PublishedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, topic: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.topic == topic)
            .count()
    }

    fn next_step(&self) -> Step {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl OutboxPublisher for ScriptedPublisher {
    async fn publish(
        &self,
        topic: &str,
        body: &[u8],
        headers: &Headers,
    ) -> Result<(), PublishError> {
        self.calls.lock().unwrap().push(PublishedCall {
            topic: topic.to_string(),
            body: body.to_vec(),
            headers: headers.clone(),
        });

        match self.next_step() {
            Step::Succeed => Ok(()),
            Step::FailConnection(reason) => Err(PublishError::ConnectionFailed(reason.into())),
            Step::Reject(reason) => Err(PublishError::Rejected(reason.into())),
            Step::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Step::Hang => {
                futures::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}
