//! In-process agents behind the client interface.

use super::{ClientError, DecisionClient};
use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use qbench_core::Agent;
use qbench_types::{Action, Observation};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Calls an in-process [`Agent`] on the blocking thread pool.
///
/// `decide` is synchronous, so it runs off the async workers. A caller that
/// stops waiting (step timeout, exhausted budget) gets control back at once
/// while the abandoned call finishes in the background.
pub struct InProcessClient<A> {
    name: String,
    agent: Arc<Mutex<A>>,
}

impl<A: Agent + 'static> InProcessClient<A> {
    pub fn new(agent: A) -> Self {
        Self {
            name: agent.name().to_string(),
            agent: Arc::new(Mutex::new(agent)),
        }
    }

    /// Lock the agent. Waits for an abandoned `decide` call to return.
    pub fn agent(&self) -> MutexGuard<'_, A> {
        self.agent.lock()
    }
}

impl<A> fmt::Debug for InProcessClient<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessClient")
            .field("agent", &self.name)
            .finish()
    }
}

#[async_trait]
impl<A: Agent + 'static> DecisionClient for InProcessClient<A> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exchange(&mut self, observation: &Observation) -> Result<Vec<Action>, ClientError> {
        let agent = Arc::clone(&self.agent);
        let observation = observation.clone();
        let mut decision =
            AbortOnDrop(tokio::task::spawn_blocking(move || agent.lock().decide(&observation)));

        match (&mut decision.0).await {
            Ok(actions) => Ok(actions),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(ClientError::Setup(format!("agent task failed: {}", e))),
        }
    }
}

/// Cancels a queued blocking call when the caller stops waiting. A call that
/// already started runs to completion.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbench_types::Step;
    use std::time::{Duration, Instant};

    struct SleepyAgent(Duration);

    impl Agent for SleepyAgent {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn decide(&mut self, _observation: &Observation) -> Vec<Action> {
            std::thread::sleep(self.0);
            Vec::new()
        }
    }

    #[tokio::test]
    async fn test_blocking_agent_can_be_abandoned() {
        let mut client = InProcessClient::new(SleepyAgent(Duration::from_millis(500)));
        let observation = Observation {
            time: Step(0),
            horizon: 4,
            capacity_per_step: 1,
            ..Default::default()
        };

        let started = Instant::now();
        let reply =
            tokio::time::timeout(Duration::from_millis(20), client.exchange(&observation)).await;

        assert!(reply.is_err());
        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(client.name(), "sleepy");
    }
}
