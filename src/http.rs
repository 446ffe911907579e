//! Shared HTTP client setup for the vision oracle and the webhook notifier.

use std::time::Duration;

/// Timeout from a configured number of seconds; zero is raised to one second.
pub fn timeout_from_secs(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}

/// A blocking agent whose requests give up after `timeout`.
pub fn agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}
