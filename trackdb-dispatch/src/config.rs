use std::str::FromStr;

use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::reentrancy::ReentrancyPolicy;

/// Upper bound on the configured queue capacity.
pub const MAX_QUEUE_CAPACITY: usize = 1024;

/// What happens to queued tasks when the engine shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    /// Run every task already queued, then stop.
    #[default]
    Drain,
    /// Drop every task not yet dequeued; blocked sync callers are rejected.
    Discard,
}

impl FromStr for ShutdownPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drain" => Ok(Self::Drain),
            "discard" => Ok(Self::Discard),
            other => Err(format!("unknown shutdown policy '{}'", other)),
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    pub queue_capacity: usize,
    pub shutdown_policy: ShutdownPolicy,
    pub reentrancy: ReentrancyPolicy,
    pub worker_name: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            shutdown_policy: ShutdownPolicy::default(),
            reentrancy: ReentrancyPolicy::default(),
            worker_name: "library-db".to_string(),
        }
    }
}

impl DispatchConfig {
    /// Queue capacity, clamped to 1..=MAX_QUEUE_CAPACITY.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.clamp(1, MAX_QUEUE_CAPACITY);
        self
    }

    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    pub fn reentrancy(mut self, policy: ReentrancyPolicy) -> Self {
        self.reentrancy = policy;
        self
    }

    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }
}
