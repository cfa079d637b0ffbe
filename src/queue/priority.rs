use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use tokio::sync::oneshot;

use crate::error::QueueError;

/// Service class of a queued task. Lower values are served first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
    Background = 4,
}

impl Priority {
    pub const ALL: [Self; 5] = [
        Self::Critical,
        Self::High,
        Self::Normal,
        Self::Low,
        Self::Background,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Background => "background",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(super) type Reply = oneshot::Sender<Result<String, QueueError>>;

/// A task waiting in the queue, ordered by priority then submission order.
pub(super) struct PendingTask {
    pub priority: Priority,
    pub seq: u64,
    pub text: String,
    pub category: Option<String>,
    pub reply: Reply,
}

impl PendingTask {
    pub fn settle(self, result: Result<String, QueueError>) {
        // The submitter may have stopped waiting.
        let _ = self.reply.send(result);
    }
}

impl PartialEq for PendingTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for PendingTask {}

impl PartialOrd for PendingTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.seq.cmp(&other.seq))
    }
}
