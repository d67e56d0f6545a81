//! Recent command attempts
//!
//! A bounded ring of what the user said and whether it worked, used as the
//! comparison window for correction detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// One finalized transcript and its execution outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedCommand {
    pub id: Uuid,
    pub text: String,
    pub success: bool,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub console_connected: bool,
}

impl ExecutedCommand {
    pub fn new(text: impl Into<String>, success: bool, confidence: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            success,
            confidence: confidence.clamp(0.0, 1.0),
            timestamp: Utc::now(),
            console_connected: false,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn connected(mut self, console_connected: bool) -> Self {
        self.console_connected = console_connected;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: VecDeque<ExecutedCommand>,
    capacity: usize,
}

impl CommandHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, dropping the oldest entry when full
    pub fn push(&mut self, command: ExecutedCommand) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(command);
    }

    pub fn latest(&self) -> Option<&ExecutedCommand> {
        self.entries.back()
    }

    /// Oldest first
    pub fn entries(&self) -> Vec<ExecutedCommand> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
