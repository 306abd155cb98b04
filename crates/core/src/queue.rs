//! Queue Manager
//!
//! Named FIFO queues of callsigns for shared resources such as runways.
//! Priority entries go ahead of every normal entry but stay in arrival order
//! among themselves.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::info;

/// One aircraft waiting in a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub callsign: String,
    pub priority: bool,
}

/// Queues keyed by a free-form tag (`"takeoff"`, `"landing"`, ...).
///
/// Queues are created on first enqueue. Reads never create a queue.
/// Enqueueing a callsign that is already queued adds a second entry.
#[derive(Debug, Default)]
pub struct QueueManager {
    queues: HashMap<String, VecDeque<QueueEntry>>,
}

impl QueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `callsign` to `tag`: behind the last priority entry when
    /// `priority`, otherwise at the tail. Returns the new entry's position.
    pub fn enqueue(&mut self, tag: &str, callsign: &str, priority: bool) -> usize {
        let queue = self.queues.entry(tag.to_string()).or_default();
        let entry = QueueEntry {
            callsign: callsign.to_string(),
            priority,
        };

        let position = if priority {
            let position = queue.iter().take_while(|e| e.priority).count();
            queue.insert(position, entry);
            position
        } else {
            queue.push_back(entry);
            queue.len() - 1
        };

        info!(%tag, %callsign, priority, position, "Added to queue");
        position
    }

    /// The callsign at the head of `tag`, without removing it.
    pub fn peek_next(&self, tag: &str) -> Option<&str> {
        self.queues
            .get(tag)
            .and_then(|q| q.front())
            .map(|e| e.callsign.as_str())
    }

    /// Removes and returns the head of `tag`.
    pub fn pop_next(&mut self, tag: &str) -> Option<QueueEntry> {
        let entry = self.queues.get_mut(tag)?.pop_front()?;
        info!(%tag, callsign = %entry.callsign, "Released from queue");
        Some(entry)
    }

    /// 0-based position of the first entry for `callsign`.
    pub fn position_of(&self, tag: &str, callsign: &str) -> Option<usize> {
        self.queues
            .get(tag)?
            .iter()
            .position(|e| e.callsign == callsign)
    }

    pub fn contains(&self, tag: &str, callsign: &str) -> bool {
        self.position_of(tag, callsign).is_some()
    }

    /// Removes every entry for `callsign`. Absent callsigns are a no-op.
    /// Returns how many entries were removed.
    pub fn remove(&mut self, tag: &str, callsign: &str) -> usize {
        let Some(queue) = self.queues.get_mut(tag) else {
            return 0;
        };
        let before = queue.len();
        queue.retain(|e| e.callsign != callsign);
        let removed = before - queue.len();
        if removed > 0 {
            info!(%tag, %callsign, removed, "Removed from queue");
        }
        removed
    }

    /// Empties `tag`, returning how many entries it held.
    pub fn clear(&mut self, tag: &str) -> usize {
        let count = self.queues.get_mut(tag).map_or(0, |q| {
            let count = q.len();
            q.clear();
            count
        });
        info!(%tag, count, "Cleared queue");
        count
    }

    /// Snapshot of `tag` in queue order.
    pub fn entries(&self, tag: &str) -> Vec<QueueEntry> {
        self.queues
            .get(tag)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, tag: &str) -> usize {
        self.queues.get(tag).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, tag: &str) -> bool {
        self.len(tag) == 0
    }
}
