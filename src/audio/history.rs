use std::{collections::VecDeque, sync::Arc};

use super::track::Track;

/// Máximo de tracks recordados por sesión
pub const HISTORY_CAPACITY: usize = 50;

/// Bounded play history, oldest entry evicted first.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<Arc<Track>>,
}

impl History {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    pub fn push(&mut self, track: Arc<Track>) {
        if self.entries.len() == HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(track);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Arc<Track>> {
        self.entries.back()
    }

    pub fn to_vec(&self) -> Vec<Arc<Track>> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}
