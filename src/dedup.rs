use std::collections::{HashSet, VecDeque};

/// Bounded, insertion-ordered memory of message IDs already processed.
///
/// Once more than `cap` IDs have been admitted the oldest are forgotten, so a
/// very old message replayed by the source can be admitted a second time.
/// That is accepted: memory stays bounded on long-running streams.
#[derive(Debug, Clone)]
pub struct ProcessedIds {
    cap: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl ProcessedIds {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            order: VecDeque::with_capacity(cap.min(1024)),
            seen: HashSet::with_capacity(cap.min(1024)),
        }
    }

    /// Restore from a persisted list (oldest first), keeping the most recent `cap` IDs.
    pub fn with_ids<I>(cap: usize, ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut set = Self::new(cap);
        for id in ids {
            set.admit(&id);
        }
        set
    }

    /// Record `id` and return true if it has not been seen before.
    pub fn admit(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }

        self.seen.insert(id.to_string());
        self.order.push_back(id.to_string());

        while self.order.len() > self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    #[cfg(test)]
    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// IDs oldest first, for persistence
    pub fn snapshot(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}
