//! Killed-pod deduplication

use std::collections::HashSet;

/// Pod names that already have a killed-pod row in the log.
///
/// Lives for the process lifetime only; names are added, never removed.
/// A restart forgets every entry, so a kill still present in the event
/// history is recorded again by the next process.
#[derive(Debug, Clone, Default)]
pub struct DedupSet {
    recorded: HashSet<String>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn already_recorded(&self, pod: &str) -> bool {
        self.recorded.contains(pod)
    }

    pub fn mark_recorded(&mut self, pod: impl Into<String>) {
        self.recorded.insert(pod.into());
    }

    pub fn len(&self) -> usize {
        self.recorded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_check() {
        let mut dedup = DedupSet::new();
        assert!(dedup.is_empty());
        assert!(!dedup.already_recorded("createpod-7"));

        dedup.mark_recorded("createpod-7");
        assert!(dedup.already_recorded("createpod-7"));
        assert!(!dedup.already_recorded("createpod-8"));
    }

    #[test]
    fn test_reinsertion_is_absorbed() {
        let mut dedup = DedupSet::new();
        dedup.mark_recorded("createpod-7");
        dedup.mark_recorded("createpod-7".to_string());
        assert_eq!(dedup.len(), 1);
    }
}
