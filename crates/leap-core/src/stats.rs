//! Statistics sink
//!
//! The runtime only produces counters; aggregation and file formats belong
//! to whoever implements `StatsSink`.

use crate::kinfo;
use std::collections::BTreeMap;
use std::sync::Mutex;

pub trait StatsSink: Send + Sync {
    /// Report one named counter value
    fn report(&self, name: &str, value: u64);
}

/// Collects reports in memory. Repeated names accumulate.
#[derive(Debug, Default)]
pub struct MemoryStats {
    values: Mutex<BTreeMap<String, u64>>,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.values.lock().unwrap().get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of everything reported so far, sorted by name
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        self.values
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}

impl StatsSink for MemoryStats {
    fn report(&self, name: &str, value: u64) {
        let mut values = self.values.lock().unwrap();
        *values.entry(name.to_string()).or_insert(0) += value;
    }
}

/// Writes every report to the log at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStats;

impl StatsSink for LogStats {
    fn report(&self, name: &str, value: u64) {
        kinfo!("stat {} = {}", name, value);
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStats;

impl StatsSink for NullStats {
    fn report(&self, _name: &str, _value: u64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_stats_accumulates() {
        let s = MemoryStats::new();
        assert!(s.is_empty());
        s.report("a.fired", 3);
        s.report("a.fired", 4);
        s.report("b.stalls", 1);
        assert_eq!(s.get("a.fired"), Some(7));
        assert_eq!(s.get("missing"), None);
        assert_eq!(
            s.snapshot(),
            vec![("a.fired".to_string(), 7), ("b.stalls".to_string(), 1)]
        );
    }

    #[test]
    fn test_sinks_are_object_safe() {
        let sinks: Vec<Box<dyn StatsSink>> =
            vec![Box::new(LogStats), Box::new(NullStats), Box::new(MemoryStats::new())];
        for s in &sinks {
            s.report("x", 1);
        }
    }
}
