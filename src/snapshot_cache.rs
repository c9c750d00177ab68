use std::time::{Duration, Instant};

use crate::client_model::ClientRecord;

/// Time-boxed copy of the whole collection for read-heavy calls
/// (listing, search, pagination).
///
/// A miss never reloads by itself; the store decides how to refill it.
#[derive(Debug)]
pub struct SnapshotCache {
    ttl: Duration,
    entry: Option<(Instant, Vec<ClientRecord>)>,
    hit_count: usize,
    miss_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hit_count: usize,
    pub miss_count: usize,
    pub cached_records: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: None,
            hit_count: 0,
            miss_count: 0,
        }
    }

    /// The snapshot, if it was populated less than `ttl` ago.
    pub fn get(&mut self) -> Option<&[ClientRecord]> {
        let fresh = matches!(&self.entry, Some((at, _)) if at.elapsed() < self.ttl);
        if !fresh {
            self.miss_count += 1;
            return None;
        }
        self.hit_count += 1;
        self.entry.as_ref().map(|(_, records)| records.as_slice())
    }

    /// Current entry regardless of age, without touching the counters.
    pub fn peek(&self) -> Option<&[ClientRecord]> {
        self.entry.as_ref().map(|(_, records)| records.as_slice())
    }

    pub fn populate(&mut self, records: Vec<ClientRecord>) {
        self.entry = Some((Instant::now(), records));
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    pub fn is_populated(&self) -> bool {
        self.entry.is_some()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count,
            miss_count: self.miss_count,
            cached_records: self.entry.as_ref().map_or(0, |(_, records)| records.len()),
        }
    }
}
