//! Fixed-capacity line store with overwrite-oldest eviction.

use std::sync::{PoisonError, RwLock};

/// Default number of lines kept for display.
pub const DEFAULT_CAPACITY: usize = 5000;

/// Circular buffer of log lines.
///
/// Appends come from the log pipeline task while the display side reads by
/// index, so the storage sits behind its own `RwLock`, independent of the
/// supervisor's state lock.
#[derive(Debug)]
pub struct RingLog {
    inner: RwLock<Ring>,
}

#[derive(Debug)]
struct Ring {
    slots: Vec<String>,
    /// Slot holding the oldest line.
    start: usize,
    len: usize,
    /// Lines ever appended, including evicted and cleared ones. Never reset,
    /// so readers' sequence numbers stay comparable across clears.
    appended: u64,
}

impl Ring {
    fn physical(&self, i: usize) -> usize {
        (self.start + i) % self.slots.len()
    }
}

impl RingLog {
    /// Create a ring holding at most `capacity` lines (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: RwLock::new(Ring {
                slots: vec![String::new(); capacity],
                start: 0,
                len: 0,
                appended: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.read(|ring| ring.slots.len())
    }

    /// Append a line, overwriting the oldest one when full.
    pub fn append(&self, line: impl Into<String>) {
        let line = line.into();
        let mut ring = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let cap = ring.slots.len();
        if ring.len < cap {
            let slot = ring.physical(ring.len);
            ring.slots[slot] = line;
            ring.len += 1;
        } else {
            let slot = ring.start;
            ring.slots[slot] = line;
            ring.start = (ring.start + 1) % cap;
        }
        ring.appended += 1;
    }

    /// Drop every line. The slot storage is reused.
    pub fn clear(&self) {
        let mut ring = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for slot in ring.slots.iter_mut() {
            slot.clear();
        }
        ring.start = 0;
        ring.len = 0;
    }

    pub fn len(&self) -> usize {
        self.read(|ring| ring.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `i`-th line in insertion order, 0 being the oldest retained line.
    pub fn at(&self, i: usize) -> Option<String> {
        self.read(|ring| (i < ring.len).then(|| ring.slots[ring.physical(i)].clone()))
    }

    /// Snapshot of all retained lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.read(|ring| {
            (0..ring.len)
                .map(|i| ring.slots[ring.physical(i)].clone())
                .collect()
        })
    }

    /// Sequence number of the newest line: lines ever appended.
    pub fn appended(&self) -> u64 {
        self.read(|ring| ring.appended)
    }

    /// Lines appended after sequence number `seen`, plus the new sequence
    /// number to pass next time.
    ///
    /// Lines already evicted or cleared are skipped.
    pub fn lines_since(&self, seen: u64) -> (Vec<String>, u64) {
        self.read(|ring| {
            let oldest_seq = ring.appended - ring.len as u64;
            let skip = seen.saturating_sub(oldest_seq) as usize;
            let lines = (skip..ring.len)
                .map(|i| ring.slots[ring.physical(i)].clone())
                .collect();
            (lines, ring.appended)
        })
    }

    fn read<T>(&self, f: impl FnOnce(&Ring) -> T) -> T {
        let ring = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&ring)
    }
}

impl Default for RingLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_append_within_capacity() {
        let ring = RingLog::new(4);
        ring.append("a");
        ring.append("b");
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.at(0).as_deref(), Some("a"));
        assert_eq!(ring.at(1).as_deref(), Some("b"));
        assert_eq!(ring.at(2), None);
    }

    #[test]
    fn test_overwrites_oldest_when_full() {
        let ring = RingLog::new(3);
        for i in 0..10 {
            ring.append(format!("line {}", i));
        }
        assert_eq!(ring.len(), 3);
        // N=10, capacity=3: oldest retained is the 7th line (index 7)
        assert_eq!(ring.at(0).as_deref(), Some("line 7"));
        assert_eq!(ring.lines(), vec!["line 7", "line 8", "line 9"]);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let ring = RingLog::new(3);
        ring.append("x");
        ring.append("y");
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.capacity(), 3);
        assert_eq!(ring.at(0), None);

        ring.append("z");
        assert_eq!(ring.lines(), vec!["z"]);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let ring = RingLog::new(0);
        ring.append("only");
        ring.append("latest");
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.lines(), vec!["latest"]);
    }

    #[test]
    fn test_lines_since_skips_seen_and_evicted() {
        let ring = RingLog::new(3);
        ring.append("a");
        ring.append("b");
        let (lines, seq) = ring.lines_since(0);
        assert_eq!(lines, vec!["a", "b"]);
        assert_eq!(seq, 2);

        for l in ["c", "d", "e", "f"] {
            ring.append(l);
        }
        // "c" was evicted before we looked again
        let (lines, seq) = ring.lines_since(seq);
        assert_eq!(lines, vec!["d", "e", "f"]);
        assert_eq!(seq, 6);

        ring.clear();
        ring.append("g");
        let (lines, seq) = ring.lines_since(seq);
        assert_eq!(lines, vec!["g"]);
        assert_eq!(seq, 7);
    }

    #[test]
    fn test_lines_since_after_clear_and_refill() {
        let ring = RingLog::new(10);
        ring.append("old1");
        ring.append("old2");
        let (_, seq) = ring.lines_since(0);

        ring.clear();
        for l in ["new1", "new2", "new3"] {
            ring.append(l);
        }
        let (lines, seq) = ring.lines_since(seq);
        assert_eq!(lines, vec!["new1", "new2", "new3"]);
        assert_eq!(seq, 5);
        assert_eq!(ring.appended(), 5);
    }

    #[test]
    fn test_concurrent_append_and_read() {
        let ring = Arc::new(RingLog::new(64));
        let writer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                for i in 0..10_000 {
                    ring.append(format!("{}", i));
                }
            })
        };
        for _ in 0..1_000 {
            let len = ring.len();
            assert!(len <= 64);
            let _ = ring.at(len.saturating_sub(1));
        }
        writer.join().unwrap();
        assert_eq!(ring.len(), 64);
        assert_eq!(ring.at(63).as_deref(), Some("9999"));
    }
}
