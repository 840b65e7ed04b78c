//! Double-buffered named item set
//!
//! The writer (receive thread) appends to the back slot; the reader (render
//! thread) copies the front slot. `swap` publishes the back slot in one step,
//! so a reader never observes a partially filled batch.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Two item slots with front/back roles that only change on [`BufferedSet::swap`]
pub struct BufferedSet<T> {
    name: String,
    visible: AtomicBool,
    /// Published batch, read by the renderer
    front: Mutex<Vec<T>>,
    /// Batch being filled by the writer
    back: Mutex<Vec<T>>,
}

impl<T: Clone> BufferedSet<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_visibility(name, true)
    }

    pub fn with_visibility(name: impl Into<String>, visible: bool) -> Self {
        Self {
            name: name.into(),
            visible: AtomicBool::new(visible),
            front: Mutex::new(Vec::new()),
            back: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Relaxed);
    }

    /// Append to the back slot.
    ///
    /// Intended for a single writer thread (the one that also calls `swap`).
    /// Only the back lock is taken, which readers never touch.
    pub fn put(&self, item: T) {
        self.back.lock().push(item);
    }

    /// Copy of the current front slot
    pub fn front_snapshot(&self) -> Vec<T> {
        self.front.lock().clone()
    }

    /// Number of items in the published batch
    pub fn front_len(&self) -> usize {
        self.front.lock().len()
    }

    /// Number of items waiting for the next swap
    pub fn pending_len(&self) -> usize {
        self.back.lock().len()
    }

    /// Exchange front and back, then clear the new back slot.
    ///
    /// Lock order is always back then front.
    pub fn swap(&self) {
        let mut back = self.back.lock();
        let mut front = self.front.lock();
        std::mem::swap(&mut *front, &mut *back);
        drop(front);
        back.clear();
    }
}

impl<T> std::fmt::Debug for BufferedSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedSet")
            .field("name", &self.name)
            .field("visible", &self.visible.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_put_not_visible_until_swap() {
        let set = BufferedSet::new("dbg");
        set.put(1);
        set.put(2);
        assert!(set.front_snapshot().is_empty());
        assert_eq!(set.pending_len(), 2);

        set.swap();
        assert_eq!(set.front_snapshot(), vec![1, 2]);
        assert_eq!(set.pending_len(), 0);
    }

    #[test]
    fn test_swap_clears_back() {
        let set = BufferedSet::new("dbg");
        set.put(1);
        set.swap();
        set.put(2);
        // published batch is unaffected by later puts
        assert_eq!(set.front_snapshot(), vec![1]);

        set.swap();
        assert_eq!(set.front_snapshot(), vec![2]);

        // swapping with an empty back publishes an empty batch
        set.swap();
        assert!(set.front_snapshot().is_empty());
        assert_eq!(set.front_len(), 0);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let set = BufferedSet::new("dbg");
        set.put(String::from("a"));
        set.swap();
        let mut snapshot = set.front_snapshot();
        snapshot.push(String::from("b"));
        assert_eq!(set.front_snapshot(), vec![String::from("a")]);
    }

    #[test]
    fn test_visibility() {
        let set: BufferedSet<u32> = BufferedSet::with_visibility("hidden", false);
        assert!(!set.is_visible());
        set.set_visible(true);
        assert!(set.is_visible());
        assert_eq!(set.name(), "hidden");
    }

    /// Writer publishes batches [k*B .. k*B+B); every snapshot must be one whole batch.
    #[test]
    fn test_no_tearing_across_threads() {
        const BATCH: u32 = 50;
        const BATCHES: u32 = 400;

        let set = Arc::new(BufferedSet::new("stress"));
        let writer = {
            let set = set.clone();
            std::thread::spawn(move || {
                for k in 0..BATCHES {
                    for i in 0..BATCH {
                        set.put(k * BATCH + i);
                    }
                    set.swap();
                }
            })
        };

        let mut seen = 0;
        while !writer.is_finished() || seen == 0 {
            let snapshot = set.front_snapshot();
            if snapshot.is_empty() {
                continue;
            }
            assert_eq!(snapshot.len(), BATCH as usize);
            let first = snapshot[0];
            assert_eq!(first % BATCH, 0);
            for (i, v) in snapshot.iter().enumerate() {
                assert_eq!(*v, first + i as u32);
            }
            seen += 1;
        }
        writer.join().unwrap();

        let last = set.front_snapshot();
        assert_eq!(last[0], (BATCHES - 1) * BATCH);
    }
}
