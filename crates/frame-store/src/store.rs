//! Frame Store Implementation

use crate::EncodedFrame;
use arc_swap::ArcSwapOption;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Single-slot store for the latest encoded frame.
///
/// Publishing builds a complete immutable [`EncodedFrame`] first and then
/// swaps the pointer, so a reader sees either the old frame or the new one,
/// never a mix of both.
pub struct FrameStore {
    /// Current frame snapshot
    slot: ArcSwapOption<EncodedFrame>,
    /// Last sequence number handed out
    sequence: AtomicU64,
    /// Total frames published (survives `clear`)
    total_published: AtomicU64,
}

impl FrameStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            slot: ArcSwapOption::empty(),
            sequence: AtomicU64::new(0),
            total_published: AtomicU64::new(0),
        }
    }

    /// Replace the current frame and return its sequence number
    pub fn publish(&self, data: impl Into<Bytes>, width: u32, height: u32) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        let frame = EncodedFrame {
            data: data.into(),
            width,
            height,
            sequence,
            timestamp_ms: now_ms(),
        };

        self.slot.store(Some(Arc::new(frame)));
        self.total_published.fetch_add(1, Ordering::Relaxed);
        sequence
    }

    /// Snapshot of the current frame, if any
    pub fn latest(&self) -> Option<Arc<EncodedFrame>> {
        self.slot.load_full()
    }

    /// Drop the current frame
    pub fn clear(&self) {
        if self.slot.swap(None).is_some() {
            debug!("Frame store cleared");
        }
    }

    /// Check whether a frame is available
    pub fn is_empty(&self) -> bool {
        self.slot.load().is_none()
    }

    /// Total frames published over the store's lifetime
    pub fn total_published(&self) -> u64 {
        self.total_published.load(Ordering::Relaxed)
    }
}

impl Default for FrameStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameStore")
            .field("latest", &self.latest().map(|frame| frame.info()))
            .field("total_published", &self.total_published())
            .finish()
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    #[test]
    fn test_empty_store() {
        let store = FrameStore::new();
        assert!(store.is_empty());
        assert!(store.latest().is_none());
        assert_eq!(store.total_published(), 0);
    }

    #[test]
    fn test_publish_and_read() {
        let store = FrameStore::new();

        let first = store.publish(vec![1u8, 2, 3], 640, 480);
        let second = store.publish(vec![4u8, 5], 480, 640);
        assert_eq!(first, 1);
        assert_eq!(second, 2);

        let frame = store.latest().unwrap();
        assert_eq!(frame.data.as_ref(), &[4, 5]);
        assert_eq!(frame.width, 480);
        assert_eq!(frame.height, 640);
        assert_eq!(frame.sequence, 2);
        assert_eq!(store.total_published(), 2);
    }

    #[test]
    fn test_clear_keeps_sequence() {
        let store = FrameStore::new();
        store.publish(vec![0u8; 4], 2, 2);
        store.clear();
        assert!(store.is_empty());

        // Sequence keeps increasing after a clear
        assert_eq!(store.publish(vec![0u8; 4], 2, 2), 2);
    }

    #[test]
    fn test_readers_keep_old_snapshot() {
        let store = FrameStore::new();
        store.publish(vec![7u8; 8], 1, 1);
        let held = store.latest().unwrap();

        store.publish(vec![9u8; 16], 1, 1);
        assert_eq!(held.data.len(), 8);
        assert!(held.data.iter().all(|b| *b == 7));
    }

    /// Frame `n` is `n % 251 + 1` repeated `64 + n % 97` times, so a reader
    /// can tell a whole frame from a torn one without extra bookkeeping.
    fn pattern(n: u64) -> Vec<u8> {
        vec![(n % 251) as u8 + 1; 64 + (n % 97) as usize]
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_frames() {
        let store = Arc::new(FrameStore::new());
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let done = done.clone();
                thread::spawn(move || {
                    let mut observed = 0usize;
                    while !done.load(Ordering::Acquire) {
                        if let Some(frame) = store.latest() {
                            let n = frame.width as u64;
                            assert_eq!(frame.data.as_ref(), pattern(n).as_slice());
                            observed += 1;
                        }
                    }
                    observed
                })
            })
            .collect();

        for n in 0..5_000u64 {
            // The width carries the generator index for verification
            store.publish(pattern(n), n as u32, 1);
        }
        done.store(true, Ordering::Release);

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.total_published(), 5_000);
        assert_eq!(store.latest().unwrap().width, 4_999);
    }
}
