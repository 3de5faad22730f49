//! Latest-Frame Store
//!
//! Holds the most recently published encoded still frame. One writer (the
//! capture thread) replaces the slot, any number of readers (HTTP handlers)
//! take cheap snapshots of it.

mod store;

pub use store::FrameStore;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Encoded still frame held in the store
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// JPEG bytes, immutable once published
    pub data: Bytes,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Per-store publish counter, starting at 1
    pub sequence: u64,
    /// Wall clock time of publication (ms since epoch)
    pub timestamp_ms: u64,
}

impl EncodedFrame {
    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Metadata view without the payload
    pub fn info(&self) -> FrameInfo {
        FrameInfo {
            sequence: self.sequence,
            width: self.width,
            height: self.height,
            timestamp_ms: self.timestamp_ms,
            size_bytes: self.data.len(),
        }
    }
}

/// Frame metadata exposed over the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: u64,
    pub size_bytes: usize,
}
