//! Per-thread (or shared) holder of a current chunk plus its lock and an
//! "initialised" flag.
//!
//! `chunk` is mutated only while one of `lock`'s two sides is held (slave
//! side on the logging fast path and in `replace_chunk`, master side
//! during eviction) or while the owning `TraceLog`'s lifecycle lock is held
//! (registration). The lock — not the borrow checker — is what makes
//! concurrent access to `chunk` sound here.

use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::chunk_lock::ChunkLock;
use crate::trace_buffer::TraceChunk;

pub struct ChunkTenant {
    pub lock: ChunkLock,
    chunk: UnsafeCell<Option<NonNull<TraceChunk>>>,
    pub initialised: AtomicBool,
}

unsafe impl Send for ChunkTenant {}
unsafe impl Sync for ChunkTenant {}

impl ChunkTenant {
    pub fn new() -> Self {
        ChunkTenant {
            lock: ChunkLock::new(),
            chunk: UnsafeCell::new(None),
            initialised: AtomicBool::new(false),
        }
    }

    /// # Safety
    /// Caller must hold `lock` (either side) or the owning `TraceLog`'s
    /// lifecycle lock.
    pub unsafe fn chunk(&self) -> Option<NonNull<TraceChunk>> {
        unsafe { *self.chunk.get() }
    }

    /// # Safety
    /// Same requirement as [`Self::chunk`].
    pub unsafe fn set_chunk(&self, chunk: Option<NonNull<TraceChunk>>) {
        unsafe {
            *self.chunk.get() = chunk;
        }
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised.load(Ordering::Acquire)
    }
}

impl Default for ChunkTenant {
    fn default() -> Self {
        Self::new()
    }
}
