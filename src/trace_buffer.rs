//! `TraceChunk` storage and the two `TraceBuffer` policies (`fixed`,
//! `ring`) that hand chunks out to tenants.
//!
//! Chunk ownership crosses thread boundaries through raw pointers rather
//! than Rust references: exclusivity is enforced by `ChunkLock`, not by the
//! borrow checker, exactly as in the thread-local-tenant-with-back-pointer
//! design this crate follows.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_queue::ArrayQueue;

use crate::error::PhosphorError;
use crate::stats::StatsCallback;
use crate::trace_event::TraceEvent;

pub const PAGE_SIZE: usize = 4096;
pub const ARRAY_OFFSET: usize = 64;
pub const CHUNK_CAPACITY: usize = (PAGE_SIZE - ARRAY_OFFSET) / std::mem::size_of::<TraceEvent>();

/// A fixed-capacity array of events, owned by one producer tenant at a
/// time. Trivially resettable: `reset` only needs to rewind `next_free`
/// since `TraceEvent` carries no heap-owned state.
pub struct TraceChunk {
    next_free: u16,
    thread_id: u32,
    events: [MaybeUninit<TraceEvent>; CHUNK_CAPACITY],
}

impl TraceChunk {
    fn new() -> Self {
        TraceChunk {
            next_free: 0,
            thread_id: 0,
            events: std::array::from_fn(|_| MaybeUninit::uninit()),
        }
    }

    pub fn reset(&mut self, thread_id: u32) {
        self.next_free = 0;
        self.thread_id = thread_id;
    }

    pub fn is_full(&self) -> bool {
        self.next_free as usize == CHUNK_CAPACITY
    }

    pub fn count(&self) -> usize {
        self.next_free as usize
    }

    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    /// Appends `event`, returning a reference to the stored copy.
    ///
    /// Calling this when `is_full()` is a logic error: the fast path never
    /// does so because `replace_chunk` is interposed first.
    pub fn add_event(&mut self, event: TraceEvent) -> &TraceEvent {
        debug_assert!(!self.is_full(), "add_event called on a full chunk");
        let slot = &mut self.events[self.next_free as usize];
        slot.write(event);
        self.next_free += 1;
        unsafe { self.events[self.next_free as usize - 1].assume_init_ref() }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraceEvent> {
        self.events[..self.count()]
            .iter()
            .map(|slot| unsafe { slot.assume_init_ref() })
    }
}

impl std::ops::Index<usize> for TraceChunk {
    type Output = TraceEvent;

    fn index(&self, index: usize) -> &TraceEvent {
        debug_assert!(index < self.count());
        unsafe { self.events[index].assume_init_ref() }
    }
}

/// The mode a concrete `TraceBuffer` implements. `Custom` exists for
/// embedders supplying their own buffer via a factory and is never
/// reachable from a config string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    Custom,
    Fixed,
    Ring,
}

impl FromStr for BufferMode {
    type Err = PhosphorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(BufferMode::Fixed),
            "ring" => Ok(BufferMode::Ring),
            "custom" => Ok(BufferMode::Custom),
            other => Err(PhosphorError::InvalidArgument(format!(
                "unknown buffer-mode '{other}'"
            ))),
        }
    }
}

impl fmt::Display for BufferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BufferMode::Custom => "custom",
            BufferMode::Fixed => "fixed",
            BufferMode::Ring => "ring",
        };
        f.write_str(s)
    }
}

/// Shared contract for a pool of `TraceChunk`s. Not thread-safe to iterate
/// while chunks are loaned out — callers must only do so after `stop()`.
pub trait TraceBuffer: Send + Sync {
    fn get_chunk(&self, thread_id: u32) -> Option<*mut TraceChunk>;
    fn return_chunk(&self, chunk: *mut TraceChunk);
    fn is_full(&self) -> bool;
    fn chunk_count(&self) -> usize;
    fn generation(&self) -> usize;
    fn buffer_mode(&self) -> BufferMode;
    fn stats(&self, cb: &mut dyn StatsCallback);

    /// Valid only when no chunks are loaned out.
    fn chunks(&self) -> &[TraceChunk];
}

/// Wrapper making a raw chunk pointer safe to move across the queue's
/// internal synchronization; the pointed-to chunk is only ever touched by
/// whichever thread currently holds it out on loan.
#[derive(Clone, Copy)]
struct ChunkPtr(*mut TraceChunk);
unsafe impl Send for ChunkPtr {}

fn backing_store(capacity: usize) -> Box<[UnsafeCell<TraceChunk>]> {
    (0..capacity)
        .map(|_| UnsafeCell::new(TraceChunk::new()))
        .collect()
}

/// Never reuses chunks: `get_chunk` returns `None` once `capacity` chunks
/// have been issued, and stays that way ("stop when full").
pub struct FixedTraceBuffer {
    generation: usize,
    capacity: usize,
    chunks: Box<[UnsafeCell<TraceChunk>]>,
    issued: AtomicUsize,
    loaned: AtomicUsize,
    total_loaned: AtomicUsize,
}

unsafe impl Send for FixedTraceBuffer {}
unsafe impl Sync for FixedTraceBuffer {}

impl FixedTraceBuffer {
    pub fn new(generation: usize, capacity: usize) -> Self {
        FixedTraceBuffer {
            generation,
            capacity,
            chunks: backing_store(capacity),
            issued: AtomicUsize::new(0),
            loaned: AtomicUsize::new(0),
            total_loaned: AtomicUsize::new(0),
        }
    }
}

impl TraceBuffer for FixedTraceBuffer {
    fn get_chunk(&self, thread_id: u32) -> Option<*mut TraceChunk> {
        let idx = self.issued.fetch_add(1, Ordering::AcqRel);
        if idx >= self.capacity {
            return None;
        }
        let chunk = unsafe { &mut *self.chunks[idx].get() };
        chunk.reset(thread_id);
        self.loaned.fetch_add(1, Ordering::AcqRel);
        self.total_loaned.fetch_add(1, Ordering::Relaxed);
        Some(chunk as *mut TraceChunk)
    }

    fn return_chunk(&self, _chunk: *mut TraceChunk) {
        self.loaned.fetch_sub(1, Ordering::AcqRel);
    }

    fn is_full(&self) -> bool {
        self.issued.load(Ordering::Acquire) >= self.capacity
    }

    fn chunk_count(&self) -> usize {
        self.issued.load(Ordering::Acquire).min(self.capacity)
    }

    fn generation(&self) -> usize {
        self.generation
    }

    fn buffer_mode(&self) -> BufferMode {
        BufferMode::Fixed
    }

    fn stats(&self, cb: &mut dyn StatsCallback) {
        cb.record("buffer_name", "fixed".into());
        cb.record("buffer_is_full", self.is_full().into());
        cb.record("buffer_chunk_count", self.chunk_count().into());
        cb.record("buffer_total_loaned", self.total_loaned.load(Ordering::Relaxed).into());
        cb.record("buffer_loaned_chunks", self.loaned.load(Ordering::Relaxed).into());
        cb.record("buffer_size", self.capacity.into());
        cb.record("buffer_generation", self.generation.into());
    }

    fn chunks(&self) -> &[TraceChunk] {
        let count = self.chunk_count();
        unsafe { std::slice::from_raw_parts(self.chunks.as_ptr() as *const TraceChunk, count) }
    }
}

/// Reuses chunks via a bounded MPMC return queue once the full capacity has
/// been issued at least once. `get_chunk` never returns `None`.
pub struct RingTraceBuffer {
    generation: usize,
    capacity: usize,
    chunks: Box<[UnsafeCell<TraceChunk>]>,
    issued: AtomicUsize,
    loaned: AtomicUsize,
    total_loaned: AtomicUsize,
    returned: ArrayQueue<ChunkPtr>,
}

unsafe impl Send for RingTraceBuffer {}
unsafe impl Sync for RingTraceBuffer {}

impl RingTraceBuffer {
    pub fn new(generation: usize, capacity: usize) -> Self {
        let queue_capacity = capacity.max(1).next_power_of_two();
        RingTraceBuffer {
            generation,
            capacity,
            chunks: backing_store(capacity),
            issued: AtomicUsize::new(0),
            loaned: AtomicUsize::new(0),
            total_loaned: AtomicUsize::new(0),
            returned: ArrayQueue::new(queue_capacity),
        }
    }
}

impl TraceBuffer for RingTraceBuffer {
    fn get_chunk(&self, thread_id: u32) -> Option<*mut TraceChunk> {
        let idx = self.issued.fetch_add(1, Ordering::AcqRel);
        let chunk = if idx < self.capacity {
            unsafe { &mut *self.chunks[idx].get() }
        } else {
            loop {
                if let Some(ChunkPtr(ptr)) = self.returned.pop() {
                    break unsafe { &mut *ptr };
                }
                std::hint::spin_loop();
            }
        };
        chunk.reset(thread_id);
        self.loaned.fetch_add(1, Ordering::AcqRel);
        self.total_loaned.fetch_add(1, Ordering::Relaxed);
        Some(chunk as *mut TraceChunk)
    }

    fn return_chunk(&self, chunk: *mut TraceChunk) {
        self.loaned.fetch_sub(1, Ordering::AcqRel);
        // The queue is sized to the buffer so this should never spin more
        // than once; belt-and-braces per the ring buffer's liveness note.
        let mut ptr = ChunkPtr(chunk);
        while let Err(back) = self.returned.push(ptr) {
            ptr = back;
            std::hint::spin_loop();
        }
    }

    fn is_full(&self) -> bool {
        false
    }

    fn chunk_count(&self) -> usize {
        self.issued.load(Ordering::Acquire).min(self.capacity)
    }

    fn generation(&self) -> usize {
        self.generation
    }

    fn buffer_mode(&self) -> BufferMode {
        BufferMode::Ring
    }

    fn stats(&self, cb: &mut dyn StatsCallback) {
        cb.record("buffer_name", "ring".into());
        cb.record("buffer_is_full", self.is_full().into());
        cb.record("buffer_chunk_count", self.chunk_count().into());
        cb.record("buffer_total_loaned", self.total_loaned.load(Ordering::Relaxed).into());
        cb.record("buffer_loaned_chunks", self.loaned.load(Ordering::Relaxed).into());
        cb.record("buffer_size", self.capacity.into());
        cb.record("buffer_generation", self.generation.into());
    }

    fn chunks(&self) -> &[TraceChunk] {
        let count = self.chunk_count();
        unsafe { std::slice::from_raw_parts(self.chunks.as_ptr() as *const TraceChunk, count) }
    }
}
