//! Sample chunks and the chunk pool shared by the replay thread and the tick handler
//!
//! The pool is a fixed set of `depth` chunks cycled through two lock-free SPSC
//! queues:
//!
//! ```text
//!            ┌──────────── free queue ────────────┐
//!            ↓                                     │
//!   FillSide::checkout() → fill → FillSide::deliver()
//!                                         ↓
//!                                  filled queue
//!                                         ↓
//!   ConsumeSide::take_filled() → copy into tick buffer → ConsumeSide::release()
//! ```
//!
//! A chunk is a uniquely owned value: it is either in one of the queues, held by
//! the replay thread while filling, or held by the tick handler while draining.
//! No chunk is ever visible to both sides at once.

use super::source::SampleSource;
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Fixed-capacity buffer of C8 sample bytes
pub struct SampleChunk {
    /// Pool slot this chunk belongs to
    slot: usize,
    data: Box<[u8]>,
    /// Valid bytes from the last fill
    len: usize,
    /// Sequence number of the fill that produced the current contents
    fill_seq: u64,
}

impl SampleChunk {
    fn new(slot: usize, capacity: usize) -> Self {
        Self {
            slot,
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
            fill_seq: 0,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn fill_seq(&self) -> u64 {
        self.fill_seq
    }

    /// Valid sample bytes
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Read from `source` until the chunk is full or the source reports end of stream
    ///
    /// Returns the number of valid bytes. Zero means the source was already exhausted.
    /// On error the chunk contents are invalidated.
    pub(crate) fn fill_from(&mut self, source: &mut dyn SampleSource, fill_seq: u64) -> io::Result<usize> {
        self.len = 0;
        while self.len < self.data.len() {
            match source.read(&mut self.data[self.len..]) {
                Ok(0) => break,
                Ok(n) => self.len += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.len = 0;
                    return Err(e);
                }
            }
        }
        self.fill_seq = fill_seq;
        Ok(self.len)
    }
}

impl std::fmt::Debug for SampleChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleChunk")
            .field("slot", &self.slot)
            .field("capacity", &self.data.len())
            .field("len", &self.len)
            .field("fill_seq", &self.fill_seq)
            .finish()
    }
}

/// State visible to both sides of the pool
#[derive(Debug)]
struct PoolShared {
    depth: usize,
    chunk_size: usize,
    /// Set by the replay thread once its initial prefill is done
    primed: AtomicBool,
}

/// Create a pool of `depth` chunks of `chunk_size` bytes, all initially free
pub fn chunk_pool(depth: usize, chunk_size: usize) -> (FillSide, ConsumeSide) {
    debug!("Creating chunk pool: depth={}, chunk_size={} bytes", depth, chunk_size);

    // Both queues can hold the whole pool, so a push never fails
    let (mut free_prod, free_cons) = HeapRb::<SampleChunk>::new(depth).split();
    let (filled_prod, filled_cons) = HeapRb::<SampleChunk>::new(depth).split();

    for slot in 0..depth {
        let _ = free_prod.try_push(SampleChunk::new(slot, chunk_size));
    }

    let shared = Arc::new(PoolShared {
        depth,
        chunk_size,
        primed: AtomicBool::new(false),
    });

    (
        FillSide {
            free: free_cons,
            filled: filled_prod,
            spare: None,
            shared: Arc::clone(&shared),
        },
        ConsumeSide {
            filled: filled_cons,
            free: free_prod,
            shared,
        },
    )
}

/// Producer half of the pool, owned by whichever replay thread is current
///
/// Survives the replay thread: a finished thread hands it back so the next one
/// continues filling the same pool.
pub struct FillSide {
    free: HeapCons<SampleChunk>,
    filled: HeapProd<SampleChunk>,
    /// Chunk checked out but not delivered (end of file or read error)
    spare: Option<SampleChunk>,
    shared: Arc<PoolShared>,
}

impl FillSide {
    /// Take a free chunk for filling
    pub fn checkout(&mut self) -> Option<SampleChunk> {
        self.spare.take().or_else(|| self.free.try_pop())
    }

    /// Hand a filled chunk to the consumer
    pub fn deliver(&mut self, chunk: SampleChunk) {
        if let Err(chunk) = self.filled.try_push(chunk) {
            // Unreachable with queue capacity == pool depth; keep the chunk rather than lose it
            self.spare = Some(chunk);
        }
    }

    /// Return a chunk that was checked out but not delivered
    pub fn put_back(&mut self, chunk: SampleChunk) {
        self.spare = Some(chunk);
    }

    /// Chunks available for filling right now
    pub fn free_count(&self) -> usize {
        self.free.occupied_len() + usize::from(self.spare.is_some())
    }

    pub fn mark_primed(&self) {
        self.shared.primed.store(true, Ordering::Release);
    }

    pub fn depth(&self) -> usize {
        self.shared.depth
    }

    pub fn chunk_size(&self) -> usize {
        self.shared.chunk_size
    }
}

impl std::fmt::Debug for FillSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FillSide")
            .field("depth", &self.shared.depth)
            .field("free", &self.free_count())
            .field("delivered", &self.filled.occupied_len())
            .finish()
    }
}

/// Consumer half of the pool, owned by the tick handler
pub struct ConsumeSide {
    filled: HeapCons<SampleChunk>,
    free: HeapProd<SampleChunk>,
    shared: Arc<PoolShared>,
}

impl ConsumeSide {
    /// Next delivered chunk, if any
    pub fn take_filled(&mut self) -> Option<SampleChunk> {
        self.filled.try_pop()
    }

    /// Return a drained chunk to the free queue
    pub fn release(&mut self, chunk: SampleChunk) {
        // Capacity equals the pool depth, so this cannot overflow
        let _ = self.free.try_push(chunk);
    }

    /// Delivered chunks waiting to be consumed
    pub fn queued(&self) -> usize {
        self.filled.occupied_len()
    }

    /// Valid bytes across all delivered chunks
    pub fn queued_bytes(&self) -> usize {
        self.filled.iter().map(SampleChunk::len).sum()
    }

    pub fn is_primed(&self) -> bool {
        self.shared.primed.load(Ordering::Acquire)
    }

    pub fn depth(&self) -> usize {
        self.shared.depth
    }

    pub fn chunk_size(&self) -> usize {
        self.shared.chunk_size
    }
}

impl std::fmt::Debug for ConsumeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumeSide")
            .field("depth", &self.shared.depth)
            .field("queued", &self.queued())
            .field("primed", &self.is_primed())
            .finish()
    }
}
