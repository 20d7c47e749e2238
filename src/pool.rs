//------------ LinPool -------------------------------------------------------

//! A linear (bump) scratch allocator.
//!
//! Filters get a `LinPool` to build temporary data in while they run. The
//! pool only ever grows, until it is flushed as a whole. The route table
//! engine flushes it when the outermost update returns, and after every
//! network during an initial feed, so the pool's peak size is bound by
//! the work done for a single network, not by the size of the table.

use log::trace;

pub const DEFAULT_CHUNK_SIZE: usize = 4080;

#[derive(Debug)]
pub struct LinPool {
    chunk_size: usize,
    chunks: Vec<Box<[u8]>>,
    // index of the chunk that is being allocated from
    current: usize,
    // bytes used in the current chunk
    used: usize,
    // bytes handed out since the last flush
    allocated: usize,
    peak: usize,
    flushes: usize,
}

impl Default for LinPool {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl LinPool {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunks: Vec::new(),
            current: 0,
            used: 0,
            allocated: 0,
            peak: 0,
            flushes: 0,
        }
    }

    /// Hand out `size` zeroed bytes, valid until the next flush.
    pub fn alloc(&mut self, size: usize) -> &mut [u8] {
        self.allocated += size;
        self.peak = self.peak.max(self.allocated);

        // Requests larger than a chunk get a chunk of their own, that is
        // slotted in before the current chunk, so the remainder of the
        // current chunk stays usable.
        if size > self.chunk_size {
            let pos = self.current.min(self.chunks.len());
            self.chunks.insert(pos, vec![0; size].into_boxed_slice());
            self.current = pos + 1;
            return match self.chunks.get_mut(pos) {
                Some(chunk) => chunk.as_mut(),
                None => &mut [],
            };
        }

        let fits = self
            .chunks
            .get(self.current)
            .is_some_and(|c| c.len() - self.used >= size);
        if !fits {
            if self.chunks.get(self.current).is_some() {
                self.current += 1;
            }
            if self.chunks.get(self.current).is_none() {
                trace!("linpool: new chunk of {} bytes", self.chunk_size);
                self.chunks
                    .push(vec![0; self.chunk_size].into_boxed_slice());
                self.current = self.chunks.len() - 1;
            }
            self.used = 0;
        }

        let start = self.used;
        self.used += size;
        match self
            .chunks
            .get_mut(self.current)
            .and_then(|c| c.get_mut(start..start + size))
        {
            Some(bytes) => {
                bytes.fill(0);
                bytes
            }
            None => &mut [],
        }
    }

    /// Copy `data` into the pool.
    pub fn alloc_copy(&mut self, data: &[u8]) -> &mut [u8] {
        let bytes = self.alloc(data.len());
        bytes.copy_from_slice(data);
        bytes
    }

    /// Forget about everything allocated so far. Regular sized chunks are
    /// kept around for reuse, oversized ones are dropped.
    pub fn flush(&mut self) {
        if self.allocated > 0 {
            trace!("linpool: flush {} bytes", self.allocated);
        }
        let chunk_size = self.chunk_size;
        self.chunks.retain(|c| c.len() == chunk_size);
        self.current = 0;
        self.used = 0;
        self.allocated = 0;
        self.flushes += 1;
    }

    /// The number of bytes handed out since the last flush.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// The largest value `allocated` has ever had.
    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// The memory held by the pool, in bytes.
    pub fn capacity(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }
}
