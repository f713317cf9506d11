// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Chunked bump allocator backing every matrix in the process.
//!
//! Matrices created during a forward pass are small, predictable, and die
//! together at generation boundaries, so the arena never frees individual
//! blocks: [`MatrixArena::release`] is a documented no-op and reclamation
//! happens wholesale through [`MatrixArena::release_all`]. Allocation is a
//! first-fit scan over the open chunks followed by a pointer bump, which
//! keeps the steady-state cost at a couple of compares.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::{self, NonNull};
use std::sync::{Mutex, MutexGuard, OnceLock};

use tracing::error;

use crate::bytes::HumanSize;
use crate::error::{TensorError, TensorResult};

/// Chunk allocations are aligned generously enough for `f64` storage and for
/// SIMD loads over `f32` rows.
const CHUNK_ALIGN: usize = 16;

/// Default growth quantum. Large enough that a 784-input MNIST topology runs
/// whole generations without touching the system allocator.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// One contiguous backing buffer. `end` counts carved bytes; the bytes in
/// `[end, capacity)` are still available.
struct Chunk {
    base: NonNull<u8>,
    end: usize,
    capacity: usize,
}

impl Chunk {
    fn available(&self) -> usize {
        self.capacity - self.end
    }
}

// Chunks are uniquely owned heap allocations; the pointer never aliases
// another chunk and is only dereferenced through carved, disjoint ranges.
unsafe impl Send for Chunk {}

/// Process-wide bump allocator for matrix storage.
///
/// Carving is byte-granular: a request for `n` bytes consumes exactly `n`
/// bytes of a chunk. Handed-out pointers stay element-aligned because every
/// matrix in a process shares one element type, so all request sizes are
/// multiples of that element's width (chunk bases are 16-byte aligned).
pub struct MatrixArena {
    chunk_size: usize,
    open: Vec<Chunk>,
    full: Vec<Chunk>,
}

static GLOBAL: OnceLock<Mutex<MatrixArena>> = OnceLock::new();

impl MatrixArena {
    /// Creates an empty arena with the default chunk size. No memory is
    /// reserved until the first allocation.
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            open: Vec::new(),
            full: Vec::new(),
        }
    }

    /// Locks the process-wide arena, creating it lazily on first use.
    ///
    /// Matrix construction routes through this accessor. The mutex also
    /// serialises allocation, so callers that evaluate on worker threads must
    /// still allocate their scratch up front to keep the hot path lock-free.
    pub fn global() -> MutexGuard<'static, MatrixArena> {
        GLOBAL
            .get_or_init(|| Mutex::new(MatrixArena::new()))
            .lock()
            .expect("matrix arena poisoned")
    }

    /// Sets the growth quantum used when a new chunk is reserved.
    pub fn configure(&mut self, chunk_size: usize) {
        self.chunk_size = chunk_size;
    }

    /// Appends a fresh chunk of exactly `size` bytes to the open list.
    /// A zero-size reservation is a no-op.
    pub fn reserve(&mut self, size: usize) -> TensorResult<()> {
        if size == 0 {
            return Ok(());
        }
        let layout = Layout::from_size_align(size, CHUNK_ALIGN).map_err(|_| {
            TensorError::InvalidDimensions {
                rows: size,
                cols: 1,
            }
        })?;
        let raw = unsafe { alloc(layout) };
        let Some(base) = NonNull::new(raw) else {
            let err = TensorError::OutOfMemory {
                requested: size,
                allocated: self.allocated_size(),
                wasted: self.wasted_size(),
            };
            error!(
                requested = %HumanSize::new(size as f64),
                allocated = %HumanSize::new(self.allocated_size() as f64),
                wasted = %HumanSize::new(self.wasted_size() as f64),
                "matrix arena failed to reserve a chunk"
            );
            return Err(err);
        };
        self.open.push(Chunk {
            base,
            end: 0,
            capacity: size,
        });
        Ok(())
    }

    /// Returns a pointer to `size` contiguous uninitialised bytes.
    ///
    /// A zero-size request returns the null sentinel without touching any
    /// chunk. When no open chunk can host the request, a new chunk of
    /// `max(chunk_size, size)` bytes is reserved, so a single oversized
    /// matrix gets a dedicated chunk rather than failing.
    pub fn allocate(&mut self, size: usize) -> TensorResult<*mut u8> {
        if size == 0 {
            return Ok(ptr::null_mut());
        }

        loop {
            for i in 0..self.open.len() {
                if size <= self.open[i].available() {
                    let chunk = &mut self.open[i];
                    let out = unsafe { chunk.base.as_ptr().add(chunk.end) };
                    chunk.end += size;

                    if chunk.available() == 0 {
                        let exhausted = self.open.remove(i);
                        self.full.push(exhausted);
                    }

                    return Ok(out);
                }
            }

            self.reserve(self.chunk_size.max(size))?;
        }
    }

    /// No-op. Individual blocks are never reclaimed; freeing is all-or-nothing
    /// through [`MatrixArena::release_all`].
    pub fn release(&mut self, _ptr: *mut u8, _size: usize) {}

    /// Frees every chunk and clears both lists.
    ///
    /// Every pointer previously returned by [`MatrixArena::allocate`] becomes
    /// dangling; callers must ensure no live matrix still views arena bytes.
    pub fn release_all(&mut self) {
        for chunk in self.full.drain(..).chain(self.open.drain(..)) {
            let layout = Layout::from_size_align(chunk.capacity, CHUNK_ALIGN)
                .expect("chunk layout was validated at reserve time");
            unsafe { dealloc(chunk.base.as_ptr(), layout) };
        }
    }

    /// Total bytes held across all chunks.
    pub fn allocated_size(&self) -> usize {
        self.open
            .iter()
            .chain(self.full.iter())
            .map(|c| c.capacity)
            .sum()
    }

    /// Bytes reserved but not yet carved. Full chunks contribute nothing, so
    /// a persistently high figure means `chunk_size` is tuned too coarsely.
    pub fn wasted_size(&self) -> usize {
        self.open.iter().map(|c| c.available()).sum()
    }

    #[cfg(test)]
    fn open_chunks(&self) -> usize {
        self.open.len()
    }

    #[cfg(test)]
    fn full_chunks(&self) -> usize {
        self.full.len()
    }
}

impl Default for MatrixArena {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MatrixArena {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_allocation_is_null_and_reserves_nothing() {
        let mut arena = MatrixArena::new();
        let p = arena.allocate(0).unwrap();
        assert!(p.is_null());
        assert_eq!(arena.allocated_size(), 0);
        assert_eq!(arena.open_chunks(), 0);
    }

    #[test]
    fn chunk_rollover_and_full_migration() {
        let mut arena = MatrixArena::new();
        arena.configure(1024);

        arena.allocate(1000).unwrap();
        arena.allocate(20).unwrap();
        assert_eq!(arena.open_chunks(), 1);
        assert_eq!(arena.full_chunks(), 0);
        assert_eq!(arena.wasted_size(), 4);

        // 4 bytes left in the first chunk; this request must open a second.
        arena.allocate(10).unwrap();
        assert_eq!(arena.open_chunks(), 2);
        assert_eq!(arena.full_chunks(), 0);
        assert_eq!(arena.allocated_size(), 2048);

        // Only an allocation that consumes the last byte migrates a chunk.
        arena.allocate(4).unwrap();
        assert_eq!(arena.full_chunks(), 1);
        assert_eq!(arena.open_chunks(), 1);
    }

    #[test]
    fn oversized_request_gets_a_dedicated_chunk() {
        let mut arena = MatrixArena::new();
        arena.configure(64);
        arena.allocate(1000).unwrap();
        assert_eq!(arena.allocated_size(), 1000);
    }

    #[test]
    fn carved_bytes_match_the_accounting() {
        let mut arena = MatrixArena::new();
        arena.configure(256);
        let mut carved = 0usize;
        for size in [16, 64, 200, 8, 120, 32] {
            arena.allocate(size).unwrap();
            carved += size;
        }
        assert_eq!(arena.allocated_size() - arena.wasted_size(), carved);
    }

    #[test]
    fn release_is_a_no_op() {
        let mut arena = MatrixArena::new();
        arena.configure(128);
        let p = arena.allocate(64).unwrap();
        let before = (arena.allocated_size(), arena.wasted_size());
        arena.release(p, 64);
        assert_eq!((arena.allocated_size(), arena.wasted_size()), before);
    }

    #[test]
    fn release_all_clears_every_chunk() {
        let mut arena = MatrixArena::new();
        arena.configure(128);
        arena.allocate(128).unwrap();
        arena.allocate(100).unwrap();
        arena.release_all();
        assert_eq!(arena.allocated_size(), 0);
        assert_eq!(arena.wasted_size(), 0);
        // The arena remains usable afterwards.
        arena.allocate(32).unwrap();
        assert_eq!(arena.allocated_size(), 128);
    }

    #[test]
    fn allocations_are_element_aligned() {
        let mut arena = MatrixArena::new();
        arena.configure(256);
        let a = arena.allocate(64).unwrap();
        let b = arena.allocate(8).unwrap();
        assert_eq!(a as usize % CHUNK_ALIGN, 0);
        assert_eq!(b as usize % 8, 0);
    }
}
