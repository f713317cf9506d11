// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Range-coalescing sub-allocator over large device buffer pages.
//!
//! wgpu allocations are expensive and bind-group offsets need alignment, so
//! the pool reserves 16 MiB pages per usage class and carves aligned ranges
//! out of per-page free lists. A carve splits a free range into up to three
//! parts (left residue, carved block, right residue); a release re-inserts
//! the range and merges neighbours. Unlike the CPU arena this allocator
//! genuinely frees; the two deliberately share nothing.

use std::sync::mpsc;
use std::sync::Arc;

use tracing::warn;

use crate::GpuError;

/// Default page size for fresh device allocations.
pub const DEFAULT_PAGE_SIZE: u64 = 16 * 1024 * 1024;

/// Offset alignment safe for storage and uniform bindings on every backend
/// wgpu currently ships.
pub const STORAGE_BINDING_ALIGN: u64 = 256;

/// A free span inside one page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Range {
    pub offset: u64,
    pub size: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RangeMode {
    ByOffset,
    BySize,
}

fn align_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

/// Splits `range` into (left residue, carved, right residue) if an aligned
/// block of `size` bytes fits.
fn split_range(range: Range, size: u64, align: u64) -> Option<(Range, Range, Range)> {
    let aligned = align_up(range.offset, align);
    let padding = aligned - range.offset;
    if range.size < padding + size {
        return None;
    }
    let left = Range {
        offset: range.offset,
        size: padding,
    };
    let carved = Range {
        offset: aligned,
        size,
    };
    let right = Range {
        offset: aligned + size,
        size: range.size - padding - size,
    };
    Some((left, carved, right))
}

/// The free ranges of one page, kept sorted by offset or by size depending
/// on what the next operation needs.
#[derive(Debug)]
struct FreeList {
    ranges: Vec<Range>,
    mode: RangeMode,
}

impl FreeList {
    fn spanning(size: u64) -> Self {
        Self {
            ranges: vec![Range { offset: 0, size }],
            mode: RangeMode::ByOffset,
        }
    }

    fn set_mode(&mut self, mode: RangeMode) {
        if self.mode == mode {
            return;
        }
        match mode {
            RangeMode::ByOffset => self.ranges.sort_by_key(|r| r.offset),
            RangeMode::BySize => self.ranges.sort_by_key(|r| r.size),
        }
        self.mode = mode;
    }

    /// First-fit over the size-sorted list, so small ranges get consumed
    /// before large ones fragment.
    fn carve(&mut self, size: u64, align: u64) -> Option<u64> {
        self.set_mode(RangeMode::BySize);
        for i in 0..self.ranges.len() {
            if let Some((left, carved, right)) = split_range(self.ranges[i], size, align) {
                self.ranges.remove(i);
                if left.size > 0 {
                    self.ranges.push(left);
                }
                if right.size > 0 {
                    self.ranges.push(right);
                }
                self.compact();
                return Some(carved.offset);
            }
        }
        None
    }

    fn insert(&mut self, range: Range) {
        self.ranges.push(range);
        self.compact();
    }

    /// Sorts by offset, drops empties, merges adjacent ranges.
    fn compact(&mut self) {
        self.ranges.sort_by_key(|r| r.offset);
        self.mode = RangeMode::ByOffset;

        let mut merged: Vec<Range> = Vec::with_capacity(self.ranges.len());
        for range in self.ranges.drain(..) {
            if range.size == 0 {
                continue;
            }
            match merged.last_mut() {
                Some(last) if last.offset + last.size >= range.offset => {
                    last.size = (range.offset + range.size).max(last.offset + last.size)
                        - last.offset;
                }
                _ => merged.push(range),
            }
        }
        self.ranges = merged;
    }

    fn total_free(&self) -> u64 {
        self.ranges.iter().map(|r| r.size).sum()
    }

    /// True when the single remaining range spans the whole page.
    fn is_vacant(&self, page_size: u64) -> bool {
        self.ranges.len() == 1
            && self.ranges[0]
                == Range {
                    offset: 0,
                    size: page_size,
                }
    }
}

/// One device page plus its free list. Pages only serve allocations with an
/// exactly matching usage set, the wgpu analog of a memory type index.
struct MemoryPage {
    buffer: Arc<wgpu::Buffer>,
    usage: wgpu::BufferUsages,
    size: u64,
    free: FreeList,
}

/// A carved block: the page buffer plus the byte window inside it.
#[derive(Clone, Debug)]
pub struct PoolAllocation {
    pub buffer: Arc<wgpu::Buffer>,
    pub offset: u64,
    pub size: u64,
}

/// The device memory pool.
pub struct MemoryPool {
    page_size: u64,
    pages: Vec<MemoryPage>,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            pages: Vec::new(),
        }
    }

    /// Sets the size used for fresh pages; oversized allocations still get a
    /// page of their own exact size.
    pub fn set_page_size(&mut self, size: u64) {
        self.page_size = size;
    }

    /// Carves an aligned block from a page matching `usage`, reserving a new
    /// page of `max(page_size, size)` bytes when none fits.
    pub fn allocate(
        &mut self,
        device: &wgpu::Device,
        usage: wgpu::BufferUsages,
        size: u64,
        align: u64,
    ) -> Result<PoolAllocation, GpuError> {
        if size == 0 {
            return Err(GpuError::EmptyAllocation);
        }

        for page in &mut self.pages {
            if page.usage != usage || page.size < size {
                continue;
            }
            if let Some(offset) = page.free.carve(size, align) {
                return Ok(PoolAllocation {
                    buffer: page.buffer.clone(),
                    offset,
                    size,
                });
            }
        }

        let page_size = self.page_size.max(size);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("se.gpu.pool.page"),
            size: page_size,
            usage,
            mapped_at_creation: false,
        });
        let mut page = MemoryPage {
            buffer: Arc::new(buffer),
            usage,
            size: page_size,
            free: FreeList::spanning(page_size),
        };
        let offset = page
            .free
            .carve(size, align)
            .expect("a fresh page always fits its first allocation");
        let allocation = PoolAllocation {
            buffer: page.buffer.clone(),
            offset,
            size,
        };
        self.pages.push(page);
        Ok(allocation)
    }

    /// Returns a block to its page and merges it with adjacent free ranges.
    pub fn release(&mut self, allocation: PoolAllocation) {
        for page in &mut self.pages {
            if Arc::ptr_eq(&page.buffer, &allocation.buffer) {
                page.free.insert(Range {
                    offset: allocation.offset,
                    size: allocation.size,
                });
                return;
            }
        }
        warn!("released a device allocation from an unknown page");
    }

    /// Frees every page whose single free range covers its full extent.
    pub fn release_unused_pages(&mut self) {
        self.pages.retain(|page| {
            if page.free.is_vacant(page.size) {
                page.buffer.destroy();
                false
            } else {
                true
            }
        });
    }

    /// Frees every page unconditionally. Outstanding allocations become
    /// dangling; callers tear managers down first.
    pub fn release_all(&mut self) {
        for page in self.pages.drain(..) {
            page.buffer.destroy();
        }
    }

    /// Total bytes held in device pages.
    pub fn allocated_size(&self) -> u64 {
        self.pages.iter().map(|p| p.size).sum()
    }

    /// Bytes currently free across all pages.
    pub fn free_size(&self) -> u64 {
        self.pages.iter().map(|p| p.free.total_free()).sum()
    }

    /// Uploads bytes through the queue; the page must be a copy target.
    pub fn write(
        &self,
        queue: &wgpu::Queue,
        allocation: &PoolAllocation,
        label: &str,
        data: &[u8],
    ) -> Result<(), GpuError> {
        self.check_usage(allocation, label, wgpu::BufferUsages::COPY_DST)?;
        queue.write_buffer(&allocation.buffer, allocation.offset, data);
        Ok(())
    }

    /// Maps the block for reading and copies it out. The page must carry
    /// `MAP_READ`; submitted work that writes it must already be waited on.
    pub fn read(
        &self,
        device: &wgpu::Device,
        allocation: &PoolAllocation,
        label: &str,
    ) -> Result<Vec<u8>, GpuError> {
        self.check_usage(allocation, label, wgpu::BufferUsages::MAP_READ)?;

        let slice = allocation
            .buffer
            .slice(allocation.offset..allocation.offset + allocation.size);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = device.poll(wgpu::Maintain::Wait);
        match receiver.recv() {
            Ok(Ok(())) => {}
            _ => return Err(GpuError::Map),
        }

        let data = slice.get_mapped_range().to_vec();
        allocation.buffer.unmap();
        Ok(data)
    }

    fn check_usage(
        &self,
        allocation: &PoolAllocation,
        label: &str,
        required: wgpu::BufferUsages,
    ) -> Result<(), GpuError> {
        let usage = self
            .pages
            .iter()
            .find(|p| Arc::ptr_eq(&p.buffer, &allocation.buffer))
            .map(|p| p.usage)
            .unwrap_or(wgpu::BufferUsages::empty());
        if usage.contains(required) {
            Ok(())
        } else {
            Err(GpuError::UsageMismatch {
                label: label.to_owned(),
                usage,
                required,
            })
        }
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_multiples() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(7, 1), 7);
        assert_eq!(align_up(7, 0), 7);
    }

    #[test]
    fn split_produces_three_parts() {
        let range = Range {
            offset: 100,
            size: 1000,
        };
        let (left, carved, right) = split_range(range, 200, 256).unwrap();
        assert_eq!(left, Range { offset: 100, size: 156 });
        assert_eq!(carved, Range { offset: 256, size: 200 });
        assert_eq!(right, Range { offset: 456, size: 644 });
        assert_eq!(left.size + carved.size + right.size, range.size);
    }

    #[test]
    fn split_rejects_ranges_too_small_after_alignment() {
        let range = Range {
            offset: 250,
            size: 210,
        };
        // Aligning 250 up to 256 leaves 204 bytes, not enough for 205.
        assert!(split_range(range, 205, 256).is_none());
        assert!(split_range(range, 204, 256).is_some());
    }

    #[test]
    fn carve_consumes_small_ranges_first() {
        let mut free = FreeList::spanning(4096);
        let a = free.carve(512, 1).unwrap();
        free.carve(512, 1).unwrap();
        free.carve(1024, 1).unwrap();
        // Free ranges now: the released [0, 512) and the [2048, 4096) tail.
        free.insert(Range { offset: a, size: 512 });
        assert_eq!(free.total_free(), 512 + 2048);

        // A request fitting both ranges must come from the smaller one.
        assert_eq!(free.carve(512, 1), Some(0));
        assert_eq!(free.total_free(), 2048);
    }

    #[test]
    fn release_coalesces_neighbours() {
        let mut free = FreeList::spanning(1024);
        let a = free.carve(256, 1).unwrap();
        let b = free.carve(256, 1).unwrap();
        let c = free.carve(256, 1).unwrap();
        assert_eq!((a, b, c), (0, 256, 512));
        assert_eq!(free.total_free(), 256);

        free.insert(Range { offset: a, size: 256 });
        free.insert(Range { offset: c, size: 256 });
        // c merged with the tail, a stays separate across the b-sized gap.
        assert_eq!(free.ranges.len(), 2);
        free.insert(Range { offset: b, size: 256 });
        // The middle block bridges everything back into one span.
        assert!(free.is_vacant(1024));
    }

    #[test]
    fn aligned_carves_keep_residues_available() {
        let mut free = FreeList::spanning(1024);
        let first = free.carve(10, 1).unwrap();
        assert_eq!(first, 0);
        let aligned = free.carve(100, 256).unwrap();
        assert_eq!(aligned % 256, 0);
        // The left residue between 10 and 256 survives as free space.
        assert_eq!(free.total_free(), 1024 - 10 - 100);
    }

    #[test]
    fn vacancy_requires_the_full_span() {
        let mut free = FreeList::spanning(512);
        assert!(free.is_vacant(512));
        let offset = free.carve(64, 1).unwrap();
        assert!(!free.is_vacant(512));
        free.insert(Range { offset, size: 64 });
        assert!(free.is_vacant(512));
    }
}
