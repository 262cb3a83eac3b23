// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Fixed-depth pools of identically sized command buffer slots.
//!
//! A pool makes one device allocation of `element_size * depth` bytes so the
//! transport can map it in a single call (see [`ResourcePool::region`]), and
//! carves it into `depth` slots. Each in-flight request owns at most one slot
//! per pool from [`acquire`](ResourcePool::acquire) until
//! [`recycle`](ResourcePool::recycle). The pool never decides on its own that
//! hardware is done with a slot; that knowledge comes from the fence system
//! through the caller.
//!
//! # Example
//!
//! ```
//! use edgefirst_isp::cmdbuf::{BufferKind, CommitLog};
//! use edgefirst_isp::pool::{DeviceAffinity, ResourcePool};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut pool = ResourcePool::new("regs", BufferKind::Generic, 256, 2, DeviceAffinity::Host)?;
//! let handle = pool.acquire(7)?;
//! {
//!     let mut stream = pool.begin_write(handle, 16)?;
//!     stream.write_reg_range(0x400, &[1, 2, 3])?;
//! }
//! let mut log = CommitLog::new();
//! pool.commit(handle, &mut log)?;
//! assert_eq!(pool.device_words(handle)?[2..5], [1, 2, 3]);
//! pool.recycle(handle)?;
//! # Ok(())
//! # }
//! ```

use crate::{
    cmdbuf::{BufferHandle, BufferKind, BufferSnapshot, BufferState, CommandBuffer, CommandStream, CommitLog, PoolId},
    error::{IspError, Result},
};
use dma_buf::{DmaBuf, MappedDmaBuf};
use dma_heap::{Heap, HeapKind};
use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    os::fd::{AsRawFd, OwnedFd, RawFd},
    sync::atomic::{AtomicU32, Ordering},
};
use tracing::{debug, trace};

static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

/// Where a pool's memory comes from.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceAffinity {
    /// Plain host memory. Used for simulation and tests.
    #[default]
    Host,
    /// Linux DMA heap, system (scattered pages) flavour.
    SystemHeap,
    /// Linux DMA heap, physically contiguous (CMA) flavour.
    CmaHeap,
}

/// Merged view of a pool's backing memory for bulk mapping.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PoolRegion {
    /// DMA-buf file descriptor, `None` for host memory.
    pub fd: Option<RawFd>,
    /// Total bytes of the allocation.
    pub size: usize,
    /// Distance in bytes between consecutive slots.
    pub stride: usize,
}

enum PoolMemory {
    Host(Vec<u8>),
    Dma { fd: OwnedFd, map: MappedDmaBuf },
}

// SAFETY: the mapping is exclusively owned by this value and only accessed
// through `&self`/`&mut self`, so moving it to another thread is sound.
unsafe impl Send for PoolMemory {}

impl PoolMemory {
    fn allocate(name: &str, size: usize, affinity: DeviceAffinity) -> Result<Self> {
        let alloc_err = |reason: String| IspError::Allocation {
            pool: name.to_owned(),
            size,
            reason,
        };
        let kind = match affinity {
            DeviceAffinity::Host => return Ok(PoolMemory::Host(vec![0; size])),
            DeviceAffinity::SystemHeap => HeapKind::System,
            DeviceAffinity::CmaHeap => HeapKind::Cma,
        };
        let heap = Heap::new(kind).map_err(|e| alloc_err(e.to_string()))?;
        let fd = heap.allocate(size).map_err(|e| alloc_err(e.to_string()))?;
        let export = fd.try_clone()?;
        let map = DmaBuf::from(fd)
            .memory_map()
            .map_err(|e| alloc_err(e.to_string()))?;
        Ok(PoolMemory::Dma { fd: export, map })
    }

    fn raw_fd(&self) -> Option<RawFd> {
        match self {
            PoolMemory::Host(_) => None,
            PoolMemory::Dma { fd, .. } => Some(fd.as_raw_fd()),
        }
    }

    fn store(&mut self, offset: usize, words: &[u32]) -> Result<()> {
        match self {
            PoolMemory::Host(bytes) => {
                store_words(&mut bytes[offset..], words);
                Ok(())
            }
            PoolMemory::Dma { map, .. } => map
                .write(store_mapped, Some((offset, words)))
                .map_err(|e| IspError::Io(std::io::Error::other(e.to_string()))),
        }
    }

    fn load(&self, offset: usize, count: usize) -> Result<Vec<u32>> {
        match self {
            PoolMemory::Host(bytes) => Ok(load_words(&bytes[offset..], count)),
            PoolMemory::Dma { map, .. } => map
                .read(load_mapped, Some((offset, count)))
                .map_err(|e| IspError::Io(std::io::Error::other(e.to_string()))),
        }
    }
}

fn store_mapped(bytes: &mut [u8], arg: Option<(usize, &[u32])>) -> std::result::Result<(), Box<dyn Error>> {
    if let Some((offset, words)) = arg {
        store_words(&mut bytes[offset..], words);
    }
    Ok(())
}

fn load_mapped(bytes: &[u8], arg: Option<(usize, usize)>) -> std::result::Result<Vec<u32>, Box<dyn Error>> {
    let (offset, count) = arg.unwrap_or_default();
    Ok(load_words(&bytes[offset..], count))
}

fn store_words(dst: &mut [u8], words: &[u32]) {
    for (chunk, word) in dst.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
}

fn load_words(src: &[u8], count: usize) -> Vec<u32> {
    src.chunks_exact(4)
        .take(count)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

struct Slot {
    owner: Option<u64>,
    buffer: CommandBuffer,
}

/// A ring of `depth` command buffer slots of `element_size` bytes each.
pub struct ResourcePool {
    id: PoolId,
    name: String,
    kind: BufferKind,
    element_size: usize,
    affinity: DeviceAffinity,
    memory: PoolMemory,
    slots: Vec<Slot>,
    in_use: usize,
    high_water: usize,
}

impl ResourcePool {
    /// Allocates `element_size * depth` bytes of device memory. The element
    /// size is rounded up to a whole number of 32-bit words.
    ///
    /// # Errors
    ///
    /// Returns [`IspError::Allocation`] if the element size or depth is zero
    /// or if the DMA heap cannot satisfy the request.
    pub fn new(
        name: &str,
        kind: BufferKind,
        element_size: usize,
        depth: usize,
        affinity: DeviceAffinity,
    ) -> Result<Self> {
        let element_size = element_size.div_ceil(4) * 4;
        if element_size == 0 || depth == 0 {
            return Err(IspError::Allocation {
                pool: name.to_owned(),
                size: element_size * depth,
                reason: "zero-sized pool".to_owned(),
            });
        }
        let memory = PoolMemory::allocate(name, element_size * depth, affinity)?;
        let id = PoolId(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed));
        let slots = (0..depth)
            .map(|slot| Slot {
                owner: None,
                buffer: CommandBuffer::new(
                    BufferHandle {
                        pool: id,
                        slot: slot as u32,
                    },
                    kind,
                    element_size / 4,
                ),
            })
            .collect();
        debug!(
            "pool '{}' ({:?}) allocated {} x {} bytes on {:?}",
            name, kind, depth, element_size, affinity
        );
        Ok(Self {
            id,
            name: name.to_owned(),
            kind,
            element_size,
            affinity,
            memory,
            slots,
            in_use: 0,
            high_water: 0,
        })
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn affinity(&self) -> DeviceAffinity {
        self.affinity
    }

    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Slot size in bytes.
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Slots currently checked out.
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Largest number of slots ever checked out at once.
    pub fn high_water_mark(&self) -> usize {
        self.high_water
    }

    pub fn region(&self) -> PoolRegion {
        PoolRegion {
            fd: self.memory.raw_fd(),
            size: self.element_size * self.slots.len(),
            stride: self.element_size,
        }
    }

    /// Checks out the slot for `request_id`. A request that already owns a
    /// slot gets the same one back.
    pub fn acquire(&mut self, request_id: u64) -> Result<BufferHandle> {
        if let Some(slot) = self.slots.iter().find(|s| s.owner == Some(request_id)) {
            return Ok(slot.buffer.handle());
        }
        let Some(slot) = self.slots.iter_mut().find(|s| s.owner.is_none()) else {
            return Err(IspError::ResourceExhausted {
                pool: self.name.clone(),
                depth: self.slots.len(),
            });
        };
        slot.owner = Some(request_id);
        slot.buffer.reset(BufferState::Acquired);
        let handle = slot.buffer.handle();
        self.in_use += 1;
        self.high_water = self.high_water.max(self.in_use);
        trace!("pool '{}' slot {} -> request {}", self.name, handle.slot, request_id);
        Ok(handle)
    }

    fn slot(&self, handle: BufferHandle) -> Result<&Slot> {
        if handle.pool != self.id {
            return Err(IspError::UnknownBuffer(handle));
        }
        self.slots
            .get(handle.slot as usize)
            .ok_or(IspError::UnknownBuffer(handle))
    }

    fn slot_mut(&mut self, handle: BufferHandle) -> Result<&mut Slot> {
        if handle.pool != self.id {
            return Err(IspError::UnknownBuffer(handle));
        }
        self.slots
            .get_mut(handle.slot as usize)
            .ok_or(IspError::UnknownBuffer(handle))
    }

    /// Request currently owning the slot, if any.
    pub fn owner(&self, handle: BufferHandle) -> Result<Option<u64>> {
        Ok(self.slot(handle)?.owner)
    }

    pub fn buffer(&self, handle: BufferHandle) -> Result<&CommandBuffer> {
        Ok(&self.slot(handle)?.buffer)
    }

    /// Opens the buffer for writing up to `max_words` words. Callable once
    /// per acquisition.
    pub fn begin_write(&mut self, handle: BufferHandle, max_words: usize) -> Result<CommandStream<'_>> {
        self.slot_mut(handle)?.buffer.begin(max_words)
    }

    /// Finalizes the buffer: checks that every patch source has already
    /// committed, then flushes the staged words to device memory. The buffer
    /// stays read-only until recycled.
    pub fn commit(&mut self, handle: BufferHandle, log: &mut CommitLog) -> Result<()> {
        let stride = self.element_size;
        let slot = self.slot_mut(handle)?;
        let state = slot.buffer.state();
        if !matches!(state, BufferState::Acquired | BufferState::Writing) {
            return Err(IspError::BufferState {
                handle,
                state,
                operation: "commit",
            });
        }
        log.check(handle, slot.buffer.patches())?;
        slot.buffer.mark_committed();
        let offset = handle.slot as usize * stride;
        let words = slot.buffer.words().to_vec();
        self.memory.store(offset, &words)?;
        log.record(handle);
        trace!("pool '{}' slot {} committed {} words", self.name, handle.slot, words.len());
        Ok(())
    }

    /// Copy of a committed buffer for packet assembly.
    pub fn snapshot(&self, handle: BufferHandle) -> Result<BufferSnapshot> {
        let buffer = &self.slot(handle)?.buffer;
        if buffer.state() != BufferState::Committed {
            return Err(IspError::BufferState {
                handle,
                state: buffer.state(),
                operation: "snapshot",
            });
        }
        Ok(buffer.snapshot())
    }

    /// Reads back the committed words from device memory.
    pub fn device_words(&self, handle: BufferHandle) -> Result<Vec<u32>> {
        let buffer = &self.slot(handle)?.buffer;
        let count = buffer.words().len();
        self.memory.load(handle.slot as usize * self.element_size, count)
    }

    /// Returns a slot to the free set. The caller guarantees hardware no
    /// longer reads it.
    pub fn recycle(&mut self, handle: BufferHandle) -> Result<()> {
        let slot = self.slot_mut(handle)?;
        if slot.owner.take().is_some() {
            slot.buffer.reset(BufferState::Free);
            self.in_use -= 1;
            trace!("pool '{}' slot {} recycled", self.name, handle.slot);
        }
        Ok(())
    }

    /// Recycles whatever slot `request_id` owns. Returns whether one was
    /// found.
    pub fn recycle_request(&mut self, request_id: u64) -> bool {
        let handle = self
            .slots
            .iter()
            .find(|s| s.owner == Some(request_id))
            .map(|s| s.buffer.handle());
        match handle {
            Some(handle) => self.recycle(handle).is_ok(),
            None => false,
        }
    }
}
