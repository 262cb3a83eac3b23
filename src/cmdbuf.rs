// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Command buffers and cross-buffer patches.
//!
//! A [`CommandBuffer`] lives inside one slot of a
//! [`ResourcePool`](crate::pool::ResourcePool). Words are staged on the host
//! through a [`CommandStream`] and flushed to the pool's device memory when
//! the buffer commits. Buffers have no final device address until the
//! transport maps them, so any reference from one buffer into another is
//! recorded as a [`PatchEntry`] and resolved at submit time.
//!
//! Three command encodings are produced:
//!
//! | Command        | Layout                                                   |
//! |----------------|----------------------------------------------------------|
//! | register range | `REG_RANGE << 24 \| count`, `base`, `count` values       |
//! | DMI select     | `DMI << 24 \| bank << 16 \| select`, `len`, `len` entries |
//! | blob           | raw words, interpreted by firmware                       |

use crate::error::{IspError, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt};

/// Opcode of a contiguous register range write.
pub const OPCODE_REG_RANGE: u32 = 0x1;
/// Opcode of an indexed lookup-table (DMI) select write.
pub const OPCODE_DMI: u32 = 0x2;

const OPCODE_SHIFT: u32 = 24;
const COUNT_MASK: u32 = 0x00FF_FFFF;
const BANK_SHIFT: u32 = 16;

/// Pool identifier. `0` is reserved for buffers owned outside the node, such
/// as the image buffers behind input and output ports.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolId(pub u32);

impl PoolId {
    pub const EXTERNAL: PoolId = PoolId(0);
}

/// Names one slot of one pool. Handles are what patches and packets carry;
/// the transport maps them to device addresses.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BufferHandle {
    pub pool: PoolId,
    pub slot: u32,
}

impl BufferHandle {
    /// Handle of an image buffer owned by the pipeline framework.
    pub fn external(id: u32) -> Self {
        Self {
            pool: PoolId::EXTERNAL,
            slot: id,
        }
    }

    pub fn is_external(&self) -> bool {
        self.pool == PoolId::EXTERNAL
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_external() {
            write!(f, "ext:{}", self.slot)
        } else {
            write!(f, "{}:{}", self.pool.0, self.slot)
        }
    }
}

/// What a buffer holds, as seen by the transport.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Top-level frame-process structure.
    Frame,
    /// Shared IQ settings block consumed by firmware.
    IqSettings,
    /// Register range writes.
    Generic,
    /// Lookup-table (DMI) select writes.
    Dmi,
    /// Opaque striping output.
    Striping,
    /// Module-private LUT staging, never submitted.
    LutStaging,
}

/// Lifecycle of a command buffer slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferState {
    Free,
    Acquired,
    Writing,
    Committed,
}

/// A cross-buffer reference: the word pair at `dst_offset` of the containing
/// buffer receives the device address of `source` plus `src_offset`.
/// Offsets are in bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PatchEntry {
    pub dst_offset: u32,
    pub source: BufferHandle,
    pub src_offset: u32,
}

/// Staged content of one pool slot.
#[derive(Debug)]
pub struct CommandBuffer {
    handle: BufferHandle,
    kind: BufferKind,
    capacity: usize,
    reserved: usize,
    words: Vec<u32>,
    patches: Vec<PatchEntry>,
    state: BufferState,
}

impl CommandBuffer {
    pub(crate) fn new(handle: BufferHandle, kind: BufferKind, capacity: usize) -> Self {
        Self {
            handle,
            kind,
            capacity,
            reserved: 0,
            words: Vec::with_capacity(capacity),
            patches: Vec::new(),
            state: BufferState::Free,
        }
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    /// Slot capacity in 32-bit words.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn patches(&self) -> &[PatchEntry] {
        &self.patches
    }

    /// Length of the staged content in bytes.
    pub fn len_bytes(&self) -> usize {
        self.words.len() * 4
    }

    pub(crate) fn reset(&mut self, state: BufferState) {
        self.words.clear();
        self.patches.clear();
        self.reserved = 0;
        self.state = state;
    }

    pub(crate) fn begin(&mut self, max_words: usize) -> Result<CommandStream<'_>> {
        if self.state != BufferState::Acquired {
            return Err(IspError::BufferState {
                handle: self.handle,
                state: self.state,
                operation: "begin a write",
            });
        }
        if max_words > self.capacity {
            return Err(IspError::BufferOverflow {
                handle: self.handle,
                requested: max_words,
                available: self.capacity,
            });
        }
        self.reserved = max_words;
        self.state = BufferState::Writing;
        Ok(CommandStream { buffer: self })
    }

    pub(crate) fn mark_committed(&mut self) {
        self.state = BufferState::Committed;
    }

    pub(crate) fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot {
            handle: self.handle,
            kind: self.kind,
            words: self.words.clone(),
            patches: self.patches.clone(),
        }
    }
}

/// Append-only writer over a buffer, obtained once per frame from
/// [`ResourcePool::begin_write`](crate::pool::ResourcePool::begin_write).
pub struct CommandStream<'a> {
    buffer: &'a mut CommandBuffer,
}

impl CommandStream<'_> {
    pub fn handle(&self) -> BufferHandle {
        self.buffer.handle
    }

    /// Words written so far.
    pub fn len(&self) -> usize {
        self.buffer.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.words.is_empty()
    }

    /// Byte offset at which the next word lands.
    pub fn offset_bytes(&self) -> u32 {
        (self.buffer.words.len() * 4) as u32
    }

    pub fn remaining(&self) -> usize {
        self.buffer.reserved - self.buffer.words.len()
    }

    fn ensure(&self, words: usize) -> Result<()> {
        if words > self.remaining() {
            return Err(IspError::BufferOverflow {
                handle: self.buffer.handle,
                requested: words,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    /// Appends raw words, returning the word offset of the first one.
    pub fn write_words(&mut self, words: &[u32]) -> Result<usize> {
        self.ensure(words.len())?;
        let offset = self.buffer.words.len();
        self.buffer.words.extend_from_slice(words);
        Ok(offset)
    }

    /// Appends `count` zero words to be filled later with [`Self::set`].
    pub fn reserve(&mut self, count: usize) -> Result<usize> {
        self.ensure(count)?;
        let offset = self.buffer.words.len();
        self.buffer.words.resize(offset + count, 0);
        Ok(offset)
    }

    /// Overwrites an already written word.
    pub fn set(&mut self, offset: usize, value: u32) -> Result<()> {
        let len = self.buffer.words.len();
        match self.buffer.words.get_mut(offset) {
            Some(word) => {
                *word = value;
                Ok(())
            }
            None => Err(IspError::BufferOverflow {
                handle: self.buffer.handle,
                requested: offset + 1,
                available: len,
            }),
        }
    }

    /// One contiguous register range write.
    pub fn write_reg_range(&mut self, base: u32, values: &[u32]) -> Result<usize> {
        self.ensure(values.len() + 2)?;
        let offset = self.write_words(&[reg_range_header(values.len()), base])?;
        self.write_words(values)?;
        Ok(offset)
    }

    /// One indexed lookup-table write into bank `bank` of table `select`.
    pub fn write_dmi(&mut self, select: u8, bank: u8, entries: &[u32]) -> Result<usize> {
        self.ensure(entries.len() + 2)?;
        let offset = self.write_words(&[dmi_header(select, bank), entries.len() as u32])?;
        self.write_words(entries)?;
        Ok(offset)
    }

    /// Records that the address slot at `dst_offset` (bytes, in this buffer)
    /// points at `src_offset` bytes into `source`.
    pub fn add_patch(&mut self, dst_offset: u32, source: BufferHandle, src_offset: u32) -> Result<()> {
        if dst_offset % 4 != 0 || dst_offset as usize >= self.buffer.len_bytes() {
            return Err(IspError::BufferOverflow {
                handle: self.buffer.handle,
                requested: dst_offset as usize / 4 + 1,
                available: self.buffer.words.len(),
            });
        }
        if source == self.buffer.handle {
            return Err(IspError::Patch {
                dst: self.buffer.handle,
                src: source,
            });
        }
        self.buffer.patches.push(PatchEntry {
            dst_offset,
            source,
            src_offset,
        });
        Ok(())
    }
}

pub fn reg_range_header(count: usize) -> u32 {
    (OPCODE_REG_RANGE << OPCODE_SHIFT) | (count as u32 & COUNT_MASK)
}

pub fn dmi_header(select: u8, bank: u8) -> u32 {
    (OPCODE_DMI << OPCODE_SHIFT) | (u32::from(bank & 1) << BANK_SHIFT) | u32::from(select)
}

/// A decoded register or DMI command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    RegRange { base: u32, values: Vec<u32> },
    Dmi { select: u8, bank: u8, entries: Vec<u32> },
}

/// Decodes a stream of register range and DMI commands. Used by the
/// transport simulation and tests; returns `None` on a malformed stream.
pub fn decode_commands(words: &[u32]) -> Option<Vec<Command>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < words.len() {
        let header = words[i];
        let arg = *words.get(i + 1)?;
        match header >> OPCODE_SHIFT {
            OPCODE_REG_RANGE => {
                let count = (header & COUNT_MASK) as usize;
                let values = words.get(i + 2..i + 2 + count)?.to_vec();
                out.push(Command::RegRange { base: arg, values });
                i += 2 + count;
            }
            OPCODE_DMI => {
                let count = arg as usize;
                let entries = words.get(i + 2..i + 2 + count)?.to_vec();
                out.push(Command::Dmi {
                    select: (header & 0xFF) as u8,
                    bank: ((header >> BANK_SHIFT) & 1) as u8,
                    entries,
                });
                i += 2 + count;
            }
            _ => return None,
        }
    }
    Some(out)
}

/// Committed content of a buffer, as carried in a packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferSnapshot {
    pub handle: BufferHandle,
    pub kind: BufferKind,
    pub words: Vec<u32>,
    pub patches: Vec<PatchEntry>,
}

/// Per-frame record of which buffers have committed, in order. A buffer may
/// only commit once every patch source it carries is already recorded here
/// or was registered as external.
#[derive(Debug, Default)]
pub struct CommitLog {
    order: Vec<BufferHandle>,
    committed: HashSet<BufferHandle>,
    external: HashSet<BufferHandle>,
}

impl CommitLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a buffer owned outside the node (port images) as a valid
    /// patch source.
    pub fn mark_external(&mut self, handle: BufferHandle) {
        self.external.insert(handle);
    }

    pub fn is_committed(&self, handle: BufferHandle) -> bool {
        self.committed.contains(&handle) || self.external.contains(&handle)
    }

    /// Commit order so far.
    pub fn order(&self) -> &[BufferHandle] {
        &self.order
    }

    pub(crate) fn check(&self, dst: BufferHandle, patches: &[PatchEntry]) -> Result<()> {
        match patches.iter().find(|p| !self.is_committed(p.source)) {
            Some(p) => Err(IspError::Patch { dst, src: p.source }),
            None => Ok(()),
        }
    }

    pub(crate) fn record(&mut self, handle: BufferHandle) {
        self.order.push(handle);
        self.committed.insert(handle);
    }
}
