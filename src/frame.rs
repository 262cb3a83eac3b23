// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! The top-level frame-process buffer firmware starts from.
//!
//! ```text
//! Header        8 words   magic, version, request lo/hi, batch, ports, programs, flags
//! IqSettings    2 words   address of the IQ settings block (patched)
//! Striping      2 words   address of the striping blob (patched, optional)
//! Ports         7 x 7     port id, flags, width, height, stride, address lo/hi (patched)
//! Programs     14 x 4     type, length, address lo/hi (patched)
//! ClockBw       9 words   see [`ClockBandwidth`]
//! ```
//!
//! Every address slot is two words wide and left zero; the transport fills
//! it from the patch list.

use crate::{
    bandwidth::ClockBandwidth,
    cmdbuf::{BufferHandle, CommandStream},
    error::{IspError, Result},
    iq::ModuleKind,
    port::{PortBuffer, PortId},
    schema::Schema,
};
use std::sync::OnceLock;

/// Frame magic, "ISPF".
pub const FRAME_MAGIC: u32 = 0x4953_5046;
pub const FRAME_VERSION: u32 = 1;

/// Program type of the descriptor covering the shared register buffer.
pub const PROGRAM_GENERIC: u32 = 0x01;

/// One per module plus the generic program.
pub const MAX_PROGRAMS: usize = ModuleKind::COUNT + 1;

pub const FLAG_STRIPING: u32 = 1 << 0;
pub const FLAG_TUNING_DUMP: u32 = 1 << 1;

pub const PORT_FLAG_VALID: u32 = 1 << 0;
pub const PORT_FLAG_COMPRESSED: u32 = 1 << 1;

const PORT_WORDS: usize = 7;
const PROGRAM_WORDS: usize = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameField {
    Header,
    IqSettingsAddr,
    StripingAddr,
    Ports,
    Programs,
    ClockBw,
}

/// Cached layout of the frame buffer.
pub fn schema() -> &'static Schema<FrameField> {
    static SCHEMA: OnceLock<Schema<FrameField>> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::builder()
            .field(FrameField::Header, 8)
            .field(FrameField::IqSettingsAddr, 2)
            .field(FrameField::StripingAddr, 2)
            .array(FrameField::Ports, PORT_WORDS, PortId::ALL.len())
            .array(FrameField::Programs, PROGRAM_WORDS, MAX_PROGRAMS)
            .field(FrameField::ClockBw, ClockBandwidth::WORDS)
            .build()
    })
}

/// A typed, length-delimited chunk firmware walks in order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProgramDescriptor {
    pub program_type: u32,
    /// Length in bytes of the referenced content.
    pub length: u32,
    /// Buffer and byte offset the program's content starts at.
    pub target: Option<(BufferHandle, u32)>,
}

/// Everything the frame buffer references.
#[derive(Debug)]
pub struct FrameContent<'a> {
    pub request_id: u64,
    pub batch_size: u32,
    pub ports: &'a [PortBuffer],
    pub iq_settings: BufferHandle,
    pub striping: Option<BufferHandle>,
    pub programs: &'a [ProgramDescriptor],
    pub clock: ClockBandwidth,
    pub flags: u32,
}

/// Writes `content` into `stream`, recording one patch per address slot.
pub fn write_frame(stream: &mut CommandStream<'_>, content: &FrameContent<'_>) -> Result<()> {
    let schema = schema();
    if content.programs.len() > MAX_PROGRAMS {
        return Err(IspError::Configuration(format!(
            "{} programs exceed the frame limit of {}",
            content.programs.len(),
            MAX_PROGRAMS
        )));
    }
    let base = stream.reserve(schema.total_words())?;
    let byte = |word: usize| ((base + word) * 4) as u32;

    let header = base + schema.offset(FrameField::Header);
    for (i, word) in [
        FRAME_MAGIC,
        FRAME_VERSION,
        content.request_id as u32,
        (content.request_id >> 32) as u32,
        content.batch_size,
        content.ports.len() as u32,
        content.programs.len() as u32,
        content.flags,
    ]
    .into_iter()
    .enumerate()
    {
        stream.set(header + i, word)?;
    }

    stream.add_patch(byte(schema.offset(FrameField::IqSettingsAddr)), content.iq_settings, 0)?;
    if let Some(striping) = content.striping {
        stream.add_patch(byte(schema.offset(FrameField::StripingAddr)), striping, 0)?;
    }

    for port in content.ports {
        let at = schema.element(FrameField::Ports, port.port.index());
        let mut flags = PORT_FLAG_VALID;
        if port.compressed {
            flags |= PORT_FLAG_COMPRESSED;
        }
        for (i, word) in [port.port.index() as u32, flags, port.width, port.height, port.stride]
            .into_iter()
            .enumerate()
        {
            stream.set(base + at + i, word)?;
        }
        stream.add_patch(byte(at + 5), port.image, 0)?;
    }

    for (i, program) in content.programs.iter().enumerate() {
        let at = schema.element(FrameField::Programs, i);
        stream.set(base + at, program.program_type)?;
        stream.set(base + at + 1, program.length)?;
        if let Some((target, offset)) = program.target {
            stream.add_patch(byte(at + 2), target, offset)?;
        }
    }

    let clock = base + schema.offset(FrameField::ClockBw);
    for (i, word) in content.clock.to_words().into_iter().enumerate() {
        stream.set(clock + i, word)?;
    }
    Ok(())
}

/// Port entry as read back from a frame buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PortEntry {
    pub port: PortId,
    pub compressed: bool,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
}

/// Decoded frame buffer, without resolved addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameView {
    pub request_id: u64,
    pub batch_size: u32,
    pub flags: u32,
    pub ports: Vec<PortEntry>,
    /// `(program_type, length)` in firmware order.
    pub programs: Vec<(u32, u32)>,
    pub clock: ClockBandwidth,
}

/// Parses a frame buffer written by [`write_frame`]. `None` when the words
/// are not a frame of this version.
pub fn decode_frame(words: &[u32]) -> Option<FrameView> {
    let schema = schema();
    if words.len() < schema.total_words() {
        return None;
    }
    let header = &words[schema.offset(FrameField::Header)..];
    if header[0] != FRAME_MAGIC || header[1] != FRAME_VERSION {
        return None;
    }
    let program_count = header[6] as usize;
    if program_count > MAX_PROGRAMS {
        return None;
    }

    let ports = PortId::ALL
        .iter()
        .filter_map(|&port| {
            let entry = &words[schema.element(FrameField::Ports, port.index())..];
            (entry[1] & PORT_FLAG_VALID != 0).then_some(PortEntry {
                port,
                compressed: entry[1] & PORT_FLAG_COMPRESSED != 0,
                width: entry[2],
                height: entry[3],
                stride: entry[4],
            })
        })
        .collect();

    let programs = (0..program_count)
        .map(|i| {
            let at = schema.element(FrameField::Programs, i);
            (words[at], words[at + 1])
        })
        .collect();

    Some(FrameView {
        request_id: u64::from(header[2]) | (u64::from(header[3]) << 32),
        batch_size: header[4],
        flags: header[7],
        ports,
        programs,
        clock: ClockBandwidth::from_words(&words[schema.offset(FrameField::ClockBw)..])?,
    })
}
