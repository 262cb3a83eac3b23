// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Device submission transport.
//!
//! The node hands each frame to a [`Device`] as a [`Packet`]: the committed
//! buffers of the frame in commit order. Resolving patches into device
//! addresses and signalling completion belong to the transport.
//! [`LoopbackDevice`] forwards packets over a channel to a simulated
//! hardware thread, which is what the command line tool and the tests use.

use crate::{
    cmdbuf::{decode_commands, BufferHandle, BufferKind, BufferSnapshot},
    error::{IspError, Result},
    frame::decode_frame,
    pool::PoolRegion,
};
use std::{
    collections::HashSet,
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, warn};

/// Session with the device, valid from `acquire` to `release`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u32);

/// Memory the device will be asked to read, registered once per node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub name: String,
    pub queue_depth: usize,
    pub regions: Vec<(BufferKind, PoolRegion)>,
}

/// One frame's worth of committed buffers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub request_id: u64,
    /// The top-level frame buffer firmware starts from.
    pub frame: BufferHandle,
    /// Buffers in commit order, the frame buffer last.
    pub buffers: Vec<BufferSnapshot>,
}

impl Packet {
    pub fn buffer(&self, handle: BufferHandle) -> Option<&BufferSnapshot> {
        self.buffers.iter().find(|b| b.handle == handle)
    }

    pub fn frame(&self) -> Option<&BufferSnapshot> {
        self.buffer(self.frame)
    }

    /// Buffers of one kind, in commit order.
    pub fn of_kind(&self, kind: BufferKind) -> impl Iterator<Item = &BufferSnapshot> {
        self.buffers.iter().filter(move |b| b.kind == kind)
    }

    /// Checks that every patch points at a buffer committed earlier in the
    /// packet or at memory owned outside the node.
    pub fn verify_commit_order(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for buffer in &self.buffers {
            if let Some(patch) = buffer
                .patches
                .iter()
                .find(|p| !p.source.is_external() && !seen.contains(&p.source))
            {
                return Err(IspError::Patch {
                    dst: buffer.handle,
                    src: patch.source,
                });
            }
            seen.insert(buffer.handle);
        }
        Ok(())
    }
}

pub trait Device: Send {
    fn acquire(&mut self, descriptor: &ResourceDescriptor) -> Result<DeviceHandle>;

    /// Hands the packet to hardware. Failure is final for the frame.
    fn submit(&mut self, handle: DeviceHandle, packet: Packet) -> Result<()>;

    fn release(&mut self, handle: DeviceHandle);
}

/// Forwards submitted packets to a channel.
pub struct LoopbackDevice {
    tx: kanal::Sender<Packet>,
    next_handle: u32,
    open: HashSet<DeviceHandle>,
}

impl LoopbackDevice {
    /// The device and the receiving end of its packet queue.
    pub fn new() -> (Self, kanal::Receiver<Packet>) {
        let (tx, rx) = kanal::unbounded();
        (
            Self {
                tx,
                next_handle: 1,
                open: HashSet::new(),
            },
            rx,
        )
    }

    pub fn is_open(&self, handle: DeviceHandle) -> bool {
        self.open.contains(&handle)
    }
}

impl Device for LoopbackDevice {
    fn acquire(&mut self, descriptor: &ResourceDescriptor) -> Result<DeviceHandle> {
        let handle = DeviceHandle(self.next_handle);
        self.next_handle += 1;
        self.open.insert(handle);
        debug!(
            "loopback device {:?} acquired by '{}' ({} regions, depth {})",
            handle,
            descriptor.name,
            descriptor.regions.len(),
            descriptor.queue_depth
        );
        Ok(handle)
    }

    fn submit(&mut self, handle: DeviceHandle, packet: Packet) -> Result<()> {
        let request_id = packet.request_id;
        if !self.open.contains(&handle) {
            return Err(IspError::Submit {
                request_id,
                reason: format!("device handle {:?} is not open", handle),
            });
        }
        self.tx.send(packet).map_err(|e| IspError::Submit {
            request_id,
            reason: e.to_string(),
        })
    }

    fn release(&mut self, handle: DeviceHandle) {
        self.open.remove(&handle);
    }
}

/// Fence signalled by the simulated hardware.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    pub request_id: u64,
    /// The packet was well formed.
    pub ok: bool,
}

/// Checks a packet the way firmware would walk it.
pub fn validate_packet(packet: &Packet) -> bool {
    if packet.verify_commit_order().is_err() {
        return false;
    }
    let Some(frame) = packet.frame() else {
        return false;
    };
    match decode_frame(&frame.words) {
        Some(view) if view.request_id == packet.request_id => {}
        _ => return false,
    }
    packet
        .of_kind(BufferKind::Generic)
        .chain(packet.of_kind(BufferKind::Dmi))
        .all(|b| decode_commands(&b.words).is_some())
}

/// Simulated hardware: consumes packets, holds each for `latency`, then
/// reports completion. Exits when the device side is dropped.
pub fn spawn_hardware(
    packets: kanal::Receiver<Packet>,
    latency: Duration,
) -> (JoinHandle<()>, kanal::Receiver<Completion>) {
    let (tx, rx) = kanal::unbounded();
    let handle = thread::spawn(move || {
        while let Ok(packet) = packets.recv() {
            let ok = validate_packet(&packet);
            if !ok {
                warn!("request {}: malformed packet", packet.request_id);
            }
            thread::sleep(latency);
            if tx
                .send(Completion {
                    request_id: packet.request_id,
                    ok,
                })
                .is_err()
            {
                break;
            }
        }
    });
    (handle, rx)
}
