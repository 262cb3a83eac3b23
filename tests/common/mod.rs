// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

#![allow(dead_code)]

use edgefirst_isp::{
    calibration::{CalibrationSource, TuningTree},
    cmdbuf::{decode_commands, BufferHandle, BufferKind, Command},
    config::{InstanceProfile, NodeConfig},
    device::{LoopbackDevice, Packet},
    iq::ModuleKind,
    metadata::{MemorySink, MetadataService},
    node::ProcessingNode,
    port::{PortBuffer, PortId},
    request::{AecStats, AwbStats, FrameProperties, FrameRequest, FrameSummary, ProcessOutcome, SensorMode},
    Result,
};
use std::{error::Error, sync::Arc};

pub const SENSOR_WIDTH: u32 = 1920;
pub const SENSOR_HEIGHT: u32 = 1080;

/// A node on the loopback device with its packet queue and metadata sink.
pub struct Harness {
    pub node: ProcessingNode,
    pub packets: kanal::Receiver<Packet>,
    pub sink: MemorySink,
}

pub fn harness(config: NodeConfig, tuning: impl CalibrationSource + 'static) -> Result<Harness> {
    let (device, packets) = LoopbackDevice::new();
    let sink = MemorySink::new();
    let node = ProcessingNode::builder()
        .with_config(config)
        .with_device(device)
        .with_calibration(Arc::new(tuning))
        .with_metadata(MetadataService::memory(&sink))
        .initialize()?;
    Ok(Harness { node, packets, sink })
}

impl Harness {
    /// Processes a frame that has every dependency, takes its packet off
    /// the loopback queue and completes it.
    pub fn run(
        &mut self,
        request: &FrameRequest,
        properties: &FrameProperties,
    ) -> std::result::Result<(FrameSummary, Packet), Box<dyn Error>> {
        let summary = match self.node.execute_process_request(request, properties)? {
            ProcessOutcome::Submitted(summary) => summary,
            ProcessOutcome::DependencyPending(pending) => {
                return Err(format!("request {} pending on {:?}", request.id, pending.missing).into())
            }
        };
        let packet = self.packets.recv()?;
        assert_eq!(packet.request_id, request.id);
        self.node.on_request_complete(request.id);
        Ok((summary, packet))
    }
}

/// Pedestal, white balance and tone mapping: two register-only blocks and
/// one with a 64-entry table.
pub fn three_module_config() -> NodeConfig {
    NodeConfig {
        profile: InstanceProfile::Only(vec![
            ModuleKind::Pedestal,
            ModuleKind::WhiteBalance,
            ModuleKind::ToneMapping,
        ]),
        queue_depth: 4,
        ..NodeConfig::default()
    }
}

pub fn all_enabled() -> TuningTree {
    TuningTree::enable_all()
}

pub fn sensor() -> SensorMode {
    SensorMode::new(0, SENSOR_WIDTH, SENSOR_HEIGHT, 10).with_black_level(64)
}

pub fn properties() -> FrameProperties {
    FrameProperties::default()
        .with_sensor_mode(sensor())
        .with_aec(AecStats::default())
        .with_awb(AwbStats::default())
}

pub fn properties_with_gain(gain: f32) -> FrameProperties {
    properties().with_aec(AecStats {
        real_gain: gain,
        ..AecStats::default()
    })
}

pub fn request(id: u64) -> FrameRequest {
    FrameRequest::new(id)
        .with_input(PortBuffer::new(
            PortId::Input,
            BufferHandle::external(1),
            SENSOR_WIDTH,
            SENSOR_HEIGHT,
            10,
        ))
        .with_output(PortBuffer::new(
            PortId::Full,
            BufferHandle::external(2),
            SENSOR_WIDTH,
            SENSOR_HEIGHT,
            16,
        ))
}

/// Register range commands of the packet's register buffer.
pub fn register_writes(packet: &Packet) -> Vec<(u32, Vec<u32>)> {
    packet
        .of_kind(BufferKind::Generic)
        .flat_map(|b| decode_commands(&b.words).unwrap_or_default())
        .filter_map(|c| match c {
            Command::RegRange { base, values } => Some((base, values)),
            Command::Dmi { .. } => None,
        })
        .collect()
}

/// `(select, bank)` of every table write in the packet's DMI buffer.
pub fn table_writes(packet: &Packet) -> Vec<(u8, u8)> {
    packet
        .of_kind(BufferKind::Dmi)
        .flat_map(|b| decode_commands(&b.words).unwrap_or_default())
        .filter_map(|c| match c {
            Command::Dmi { select, bank, .. } => Some((select, bank)),
            Command::RegRange { .. } => None,
        })
        .collect()
}
