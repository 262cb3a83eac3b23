// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! The per-frame processing node.
//!
//! A [`ProcessingNode`] owns the IQ modules and the frame-scoped pools. For
//! each frame it resolves dependencies, drives every module in processing
//! order, assembles the frame buffer, commits everything in patch order and
//! submits the packet. Hardware completion is reported back through
//! [`ProcessingNode::on_request_complete`], which recycles the frame's slots.

use crate::{
    bandwidth::{self, ClockBandwidth, PortTraffic},
    calibration::CalibrationSource,
    cmdbuf::{BufferHandle, BufferKind, CommitLog},
    config::{HardwareCapability, NodeConfig},
    device::{Device, DeviceHandle, Packet, ResourceDescriptor},
    error::{IspError, Result},
    frame::{self, FrameContent, ProgramDescriptor, FLAG_STRIPING, FLAG_TUNING_DUMP, PROGRAM_GENERIC},
    iq::{self, IqModule, ModuleCommands, ModuleInput, ModuleKind, ModuleStreams, Triggers},
    metadata::{FrameMetadata, MetadataService, MetadataWriter},
    negotiate::{self, ConsumerRequirement, NegotiationResult},
    pool::ResourcePool,
    port::{PortBuffer, PortDirection, PortId, PortSpec},
    request::{
        AecStats, AwbStats, Dependency, DependencyDescriptor, FrameProperties, FrameRequest, FrameSummary,
        ProcessOutcome, ResumeToken, Roi, SensorMode,
    },
    settings::{self, IqSettingsBlock, TuningDump},
    striping::{FixedUnitStriper, FrameGeometry, StripingLibrary},
};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, error, info, instrument, warn};

/// Where a request is in its lifecycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RequestState {
    /// Waiting for dependencies; re-drive with the token.
    DependencyPending(ResumeToken),
    /// Buffers acquired, modules running.
    Ready,
    /// Handed to the device, slots held until completion.
    Submitted,
}

/// Collects the collaborators of a node before initialization.
pub struct NodeBuilder {
    config: NodeConfig,
    capability: HardwareCapability,
    device: Option<Box<dyn Device>>,
    calibration: Option<Arc<dyn CalibrationSource>>,
    metadata: Option<MetadataService>,
    striping: Option<Box<dyn StripingLibrary>>,
    modules: Vec<Box<dyn IqModule>>,
}

impl NodeBuilder {
    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_capability(mut self, capability: HardwareCapability) -> Self {
        self.capability = capability;
        self
    }

    pub fn with_device(mut self, device: impl Device + 'static) -> Self {
        self.device = Some(Box::new(device));
        self
    }

    pub fn with_calibration(mut self, calibration: Arc<dyn CalibrationSource>) -> Self {
        self.calibration = Some(calibration);
        self
    }

    pub fn with_metadata(mut self, metadata: MetadataService) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_striping_library(mut self, library: impl StripingLibrary + 'static) -> Self {
        self.striping = Some(Box::new(library));
        self
    }

    /// Replaces the built-in implementation of `module.kind()`.
    pub fn with_module(mut self, module: Box<dyn IqModule>) -> Self {
        self.modules.push(module);
        self
    }

    /// Validates the configuration, builds the module chain, sizes and
    /// allocates the pools, and acquires the device and a metadata writer.
    pub fn initialize(self) -> Result<ProcessingNode> {
        ProcessingNode::initialize(self)
    }
}

/// The frame-scoped pools, one slot per in-flight request each.
struct FramePools {
    frame: ResourcePool,
    iq_settings: ResourcePool,
    registers: ResourcePool,
    dmi: ResourcePool,
    striping: Option<ResourcePool>,
}

impl FramePools {
    fn iter(&self) -> impl Iterator<Item = &ResourcePool> {
        [&self.frame, &self.iq_settings, &self.registers, &self.dmi]
            .into_iter()
            .chain(self.striping.as_ref())
    }

    fn recycle_request(&mut self, request_id: u64) -> usize {
        let mut recycled = 0;
        for pool in [&mut self.frame, &mut self.iq_settings, &mut self.registers, &mut self.dmi]
            .into_iter()
            .chain(self.striping.as_mut())
        {
            if pool.recycle_request(request_id) {
                recycled += 1;
            }
        }
        recycled
    }
}

/// Handles of one frame's buffers.
struct FrameHandles {
    frame: BufferHandle,
    iq_settings: BufferHandle,
    registers: BufferHandle,
    dmi: BufferHandle,
    striping: Option<BufferHandle>,
}

pub struct ProcessingNode {
    config: NodeConfig,
    capability: HardwareCapability,
    device: Box<dyn Device>,
    device_handle: Option<DeviceHandle>,
    calibration: Arc<dyn CalibrationSource>,
    metadata: Option<MetadataWriter>,
    striping: Option<Box<dyn StripingLibrary>>,
    modules: Vec<Box<dyn IqModule>>,
    pools: FramePools,
    register_words: usize,
    dmi_words: usize,
    ports: Vec<PortSpec>,
    negotiated: Option<NegotiationResult>,
    requests: HashMap<u64, RequestState>,
    submitted: u64,
}

impl ProcessingNode {
    pub fn builder() -> NodeBuilder {
        NodeBuilder {
            config: NodeConfig::default(),
            capability: HardwareCapability::default(),
            device: None,
            calibration: None,
            metadata: None,
            striping: None,
            modules: Vec::new(),
        }
    }

    #[instrument(skip_all, fields(version = %builder.capability.version))]
    fn initialize(builder: NodeBuilder) -> Result<Self> {
        let NodeBuilder {
            config,
            capability,
            device,
            calibration,
            metadata,
            striping,
            modules: mut custom,
        } = builder;
        config.validate()?;
        if !capability.version.is_supported() {
            return Err(IspError::Configuration(format!(
                "unsupported hardware version {}",
                capability.version
            )));
        }
        let mut device =
            device.ok_or_else(|| IspError::Configuration("no device transport".to_owned()))?;
        let calibration =
            calibration.ok_or_else(|| IspError::Configuration("no calibration source".to_owned()))?;

        let mut modules: Vec<Box<dyn IqModule>> = Vec::new();
        for kind in ModuleKind::ALL {
            if !config.profile.selects(kind) || config.disabled_modules.contains(&kind) {
                continue;
            }
            if kind.min_hw_major() > capability.version.major {
                debug!("{} not present on hardware {}", kind, capability.version);
                continue;
            }
            let module = match custom.iter().position(|m| m.kind() == kind) {
                Some(i) => custom.swap_remove(i),
                None => iq::create(kind, config.affinity)?,
            };
            modules.push(module);
        }
        if modules.is_empty() {
            return Err(IspError::Configuration(format!(
                "profile {:?} selects no module",
                config.profile
            )));
        }

        let register_words: usize = modules.iter().map(|m| m.register_words()).sum();
        let dmi_words: usize = modules.iter().map(|m| m.dmi_words()).sum();
        let striping = match (config.striping, striping) {
            (false, _) => None,
            (true, Some(library)) => Some(library),
            (true, None) => Some(Box::new(FixedUnitStriper::new(
                capability.stripe_units,
                capability.stripe_overlap,
                capability.max_stripe_width,
            )) as Box<dyn StripingLibrary>),
        };

        let depth = config.queue_depth;
        let affinity = config.affinity;
        let pools = FramePools {
            frame: ResourcePool::new("frame", BufferKind::Frame, frame::schema().total_bytes(), depth, affinity)?,
            iq_settings: ResourcePool::new(
                "iq-settings",
                BufferKind::IqSettings,
                settings::schema().total_bytes(),
                depth,
                affinity,
            )?,
            registers: ResourcePool::new("registers", BufferKind::Generic, register_words * 4, depth, affinity)?,
            dmi: ResourcePool::new("dmi", BufferKind::Dmi, dmi_words.max(1) * 4, depth, affinity)?,
            striping: match &striping {
                Some(library) => Some(ResourcePool::new(
                    "striping",
                    BufferKind::Striping,
                    library.max_blob_words() * 4,
                    depth,
                    affinity,
                )?),
                None => None,
            },
        };

        let descriptor = ResourceDescriptor {
            name: "edgefirst-isp".to_owned(),
            queue_depth: depth,
            regions: pools.iter().map(|p| (p.kind(), p.region())).collect(),
        };
        let device_handle = device.acquire(&descriptor)?;
        let metadata = match metadata {
            Some(service) => Some(service.acquire()?),
            None => None,
        };

        let ports = PortId::ALL
            .iter()
            .map(|&port| PortSpec {
                port,
                direction: port.direction(),
                class: port.class(),
            })
            .collect();

        info!(
            "initialized {} modules, {} register words, {} DMI words, depth {}",
            modules.len(),
            register_words,
            dmi_words,
            depth
        );
        Ok(Self {
            config,
            capability,
            device,
            device_handle: Some(device_handle),
            calibration,
            metadata,
            striping,
            modules,
            pools,
            register_words,
            dmi_words,
            ports,
            negotiated: None,
            requests: HashMap::new(),
            submitted: 0,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn capability(&self) -> &HardwareCapability {
        &self.capability
    }

    pub fn port_specs(&self) -> &[PortSpec] {
        &self.ports
    }

    /// Instantiated modules in processing order.
    pub fn module_kinds(&self) -> Vec<ModuleKind> {
        self.modules.iter().map(|m| m.kind()).collect()
    }

    pub fn module(&self, kind: ModuleKind) -> Option<&dyn IqModule> {
        self.modules.iter().find(|m| m.kind() == kind).map(|m| m.as_ref())
    }

    /// Frame-scoped pools: frame, IQ settings, registers, DMI, striping.
    pub fn pools(&self) -> Vec<&ResourcePool> {
        self.pools.iter().collect()
    }

    pub fn request_state(&self, request_id: u64) -> Option<RequestState> {
        self.requests.get(&request_id).copied()
    }

    /// Requests submitted and not yet completed.
    pub fn in_flight(&self) -> usize {
        self.requests
            .values()
            .filter(|s| **s == RequestState::Submitted)
            .count()
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn negotiated(&self) -> Option<&NegotiationResult> {
        self.negotiated.as_ref()
    }

    /// Agrees output geometry with downstream consumers.
    #[instrument(skip_all, fields(consumers = consumers.len()))]
    pub fn negotiate_buffers(&mut self, consumers: &[ConsumerRequirement]) -> Result<NegotiationResult> {
        let result = negotiate::negotiate(consumers, &self.capability)?;
        self.negotiated = Some(result.clone());
        Ok(result)
    }

    /// Processes one frame.
    ///
    /// Returns [`ProcessOutcome::DependencyPending`] when the sensor mode,
    /// or in realtime mode the statistics, are not yet published. The
    /// scheduler re-drives the request with the returned token once they
    /// are. Any error releases the request's slots.
    #[instrument(skip_all, fields(request = request.id, sequence = request.sequence_id))]
    pub fn execute_process_request(
        &mut self,
        request: &FrameRequest,
        properties: &FrameProperties,
    ) -> Result<ProcessOutcome> {
        if self.device_handle.is_none() {
            return Err(IspError::Configuration("node is torn down".to_owned()));
        }
        if request.batch_size != 1 {
            return Err(IspError::Configuration(format!(
                "batch size {} unsupported",
                request.batch_size
            )));
        }
        self.check_negotiated(request)?;
        match self.requests.get(&request.id) {
            Some(RequestState::Submitted) | Some(RequestState::Ready) => {
                return Err(IspError::Configuration(format!(
                    "request {} already in progress",
                    request.id
                )));
            }
            Some(RequestState::DependencyPending(token)) if request.sequence_id < token.sequence_id => {
                return Err(IspError::Configuration(format!(
                    "request {} re-driven with stale sequence {} (expected {})",
                    request.id, request.sequence_id, token.sequence_id
                )));
            }
            _ => {}
        }

        let missing = self.missing_dependencies(properties);
        let sensor = match (&properties.sensor_mode, missing.is_empty()) {
            (Some(sensor), true) => sensor.clone(),
            _ => {
                let sequence_id = request.sequence_id.checked_add(1).ok_or_else(|| {
                    IspError::Configuration(format!("request {} sequence exhausted", request.id))
                })?;
                let resume = ResumeToken {
                    request_id: request.id,
                    sequence_id,
                };
                self.requests
                    .insert(request.id, RequestState::DependencyPending(resume));
                self.evict_pending();
                debug!("request {} waiting on {:?}", request.id, missing);
                return Ok(ProcessOutcome::DependencyPending(DependencyDescriptor { resume, missing }));
            }
        };

        self.requests.insert(request.id, RequestState::Ready);
        match self.process(request, properties, &sensor) {
            Ok(summary) => {
                self.requests.insert(request.id, RequestState::Submitted);
                self.submitted += 1;
                Ok(ProcessOutcome::Submitted(summary))
            }
            Err(e) => {
                let released = self.pools.recycle_request(request.id);
                self.requests.remove(&request.id);
                error!(
                    "request {} aborted, released {} slots: {}",
                    request.id, released, e
                );
                Err(e)
            }
        }
    }

    /// Rejects port buffers smaller than the geometry agreed with
    /// neighbors. Nothing is checked before the first negotiation.
    fn check_negotiated(&self, request: &FrameRequest) -> Result<()> {
        let Some(negotiated) = &self.negotiated else {
            return Ok(());
        };
        for buffer in request.ports() {
            let required = match buffer.port {
                PortId::Input => Some(&negotiated.input),
                port => negotiated.port(port),
            };
            let Some(required) = required else {
                continue;
            };
            if buffer.width < required.dimensions.width || buffer.height < required.dimensions.height {
                return Err(IspError::Configuration(format!(
                    "request {}: {:?} buffer {}x{} below negotiated {}x{}",
                    request.id,
                    buffer.port,
                    buffer.width,
                    buffer.height,
                    required.dimensions.width,
                    required.dimensions.height
                )));
            }
        }
        Ok(())
    }

    /// Forgets the oldest pending requests beyond the configured limit.
    fn evict_pending(&mut self) {
        loop {
            let mut pending: Vec<u64> = self
                .requests
                .iter()
                .filter(|(_, state)| matches!(state, RequestState::DependencyPending(_)))
                .map(|(id, _)| *id)
                .collect();
            if pending.len() <= self.config.max_pending {
                return;
            }
            pending.sort_unstable();
            self.requests.remove(&pending[0]);
            warn!("evicted pending request {}", pending[0]);
        }
    }

    /// Drops a request the scheduler abandoned while it waited on
    /// dependencies. Submitted requests finish through
    /// [`on_request_complete`](Self::on_request_complete).
    pub fn cancel_request(&mut self, request_id: u64) -> bool {
        match self.requests.get(&request_id) {
            Some(RequestState::DependencyPending(_)) => {
                self.requests.remove(&request_id);
                true
            }
            _ => false,
        }
    }

    fn missing_dependencies(&self, properties: &FrameProperties) -> Vec<Dependency> {
        let mut missing = Vec::new();
        if properties.sensor_mode.is_none() {
            missing.push(Dependency::SensorMode);
        }
        if self.config.realtime {
            if properties.aec.is_none() {
                missing.push(Dependency::AecStatistics);
            }
            if properties.awb.is_none() {
                missing.push(Dependency::AwbStatistics);
            }
        }
        missing
    }

    fn acquire_buffers(&mut self, request_id: u64) -> Result<FrameHandles> {
        Ok(FrameHandles {
            frame: self.pools.frame.acquire(request_id)?,
            iq_settings: self.pools.iq_settings.acquire(request_id)?,
            registers: self.pools.registers.acquire(request_id)?,
            dmi: self.pools.dmi.acquire(request_id)?,
            striping: match self.pools.striping.as_mut() {
                Some(pool) => Some(pool.acquire(request_id)?),
                None => None,
            },
        })
    }

    /// Output ports with the configured compression applied.
    fn frame_ports(&self, request: &FrameRequest) -> Vec<PortBuffer> {
        request
            .ports()
            .map(|buffer| {
                let compressed = buffer.compressed || self.config.compressed_outputs.contains(&buffer.port);
                buffer.compressed(compressed)
            })
            .collect()
    }

    fn process(
        &mut self,
        request: &FrameRequest,
        properties: &FrameProperties,
        sensor: &SensorMode,
    ) -> Result<FrameSummary> {
        let handles = self.acquire_buffers(request.id)?;

        let aec = properties.aec.unwrap_or_default();
        let awb = properties.awb.unwrap_or_default();
        let mut base = base_triggers(&aec, &awb, sensor);
        let roi = properties.roi.unwrap_or(Roi {
            x: 0,
            y: 0,
            width: sensor.width,
            height: sensor.height,
        });

        let mut iq_settings = IqSettingsBlock::new(request.id);
        let mut dump = self.config.tuning_dump.then(|| TuningDump::new(request.id));
        let mut emitted: Vec<ModuleCommands> = Vec::new();
        let register_bytes;
        {
            let mut registers = self.pools.registers.begin_write(handles.registers, self.register_words)?;
            let mut dmi = self.pools.dmi.begin_write(handles.dmi, self.dmi_words)?;
            let mut streams = ModuleStreams {
                registers: &mut registers,
                dmi: &mut dmi,
            };
            for module in self.modules.iter_mut() {
                let kind = module.kind();
                if kind.index() >= ModuleKind::WhiteBalance.index() {
                    // From white balance on, modules see the sensitivity
                    // left after the white balance gains.
                    base.wb_sensitivity = base.gain * awb.gains.max();
                }
                let input = ModuleInput {
                    request_id: request.id,
                    selector: &properties.selector,
                    calibration: self.calibration.as_ref(),
                    sensor,
                    black_level: sensor.black_level,
                    roi,
                    awb: awb.gains,
                    triggers: module_triggers(kind, &base),
                    overrides: &request.overrides,
                    force_disabled: &request.force_disable,
                };
                if let Some(commands) = module.execute(&input, &mut streams, &mut iq_settings, dump.as_mut())? {
                    emitted.push(commands);
                }
            }
            register_bytes = streams.registers.offset_bytes();
        }

        let mut programs: Vec<ProgramDescriptor> = emitted
            .iter()
            .map(|commands| ProgramDescriptor {
                program_type: commands.program_type,
                length: commands.lut.map(|l| l.length).unwrap_or(0),
                target: commands.lut.map(|l| (handles.dmi, l.offset)),
            })
            .collect();
        programs.push(ProgramDescriptor {
            program_type: PROGRAM_GENERIC,
            length: register_bytes,
            target: Some((handles.registers, 0)),
        });

        {
            let mut stream = self
                .pools
                .iq_settings
                .begin_write(handles.iq_settings, settings::schema().total_words())?;
            iq_settings.encode(&mut stream)?;
        }

        let ports = self.frame_ports(request);
        let output = ports
            .iter()
            .find(|p| p.port.direction() == PortDirection::Output)
            .map(|p| (p.width, p.height))
            .unwrap_or((sensor.width, sensor.height));
        let pixels = match (self.striping.as_mut(), handles.striping, self.pools.striping.as_mut()) {
            (Some(library), Some(handle), Some(pool)) => {
                let geometry = FrameGeometry {
                    input_width: sensor.width,
                    input_height: sensor.height,
                    output_width: output.0,
                    output_height: output.1,
                };
                let striped = library.stripe(&iq_settings, &geometry)?;
                let mut stream = pool.begin_write(handle, striped.blob.len())?;
                stream.write_words(&striped.blob)?;
                debug!("request {}: {} stripes", request.id, striped.stripes);
                striped.pixel_count
            }
            _ => u64::from(sensor.width) * u64::from(sensor.height),
        };

        let traffic: Vec<PortTraffic> = ports.iter().map(PortTraffic::from).collect();
        let clock = bandwidth::compute(&self.config.bandwidth, pixels, self.config.target_fps, &traffic);

        let mut flags = 0;
        if handles.striping.is_some() {
            flags |= FLAG_STRIPING;
        }
        if dump.is_some() {
            flags |= FLAG_TUNING_DUMP;
        }
        {
            let mut stream = self
                .pools
                .frame
                .begin_write(handles.frame, frame::schema().total_words())?;
            frame::write_frame(
                &mut stream,
                &FrameContent {
                    request_id: request.id,
                    batch_size: request.batch_size,
                    ports: &ports,
                    iq_settings: handles.iq_settings,
                    striping: handles.striping,
                    programs: &programs,
                    clock,
                    flags,
                },
            )?;
        }

        let packet = self.commit(request.id, &handles, &ports)?;
        self.publish_metadata(request, &iq_settings, clock, dump, sensor);

        let device_handle = self
            .device_handle
            .ok_or_else(|| IspError::Configuration("node is torn down".to_owned()))?;
        self.device.submit(device_handle, packet)?;
        debug!(
            "request {}: submitted {} programs, {} modules enabled",
            request.id,
            programs.len(),
            emitted.len()
        );

        Ok(FrameSummary {
            request_id: request.id,
            sequence_id: request.sequence_id,
            frame: handles.frame,
            enabled_modules: iq_settings.enabled(),
            programs: programs.len(),
            clock,
        })
    }

    /// Commits register, DMI, striping, IQ settings then frame buffers and
    /// collects them into a packet in that order.
    fn commit(&mut self, request_id: u64, handles: &FrameHandles, ports: &[PortBuffer]) -> Result<Packet> {
        let mut log = CommitLog::new();
        for port in ports {
            log.mark_external(port.image);
        }
        let pools = &mut self.pools;
        pools.registers.commit(handles.registers, &mut log)?;
        pools.dmi.commit(handles.dmi, &mut log)?;
        if let (Some(pool), Some(handle)) = (pools.striping.as_mut(), handles.striping) {
            pool.commit(handle, &mut log)?;
        }
        pools.iq_settings.commit(handles.iq_settings, &mut log)?;
        pools.frame.commit(handles.frame, &mut log)?;

        let mut buffers = vec![
            pools.registers.snapshot(handles.registers)?,
            pools.dmi.snapshot(handles.dmi)?,
        ];
        if let (Some(pool), Some(handle)) = (pools.striping.as_ref(), handles.striping) {
            buffers.push(pool.snapshot(handle)?);
        }
        buffers.push(pools.iq_settings.snapshot(handles.iq_settings)?);
        buffers.push(pools.frame.snapshot(handles.frame)?);
        Ok(Packet {
            request_id,
            frame: handles.frame,
            buffers,
        })
    }

    fn publish_metadata(
        &self,
        request: &FrameRequest,
        iq_settings: &IqSettingsBlock,
        clock: ClockBandwidth,
        dump: Option<TuningDump>,
        sensor: &SensorMode,
    ) {
        let Some(writer) = &self.metadata else {
            return;
        };
        let active = |kind| self.module(kind).filter(|m| m.state().active());
        let black_level = active(ModuleKind::Pedestal)
            .and_then(|m| m.state().registers.first().copied())
            .unwrap_or(sensor.black_level);
        let tone = active(ModuleKind::ToneMapping);
        let metadata = FrameMetadata {
            request_id: request.id,
            sequence_id: request.sequence_id,
            black_level,
            drc_gain: tone
                .and_then(|m| m.state().triggers)
                .map(|t| t.drc_gain)
                .unwrap_or(1.0),
            tone_curve: tone
                .and_then(|m| m.state().luts.first().cloned())
                .unwrap_or_default(),
            enabled_modules: iq_settings.enabled(),
            clock,
            tuning: dump,
        };
        if let Err(e) = writer.publish(&metadata) {
            warn!("request {}: metadata not published: {}", request.id, e);
        }
    }

    /// Hardware finished with `request_id`: its slots return to the pools.
    /// Returns the number of slots recycled.
    #[instrument(skip(self))]
    pub fn on_request_complete(&mut self, request_id: u64) -> usize {
        let recycled = self.pools.recycle_request(request_id);
        if self.requests.remove(&request_id).is_none() {
            warn!("completion for unknown request {}", request_id);
        }
        recycled
    }

    /// Releases the device handle and the metadata reference, then drops
    /// modules and pools.
    pub fn teardown(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.modules.clear();
        if let Some(handle) = self.device_handle.take() {
            self.device.release(handle);
        }
        if !self.requests.is_empty() {
            debug!("tearing down with {} requests outstanding", self.requests.len());
            self.requests.clear();
        }
        match self.metadata.take() {
            Some(writer) => writer.release(),
            None => Ok(()),
        }
    }
}

impl Drop for ProcessingNode {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("teardown: {}", e);
        }
    }
}

/// Triggers shared by every module of the frame.
fn base_triggers(aec: &AecStats, awb: &AwbStats, sensor: &SensorMode) -> Triggers {
    Triggers {
        gain: aec.real_gain,
        lux: aec.lux_index,
        exposure_time: aec.exposure_ns as f32 / 1_000_000.0,
        drc_gain: aec.drc_gain,
        cct: awb.cct,
        wb_sensitivity: 1.0,
        sensor_width: sensor.width,
        sensor_height: sensor.height,
    }
}

/// The DRC gain multiplies the sensor gain for tone mapping only.
fn module_triggers(kind: ModuleKind, base: &Triggers) -> Triggers {
    let mut triggers = *base;
    if kind == ModuleKind::ToneMapping {
        triggers.gain = base.gain * base.drc_gain;
    }
    triggers
}
