// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod common;

use common::{all_enabled, harness, properties, register_writes, request, table_writes, three_module_config};
use edgefirst_isp::{
    bandwidth,
    calibration::TuningTree,
    cmdbuf::{BufferHandle, BufferKind},
    config::{HardwareCapability, HwVersion, InstanceProfile, NodeConfig},
    device::{validate_packet, Device, DeviceHandle, LoopbackDevice, Packet, ResourceDescriptor},
    frame::{decode_frame, FLAG_STRIPING, FLAG_TUNING_DUMP, PROGRAM_GENERIC},
    iq::ModuleKind,
    negotiate::{ConsumerRequirement, Dimensions},
    node::{ProcessingNode, RequestState},
    port::{PortBuffer, PortId},
    request::{AecStats, Dependency, FrameProperties, FrameRequest, ResumeToken},
    striping::STRIPE_MAGIC,
    IspError,
};
use std::{collections::VecDeque, error::Error, sync::Arc};

#[test]
fn test_three_modules_ten_frames() -> Result<(), Box<dyn Error>> {
    let mut h = harness(three_module_config(), all_enabled())?;
    assert_eq!(
        h.node.module_kinds(),
        vec![ModuleKind::Pedestal, ModuleKind::WhiteBalance, ModuleKind::ToneMapping]
    );

    let mut in_flight = VecDeque::new();
    for frame in 1..=10u64 {
        let outcome = h.node.execute_process_request(&request(frame), &properties())?;
        let summary = outcome.summary().ok_or("frame not submitted")?;
        assert_eq!(summary.programs, 4);

        let packet = h.packets.recv()?;
        assert_eq!(packet.request_id, frame);
        packet.verify_commit_order()?;
        assert!(validate_packet(&packet));

        let view = decode_frame(&packet.frame().ok_or("no frame buffer")?.words).ok_or("bad frame")?;
        assert_eq!(view.request_id, frame);
        let types: Vec<u32> = view.programs.iter().map(|(t, _)| *t).collect();
        assert_eq!(
            types,
            vec![
                ModuleKind::Pedestal.program_type(),
                ModuleKind::WhiteBalance.program_type(),
                ModuleKind::ToneMapping.program_type(),
                PROGRAM_GENERIC,
            ]
        );
        assert_eq!(view.programs[0].1, 0);
        assert_eq!(view.programs[2].1, 66 * 4);
        assert_eq!(view.programs[3].1, (10 + 8 + 10) * 4);

        in_flight.push_back(frame);
        if in_flight.len() == 4 {
            if let Some(done) = in_flight.pop_front() {
                assert_eq!(h.node.on_request_complete(done), 4);
            }
        }
    }

    assert_eq!(h.node.submitted(), 10);
    assert!(h.packets.try_recv()?.is_none());
    for pool in h.node.pools() {
        assert_eq!(pool.high_water_mark(), 4, "pool '{}'", pool.name());
    }
    assert_eq!(h.sink.len(), 10);
    Ok(())
}

#[test]
fn test_commit_order_in_packet() -> Result<(), Box<dyn Error>> {
    let mut h = harness(three_module_config(), all_enabled())?;
    let (summary, packet) = h.run(&request(1), &properties())?;
    let kinds: Vec<BufferKind> = packet.buffers.iter().map(|b| b.kind).collect();
    assert_eq!(
        kinds,
        vec![BufferKind::Generic, BufferKind::Dmi, BufferKind::IqSettings, BufferKind::Frame]
    );
    assert_eq!(packet.frame, summary.frame);

    // The frame patches the settings block, both port images and every
    // program target.
    let frame = packet.frame().ok_or("no frame buffer")?;
    assert_eq!(frame.patches.len(), 1 + 2 + 2);
    assert_eq!(frame.patches.iter().filter(|p| p.source.is_external()).count(), 2);
    Ok(())
}

#[test]
fn test_dependency_pending_then_resume() -> Result<(), Box<dyn Error>> {
    let mut h = harness(three_module_config(), all_enabled())?;

    let outcome = h.node.execute_process_request(&request(1), &FrameProperties::default())?;
    let pending = outcome.pending().ok_or("expected dependency pending")?;
    assert_eq!(pending.missing, vec![Dependency::SensorMode]);
    let token = pending.resume;
    assert_eq!(
        token,
        ResumeToken {
            request_id: 1,
            sequence_id: 1
        }
    );
    assert_eq!(h.node.request_state(1), Some(RequestState::DependencyPending(token)));
    assert!(h.packets.try_recv()?.is_none());
    assert!(h.node.pools().iter().all(|p| p.in_use() == 0));

    let (summary, _) = h.run(&request(1).resume(token), &properties())?;
    assert_eq!(summary.sequence_id, 1);
    assert!(h.packets.try_recv()?.is_none());
    assert_eq!(h.node.submitted(), 1);
    Ok(())
}

#[test]
fn test_stale_sequence_rejected() -> Result<(), Box<dyn Error>> {
    let mut h = harness(three_module_config(), all_enabled())?;
    let outcome = h.node.execute_process_request(&request(1), &FrameProperties::default())?;
    let token = outcome.pending().ok_or("expected dependency pending")?.resume;

    assert!(matches!(
        h.node.execute_process_request(&request(1), &properties()),
        Err(IspError::Configuration(_))
    ));
    assert_eq!(h.node.request_state(1), Some(RequestState::DependencyPending(token)));
    h.run(&request(1).resume(token), &properties())?;
    Ok(())
}

#[test]
fn test_realtime_waits_for_statistics() -> Result<(), Box<dyn Error>> {
    let config = NodeConfig {
        realtime: true,
        ..three_module_config()
    };
    let mut h = harness(config, all_enabled())?;
    let partial = FrameProperties::default().with_sensor_mode(common::sensor());
    let outcome = h.node.execute_process_request(&request(1), &partial)?;
    let pending = outcome.pending().ok_or("expected dependency pending")?;
    assert_eq!(
        pending.missing,
        vec![Dependency::AecStatistics, Dependency::AwbStatistics]
    );

    let resumed = request(1).resume(pending.resume);
    let (summary, _) = h.run(&resumed, &properties())?;
    assert_eq!(summary.request_id, 1);
    Ok(())
}

#[test]
fn test_profile_excludes_modules() -> Result<(), Box<dyn Error>> {
    let config = NodeConfig {
        profile: InstanceProfile::Only(vec![ModuleKind::Pedestal, ModuleKind::ToneMapping]),
        ..NodeConfig::default()
    };
    let mut h = harness(config, all_enabled())?;
    assert_eq!(
        h.node.module_kinds(),
        vec![ModuleKind::Pedestal, ModuleKind::ToneMapping]
    );
    assert!(h.node.module(ModuleKind::Gamma).is_none());

    for frame in 1..=3 {
        let (summary, packet) = h.run(&request(frame), &properties())?;
        let bases: Vec<u32> = register_writes(&packet).iter().map(|(base, _)| *base).collect();
        assert_eq!(bases, vec![0x0400, 0x0800]);
        assert_eq!(table_writes(&packet).len(), 1);
        assert_eq!(
            summary.enabled_modules,
            vec![ModuleKind::Pedestal, ModuleKind::ToneMapping]
        );
    }
    Ok(())
}

#[test]
fn test_profile_ranges() -> Result<(), Box<dyn Error>> {
    let config = NodeConfig {
        profile: InstanceProfile::UpTo(ModuleKind::LensShading),
        disabled_modules: vec![ModuleKind::Denoise],
        ..NodeConfig::default()
    };
    let h = harness(config, all_enabled())?;
    assert_eq!(
        h.node.module_kinds(),
        vec![
            ModuleKind::Pedestal,
            ModuleKind::Linearization,
            ModuleKind::DefectivePixel,
            ModuleKind::GainImbalance,
            ModuleKind::LensShading,
        ]
    );

    let config = NodeConfig {
        profile: InstanceProfile::From(ModuleKind::Gamma),
        ..NodeConfig::default()
    };
    let h = harness(config, all_enabled())?;
    assert_eq!(
        h.node.module_kinds(),
        vec![
            ModuleKind::Gamma,
            ModuleKind::ColorSpaceTransform,
            ModuleKind::HybridNoiseReduction,
        ]
    );
    Ok(())
}

#[test]
fn test_full_chain() -> Result<(), Box<dyn Error>> {
    let mut h = harness(NodeConfig::default(), all_enabled())?;
    assert_eq!(h.node.module_kinds().len(), ModuleKind::COUNT);
    assert_eq!(h.node.port_specs().len(), 7);

    let (summary, packet) = h.run(&request(1), &properties())?;
    assert_eq!(summary.enabled_modules, ModuleKind::ALL.to_vec());
    assert_eq!(summary.programs, ModuleKind::COUNT + 1);
    assert!(validate_packet(&packet));
    Ok(())
}

#[test]
fn test_striping() -> Result<(), Box<dyn Error>> {
    let config = NodeConfig {
        striping: true,
        ..three_module_config()
    };
    let mut h = harness(config, all_enabled())?;
    assert_eq!(h.node.pools().len(), 5);

    let (summary, packet) = h.run(&request(1), &properties())?;
    let blob = packet.of_kind(BufferKind::Striping).next().ok_or("no striping buffer")?;
    assert_eq!(blob.words[0], STRIPE_MAGIC);
    assert_eq!(blob.words[1], 2);
    packet.verify_commit_order()?;

    let view = decode_frame(&packet.frame().ok_or("no frame buffer")?.words).ok_or("bad frame")?;
    assert_ne!(view.flags & FLAG_STRIPING, 0);

    // Two 960 pixel stripes, each with one 64 pixel overlap.
    assert_eq!(summary.clock.cycles, 580_608);
    let unstriped = bandwidth::estimate_cycles(&h.node.config().bandwidth, 1920 * 1080);
    assert!(summary.clock.cycles > unstriped);
    Ok(())
}

#[test]
fn test_tuning_dump() -> Result<(), Box<dyn Error>> {
    let config = NodeConfig {
        tuning_dump: true,
        ..three_module_config()
    };
    let mut h = harness(config, all_enabled())?;
    let (_, packet) = h.run(&request(1), &properties())?;
    let view = decode_frame(&packet.frame().ok_or("no frame buffer")?.words).ok_or("bad frame")?;
    assert_ne!(view.flags & FLAG_TUNING_DUMP, 0);

    let records = h.sink.records();
    let dump = records[0].tuning.as_ref().ok_or("no tuning dump")?;
    assert_eq!(dump.snapshots.len(), 3);
    let tone = dump.get(ModuleKind::ToneMapping).ok_or("no tone mapping snapshot")?;
    assert_eq!(tone.luts[0].len(), 64);
    assert_eq!(tone.bank, 0);
    Ok(())
}

#[test]
fn test_metadata_contents() -> Result<(), Box<dyn Error>> {
    let mut h = harness(three_module_config(), all_enabled())?;
    let props = properties().with_aec(AecStats {
        drc_gain: 2.0,
        ..AecStats::default()
    });
    h.run(&request(1), &props)?;

    let records = h.sink.records();
    assert_eq!(records.len(), 1);
    let meta = &records[0];
    assert_eq!(meta.request_id, 1);
    assert_eq!(meta.black_level, 64);
    assert_eq!(meta.drc_gain, 2.0);
    assert_eq!(meta.tone_curve.len(), 64);
    assert!(meta.tuning.is_none());
    assert_eq!(meta.enabled_modules.len(), 3);
    Ok(())
}

#[test]
fn test_pool_exhaustion_drops_frame() -> Result<(), Box<dyn Error>> {
    let config = NodeConfig {
        queue_depth: 2,
        ..three_module_config()
    };
    let mut h = harness(config, all_enabled())?;
    h.node.execute_process_request(&request(1), &properties())?;
    h.node.execute_process_request(&request(2), &properties())?;
    assert_eq!(h.node.in_flight(), 2);

    assert!(matches!(
        h.node.execute_process_request(&request(3), &properties()),
        Err(IspError::ResourceExhausted { depth: 2, .. })
    ));
    assert_eq!(h.node.request_state(3), None);
    assert!(h.node.pools().iter().all(|p| p.in_use() == 2));

    h.node.on_request_complete(1);
    assert!(h.node.execute_process_request(&request(3), &properties())?.is_submitted());
    Ok(())
}

#[test]
fn test_request_validation() -> Result<(), Box<dyn Error>> {
    let mut h = harness(three_module_config(), all_enabled())?;
    let mut batched = request(1);
    batched.batch_size = 2;
    assert!(matches!(
        h.node.execute_process_request(&batched, &properties()),
        Err(IspError::Configuration(_))
    ));

    h.node.execute_process_request(&request(1), &properties())?;
    assert_eq!(h.node.request_state(1), Some(RequestState::Submitted));
    assert!(matches!(
        h.node.execute_process_request(&request(1), &properties()),
        Err(IspError::Configuration(_))
    ));
    assert_eq!(h.node.on_request_complete(1), 4);
    assert_eq!(h.node.request_state(1), None);
    Ok(())
}

struct RejectingDevice;

impl Device for RejectingDevice {
    fn acquire(&mut self, _descriptor: &ResourceDescriptor) -> edgefirst_isp::Result<DeviceHandle> {
        Ok(DeviceHandle(1))
    }

    fn submit(&mut self, _handle: DeviceHandle, packet: Packet) -> edgefirst_isp::Result<()> {
        Err(IspError::Submit {
            request_id: packet.request_id,
            reason: "queue full".to_owned(),
        })
    }

    fn release(&mut self, _handle: DeviceHandle) {}
}

#[test]
fn test_submit_failure_releases_slots() -> Result<(), Box<dyn Error>> {
    let mut node = ProcessingNode::builder()
        .with_config(three_module_config())
        .with_device(RejectingDevice)
        .with_calibration(Arc::new(all_enabled()))
        .initialize()?;
    assert!(matches!(
        node.execute_process_request(&request(1), &properties()),
        Err(IspError::Submit { request_id: 1, .. })
    ));
    assert!(node.pools().iter().all(|p| p.in_use() == 0));
    assert_eq!(node.request_state(1), None);
    assert_eq!(node.submitted(), 0);
    Ok(())
}

#[test]
fn test_hardware_versions() -> Result<(), Box<dyn Error>> {
    let unsupported = ProcessingNode::builder()
        .with_capability(HardwareCapability {
            version: HwVersion::new(3, 0),
            ..HardwareCapability::default()
        })
        .with_device(LoopbackDevice::new().0)
        .with_calibration(Arc::new(all_enabled()))
        .initialize();
    assert!(matches!(unsupported, Err(IspError::Configuration(_))));

    let v1 = HardwareCapability {
        version: HwVersion::new(1, 4),
        ..HardwareCapability::default()
    };
    let node = ProcessingNode::builder()
        .with_capability(v1)
        .with_device(LoopbackDevice::new().0)
        .with_calibration(Arc::new(all_enabled()))
        .initialize()?;
    assert_eq!(node.module_kinds().len(), ModuleKind::COUNT - 1);
    assert!(node.module(ModuleKind::HybridNoiseReduction).is_none());

    let only_hnr = ProcessingNode::builder()
        .with_config(NodeConfig {
            profile: InstanceProfile::Only(vec![ModuleKind::HybridNoiseReduction]),
            ..NodeConfig::default()
        })
        .with_capability(v1)
        .with_device(LoopbackDevice::new().0)
        .with_calibration(Arc::new(all_enabled()))
        .initialize();
    assert!(matches!(only_hnr, Err(IspError::Configuration(_))));
    Ok(())
}

#[test]
fn test_initialize_validation() {
    let no_device = ProcessingNode::builder()
        .with_calibration(Arc::new(TuningTree::new()))
        .initialize();
    assert!(matches!(no_device, Err(IspError::Configuration(_))));

    let no_calibration = ProcessingNode::builder()
        .with_device(LoopbackDevice::new().0)
        .initialize();
    assert!(matches!(no_calibration, Err(IspError::Configuration(_))));

    let zero_depth = ProcessingNode::builder()
        .with_config(NodeConfig {
            queue_depth: 0,
            ..NodeConfig::default()
        })
        .with_device(LoopbackDevice::new().0)
        .with_calibration(Arc::new(TuningTree::new()))
        .initialize();
    assert!(matches!(zero_depth, Err(IspError::Configuration(_))));
}

#[test]
fn test_negotiate_through_node() -> Result<(), Box<dyn Error>> {
    let mut h = harness(three_module_config(), all_enabled())?;
    assert!(h.node.negotiated().is_none());
    let result = h.node.negotiate_buffers(&[
        ConsumerRequirement::new(PortId::Full, Dimensions::new(1920, 1080)).with_alignment(16),
        ConsumerRequirement::new(PortId::Ds4, Dimensions::new(480, 270)),
    ])?;
    assert_eq!(result.input.port, PortId::Input);
    assert_eq!(result.input.dimensions, Dimensions::new(1920, 1088));
    assert_eq!(h.node.negotiated(), Some(&result));

    // 1080-line buffers no longer hold the agreed geometry.
    assert!(matches!(
        h.node.execute_process_request(&request(1), &properties()),
        Err(IspError::Configuration(_))
    ));
    assert_eq!(h.node.request_state(1), None);
    assert!(h.node.pools().iter().all(|p| p.in_use() == 0));

    let sized = FrameRequest::new(2)
        .with_input(PortBuffer::new(PortId::Input, BufferHandle::external(1), 1920, 1088, 10))
        .with_output(PortBuffer::new(PortId::Full, BufferHandle::external(2), 1920, 1088, 16));
    let (summary, _) = h.run(&sized, &properties())?;
    assert_eq!(summary.request_id, 2);
    Ok(())
}

#[test]
fn test_unchanged_frame_repeats_commands() -> Result<(), Box<dyn Error>> {
    let mut h = harness(three_module_config(), all_enabled())?;
    let (_, first) = h.run(&request(1), &properties())?;
    let (_, second) = h.run(&request(2), &properties())?;

    for kind in [BufferKind::Generic, BufferKind::Dmi] {
        let a: Vec<&Vec<u32>> = first.of_kind(kind).map(|b| &b.words).collect();
        let b: Vec<&Vec<u32>> = second.of_kind(kind).map(|b| &b.words).collect();
        assert_eq!(a.len(), 1);
        assert_eq!(a, b, "{:?} words differ", kind);
    }
    for kind in h.node.module_kinds() {
        let module = h.node.module(kind).ok_or("module missing")?;
        assert_eq!(module.state().calculations, 1, "{} recalculated", kind);
    }
    Ok(())
}

#[test]
fn test_pending_requests_bounded() -> Result<(), Box<dyn Error>> {
    let config = NodeConfig {
        max_pending: 2,
        ..three_module_config()
    };
    let mut h = harness(config, all_enabled())?;
    for id in 1..=3 {
        h.node.execute_process_request(&request(id), &FrameProperties::default())?;
    }
    assert_eq!(h.node.request_state(1), None);
    assert!(matches!(h.node.request_state(2), Some(RequestState::DependencyPending(_))));
    assert!(matches!(h.node.request_state(3), Some(RequestState::DependencyPending(_))));

    assert!(h.node.cancel_request(2));
    assert!(!h.node.cancel_request(2));
    assert_eq!(h.node.request_state(2), None);

    let (summary, _) = h.run(&request(4), &properties())?;
    assert_eq!(summary.request_id, 4);
    assert!(!h.node.cancel_request(4));
    Ok(())
}

#[test]
fn test_sequence_exhausted() -> Result<(), Box<dyn Error>> {
    let mut h = harness(three_module_config(), all_enabled())?;
    let mut last = request(1);
    last.sequence_id = u32::MAX;
    assert!(matches!(
        h.node.execute_process_request(&last, &FrameProperties::default()),
        Err(IspError::Configuration(_))
    ));
    assert_eq!(h.node.request_state(1), None);
    Ok(())
}

#[test]
fn test_compressed_output() -> Result<(), Box<dyn Error>> {
    let config = NodeConfig {
        compressed_outputs: vec![PortId::Full],
        ..three_module_config()
    };
    let mut h = harness(config, all_enabled())?;
    let (summary, packet) = h.run(&request(1), &properties())?;
    assert!(summary.clock.compressed_bw > 0);

    let view = decode_frame(&packet.frame().ok_or("no frame buffer")?.words).ok_or("bad frame")?;
    let full = view.ports.iter().find(|p| p.port == PortId::Full).ok_or("no full port")?;
    let input = view.ports.iter().find(|p| p.port == PortId::Input).ok_or("no input port")?;
    assert!(full.compressed);
    assert!(!input.compressed);
    Ok(())
}

#[test]
fn test_teardown() -> Result<(), Box<dyn Error>> {
    let mut h = harness(three_module_config(), all_enabled())?;
    h.run(&request(1), &properties())?;
    h.node.execute_process_request(&request(2), &properties())?;
    assert!(!h.sink.is_closed());

    h.node.teardown()?;
    assert!(h.sink.is_closed());
    assert_eq!(h.sink.len(), 2);
    Ok(())
}
