// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod common;

use common::{all_enabled, harness, properties, properties_with_gain, register_writes, request, table_writes};
use edgefirst_isp::{
    calibration::{CalibrationLeaf, CalibrationNode, Parameters, TriggerKind, TuningSelector, TuningTree},
    config::{InstanceProfile, NodeConfig},
    device::Packet,
    hysteresis::{HysteresisConfig, HysteresisState},
    iq::{self, DirectOverride, ModuleInput, ModuleKind, Triggers},
    pool::DeviceAffinity,
    request::{AecStats, AwbGains, AwbStats, Roi, SensorMode},
};
use std::{collections::HashMap, error::Error};

fn module_input<'a>(
    tuning: &'a TuningTree,
    sensor: &'a SensorMode,
    selector: &'a TuningSelector,
    overrides: &'a HashMap<ModuleKind, DirectOverride>,
    triggers: Triggers,
) -> ModuleInput<'a> {
    ModuleInput {
        request_id: 1,
        selector,
        calibration: tuning,
        sensor,
        black_level: sensor.black_level,
        roi: Roi {
            x: 0,
            y: 0,
            width: sensor.width,
            height: sensor.height,
        },
        awb: AwbGains::default(),
        triggers,
        overrides,
        force_disabled: &[],
    }
}

fn gain(gain: f32) -> Triggers {
    Triggers {
        gain,
        ..Triggers::default()
    }
}

fn nan_override() -> DirectOverride {
    DirectOverride {
        enable: true,
        params: Parameters {
            coefficients: vec![f32::NAN],
            tables: Vec::new(),
        },
    }
}

#[test]
fn test_dependency_check_idempotent() -> Result<(), Box<dyn Error>> {
    let tuning = all_enabled();
    let sensor = common::sensor();
    let selector = TuningSelector::default();
    let overrides = HashMap::new();
    let input = module_input(&tuning, &sensor, &selector, &overrides, Triggers::default());

    let mut module = iq::create(ModuleKind::Pedestal, DeviceAffinity::Host)?;
    assert!(module.check_dependency_changed(&input));
    module.run_calculation(&input)?;
    assert!(!module.check_dependency_changed(&input));
    assert!(!module.check_dependency_changed(&input));
    assert_eq!(module.state().calculations, 1);

    let brighter = module_input(&tuning, &sensor, &selector, &overrides, gain(2.0));
    assert!(module.check_dependency_changed(&brighter));
    Ok(())
}

#[test]
fn test_selector_change_requeries() -> Result<(), Box<dyn Error>> {
    let tuning = TuningTree::new().with_entry(edgefirst_isp::calibration::TuningEntry {
        module: ModuleKind::Pedestal,
        usecase: None,
        sensor_mode: Some(1),
        scene: None,
        effect: None,
        leaf: CalibrationLeaf::default(),
    });
    let sensor = common::sensor();
    let overrides = HashMap::new();
    let mode0 = TuningSelector::default();
    let mode1 = TuningSelector {
        sensor_mode: 1,
        ..TuningSelector::default()
    };

    let mut module = iq::create(ModuleKind::Pedestal, DeviceAffinity::Host)?;
    module.check_dependency_changed(&module_input(&tuning, &sensor, &mode0, &overrides, Triggers::default()));
    assert!(!module.state().enabled);

    assert!(module.check_dependency_changed(&module_input(&tuning, &sensor, &mode1, &overrides, Triggers::default())));
    assert!(module.state().enabled);
    Ok(())
}

#[test]
fn test_hysteresis_band() {
    let config = HysteresisConfig {
        trigger: TriggerKind::Gain,
        threshold: 8.0,
        margin: 1.0,
        enable_above: true,
    };
    let mut state = HysteresisState::default();
    assert_eq!(state.enabled(), None);
    assert!(!state.update(&config, 7.5));

    // Hovering inside the band never toggles.
    for i in 0..100 {
        let value = if i % 2 == 0 { 8.5 } else { 7.5 };
        assert!(!state.update(&config, value));
    }
    assert_eq!(state.toggles(), 0);

    assert!(state.update(&config, 9.5));
    for i in 0..100 {
        let value = if i % 2 == 0 { 8.5 } else { 7.5 };
        assert!(state.update(&config, value));
    }
    assert!(!state.update(&config, 6.5));
    assert_eq!(state.toggles(), 2);
}

#[test]
fn test_hysteresis_enable_below() {
    let config = HysteresisConfig {
        trigger: TriggerKind::Lux,
        threshold: 100.0,
        margin: 10.0,
        enable_above: false,
    };
    let mut state = HysteresisState::default();
    assert!(state.update(&config, 50.0));
    assert!(state.update(&config, 105.0));
    assert!(!state.update(&config, 120.0));
    assert!(!state.update(&config, 95.0));
    assert!(state.update(&config, 85.0));
    assert_eq!(state.toggles(), 2);
}

#[test]
fn test_hysteresis_toggles_bounded() -> Result<(), Box<dyn Error>> {
    let tuning = TuningTree::new().with_leaf(
        ModuleKind::Denoise,
        CalibrationLeaf {
            hysteresis: Some(HysteresisConfig {
                trigger: TriggerKind::Gain,
                threshold: 4.0,
                margin: 0.5,
                enable_above: true,
            }),
            ..CalibrationLeaf::default()
        },
    );
    let sensor = common::sensor();
    let selector = TuningSelector::default();
    let overrides = HashMap::new();
    let mut module = iq::create(ModuleKind::Denoise, DeviceAffinity::Host)?;

    // Three full sweeps across the band: at most two toggles each.
    let sweep: Vec<f32> = (0..=16).map(|i| i as f32 * 0.5).chain((0..16).rev().map(|i| i as f32 * 0.5)).collect();
    for _ in 0..3 {
        for &value in &sweep {
            module.check_dependency_changed(&module_input(&tuning, &sensor, &selector, &overrides, gain(value)));
        }
    }
    let toggles = module.state().hysteresis.toggles();
    assert!(toggles >= 2);
    assert!(toggles <= 6);
    Ok(())
}

#[test]
fn test_lut_bank_alternates() -> Result<(), Box<dyn Error>> {
    let mut h = harness(common::three_module_config(), all_enabled())?;
    let mut banks = Vec::new();
    for frame in 1..=6u64 {
        let (_, packet) = h.run(&request(frame), &properties_with_gain(frame as f32))?;
        let writes = table_writes(&packet);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, 0x06);
        banks.push(writes[0].1);
    }
    assert_eq!(banks, vec![0, 1, 0, 1, 0, 1]);

    // Unchanged triggers reuse the tables in place.
    let (_, packet) = h.run(&request(7), &properties_with_gain(6.0))?;
    assert_eq!(table_writes(&packet), vec![(0x06, 1)]);
    let tone = h
        .node
        .module(ModuleKind::ToneMapping)
        .ok_or("tone mapping missing")?;
    assert_eq!(tone.state().calculations, 6);
    Ok(())
}

#[test]
fn test_calculation_failure_keeps_stale_output() -> Result<(), Box<dyn Error>> {
    let mut h = harness(common::three_module_config(), all_enabled())?;
    let (_, packet) = h.run(&request(1), &properties())?;
    let before = register_writes(&packet);
    let pedestal = before.iter().find(|(base, _)| *base == 0x0400).ok_or("no pedestal write")?;
    assert_eq!(pedestal.1[0], 64);

    let (summary, packet) = h.run(
        &request(2).with_override(ModuleKind::Pedestal, nan_override()),
        &properties(),
    )?;
    let state = h.node.module(ModuleKind::Pedestal).ok_or("pedestal missing")?.state();
    assert!(state.stale);
    assert!(summary.enabled_modules.contains(&ModuleKind::Pedestal));
    let after = register_writes(&packet);
    assert_eq!(after.iter().find(|(base, _)| *base == 0x0400), Some(pedestal));

    // Dropping the override recalculates from calibration.
    h.run(&request(3), &properties())?;
    let state = h.node.module(ModuleKind::Pedestal).ok_or("pedestal missing")?.state();
    assert!(!state.stale);
    assert_eq!(state.calculations, 2);
    Ok(())
}

#[test]
fn test_calculation_failure_without_output_disables() -> Result<(), Box<dyn Error>> {
    let mut h = harness(common::three_module_config(), all_enabled())?;
    let (summary, packet) = h.run(
        &request(1).with_override(ModuleKind::Pedestal, nan_override()),
        &properties(),
    )?;
    assert!(!summary.enabled_modules.contains(&ModuleKind::Pedestal));
    assert!(register_writes(&packet).iter().all(|(base, _)| *base != 0x0400));
    assert_eq!(summary.programs, 3);

    let sensor = SensorMode::new(0, 1920, 1080, 10).with_black_level(4096);
    let (summary, _) = h.run(&request(2), &properties().with_sensor_mode(sensor))?;
    assert!(!summary.enabled_modules.contains(&ModuleKind::Pedestal));
    Ok(())
}

#[test]
fn test_force_disable() -> Result<(), Box<dyn Error>> {
    let mut h = harness(common::three_module_config(), all_enabled())?;
    let (summary, packet) = h.run(
        &request(1).with_force_disable(ModuleKind::WhiteBalance),
        &properties(),
    )?;
    assert_eq!(
        summary.enabled_modules,
        vec![ModuleKind::Pedestal, ModuleKind::ToneMapping]
    );
    assert!(register_writes(&packet).iter().all(|(base, _)| *base != 0x0700));

    let (summary, _) = h.run(&request(2), &properties())?;
    assert!(summary.enabled_modules.contains(&ModuleKind::WhiteBalance));
    Ok(())
}

#[test]
fn test_override_bypasses_calibration() -> Result<(), Box<dyn Error>> {
    let tuning = TuningTree::new().with_leaf(ModuleKind::Pedestal, CalibrationLeaf::default());
    let mut h = harness(common::three_module_config(), tuning)?;

    let (summary, _) = h.run(&request(1), &properties())?;
    assert_eq!(summary.enabled_modules, vec![ModuleKind::Pedestal]);

    let direct = DirectOverride {
        enable: true,
        params: Parameters {
            coefficients: vec![2.0],
            tables: Vec::new(),
        },
    };
    let (summary, packet) = h.run(
        &request(2).with_override(ModuleKind::WhiteBalance, direct),
        &properties(),
    )?;
    assert!(summary.enabled_modules.contains(&ModuleKind::WhiteBalance));
    let writes = register_writes(&packet);
    let (_, wb) = writes.iter().find(|(base, _)| *base == 0x0700).ok_or("no white balance write")?;
    assert_eq!(&wb[..4], &[2048, 2048, 2048, 2048]);
    Ok(())
}

#[test]
fn test_disabled_override() -> Result<(), Box<dyn Error>> {
    let mut h = harness(NodeConfig::default(), all_enabled())?;
    let off = DirectOverride {
        enable: false,
        params: Parameters::default(),
    };
    let (summary, _) = h.run(&request(1).with_override(ModuleKind::Gamma, off), &properties())?;
    assert!(!summary.enabled_modules.contains(&ModuleKind::Gamma));
    assert!(summary.enabled_modules.contains(&ModuleKind::Demosaic));
    Ok(())
}

fn ccm_writes(packet: &Packet) -> Option<Vec<u32>> {
    register_writes(packet)
        .into_iter()
        .find(|(base, _)| *base == 0x0780)
        .map(|(_, values)| values)
}

#[test]
fn test_wb_sensitivity_reaches_later_modules() -> Result<(), Box<dyn Error>> {
    let saturated = vec![1.5, -0.25, -0.25, -0.25, 1.5, -0.25, -0.25, -0.25, 1.5];
    let ccm = CalibrationLeaf {
        interpolation: TriggerKind::WbSensitivity,
        nodes: vec![
            CalibrationNode {
                trigger: 1.0,
                coefficients: vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
                tables: Vec::new(),
            },
            CalibrationNode {
                trigger: 4.0,
                coefficients: saturated,
                tables: Vec::new(),
            },
        ],
        ..CalibrationLeaf::default()
    };
    let tuning = TuningTree::new()
        .with_leaf(ModuleKind::WhiteBalance, CalibrationLeaf::default())
        .with_leaf(ModuleKind::ColorCorrection, ccm);
    let config = NodeConfig {
        profile: InstanceProfile::Only(vec![ModuleKind::WhiteBalance, ModuleKind::ColorCorrection]),
        ..NodeConfig::default()
    };
    let mut h = harness(config, tuning)?;

    let (_, packet) = h.run(&request(1), &properties())?;
    let neutral = ccm_writes(&packet).ok_or("no color correction write")?;

    let warm = properties()
        .with_aec(AecStats {
            real_gain: 2.0,
            ..AecStats::default()
        })
        .with_awb(AwbStats {
            gains: AwbGains { r: 1.9, g: 1.0, b: 1.0 },
            ..AwbStats::default()
        });
    let (_, packet) = h.run(&request(2), &warm)?;
    let shifted = ccm_writes(&packet).ok_or("no color correction write")?;
    assert_ne!(neutral, shifted);

    let state = h
        .node
        .module(ModuleKind::ColorCorrection)
        .ok_or("color correction missing")?
        .state();
    let triggers = state.triggers.ok_or("no triggers")?;
    assert!((triggers.wb_sensitivity - 3.8).abs() < 1e-4);
    Ok(())
}
