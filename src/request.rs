// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Frame requests, the per-frame properties they depend on, and the
//! outcome of processing one.

use crate::{
    bandwidth::ClockBandwidth,
    calibration::TuningSelector,
    cmdbuf::BufferHandle,
    iq::{DirectOverride, ModuleKind},
    port::PortBuffer,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sensor readout mode of the frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorMode {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub bit_depth: u32,
    #[serde(default)]
    pub black_level: u32,
    #[serde(default = "default_max_fps")]
    pub max_fps: f32,
    #[serde(default = "default_binning")]
    pub binning: u32,
}

fn default_max_fps() -> f32 {
    30.0
}

fn default_binning() -> u32 {
    1
}

impl SensorMode {
    pub fn new(index: u32, width: u32, height: u32, bit_depth: u32) -> Self {
        Self {
            index,
            width,
            height,
            bit_depth,
            black_level: 0,
            max_fps: default_max_fps(),
            binning: default_binning(),
        }
    }

    pub fn with_black_level(mut self, black_level: u32) -> Self {
        self.black_level = black_level;
        self
    }

    pub fn with_max_fps(mut self, max_fps: f32) -> Self {
        self.max_fps = max_fps;
        self
    }
}

/// Auto-exposure results applied to the frame.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AecStats {
    /// Total sensor gain, analog times digital.
    pub real_gain: f32,
    pub exposure_ns: u64,
    pub lux_index: f32,
    /// Dynamic range compression gain requested for tone mapping.
    #[serde(default = "default_gain")]
    pub drc_gain: f32,
}

fn default_gain() -> f32 {
    1.0
}

impl Default for AecStats {
    fn default() -> Self {
        Self {
            real_gain: 1.0,
            exposure_ns: 33_000_000,
            lux_index: 350.0,
            drc_gain: 1.0,
        }
    }
}

/// Per-channel white balance gains.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AwbGains {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Default for AwbGains {
    fn default() -> Self {
        Self {
            r: 1.0,
            g: 1.0,
            b: 1.0,
        }
    }
}

impl AwbGains {
    pub fn max(&self) -> f32 {
        self.r.max(self.g).max(self.b)
    }
}

/// Auto white balance results applied to the frame.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AwbStats {
    pub gains: AwbGains,
    /// Correlated color temperature in kelvin.
    pub cct: f32,
}

impl Default for AwbStats {
    fn default() -> Self {
        Self {
            gains: AwbGains::default(),
            cct: 5000.0,
        }
    }
}

/// Region of interest in sensor coordinates.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Properties published by upstream stages for one frame. A `None` field
/// has not been published yet.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameProperties {
    pub sensor_mode: Option<SensorMode>,
    pub aec: Option<AecStats>,
    pub awb: Option<AwbStats>,
    pub selector: TuningSelector,
    pub roi: Option<Roi>,
}

impl FrameProperties {
    pub fn with_sensor_mode(mut self, mode: SensorMode) -> Self {
        self.selector.sensor_mode = mode.index;
        self.sensor_mode = Some(mode);
        self
    }

    pub fn with_aec(mut self, aec: AecStats) -> Self {
        self.aec = Some(aec);
        self
    }

    pub fn with_awb(mut self, awb: AwbStats) -> Self {
        self.awb = Some(awb);
        self
    }

    pub fn with_selector(mut self, selector: TuningSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_roi(mut self, roi: Roi) -> Self {
        self.roi = Some(roi);
        self
    }
}

/// One frame to process.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRequest {
    pub id: u64,
    /// Incremented each time the scheduler re-drives the same request.
    pub sequence_id: u32,
    pub batch_size: u32,
    pub inputs: Vec<PortBuffer>,
    pub outputs: Vec<PortBuffer>,
    pub overrides: HashMap<ModuleKind, DirectOverride>,
    pub force_disable: Vec<ModuleKind>,
}

impl FrameRequest {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            sequence_id: 0,
            batch_size: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
            overrides: HashMap::new(),
            force_disable: Vec::new(),
        }
    }

    pub fn with_input(mut self, buffer: PortBuffer) -> Self {
        self.inputs.push(buffer);
        self
    }

    pub fn with_output(mut self, buffer: PortBuffer) -> Self {
        self.outputs.push(buffer);
        self
    }

    pub fn with_override(mut self, kind: ModuleKind, direct: DirectOverride) -> Self {
        self.overrides.insert(kind, direct);
        self
    }

    pub fn with_force_disable(mut self, kind: ModuleKind) -> Self {
        self.force_disable.push(kind);
        self
    }

    /// The same request re-driven from a continuation token.
    pub fn resume(mut self, token: ResumeToken) -> Self {
        debug_assert_eq!(self.id, token.request_id);
        self.sequence_id = token.sequence_id;
        self
    }

    /// Input then output buffers.
    pub fn ports(&self) -> impl Iterator<Item = &PortBuffer> {
        self.inputs.iter().chain(&self.outputs)
    }
}

/// Input a request can wait on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    SensorMode,
    AecStatistics,
    AwbStatistics,
}

/// Continuation of a pending request: re-drive request `request_id` with
/// this `sequence_id` once the dependencies are published.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ResumeToken {
    pub request_id: u64,
    pub sequence_id: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DependencyDescriptor {
    pub resume: ResumeToken,
    pub missing: Vec<Dependency>,
}

/// What one submitted frame looked like.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSummary {
    pub request_id: u64,
    pub sequence_id: u32,
    pub frame: BufferHandle,
    pub enabled_modules: Vec<ModuleKind>,
    /// Program descriptors in the frame buffer, generic one included.
    pub programs: usize,
    pub clock: ClockBandwidth,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProcessOutcome {
    Submitted(FrameSummary),
    DependencyPending(DependencyDescriptor),
}

impl ProcessOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, ProcessOutcome::Submitted(_))
    }

    pub fn summary(&self) -> Option<&FrameSummary> {
        match self {
            ProcessOutcome::Submitted(summary) => Some(summary),
            ProcessOutcome::DependencyPending(_) => None,
        }
    }

    pub fn pending(&self) -> Option<&DependencyDescriptor> {
        match self {
            ProcessOutcome::DependencyPending(descriptor) => Some(descriptor),
            ProcessOutcome::Submitted(_) => None,
        }
    }
}
