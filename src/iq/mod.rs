// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Image-quality modules.
//!
//! Each hardware block is an [`IqModule`]. Per frame the node calls
//! [`IqModule::execute`], which walks the block through a fixed sequence:
//!
//! 1. [`check_dependency_changed`](IqModule::check_dependency_changed)
//!    resolves calibration and triggers and decides enablement.
//! 2. [`run_calculation`](IqModule::run_calculation) recomputes registers
//!    and lookup tables, only when something changed and the block is on.
//! 3. [`create_command_list`](IqModule::create_command_list) writes the
//!    block's tables into the shared DMI buffer and its registers into the
//!    shared register buffer.
//! 4. [`update_shared_settings`](IqModule::update_shared_settings) records
//!    the enable bit and firmware parameters, always.
//!
//! All concrete blocks share one implementation, [`Block`], parameterized by
//! a [`BlockCalculator`] that supplies the block's layout and math.

mod bayer;
mod block;
mod color;
mod tone;

pub use bayer::{DefectivePixel, Denoise, GainImbalance, LensShading, Linearization, Pedestal};
pub use block::{Block, BlockCalculator, BlockDescriptor, CalcOutput, CalcParams};
pub use color::{ColorCorrection, ColorSpaceTransform, Demosaic, WhiteBalance};
pub use tone::{Gamma, HybridNoiseReduction, ToneMapping};

use crate::{
    calibration::{CalibrationLeaf, CalibrationSource, Parameters, TriggerKind, TuningSelector},
    cmdbuf::CommandStream,
    error::{IspError, Result},
    hysteresis::HysteresisState,
    lut::LutBank,
    pool::DeviceAffinity,
    request::{AwbGains, Roi, SensorMode},
    settings::{IqSettingsBlock, TuningDump},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};
use tracing::warn;

/// The hardware blocks, in the order they process a frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    Pedestal,
    Linearization,
    DefectivePixel,
    GainImbalance,
    Denoise,
    LensShading,
    WhiteBalance,
    Demosaic,
    ColorCorrection,
    ToneMapping,
    Gamma,
    ColorSpaceTransform,
    HybridNoiseReduction,
}

impl ModuleKind {
    pub const COUNT: usize = 13;

    pub const ALL: [ModuleKind; Self::COUNT] = [
        ModuleKind::Pedestal,
        ModuleKind::Linearization,
        ModuleKind::DefectivePixel,
        ModuleKind::GainImbalance,
        ModuleKind::Denoise,
        ModuleKind::LensShading,
        ModuleKind::WhiteBalance,
        ModuleKind::Demosaic,
        ModuleKind::ColorCorrection,
        ModuleKind::ToneMapping,
        ModuleKind::Gamma,
        ModuleKind::ColorSpaceTransform,
        ModuleKind::HybridNoiseReduction,
    ];

    /// Position in processing order.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModuleKind::Pedestal => "pedestal",
            ModuleKind::Linearization => "linearization",
            ModuleKind::DefectivePixel => "defective_pixel",
            ModuleKind::GainImbalance => "gain_imbalance",
            ModuleKind::Denoise => "denoise",
            ModuleKind::LensShading => "lens_shading",
            ModuleKind::WhiteBalance => "white_balance",
            ModuleKind::Demosaic => "demosaic",
            ModuleKind::ColorCorrection => "color_correction",
            ModuleKind::ToneMapping => "tone_mapping",
            ModuleKind::Gamma => "gamma",
            ModuleKind::ColorSpaceTransform => "color_space_transform",
            ModuleKind::HybridNoiseReduction => "hybrid_noise_reduction",
        }
    }

    /// Program type code firmware uses for this block.
    pub fn program_type(&self) -> u32 {
        0x10 + self.index() as u32
    }

    /// Oldest hardware major version carrying the block.
    pub fn min_hw_major(&self) -> u32 {
        match self {
            ModuleKind::HybridNoiseReduction => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dynamic inputs every block may key on. Two frames with equal triggers and
/// selector produce identical output.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Triggers {
    pub gain: f32,
    pub lux: f32,
    /// Exposure time in milliseconds.
    pub exposure_time: f32,
    pub drc_gain: f32,
    pub cct: f32,
    pub wb_sensitivity: f32,
    pub sensor_width: u32,
    pub sensor_height: u32,
}

impl Default for Triggers {
    fn default() -> Self {
        Self {
            gain: 1.0,
            lux: 350.0,
            exposure_time: 33.0,
            drc_gain: 1.0,
            cct: 5000.0,
            wb_sensitivity: 1.0,
            sensor_width: 0,
            sensor_height: 0,
        }
    }
}

impl Triggers {
    pub fn value(&self, kind: TriggerKind) -> f32 {
        match kind {
            TriggerKind::Gain => self.gain,
            TriggerKind::Lux => self.lux,
            TriggerKind::ExposureTime => self.exposure_time,
            TriggerKind::DrcGain => self.drc_gain,
            TriggerKind::Cct => self.cct,
            TriggerKind::WbSensitivity => self.wb_sensitivity,
        }
    }
}

/// Parameters supplied by the application that bypass calibration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectOverride {
    pub enable: bool,
    #[serde(default)]
    pub params: Parameters,
}

/// Per-frame aggregate shared by every module.
pub struct ModuleInput<'a> {
    pub request_id: u64,
    pub selector: &'a TuningSelector,
    pub calibration: &'a dyn CalibrationSource,
    pub sensor: &'a SensorMode,
    pub black_level: u32,
    pub roi: Roi,
    pub awb: AwbGains,
    pub triggers: Triggers,
    pub overrides: &'a HashMap<ModuleKind, DirectOverride>,
    pub force_disabled: &'a [ModuleKind],
}

impl ModuleInput<'_> {
    pub fn override_for(&self, kind: ModuleKind) -> Option<&DirectOverride> {
        self.overrides.get(&kind)
    }

    pub fn is_force_disabled(&self, kind: ModuleKind) -> bool {
        self.force_disabled.contains(&kind)
    }
}

/// Cached state of one module, mutated only by the module itself.
#[derive(Clone, Debug, Default)]
pub struct IqModuleState {
    /// Enable decision for the current frame.
    pub enabled: bool,
    pub selector: Option<TuningSelector>,
    pub leaf: Option<CalibrationLeaf>,
    pub override_params: Option<DirectOverride>,
    pub triggers: Option<Triggers>,
    pub registers: Vec<u32>,
    pub luts: Vec<Vec<u32>>,
    pub hysteresis: HysteresisState,
    pub bank: LutBank,
    /// Registers and tables hold a successful calculation.
    pub has_output: bool,
    /// The last calculation failed and the output is from an earlier frame.
    pub stale: bool,
    pub calculations: u64,
}

impl IqModuleState {
    /// On this frame and holding output to program.
    pub fn active(&self) -> bool {
        self.enabled && self.has_output
    }
}

/// Shared per-frame buffers a module writes into.
pub struct ModuleStreams<'s, 'b> {
    pub registers: &'s mut CommandStream<'b>,
    pub dmi: &'s mut CommandStream<'b>,
}

/// Where a module's tables landed in the shared DMI buffer. Offsets in
/// bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LutRegion {
    pub offset: u32,
    pub length: u32,
}

/// What a module emitted this frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ModuleCommands {
    pub kind: ModuleKind,
    pub program_type: u32,
    pub lut: Option<LutRegion>,
}

/// Register/LUT snapshot of one block, captured for tuning metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModuleSnapshot {
    pub kind: ModuleKind,
    pub enabled: bool,
    pub stale: bool,
    pub bank: u8,
    pub registers: Vec<u32>,
    pub luts: Vec<Vec<u32>>,
}

/// One hardware block.
pub trait IqModule: Send {
    fn kind(&self) -> ModuleKind;

    fn state(&self) -> &IqModuleState;

    /// Worst-case words this block writes into the shared register buffer.
    fn register_words(&self) -> usize;

    /// Worst-case words this block writes into the shared DMI buffer.
    fn dmi_words(&self) -> usize;

    /// Resolves calibration and triggers, updates enablement and reports
    /// whether the output must be recalculated.
    fn check_dependency_changed(&mut self, input: &ModuleInput<'_>) -> bool;

    /// Recomputes registers and tables. [`IspError::Calculation`] means the
    /// math rejected its inputs; other errors are structural.
    fn run_calculation(&mut self, input: &ModuleInput<'_>) -> Result<()>;

    /// Keeps the previous output after a failed calculation.
    fn mark_stale(&mut self);

    /// Writes tables and registers when active; `None` when skipped.
    fn create_command_list(&mut self, streams: &mut ModuleStreams<'_, '_>) -> Result<Option<ModuleCommands>>;

    /// Records enable state and firmware parameters, and snapshots the
    /// block into `dump` when tuning capture is active.
    fn update_shared_settings(&self, settings: &mut IqSettingsBlock, dump: Option<&mut TuningDump>);

    /// Runs the per-frame sequence. A calculation failure is logged and the
    /// block continues with stale output, or disabled if it never produced
    /// any.
    fn execute(
        &mut self,
        input: &ModuleInput<'_>,
        streams: &mut ModuleStreams<'_, '_>,
        settings: &mut IqSettingsBlock,
        dump: Option<&mut TuningDump>,
    ) -> Result<Option<ModuleCommands>> {
        if self.check_dependency_changed(input) && self.state().enabled {
            match self.run_calculation(input) {
                Ok(()) => {}
                Err(IspError::Calculation { module, reason }) => {
                    warn!(
                        "request {}: {} calculation failed, keeping previous output: {}",
                        input.request_id, module, reason
                    );
                    self.mark_stale();
                }
                Err(e) => return Err(e),
            }
        }
        let commands = self.create_command_list(streams)?;
        self.update_shared_settings(settings, dump);
        Ok(commands)
    }
}

/// Instantiates the reference implementation of `kind`. `affinity` selects
/// the memory of the block's private LUT pool.
pub fn create(kind: ModuleKind, affinity: DeviceAffinity) -> Result<Box<dyn IqModule>> {
    Ok(match kind {
        ModuleKind::Pedestal => Box::new(Block::new(Pedestal, affinity)?),
        ModuleKind::Linearization => Box::new(Block::new(Linearization, affinity)?),
        ModuleKind::DefectivePixel => Box::new(Block::new(DefectivePixel, affinity)?),
        ModuleKind::GainImbalance => Box::new(Block::new(GainImbalance, affinity)?),
        ModuleKind::Denoise => Box::new(Block::new(Denoise, affinity)?),
        ModuleKind::LensShading => Box::new(Block::new(LensShading, affinity)?),
        ModuleKind::WhiteBalance => Box::new(Block::new(WhiteBalance, affinity)?),
        ModuleKind::Demosaic => Box::new(Block::new(Demosaic, affinity)?),
        ModuleKind::ColorCorrection => Box::new(Block::new(ColorCorrection, affinity)?),
        ModuleKind::ToneMapping => Box::new(Block::new(ToneMapping::default(), affinity)?),
        ModuleKind::Gamma => Box::new(Block::new(Gamma, affinity)?),
        ModuleKind::ColorSpaceTransform => Box::new(Block::new(ColorSpaceTransform, affinity)?),
        ModuleKind::HybridNoiseReduction => {
            Box::new(Block::new(HybridNoiseReduction, affinity)?)
        }
    })
}

/// Fixed-point encoding of `value` with `frac_bits` fractional bits,
/// saturated to `bits` bits. Negative values are two's complement within
/// `bits`.
pub(crate) fn fixed(value: f32, frac_bits: u32, bits: u32) -> u32 {
    let scaled = (value * (1u32 << frac_bits) as f32).round() as i64;
    let max = (1i64 << (bits - 1)) - 1;
    let min = -(1i64 << (bits - 1));
    let mask = if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 };
    (scaled.clamp(min, max) as u32) & mask
}

/// Unsigned fixed-point encoding saturated to `bits` bits.
pub(crate) fn ufixed(value: f32, frac_bits: u32, bits: u32) -> u32 {
    let scaled = (value.max(0.0) * (1u32 << frac_bits) as f32).round() as u64;
    let max = if bits >= 32 { u32::MAX as u64 } else { (1u64 << bits) - 1 };
    scaled.min(max) as u32
}
