// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use super::{
    IqModule, IqModuleState, LutRegion, ModuleCommands, ModuleInput, ModuleKind, ModuleSnapshot,
    ModuleStreams, Triggers,
};
use crate::{
    calibration::Parameters,
    cmdbuf::{BufferHandle, BufferKind, CommitLog},
    error::{IspError, Result},
    lut::{self, LutBank, LutLayout},
    pool::{DeviceAffinity, ResourcePool},
    request::{AwbGains, SensorMode},
    settings::{IqSettingsBlock, ModuleSettings, TuningDump, FW_PARAM_WORDS},
};
use tracing::{debug, trace};

/// Static layout of a hardware block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockDescriptor {
    pub kind: ModuleKind,
    /// Hardware offset of the block's first register.
    pub register_base: u32,
    pub register_count: usize,
    pub luts: &'static [LutLayout],
}

impl BlockDescriptor {
    pub fn register_words(&self) -> usize {
        self.register_count + 2
    }

    pub fn dmi_words(&self) -> usize {
        lut::dmi_words(self.luts)
    }
}

/// Everything the math of one block sees.
pub struct CalcParams<'a> {
    pub params: &'a Parameters,
    pub triggers: &'a Triggers,
    pub sensor: &'a SensorMode,
    pub black_level: u32,
    pub awb: AwbGains,
    /// Bank the new tables are written to.
    pub bank: LutBank,
}

/// Register image and tables produced by one calculation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CalcOutput {
    pub registers: Vec<u32>,
    pub luts: Vec<Vec<u32>>,
}

/// Layout and math of one concrete block.
pub trait BlockCalculator: Send {
    const DESCRIPTOR: BlockDescriptor;

    /// Converts interpolated calibration into registers and tables.
    fn calculate(&mut self, params: &CalcParams<'_>) -> Result<CalcOutput>;

    /// Firmware parameter words for the IQ settings block.
    fn firmware_params(&self, _state: &IqModuleState) -> [u32; FW_PARAM_WORDS] {
        [0; FW_PARAM_WORDS]
    }
}

/// The common [`IqModule`] implementation.
pub struct Block<C: BlockCalculator> {
    calculator: C,
    state: IqModuleState,
    lut_pool: Option<ResourcePool>,
    lut_handle: Option<BufferHandle>,
}

impl<C: BlockCalculator> Block<C> {
    /// Creates the block and, when it has tables, a private staging pool of
    /// two slots: the tables in use and the ones being recalculated.
    pub fn new(calculator: C, affinity: DeviceAffinity) -> Result<Self> {
        let desc = &C::DESCRIPTOR;
        let lut_pool = match desc.dmi_words() {
            0 => None,
            words => Some(ResourcePool::new(
                &format!("{}-lut", desc.kind),
                BufferKind::LutStaging,
                words * 4,
                2,
                affinity,
            )?),
        };
        Ok(Self {
            calculator,
            state: IqModuleState::default(),
            lut_pool,
            lut_handle: None,
        })
    }

    pub fn calculator(&self) -> &C {
        &self.calculator
    }

    fn calculation_error(reason: impl Into<String>) -> IspError {
        IspError::Calculation {
            module: C::DESCRIPTOR.kind.name(),
            reason: reason.into(),
        }
    }

    fn check_shape(output: &CalcOutput) -> Result<()> {
        let desc = &C::DESCRIPTOR;
        if output.registers.len() != desc.register_count {
            return Err(Self::calculation_error(format!(
                "{} registers produced, {} expected",
                output.registers.len(),
                desc.register_count
            )));
        }
        if output.luts.len() != desc.luts.len()
            || output
                .luts
                .iter()
                .zip(desc.luts)
                .any(|(table, layout)| table.len() != layout.entries)
        {
            return Err(Self::calculation_error("lookup table shape mismatch"));
        }
        Ok(())
    }

    /// Writes the new tables into a fresh private slot and releases the
    /// previous one.
    fn stage_tables(&mut self, request_id: u64, luts: &[Vec<u32>], bank: LutBank) -> Result<()> {
        let Some(pool) = self.lut_pool.as_mut() else {
            return Ok(());
        };
        if let Some(prev) = self.lut_handle {
            if pool.owner(prev)? == Some(request_id) {
                pool.recycle(prev)?;
                self.lut_handle = None;
            }
        }
        let handle = pool.acquire(request_id)?;
        {
            let mut stream = pool.begin_write(handle, C::DESCRIPTOR.dmi_words())?;
            for (layout, table) in C::DESCRIPTOR.luts.iter().zip(luts) {
                stream.write_dmi(layout.select, bank.index(), table)?;
            }
        }
        pool.commit(handle, &mut CommitLog::new())?;
        if let Some(prev) = self.lut_handle.replace(handle) {
            pool.recycle(prev)?;
        }
        Ok(())
    }
}

impl<C: BlockCalculator> IqModule for Block<C> {
    fn kind(&self) -> ModuleKind {
        C::DESCRIPTOR.kind
    }

    fn state(&self) -> &IqModuleState {
        &self.state
    }

    fn register_words(&self) -> usize {
        C::DESCRIPTOR.register_words()
    }

    fn dmi_words(&self) -> usize {
        C::DESCRIPTOR.dmi_words()
    }

    fn check_dependency_changed(&mut self, input: &ModuleInput<'_>) -> bool {
        let kind = C::DESCRIPTOR.kind;
        if input.is_force_disabled(kind) {
            self.state.enabled = false;
            return false;
        }

        let mut changed = false;
        match input.override_for(kind) {
            Some(direct) => {
                if self.state.override_params.as_ref() != Some(direct) {
                    self.state.override_params = Some(direct.clone());
                    changed = true;
                }
            }
            None => {
                if self.state.override_params.take().is_some() {
                    changed = true;
                }
                if self.state.selector.as_ref() != Some(input.selector) {
                    self.state.leaf = input.calibration.query(kind, input.selector);
                    self.state.selector = Some(input.selector.clone());
                    changed = true;
                    trace!("{} calibration lookup for {:?}", kind, input.selector);
                }
            }
        }
        if self.state.triggers.as_ref() != Some(&input.triggers) {
            self.state.triggers = Some(input.triggers);
            changed = true;
        }

        let enabled = match (&self.state.override_params, &self.state.leaf) {
            (Some(direct), _) => direct.enable,
            (None, None) => false,
            (None, Some(leaf)) => {
                leaf.enable
                    && match &leaf.hysteresis {
                        Some(config) => self
                            .state
                            .hysteresis
                            .update(config, input.triggers.value(config.trigger)),
                        None => true,
                    }
            }
        };
        self.state.enabled = enabled;
        changed || (enabled && !self.state.has_output)
    }

    fn run_calculation(&mut self, input: &ModuleInput<'_>) -> Result<()> {
        let params = match (&self.state.override_params, &self.state.leaf) {
            (Some(direct), _) => direct.params.clone(),
            (None, Some(leaf)) => leaf.interpolate(input.triggers.value(leaf.interpolation)),
            (None, None) => return Err(Self::calculation_error("no calibration data")),
        };
        if !params.is_finite() {
            return Err(Self::calculation_error("non-finite calibration values"));
        }
        // The first tables land in bank 0; later ones go to the bank the
        // firmware is not reading.
        let bank = if !C::DESCRIPTOR.luts.is_empty() && self.state.has_output {
            self.state.bank.next()
        } else {
            self.state.bank
        };
        let output = self.calculator.calculate(&CalcParams {
            params: &params,
            triggers: &input.triggers,
            sensor: input.sensor,
            black_level: input.black_level,
            awb: input.awb,
            bank,
        })?;
        Self::check_shape(&output)?;
        self.stage_tables(input.request_id, &output.luts, bank)?;

        self.state.registers = output.registers;
        self.state.luts = output.luts;
        self.state.bank = bank;
        self.state.has_output = true;
        self.state.stale = false;
        self.state.calculations += 1;
        debug!(
            "request {}: {} recalculated (bank {})",
            input.request_id,
            C::DESCRIPTOR.kind,
            self.state.bank.index()
        );
        Ok(())
    }

    fn mark_stale(&mut self) {
        self.state.stale = self.state.has_output;
        // Retry on the next frame even if nothing changes.
        self.state.triggers = None;
    }

    fn create_command_list(&mut self, streams: &mut ModuleStreams<'_, '_>) -> Result<Option<ModuleCommands>> {
        if !self.state.active() {
            return Ok(None);
        }
        let desc = &C::DESCRIPTOR;
        let lut = match (&self.lut_pool, self.lut_handle) {
            (Some(pool), Some(handle)) => {
                let offset = streams.dmi.offset_bytes();
                let words = pool.buffer(handle)?.words();
                streams.dmi.write_words(words)?;
                Some(LutRegion {
                    offset,
                    length: (words.len() * 4) as u32,
                })
            }
            _ => None,
        };
        streams
            .registers
            .write_reg_range(desc.register_base, &self.state.registers)?;
        Ok(Some(ModuleCommands {
            kind: desc.kind,
            program_type: desc.kind.program_type(),
            lut,
        }))
    }

    fn update_shared_settings(&self, settings: &mut IqSettingsBlock, dump: Option<&mut TuningDump>) {
        let active = self.state.active();
        settings.set(
            C::DESCRIPTOR.kind,
            ModuleSettings {
                enable: active,
                params: if active {
                    self.calculator.firmware_params(&self.state)
                } else {
                    [0; FW_PARAM_WORDS]
                },
            },
        );
        if let Some(dump) = dump {
            dump.push(ModuleSnapshot {
                kind: C::DESCRIPTOR.kind,
                enabled: active,
                stale: self.state.stale,
                bank: self.state.bank.index(),
                registers: self.state.registers.clone(),
                luts: self.state.luts.clone(),
            });
        }
    }
}
