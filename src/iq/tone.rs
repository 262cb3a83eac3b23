// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Tone and output-domain blocks.

use super::{
    block::{BlockCalculator, BlockDescriptor, CalcOutput, CalcParams},
    ufixed, IqModuleState, ModuleKind,
};
use crate::{
    error::{IspError, Result},
    lut::{self, LutLayout},
    settings::FW_PARAM_WORDS,
};

/// Entries of the tone curve.
pub const TONE_CURVE_ENTRIES: usize = 64;

const TONE_MAPPING_LUTS: &[LutLayout] = &[LutLayout::new(0x06, TONE_CURVE_ENTRIES, 18)];

/// Global tone mapping driven by the DRC gain.
///
/// The default curve is `min(1, x * drc)^exponent` with the exponent taken
/// from coefficient 0 (0.45). The DRC gain the curve was built for is
/// reported to firmware in Q8.
#[derive(Debug, Default)]
pub struct ToneMapping {
    drc_gain: f32,
}

impl ToneMapping {
    /// DRC gain of the last calculation.
    pub fn drc_gain(&self) -> f32 {
        self.drc_gain
    }
}

impl BlockCalculator for ToneMapping {
    const DESCRIPTOR: BlockDescriptor = BlockDescriptor {
        kind: ModuleKind::ToneMapping,
        register_base: 0x0800,
        register_count: 8,
        luts: TONE_MAPPING_LUTS,
    };

    fn calculate(&mut self, p: &CalcParams<'_>) -> Result<CalcOutput> {
        let drc = p.triggers.drc_gain;
        if drc <= 0.0 {
            return Err(IspError::Calculation {
                module: ModuleKind::ToneMapping.name(),
                reason: format!("DRC gain {} must be positive", drc),
            });
        }
        let exponent = p.params.coefficient(0, 0.45);
        let curve = lut::build_table(p.params.table(0), &TONE_MAPPING_LUTS[0], |x| {
            (x * drc).min(1.0).powf(exponent)
        });
        self.drc_gain = drc;
        let registers = vec![
            p.bank.index() as u32,
            TONE_CURVE_ENTRIES as u32,
            ufixed(drc, 8, 16),
            ufixed(exponent, 12, 16),
            ufixed(p.params.coefficient(1, 0.0), 12, 16),
            ufixed(p.params.coefficient(2, 1.0), 12, 16),
            ufixed(p.triggers.lux, 0, 16),
            0,
        ];
        Ok(CalcOutput {
            registers,
            luts: vec![curve],
        })
    }

    fn firmware_params(&self, _state: &IqModuleState) -> [u32; FW_PARAM_WORDS] {
        [ufixed(self.drc_gain, 8, 16), TONE_CURVE_ENTRIES as u32, 0, 0]
    }
}

const GAMMA_LUTS: &[LutLayout] = &[LutLayout::new(0x07, 256, 12)];

/// Output gamma, sRGB-like power curve by default.
#[derive(Debug, Default)]
pub struct Gamma;

impl BlockCalculator for Gamma {
    const DESCRIPTOR: BlockDescriptor = BlockDescriptor {
        kind: ModuleKind::Gamma,
        register_base: 0x0840,
        register_count: 4,
        luts: GAMMA_LUTS,
    };

    fn calculate(&mut self, p: &CalcParams<'_>) -> Result<CalcOutput> {
        let gamma = p.params.coefficient(0, 2.2);
        if gamma <= 0.0 {
            return Err(IspError::Calculation {
                module: ModuleKind::Gamma.name(),
                reason: format!("gamma {} must be positive", gamma),
            });
        }
        let table = lut::build_table(p.params.table(0), &GAMMA_LUTS[0], |x| x.powf(1.0 / gamma));
        Ok(CalcOutput {
            registers: vec![p.bank.index() as u32, 256, ufixed(gamma, 8, 16), 0],
            luts: vec![table],
        })
    }
}

const HNR_LUTS: &[LutLayout] = &[LutLayout::new(0x08, 17, 10), LutLayout::new(0x09, 64, 10)];

/// Hybrid (spatial plus temporal) noise reduction. Present from hardware
/// version 2.
#[derive(Debug, Default)]
pub struct HybridNoiseReduction;

impl BlockCalculator for HybridNoiseReduction {
    const DESCRIPTOR: BlockDescriptor = BlockDescriptor {
        kind: ModuleKind::HybridNoiseReduction,
        register_base: 0x0900,
        register_count: 10,
        luts: HNR_LUTS,
    };

    fn calculate(&mut self, p: &CalcParams<'_>) -> Result<CalcOutput> {
        let strength = (p.params.coefficient(0, 0.3) * p.triggers.gain.max(1.0).log2().max(1.0)).min(1.0);
        let blend = p.params.coefficient(1, 0.5).clamp(0.0, 1.0);
        let radial = lut::build_table(p.params.table(0), &HNR_LUTS[0], |x| 1.0 - 0.5 * x * x);
        let luma = lut::build_table(p.params.table(1), &HNR_LUTS[1], |x| strength * (1.0 - x));
        let registers = vec![
            p.bank.index() as u32,
            ufixed(strength, 8, 9),
            ufixed(blend, 8, 9),
            ufixed(p.triggers.lux, 0, 16),
            ufixed(p.triggers.exposure_time, 4, 16),
            p.sensor.width / 2,
            p.sensor.height / 2,
            ufixed(p.params.coefficient(2, 0.0), 8, 16),
            ufixed(p.params.coefficient(3, 0.0), 8, 16),
            0,
        ];
        Ok(CalcOutput {
            registers,
            luts: vec![radial, luma],
        })
    }
}
