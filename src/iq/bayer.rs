// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Blocks operating on the raw Bayer mosaic.

use super::{
    block::{BlockCalculator, BlockDescriptor, CalcOutput, CalcParams},
    fixed, ufixed, IqModuleState, ModuleKind,
};
use crate::{
    error::{IspError, Result},
    lut::{self, LutLayout},
    settings::FW_PARAM_WORDS,
};

fn invalid(kind: ModuleKind, reason: impl Into<String>) -> IspError {
    IspError::Calculation {
        module: kind.name(),
        reason: reason.into(),
    }
}

/// Black level subtraction.
///
/// Coefficients: `[level, r_delta, gr_delta, gb_delta, b_delta]`. The level
/// defaults to the sensor mode's black level.
#[derive(Debug, Default)]
pub struct Pedestal;

impl BlockCalculator for Pedestal {
    const DESCRIPTOR: BlockDescriptor = BlockDescriptor {
        kind: ModuleKind::Pedestal,
        register_base: 0x0400,
        register_count: 8,
        luts: &[],
    };

    fn calculate(&mut self, p: &CalcParams<'_>) -> Result<CalcOutput> {
        let white = ((1u64 << p.sensor.bit_depth.min(31)) - 1) as f32;
        let level = p.params.coefficient(0, p.black_level as f32);
        if level < 0.0 || level >= white {
            return Err(invalid(
                ModuleKind::Pedestal,
                format!("black level {} outside sensor range", level),
            ));
        }
        let mut registers = Vec::with_capacity(8);
        registers.push(level.round() as u32);
        for channel in 0..4 {
            let offset = (level + p.params.coefficient(1 + channel, 0.0)).clamp(0.0, white - 1.0);
            registers.push(offset.round() as u32);
        }
        // Gain restoring full scale after subtraction, Q12.
        registers.push(ufixed(white / (white - level), 12, 16));
        registers.push(white as u32);
        registers.push(p.sensor.bit_depth);
        Ok(CalcOutput {
            registers,
            luts: Vec::new(),
        })
    }

    fn firmware_params(&self, state: &IqModuleState) -> [u32; FW_PARAM_WORDS] {
        [state.registers.first().copied().unwrap_or(0), 0, 0, 0]
    }
}

const LINEARIZATION_LUTS: &[LutLayout] = &[LutLayout::new(0x01, 36, 14)];

/// Sensor response linearization through a knee table.
#[derive(Debug, Default)]
pub struct Linearization;

impl BlockCalculator for Linearization {
    const DESCRIPTOR: BlockDescriptor = BlockDescriptor {
        kind: ModuleKind::Linearization,
        register_base: 0x0440,
        register_count: 8,
        luts: LINEARIZATION_LUTS,
    };

    fn calculate(&mut self, p: &CalcParams<'_>) -> Result<CalcOutput> {
        let layout = &LINEARIZATION_LUTS[0];
        let table = lut::build_table(p.params.table(0), layout, |x| x);
        if table.windows(2).any(|w| w[1] < w[0]) {
            return Err(invalid(ModuleKind::Linearization, "knee table is not monotonic"));
        }
        let registers = vec![
            p.bank.index() as u32,
            layout.entries as u32,
            p.black_level,
            ufixed(p.params.coefficient(0, 1.0), 12, 16),
            ufixed(p.params.coefficient(1, 1.0), 12, 16),
            ufixed(p.params.coefficient(2, 1.0), 12, 16),
            ufixed(p.params.coefficient(3, 1.0), 12, 16),
            p.sensor.bit_depth,
        ];
        Ok(CalcOutput {
            registers,
            luts: vec![table],
        })
    }
}

/// Static and dynamic defective pixel correction.
///
/// Coefficients: `[hot_threshold, cold_threshold, strength]`, thresholds
/// scaled by analog gain.
#[derive(Debug, Default)]
pub struct DefectivePixel;

impl BlockCalculator for DefectivePixel {
    const DESCRIPTOR: BlockDescriptor = BlockDescriptor {
        kind: ModuleKind::DefectivePixel,
        register_base: 0x0480,
        register_count: 12,
        luts: &[],
    };

    fn calculate(&mut self, p: &CalcParams<'_>) -> Result<CalcOutput> {
        let gain = p.triggers.gain.max(1.0);
        let hot = p.params.coefficient(0, 64.0) * gain;
        let cold = p.params.coefficient(1, 64.0) * gain;
        let strength = p.params.coefficient(2, 0.5).clamp(0.0, 1.0);
        let mut registers = vec![
            ufixed(hot, 0, 16),
            ufixed(cold, 0, 16),
            ufixed(strength, 8, 9),
            p.sensor.width,
            p.sensor.height,
        ];
        registers.extend((0..7).map(|i| ufixed(p.params.coefficient(3 + i, 0.0), 0, 16)));
        Ok(CalcOutput {
            registers,
            luts: Vec::new(),
        })
    }
}

const GAIN_IMBALANCE_LUTS: &[LutLayout] = &[LutLayout::new(0x02, 64, 18)];

/// Green channel imbalance correction.
#[derive(Debug, Default)]
pub struct GainImbalance;

impl BlockCalculator for GainImbalance {
    const DESCRIPTOR: BlockDescriptor = BlockDescriptor {
        kind: ModuleKind::GainImbalance,
        register_base: 0x0500,
        register_count: 6,
        luts: GAIN_IMBALANCE_LUTS,
    };

    fn calculate(&mut self, p: &CalcParams<'_>) -> Result<CalcOutput> {
        let threshold = p.params.coefficient(0, 0.05);
        let table = lut::build_table(p.params.table(0), &GAIN_IMBALANCE_LUTS[0], |x| {
            (x * threshold * 8.0).min(1.0)
        });
        let registers = vec![
            p.bank.index() as u32,
            ufixed(threshold, 16, 18),
            ufixed(p.params.coefficient(1, 1.0), 12, 16),
            ufixed(p.triggers.gain, 8, 16),
            p.sensor.width,
            p.sensor.height,
        ];
        Ok(CalcOutput {
            registers,
            luts: vec![table],
        })
    }
}

const DENOISE_LUTS: &[LutLayout] = &[LutLayout::new(0x03, 64, 16), LutLayout::new(0x04, 64, 16)];

/// Bayer-domain bilateral denoise: a range weight table and a noise
/// profile table, both scaled by gain.
#[derive(Debug, Default)]
pub struct Denoise;

impl BlockCalculator for Denoise {
    const DESCRIPTOR: BlockDescriptor = BlockDescriptor {
        kind: ModuleKind::Denoise,
        register_base: 0x0540,
        register_count: 16,
        luts: DENOISE_LUTS,
    };

    fn calculate(&mut self, p: &CalcParams<'_>) -> Result<CalcOutput> {
        let sigma = p.params.coefficient(0, 0.1) * p.triggers.gain.max(1.0).sqrt();
        if sigma <= 0.0 {
            return Err(invalid(ModuleKind::Denoise, "noise sigma must be positive"));
        }
        let weights = lut::build_table(p.params.table(0), &DENOISE_LUTS[0], |x| {
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        });
        let profile = lut::build_table(p.params.table(1), &DENOISE_LUTS[1], |x| {
            (sigma * (x + 0.01).sqrt()).min(1.0)
        });
        let mut registers = vec![
            p.bank.index() as u32,
            ufixed(sigma, 12, 16),
            ufixed(p.params.coefficient(1, 1.0), 8, 12),
            ufixed(p.params.coefficient(2, 1.0), 8, 12),
        ];
        registers.extend((0..12).map(|i| ufixed(p.params.coefficient(3 + i, 0.0), 8, 16)));
        Ok(CalcOutput {
            registers,
            luts: vec![weights, profile],
        })
    }
}

const LENS_SHADING_GRID: usize = 13 * 17;
const LENS_SHADING_LUTS: &[LutLayout] = &[
    LutLayout::new(0x05, LENS_SHADING_GRID, 13),
    LutLayout::new(0x0A, LENS_SHADING_GRID, 13),
    LutLayout::new(0x0B, LENS_SHADING_GRID, 13),
    LutLayout::new(0x0C, LENS_SHADING_GRID, 13),
];

/// Vignetting correction with one 13x17 gain grid per Bayer channel.
///
/// Tables are gains in `[1, 8)`; the default is a radial falloff
/// controlled by coefficient 0.
#[derive(Debug, Default)]
pub struct LensShading;

impl BlockCalculator for LensShading {
    const DESCRIPTOR: BlockDescriptor = BlockDescriptor {
        kind: ModuleKind::LensShading,
        register_base: 0x0600,
        register_count: 10,
        luts: LENS_SHADING_LUTS,
    };

    fn calculate(&mut self, p: &CalcParams<'_>) -> Result<CalcOutput> {
        let falloff = p.params.coefficient(0, 0.4);
        let mut luts = Vec::with_capacity(LENS_SHADING_LUTS.len());
        for (channel, layout) in LENS_SHADING_LUTS.iter().enumerate() {
            let gains: Vec<f32> = match p.params.table(channel) {
                Some(table) => lut::resample(table, layout.entries),
                None => (0..layout.entries)
                    .map(|i| {
                        let (row, col) = ((i / 17) as f32, (i % 17) as f32);
                        let dy = (row - 6.0) / 6.0;
                        let dx = (col - 8.0) / 8.0;
                        1.0 + falloff * (dx * dx + dy * dy) / 2.0
                    })
                    .collect(),
            };
            if gains.iter().any(|g| *g < 1.0 || *g >= 8.0) {
                return Err(invalid(
                    ModuleKind::LensShading,
                    format!("channel {} gain outside [1, 8)", channel),
                ));
            }
            // Gains are stored as (gain - 1) / 7 in the table range.
            let normalized: Vec<f32> = gains.iter().map(|g| (g - 1.0) / 7.0).collect();
            luts.push(lut::quantize(&normalized, layout));
        }
        let cell_w = p.sensor.width.div_ceil(16);
        let cell_h = p.sensor.height.div_ceil(12);
        let registers = vec![
            p.bank.index() as u32,
            17,
            13,
            cell_w,
            cell_h,
            if cell_w > 0 { (1 << 20) / cell_w } else { 0 },
            if cell_h > 0 { (1 << 20) / cell_h } else { 0 },
            fixed(p.params.coefficient(1, 0.0), 8, 16),
            fixed(p.params.coefficient(2, 0.0), 8, 16),
            ufixed(p.triggers.cct, 0, 16),
        ];
        Ok(CalcOutput { registers, luts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{calibration::Parameters, iq::Triggers, lut::LutBank, request::SensorMode};

    fn run<C: BlockCalculator>(mut calc: C, params: &Parameters, sensor: &SensorMode) -> Result<CalcOutput> {
        calc.calculate(&CalcParams {
            params,
            triggers: &Triggers::default(),
            sensor,
            black_level: sensor.black_level,
            awb: Default::default(),
            bank: LutBank::default(),
        })
    }

    #[test]
    fn pedestal_defaults_to_sensor_black_level() {
        let sensor = SensorMode::new(0, 1920, 1080, 10).with_black_level(64);
        let out = run(Pedestal, &Parameters::default(), &sensor).unwrap();
        assert_eq!(out.registers[0], 64);
        assert_eq!(out.registers.len(), Pedestal::DESCRIPTOR.register_count);
    }

    #[test]
    fn pedestal_rejects_level_above_white() {
        let sensor = SensorMode::new(0, 1920, 1080, 10);
        let over = Parameters {
            coefficients: vec![2000.0],
            tables: Vec::new(),
        };
        let err = run(Pedestal, &over, &sensor).unwrap_err();
        assert!(matches!(err, IspError::Calculation { .. }));
    }

    #[test]
    fn lens_shading_default_grid_is_symmetric() {
        let sensor = SensorMode::new(0, 4000, 3000, 10);
        let out = run(LensShading, &Parameters::default(), &sensor).unwrap();
        let grid = &out.luts[0];
        assert_eq!(grid.len(), LENS_SHADING_GRID);
        assert_eq!(grid[0], grid[LENS_SHADING_GRID - 1]);
        assert_eq!(grid[6 * 17 + 8], 0);
    }
}
