// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! White balance, demosaic and color conversion blocks.

use super::{
    block::{BlockCalculator, BlockDescriptor, CalcOutput, CalcParams},
    fixed, ufixed, IqModuleState, ModuleKind,
};
use crate::{
    error::{IspError, Result},
    settings::FW_PARAM_WORDS,
};

/// Per-channel white balance gains.
///
/// Gains come from the AWB statistics of the frame, scaled by coefficient 0
/// (a global digital gain). Gains are Q10 in 16 bits.
#[derive(Debug, Default)]
pub struct WhiteBalance;

impl BlockCalculator for WhiteBalance {
    const DESCRIPTOR: BlockDescriptor = BlockDescriptor {
        kind: ModuleKind::WhiteBalance,
        register_base: 0x0700,
        register_count: 6,
        luts: &[],
    };

    fn calculate(&mut self, p: &CalcParams<'_>) -> Result<CalcOutput> {
        let awb = p.awb;
        if awb.r <= 0.0 || awb.g <= 0.0 || awb.b <= 0.0 {
            return Err(IspError::Calculation {
                module: ModuleKind::WhiteBalance.name(),
                reason: format!("non-positive gains {:?}", awb),
            });
        }
        let digital = p.params.coefficient(0, 1.0);
        let registers = vec![
            ufixed(awb.r * digital, 10, 16),
            ufixed(awb.g * digital, 10, 16),
            ufixed(awb.g * digital, 10, 16),
            ufixed(awb.b * digital, 10, 16),
            ufixed(p.triggers.wb_sensitivity, 10, 16),
            ufixed(p.triggers.cct, 0, 16),
        ];
        Ok(CalcOutput {
            registers,
            luts: Vec::new(),
        })
    }

    fn firmware_params(&self, state: &IqModuleState) -> [u32; FW_PARAM_WORDS] {
        let mut params = [0; FW_PARAM_WORDS];
        for (dst, src) in params.iter_mut().zip(&state.registers) {
            *dst = *src;
        }
        params
    }
}

/// Bayer to RGB interpolation.
///
/// Coefficients: `[sharpness, edge_threshold, false_color_suppression]`.
#[derive(Debug, Default)]
pub struct Demosaic;

impl BlockCalculator for Demosaic {
    const DESCRIPTOR: BlockDescriptor = BlockDescriptor {
        kind: ModuleKind::Demosaic,
        register_base: 0x0740,
        register_count: 8,
        luts: &[],
    };

    fn calculate(&mut self, p: &CalcParams<'_>) -> Result<CalcOutput> {
        let gain = p.triggers.gain.max(1.0);
        let sharpness = p.params.coefficient(0, 0.5).clamp(0.0, 1.0) / gain.sqrt();
        let registers = vec![
            ufixed(sharpness, 8, 9),
            ufixed(p.params.coefficient(1, 32.0), 0, 12),
            ufixed(p.params.coefficient(2, 0.5).clamp(0.0, 1.0), 8, 9),
            p.sensor.width,
            p.sensor.height,
            // Bayer phase of the first pixel.
            p.params.coefficient(3, 0.0).clamp(0.0, 3.0) as u32,
            ufixed(gain, 8, 16),
            0,
        ];
        Ok(CalcOutput {
            registers,
            luts: Vec::new(),
        })
    }
}

/// 3x3 color correction matrix with offsets.
///
/// Coefficients are the row-major matrix followed by three offsets. Each
/// row must sum close to one to preserve neutral gray. Saturation falls
/// with gain towards identity.
#[derive(Debug, Default)]
pub struct ColorCorrection;

const IDENTITY: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

impl BlockCalculator for ColorCorrection {
    const DESCRIPTOR: BlockDescriptor = BlockDescriptor {
        kind: ModuleKind::ColorCorrection,
        register_base: 0x0780,
        register_count: 12,
        luts: &[],
    };

    fn calculate(&mut self, p: &CalcParams<'_>) -> Result<CalcOutput> {
        let desaturate = ((p.triggers.gain - 8.0) / 56.0).clamp(0.0, 1.0);
        let matrix: Vec<f32> = IDENTITY
            .iter()
            .enumerate()
            .map(|(i, &id)| {
                let ccm = p.params.coefficient(i, id);
                ccm + (id - ccm) * desaturate
            })
            .collect();
        for (row, values) in matrix.chunks(3).enumerate() {
            let sum: f32 = values.iter().sum();
            if (sum - 1.0).abs() > 0.05 {
                return Err(IspError::Calculation {
                    module: ModuleKind::ColorCorrection.name(),
                    reason: format!("row {} sums to {:.3}", row, sum),
                });
            }
        }
        let mut registers: Vec<u32> = matrix.iter().map(|v| fixed(*v, 7, 12)).collect();
        registers.extend((0..3).map(|i| fixed(p.params.coefficient(9 + i, 0.0), 0, 12)));
        Ok(CalcOutput {
            registers,
            luts: Vec::new(),
        })
    }
}

/// RGB to YUV conversion, BT.601 full range by default.
///
/// Coefficients: the row-major 3x3 matrix followed by three output
/// offsets.
#[derive(Debug, Default)]
pub struct ColorSpaceTransform;

const BT601: [f32; 9] = [
    0.299, 0.587, 0.114, //
    -0.168_736, -0.331_264, 0.5, //
    0.5, -0.418_688, -0.081_312,
];
const BT601_OFFSETS: [f32; 3] = [0.0, 128.0, 128.0];

impl BlockCalculator for ColorSpaceTransform {
    const DESCRIPTOR: BlockDescriptor = BlockDescriptor {
        kind: ModuleKind::ColorSpaceTransform,
        register_base: 0x0880,
        register_count: 12,
        luts: &[],
    };

    fn calculate(&mut self, p: &CalcParams<'_>) -> Result<CalcOutput> {
        let mut registers: Vec<u32> = BT601
            .iter()
            .enumerate()
            .map(|(i, &v)| fixed(p.params.coefficient(i, v), 10, 12))
            .collect();
        registers.extend(
            BT601_OFFSETS
                .iter()
                .enumerate()
                .map(|(i, &v)| ufixed(p.params.coefficient(9 + i, v), 0, 10)),
        );
        Ok(CalcOutput {
            registers,
            luts: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        calibration::Parameters,
        iq::Triggers,
        lut::LutBank,
        request::{AwbGains, SensorMode},
    };

    fn run<C: BlockCalculator>(mut calc: C, params: &Parameters, triggers: &Triggers, awb: AwbGains) -> Result<CalcOutput> {
        let sensor = SensorMode::new(0, 1920, 1080, 10);
        calc.calculate(&CalcParams {
            params,
            triggers,
            sensor: &sensor,
            black_level: 0,
            awb,
            bank: LutBank::default(),
        })
    }

    #[test]
    fn white_balance_encodes_awb_gains() {
        let awb = AwbGains {
            r: 2.0,
            g: 1.0,
            b: 1.5,
        };
        let out = run(WhiteBalance, &Parameters::default(), &Triggers::default(), awb).unwrap();
        assert_eq!(&out.registers[..4], &[2048, 1024, 1024, 1536]);
    }

    #[test]
    fn color_correction_rejects_tinting_matrix() {
        let tinted = Parameters {
            coefficients: vec![2.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            tables: Vec::new(),
        };
        let err = run(ColorCorrection, &tinted, &Triggers::default(), AwbGains::default()).unwrap_err();
        assert!(matches!(err, IspError::Calculation { .. }));
    }

    #[test]
    fn color_correction_desaturates_at_high_gain() {
        let ccm = Parameters {
            coefficients: vec![1.5, -0.3, -0.2, -0.2, 1.4, -0.2, 0.0, -0.5, 1.5],
            tables: Vec::new(),
        };
        let triggers = Triggers {
            gain: 64.0,
            ..Triggers::default()
        };
        let out = run(ColorCorrection, &ccm, &triggers, AwbGains::default()).unwrap();
        assert_eq!(out.registers[0], 128);
        assert_eq!(out.registers[1], 0);
    }
}
