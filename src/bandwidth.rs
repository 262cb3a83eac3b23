// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Clock and memory bandwidth budget of a frame.
//!
//! With `area = width * height`:
//!
//! ```text
//! cycles   = ceil(pixels * clock_overhead_pct / (100 * pixels_per_clock))
//! clock_hz = cycles * fps * clock_margin_pct / 100
//! bw(port) = width * height * bpp * fps * bw_overhead_pct / (8 * bw_efficiency_pct)
//! ```
//!
//! `pixels` is the striping pixel count when striping ran, else the input
//! area. Compressed outputs contribute `bw * compression_pct / 100` to the
//! compressed term; everything else, the input included, is linear.

use crate::{
    error::{IspError, Result},
    port::{PortBuffer, PortDirection},
};
use serde::{Deserialize, Serialize};

/// Multipliers of the budget, in percent unless noted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandwidthConfig {
    pub clock_overhead_pct: u64,
    pub pixels_per_clock: u64,
    pub clock_margin_pct: u64,
    pub bw_overhead_pct: u64,
    pub bw_efficiency_pct: u64,
    pub compression_pct: u64,
}

impl Default for BandwidthConfig {
    fn default() -> Self {
        Self {
            clock_overhead_pct: 105,
            pixels_per_clock: 4,
            clock_margin_pct: 110,
            bw_overhead_pct: 110,
            bw_efficiency_pct: 90,
            compression_pct: 50,
        }
    }
}

impl BandwidthConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pixels_per_clock == 0 || self.bw_efficiency_pct == 0 {
            return Err(IspError::Configuration(
                "pixels_per_clock and bw_efficiency_pct must be non-zero".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Memory traffic of one port.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PortTraffic {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    pub compressed: bool,
}

impl From<&PortBuffer> for PortTraffic {
    fn from(buffer: &PortBuffer) -> Self {
        Self {
            width: buffer.width,
            height: buffer.height,
            bits_per_pixel: buffer.bits_per_pixel,
            compressed: buffer.compressed && buffer.port.direction() == PortDirection::Output,
        }
    }
}

/// Budget written into the frame buffer. Bandwidths in bytes per second.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ClockBandwidth {
    pub cycles: u64,
    pub clock_hz: u64,
    pub uncompressed_bw: u64,
    pub compressed_bw: u64,
    pub fps: u32,
}

impl ClockBandwidth {
    pub const WORDS: usize = 9;

    pub fn to_words(&self) -> [u32; Self::WORDS] {
        let split = |v: u64| [v as u32, (v >> 32) as u32];
        let [c0, c1] = split(self.cycles);
        let [k0, k1] = split(self.clock_hz);
        let [u0, u1] = split(self.uncompressed_bw);
        let [p0, p1] = split(self.compressed_bw);
        [c0, c1, k0, k1, u0, u1, p0, p1, self.fps]
    }

    pub fn from_words(words: &[u32]) -> Option<Self> {
        let w = words.get(..Self::WORDS)?;
        let join = |lo: u32, hi: u32| u64::from(lo) | (u64::from(hi) << 32);
        Some(Self {
            cycles: join(w[0], w[1]),
            clock_hz: join(w[2], w[3]),
            uncompressed_bw: join(w[4], w[5]),
            compressed_bw: join(w[6], w[7]),
            fps: w[8],
        })
    }
}

/// Processing cycles for `pixels`, rounded up.
pub fn estimate_cycles(config: &BandwidthConfig, pixels: u64) -> u64 {
    let num = u128::from(pixels) * u128::from(config.clock_overhead_pct);
    let den = 100 * u128::from(config.pixels_per_clock.max(1));
    num.div_ceil(den) as u64
}

/// Bytes per second moved by one port.
pub fn port_bandwidth(config: &BandwidthConfig, port: &PortTraffic, fps: u32) -> u64 {
    let num = u128::from(port.width)
        * u128::from(port.height)
        * u128::from(port.bits_per_pixel)
        * u128::from(fps)
        * u128::from(config.bw_overhead_pct);
    let den = 8 * u128::from(config.bw_efficiency_pct.max(1));
    (num / den) as u64
}

pub fn compute(config: &BandwidthConfig, pixels: u64, fps: u32, ports: &[PortTraffic]) -> ClockBandwidth {
    let cycles = estimate_cycles(config, pixels);
    let clock_hz =
        (u128::from(cycles) * u128::from(fps) * u128::from(config.clock_margin_pct) / 100) as u64;
    let (mut uncompressed_bw, mut compressed_bw) = (0u64, 0u64);
    for port in ports {
        let bw = port_bandwidth(config, port, fps);
        if port.compressed {
            compressed_bw += bw * config.compression_pct / 100;
        } else {
            uncompressed_bw += bw;
        }
    }
    ClockBandwidth {
        cycles,
        clock_hz,
        uncompressed_bw,
        compressed_bw,
        fps,
    }
}
