// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Lookup tables (DMI banks).
//!
//! Every table exists twice in hardware. Firmware reads one bank while the
//! next frame's table is written to the other, and the bank selector flips
//! once per successful calculation.

/// Shape of one hardware lookup table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LutLayout {
    /// DMI select code addressing the table.
    pub select: u8,
    /// Fixed entry count.
    pub entries: usize,
    /// Significant bits per entry.
    pub bits: u32,
}

impl LutLayout {
    pub const fn new(select: u8, entries: usize, bits: u32) -> Self {
        Self {
            select,
            entries,
            bits,
        }
    }

    /// Words of one DMI select write of this table, header included.
    pub const fn dmi_words(&self) -> usize {
        self.entries + 2
    }

    pub const fn max_value(&self) -> u32 {
        if self.bits >= 32 {
            u32::MAX
        } else {
            (1 << self.bits) - 1
        }
    }
}

/// Words needed to write every table of `layouts` once.
pub fn dmi_words(layouts: &[LutLayout]) -> usize {
    layouts.iter().map(LutLayout::dmi_words).sum()
}

/// Double-buffer bank selector.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LutBank(u8);

impl LutBank {
    pub fn index(&self) -> u8 {
        self.0
    }

    /// The other bank.
    pub fn next(&self) -> LutBank {
        LutBank(self.0 ^ 1)
    }
}

/// Linearly resamples `table` to `len` points spanning the same range.
pub fn resample(table: &[f32], len: usize) -> Vec<f32> {
    match (table.len(), len) {
        (_, 0) => Vec::new(),
        (0, _) => vec![0.0; len],
        (1, _) => vec![table[0]; len],
        (n, 1) => vec![table[n - 1]],
        (n, _) => (0..len)
            .map(|i| {
                let pos = i as f32 * (n - 1) as f32 / (len - 1) as f32;
                let lo = (pos.floor() as usize).min(n - 2);
                let t = pos - lo as f32;
                table[lo] + (table[lo + 1] - table[lo]) * t
            })
            .collect(),
    }
}

/// Maps normalized values in `[0, 1]` onto the layout's integer range.
pub fn quantize(values: &[f32], layout: &LutLayout) -> Vec<u32> {
    let max = layout.max_value() as f32;
    values
        .iter()
        .map(|v| (v.clamp(0.0, 1.0) * max).round() as u32)
        .collect()
}

/// Builds a table from a tuning table when present, else from `default`
/// evaluated on `[0, 1]`.
pub fn build_table(tuned: Option<&[f32]>, layout: &LutLayout, default: impl Fn(f32) -> f32) -> Vec<u32> {
    let values = match tuned {
        Some(table) => resample(table, layout.entries),
        None => {
            let last = (layout.entries.max(2) - 1) as f32;
            (0..layout.entries).map(|i| default(i as f32 / last)).collect()
        }
    };
    quantize(&values, layout)
}
