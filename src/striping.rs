// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Splitting a frame into vertical stripes the hardware processes in turn.
//!
//! The striping computation itself is vendor code behind
//! [`StripingLibrary`]. The node calls it once per frame, after every module
//! has written its settings, and embeds the returned blob by patch.
//! [`FixedUnitStriper`] is a simple reference implementation.

use crate::{
    error::{IspError, Result},
    settings::IqSettingsBlock,
};

/// Frame geometry handed to the striping library.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameGeometry {
    pub input_width: u32,
    pub input_height: u32,
    pub output_width: u32,
    pub output_height: u32,
}

/// Result of one striping call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StripingOutput {
    /// Opaque words interpreted by firmware.
    pub blob: Vec<u32>,
    /// Pixels processed including overlap, drives the cycle estimate.
    pub pixel_count: u64,
    pub stripes: u32,
}

pub trait StripingLibrary: Send {
    /// Largest blob [`stripe`](Self::stripe) can return, used to size the
    /// striping pool.
    fn max_blob_words(&self) -> usize;

    fn stripe(&mut self, settings: &IqSettingsBlock, geometry: &FrameGeometry) -> Result<StripingOutput>;
}

/// Stripe blob magic, "STRP".
pub const STRIPE_MAGIC: u32 = 0x5354_5250;
const STRIPE_WORDS: usize = 4;
const MAX_STRIPES: usize = 16;

/// Cuts the input into equal stripes, at least one per processing unit and
/// none wider than `max_stripe_width` before overlap.
///
/// Blob: `[magic, stripes, enable_mask]` then per stripe
/// `[x_start, width, overlap_left, overlap_right]`.
#[derive(Clone, Debug)]
pub struct FixedUnitStriper {
    pub units: u32,
    pub overlap: u32,
    pub max_stripe_width: u32,
}

impl FixedUnitStriper {
    pub fn new(units: u32, overlap: u32, max_stripe_width: u32) -> Self {
        Self {
            units: units.max(1),
            overlap,
            max_stripe_width: max_stripe_width.max(1),
        }
    }
}

impl StripingLibrary for FixedUnitStriper {
    fn max_blob_words(&self) -> usize {
        3 + STRIPE_WORDS * MAX_STRIPES
    }

    fn stripe(&mut self, settings: &IqSettingsBlock, geometry: &FrameGeometry) -> Result<StripingOutput> {
        let width = geometry.input_width;
        if width == 0 || geometry.input_height == 0 {
            return Err(IspError::Configuration("cannot stripe an empty frame".to_owned()));
        }
        let stripes = self.units.max(width.div_ceil(self.max_stripe_width));
        if stripes as usize > MAX_STRIPES {
            return Err(IspError::Configuration(format!(
                "{} pixel wide frame needs {} stripes, at most {} supported",
                width, stripes, MAX_STRIPES
            )));
        }
        let step = width.div_ceil(stripes);

        let mut blob = vec![STRIPE_MAGIC, stripes, settings.enabled_mask()];
        let mut pixel_count = 0u64;
        for i in 0..stripes {
            let start = (i * step).min(width);
            let end = ((i + 1) * step).min(width);
            let left = if i > 0 { self.overlap.min(start) } else { 0 };
            let right = if i + 1 < stripes {
                self.overlap.min(width - end)
            } else {
                0
            };
            let stripe_width = end - start;
            blob.extend_from_slice(&[start, stripe_width, left, right]);
            pixel_count += u64::from(stripe_width + left + right) * u64::from(geometry.input_height);
        }
        Ok(StripingOutput {
            blob,
            pixel_count,
            stripes,
        })
    }
}
