// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Hysteresis enablement.
//!
//! A block switches on once its trigger crosses `threshold + margin` and
//! switches off once it falls below `threshold - margin` (mirrored when
//! `enable_above` is false). Inside the band the previous decision holds, so
//! a trigger hovering around the threshold does not toggle the block every
//! frame.

use crate::calibration::TriggerKind;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HysteresisConfig {
    pub trigger: TriggerKind,
    pub threshold: f32,
    pub margin: f32,
    /// Enable when the trigger is high (`true`) or low (`false`).
    #[serde(default = "default_true")]
    pub enable_above: bool,
}

/// Decision carried between frames.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HysteresisState {
    enabled: Option<bool>,
    toggles: u64,
}

impl HysteresisState {
    /// Feeds this frame's trigger value and returns the enable decision.
    /// The first decision has no history and compares against the bare
    /// threshold.
    pub fn update(&mut self, config: &HysteresisConfig, value: f32) -> bool {
        // Normalize so that "above" always means enable.
        let (value, threshold) = if config.enable_above {
            (value, config.threshold)
        } else {
            (-value, -config.threshold)
        };
        let margin = config.margin.abs();
        let next = match self.enabled {
            None => value >= threshold,
            Some(true) => value >= threshold - margin,
            Some(false) => value > threshold + margin,
        };
        if self.enabled.is_some_and(|prev| prev != next) {
            self.toggles += 1;
        }
        self.enabled = Some(next);
        next
    }

    /// Last decision, `None` before the first update.
    pub fn enabled(&self) -> Option<bool> {
        self.enabled
    }

    /// Number of on/off transitions so far.
    pub fn toggles(&self) -> u64 {
        self.toggles
    }
}
