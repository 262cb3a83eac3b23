// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Tuning selectors and the calibration lookup contract.
//!
//! The node only relies on "selector -> leaf": given a module and the
//! current [`TuningSelector`], a [`CalibrationSource`] returns the matching
//! [`CalibrationLeaf`] or nothing. [`TuningTree`] is the JSON-backed source
//! used by the command line tool and the tests; production deployments plug
//! in their own search engine.

use crate::{
    error::Result,
    hysteresis::HysteresisConfig,
    iq::ModuleKind,
};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};

/// Capture use case the tuning was made for.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Usecase {
    #[default]
    Preview,
    Video,
    Snapshot,
}

/// Key of a calibration lookup. Modules cache the selector of their last
/// lookup and only search again when it changes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningSelector {
    pub usecase: Usecase,
    pub sensor_mode: u32,
    pub scene: u32,
    pub effect: u32,
}

/// Dynamic quantity a module interpolates or switches on.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    #[default]
    Gain,
    Lux,
    ExposureTime,
    DrcGain,
    Cct,
    WbSensitivity,
}

/// Tuning values valid at one trigger point.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationNode {
    pub trigger: f32,
    #[serde(default)]
    pub coefficients: Vec<f32>,
    #[serde(default)]
    pub tables: Vec<Vec<f32>>,
}

/// Per-frame parameters a module's calculator consumes: either interpolated
/// from a leaf or supplied directly as an override.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    #[serde(default)]
    pub coefficients: Vec<f32>,
    #[serde(default)]
    pub tables: Vec<Vec<f32>>,
}

impl Parameters {
    pub fn is_finite(&self) -> bool {
        self.coefficients.iter().all(|v| v.is_finite())
            && self.tables.iter().flatten().all(|v| v.is_finite())
    }

    /// Coefficient `index`, or `default` when the tuning omits it.
    pub fn coefficient(&self, index: usize, default: f32) -> f32 {
        self.coefficients.get(index).copied().unwrap_or(default)
    }

    /// Table `index` if present and non-empty.
    pub fn table(&self, index: usize) -> Option<&[f32]> {
        self.tables
            .get(index)
            .map(Vec::as_slice)
            .filter(|t| !t.is_empty())
    }
}

fn default_true() -> bool {
    true
}

/// Calibration data for one module under one selector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationLeaf {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default)]
    pub hysteresis: Option<HysteresisConfig>,
    #[serde(default)]
    pub interpolation: TriggerKind,
    #[serde(default)]
    pub nodes: Vec<CalibrationNode>,
}

impl Default for CalibrationLeaf {
    fn default() -> Self {
        Self {
            enable: true,
            hysteresis: None,
            interpolation: TriggerKind::Gain,
            nodes: Vec::new(),
        }
    }
}

impl CalibrationLeaf {
    /// A single-node leaf with the given coefficients.
    pub fn with_coefficients(coefficients: Vec<f32>) -> Self {
        Self {
            nodes: vec![CalibrationNode {
                trigger: 0.0,
                coefficients,
                tables: Vec::new(),
            }],
            ..Self::default()
        }
    }

    /// Linear interpolation between the two nodes bracketing `trigger`.
    /// Values outside the node range clamp to the nearest node. Vectors of
    /// unequal length interpolate over their common prefix and keep the
    /// lower node's tail.
    pub fn interpolate(&self, trigger: f32) -> Parameters {
        let mut nodes: Vec<&CalibrationNode> = self.nodes.iter().collect();
        nodes.sort_by(|a, b| a.trigger.total_cmp(&b.trigger));
        let (lo, hi) = match nodes.as_slice() {
            [] => return Parameters::default(),
            [only] => (*only, *only),
            [first, ..] if trigger <= first.trigger => (*first, *first),
            [.., last] if trigger >= last.trigger => (*last, *last),
            all => {
                let i = all
                    .windows(2)
                    .position(|w| trigger >= w[0].trigger && trigger <= w[1].trigger)
                    .unwrap_or(0);
                (all[i], all[i + 1])
            }
        };
        let t = if hi.trigger > lo.trigger {
            (trigger - lo.trigger) / (hi.trigger - lo.trigger)
        } else {
            0.0
        };
        Parameters {
            coefficients: lerp_vec(&lo.coefficients, &hi.coefficients, t),
            tables: lo
                .tables
                .iter()
                .enumerate()
                .map(|(i, table)| match hi.tables.get(i) {
                    Some(other) => lerp_vec(table, other, t),
                    None => table.clone(),
                })
                .collect(),
        }
    }
}

fn lerp_vec(a: &[f32], b: &[f32], t: f32) -> Vec<f32> {
    a.iter()
        .enumerate()
        .map(|(i, &x)| match b.get(i) {
            Some(&y) => x + (y - x) * t,
            None => x,
        })
        .collect()
}

/// The "selector -> leaf" query contract.
pub trait CalibrationSource: Send + Sync {
    fn query(&self, module: ModuleKind, selector: &TuningSelector) -> Option<CalibrationLeaf>;
}

/// One leaf of a [`TuningTree`]. Unset selector fields match anything.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TuningEntry {
    pub module: ModuleKind,
    #[serde(default)]
    pub usecase: Option<Usecase>,
    #[serde(default)]
    pub sensor_mode: Option<u32>,
    #[serde(default)]
    pub scene: Option<u32>,
    #[serde(default)]
    pub effect: Option<u32>,
    pub leaf: CalibrationLeaf,
}

impl TuningEntry {
    /// Number of constrained fields if the entry matches, `None` otherwise.
    fn specificity(&self, module: ModuleKind, selector: &TuningSelector) -> Option<u32> {
        if self.module != module {
            return None;
        }
        let mut score = 0;
        if let Some(usecase) = self.usecase {
            if usecase != selector.usecase {
                return None;
            }
            score += 1;
        }
        for (field, value) in [
            (self.sensor_mode, selector.sensor_mode),
            (self.scene, selector.scene),
            (self.effect, selector.effect),
        ] {
            if let Some(field) = field {
                if field != value {
                    return None;
                }
                score += 1;
            }
        }
        Some(score)
    }
}

/// In-memory calibration tree; the most specific matching entry wins and
/// ties go to the earlier entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TuningTree {
    pub entries: Vec<TuningEntry>,
}

impl TuningTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Adds a leaf matching every selector.
    pub fn with_leaf(mut self, module: ModuleKind, leaf: CalibrationLeaf) -> Self {
        self.entries.push(TuningEntry {
            module,
            usecase: None,
            sensor_mode: None,
            scene: None,
            effect: None,
            leaf,
        });
        self
    }

    pub fn with_entry(mut self, entry: TuningEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Enables every module with default parameters.
    pub fn enable_all() -> Self {
        ModuleKind::ALL
            .iter()
            .fold(Self::new(), |tree, &kind| tree.with_leaf(kind, CalibrationLeaf::default()))
    }
}

impl CalibrationSource for TuningTree {
    fn query(&self, module: ModuleKind, selector: &TuningSelector) -> Option<CalibrationLeaf> {
        let mut best: Option<(u32, &TuningEntry)> = None;
        for entry in &self.entries {
            let Some(score) = entry.specificity(module, selector) else {
                continue;
            };
            match best {
                Some((s, _)) if s >= score => {}
                _ => best = Some((score, entry)),
            }
        }
        best.map(|(_, entry)| entry.leaf.clone())
    }
}
