// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Node configuration and hardware capabilities.

use crate::{
    bandwidth::BandwidthConfig,
    error::{IspError, Result},
    iq::ModuleKind,
    pool::DeviceAffinity,
    port::PortId,
};
use serde::{Deserialize, Serialize};
use std::{fmt, fs::File, io::BufReader, path::Path};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HwVersion {
    pub major: u32,
    pub minor: u32,
}

impl HwVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Hardware generations this node can program.
    pub fn is_supported(&self) -> bool {
        matches!(self.major, 1 | 2)
    }
}

impl fmt::Display for HwVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Limits reported by the hardware.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareCapability {
    pub version: HwVersion,
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    /// Statistics grid output geometry.
    pub stats_width: u32,
    pub stats_height: u32,
    /// Processing units available for striping.
    pub stripe_units: u32,
    pub max_stripe_width: u32,
    pub stripe_overlap: u32,
}

impl Default for HardwareCapability {
    fn default() -> Self {
        Self {
            version: HwVersion::new(2, 0),
            min_width: 64,
            min_height: 64,
            max_width: 8192,
            max_height: 6144,
            stats_width: 1024,
            stats_height: 16,
            stripe_units: 2,
            max_stripe_width: 2048,
            stripe_overlap: 64,
        }
    }
}

/// Subset of the module chain an instance runs, in processing order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceProfile {
    #[default]
    Full,
    /// Every module up to and including the stage.
    UpTo(ModuleKind),
    /// The stage and every module after it.
    From(ModuleKind),
    Only(Vec<ModuleKind>),
}

impl InstanceProfile {
    pub fn selects(&self, kind: ModuleKind) -> bool {
        match self {
            InstanceProfile::Full => true,
            InstanceProfile::UpTo(last) => kind <= *last,
            InstanceProfile::From(first) => kind >= *first,
            InstanceProfile::Only(kinds) => kinds.contains(&kind),
        }
    }
}

/// Static configuration of one node instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub profile: InstanceProfile,
    /// Frames in flight, and the depth of every frame-scoped pool.
    pub queue_depth: usize,
    pub affinity: DeviceAffinity,
    pub striping: bool,
    /// Statistics are required before a frame can be processed.
    pub realtime: bool,
    /// Capture register and table snapshots into frame metadata.
    pub tuning_dump: bool,
    /// Modules turned off for every frame.
    pub disabled_modules: Vec<ModuleKind>,
    pub target_fps: u32,
    /// Output ports written compressed.
    pub compressed_outputs: Vec<PortId>,
    pub bandwidth: BandwidthConfig,
    /// Requests held waiting on dependencies before the oldest is dropped.
    pub max_pending: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            profile: InstanceProfile::Full,
            queue_depth: 4,
            affinity: DeviceAffinity::Host,
            striping: false,
            realtime: false,
            tuning_dump: false,
            disabled_modules: Vec::new(),
            target_fps: 30,
            compressed_outputs: Vec::new(),
            bandwidth: BandwidthConfig::default(),
            max_pending: 16,
        }
    }
}

impl NodeConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_depth == 0 {
            return Err(IspError::Configuration("queue depth must be at least 1".to_owned()));
        }
        if self.max_pending == 0 {
            return Err(IspError::Configuration("max pending must be at least 1".to_owned()));
        }
        if self.target_fps == 0 {
            return Err(IspError::Configuration("target fps must be at least 1".to_owned()));
        }
        self.bandwidth.validate()
    }
}
