// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Input and output ports of the node.

use crate::cmdbuf::BufferHandle;
use serde::{Deserialize, Serialize};

/// Ports the hardware exposes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortId {
    Input,
    Full,
    Display,
    Video,
    Ds4,
    Ds16,
    Stats,
}

/// How a port's geometry is derived during negotiation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PortClass {
    /// Takes part in the common-superset aggregation.
    Generic,
    /// Fixed downscale of the full frame by the given factor.
    FixedRatio(u32),
    /// Statistics grid with hardware-defined dimensions.
    Statistics,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

impl PortId {
    pub const ALL: [PortId; 7] = [
        PortId::Input,
        PortId::Full,
        PortId::Display,
        PortId::Video,
        PortId::Ds4,
        PortId::Ds16,
        PortId::Stats,
    ];

    pub fn class(&self) -> PortClass {
        match self {
            PortId::Input | PortId::Full | PortId::Display | PortId::Video => PortClass::Generic,
            PortId::Ds4 => PortClass::FixedRatio(4),
            PortId::Ds16 => PortClass::FixedRatio(16),
            PortId::Stats => PortClass::Statistics,
        }
    }

    pub fn direction(&self) -> PortDirection {
        match self {
            PortId::Input => PortDirection::Input,
            _ => PortDirection::Output,
        }
    }

    /// Slot index in the frame-process structure.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Port description reported at initialization.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PortSpec {
    pub port: PortId,
    pub direction: PortDirection,
    pub class: PortClass,
}

/// An image buffer attached to a port for one frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBuffer {
    pub port: PortId,
    /// Image memory, owned by the pipeline framework.
    pub image: BufferHandle,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub bits_per_pixel: u32,
    /// Output written in a compressed (tiled) addressing mode.
    #[serde(default)]
    pub compressed: bool,
}

impl PortBuffer {
    /// A linear buffer with a tightly packed stride.
    pub fn new(port: PortId, image: BufferHandle, width: u32, height: u32, bits_per_pixel: u32) -> Self {
        Self {
            port,
            image,
            width,
            height,
            stride: (width * bits_per_pixel).div_ceil(8),
            bits_per_pixel,
            compressed: false,
        }
    }

    pub fn compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }
}
