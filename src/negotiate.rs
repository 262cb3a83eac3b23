// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Output buffer geometry negotiation with downstream consumers.
//!
//! Generic output consumers are aggregated into the smallest common
//! superset of their requirements, clamped to hardware limits. That
//! superset is what the node asks of its upstream input, and every generic
//! output port gets the same geometry. Fixed-ratio ports (DS4, DS16) derive
//! theirs from the result and the statistics port uses the hardware grid,
//! so neither takes part in the aggregation.

use crate::{
    config::HardwareCapability,
    error::{IspError, Result},
    port::{PortClass, PortDirection, PortId},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// What one downstream consumer of a port can accept.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerRequirement {
    pub port: PortId,
    pub optimal: Dimensions,
    pub min: Dimensions,
    pub max: Dimensions,
    /// Width and height alignment in pixels.
    pub alignment: u32,
}

impl ConsumerRequirement {
    /// A consumer that accepts anything but prefers `optimal`.
    pub fn new(port: PortId, optimal: Dimensions) -> Self {
        Self {
            port,
            optimal,
            min: Dimensions::new(1, 1),
            max: Dimensions::new(u32::MAX, u32::MAX),
            alignment: 1,
        }
    }

    pub fn with_bounds(mut self, min: Dimensions, max: Dimensions) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_alignment(mut self, alignment: u32) -> Self {
        self.alignment = alignment.max(1);
        self
    }
}

/// Geometry granted to one port.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BufferRequirement {
    pub port: PortId,
    pub dimensions: Dimensions,
    pub alignment: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NegotiationResult {
    /// Geometry this node requires on its input port.
    pub input: BufferRequirement,
    /// One entry per output port with a consumer, in port order.
    pub ports: Vec<BufferRequirement>,
}

impl NegotiationResult {
    pub fn port(&self, port: PortId) -> Option<&BufferRequirement> {
        self.ports.iter().find(|r| r.port == port)
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn lcm(a: u32, b: u32) -> Option<u32> {
    (a / gcd(a, b)).checked_mul(b)
}

fn align_within(value: u32, alignment: u32, lo: u32, hi: u32) -> Option<u32> {
    let up = value.div_ceil(alignment).saturating_mul(alignment);
    let down = hi / alignment * alignment;
    let aligned = up.min(down);
    (aligned >= lo && aligned <= hi && aligned > 0).then_some(aligned)
}

/// Aggregates `consumers` into per-port geometry.
pub fn negotiate(consumers: &[ConsumerRequirement], caps: &HardwareCapability) -> Result<NegotiationResult> {
    let generic: Vec<&ConsumerRequirement> = consumers
        .iter()
        .filter(|c| c.port.direction() == PortDirection::Output && c.port.class() == PortClass::Generic)
        .collect();
    if generic.is_empty() {
        return Err(IspError::Negotiation("no generic output consumer".to_owned()));
    }

    let alignment = generic
        .iter()
        .try_fold(1, |acc, c| lcm(acc, c.alignment.max(1)))
        .ok_or_else(|| IspError::Negotiation("consumer alignments have no common multiple in range".to_owned()))?;
    let optimal_w = generic.iter().map(|c| c.optimal.width).max().unwrap_or(0);
    let optimal_h = generic.iter().map(|c| c.optimal.height).max().unwrap_or(0);
    let lo_w = generic.iter().map(|c| c.min.width).max().unwrap_or(0).max(caps.min_width);
    let lo_h = generic.iter().map(|c| c.min.height).max().unwrap_or(0).max(caps.min_height);
    let hi_w = generic.iter().map(|c| c.max.width).min().unwrap_or(u32::MAX).min(caps.max_width);
    let hi_h = generic.iter().map(|c| c.max.height).min().unwrap_or(u32::MAX).min(caps.max_height);
    if lo_w > hi_w || lo_h > hi_h {
        return Err(IspError::Negotiation(format!(
            "consumer bounds do not overlap: width {}..{}, height {}..{}",
            lo_w, hi_w, lo_h, hi_h
        )));
    }

    let width = align_within(optimal_w.clamp(lo_w, hi_w), alignment, lo_w, hi_w);
    let height = align_within(optimal_h.clamp(lo_h, hi_h), alignment, lo_h, hi_h);
    let (Some(width), Some(height)) = (width, height) else {
        return Err(IspError::Negotiation(format!(
            "no {}-aligned geometry within {}x{}..{}x{}",
            alignment, lo_w, lo_h, hi_w, hi_h
        )));
    };
    let input = BufferRequirement {
        port: PortId::Input,
        dimensions: Dimensions::new(width, height),
        alignment,
    };

    let mut ports: Vec<BufferRequirement> = Vec::new();
    for port in PortId::ALL {
        if !consumers.iter().any(|c| c.port == port) || port.direction() != PortDirection::Output {
            continue;
        }
        let requirement = match port.class() {
            PortClass::Generic => BufferRequirement { port, ..input },
            PortClass::FixedRatio(ratio) => BufferRequirement {
                port,
                dimensions: Dimensions::new(
                    (width / ratio).div_ceil(2) * 2,
                    (height / ratio).div_ceil(2) * 2,
                ),
                alignment: 2,
            },
            PortClass::Statistics => BufferRequirement {
                port,
                dimensions: Dimensions::new(caps.stats_width, caps.stats_height),
                alignment: 1,
            },
        };
        ports.push(requirement);
    }
    debug!("negotiated {}x{} aligned to {}", width, height, alignment);
    Ok(NegotiationResult { input, ports })
}
