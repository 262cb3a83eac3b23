// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Error types for the ISP processing node.
//!
//! Dependency resolution is not represented here: a request waiting on
//! sensor mode or statistics returns
//! [`ProcessOutcome::DependencyPending`](crate::request::ProcessOutcome)
//! rather than an error.

use crate::cmdbuf::{BufferHandle, BufferState};
use thiserror::Error;

/// Errors raised by pools, command buffers, modules and the node.
#[derive(Error, Debug)]
pub enum IspError {
    /// Bad instance profile, unsupported hardware version or invalid request
    /// shape. Fatal at initialization.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Device memory for a pool could not be obtained.
    #[error("allocation of {size} bytes for pool '{pool}' failed: {reason}")]
    Allocation {
        pool: String,
        size: usize,
        reason: String,
    },

    /// Every slot of a pool is checked out. The frame is dropped.
    #[error("pool '{pool}' exhausted: {depth} slots in use")]
    ResourceExhausted { pool: String, depth: usize },

    /// A buffer operation was attempted in the wrong lifecycle state.
    #[error("buffer {handle} is {state:?}, cannot {operation}")]
    BufferState {
        handle: BufferHandle,
        state: BufferState,
        operation: &'static str,
    },

    /// A write would run past the words reserved by `begin_write`.
    #[error("buffer {handle} overflow: {requested} words requested, {available} available")]
    BufferOverflow {
        handle: BufferHandle,
        requested: usize,
        available: usize,
    },

    /// The handle does not name a slot of this pool.
    #[error("unknown buffer {0}")]
    UnknownBuffer(BufferHandle),

    /// An IQ module's math rejected its inputs.
    #[error("calculation failed for {module}: {reason}")]
    Calculation { module: &'static str, reason: String },

    /// A patch references a buffer that has not committed.
    #[error("buffer {dst} patches uncommitted source {src}")]
    Patch { dst: BufferHandle, src: BufferHandle },

    /// The transport rejected the packet.
    #[error("submit of request {request_id} failed: {reason}")]
    Submit { request_id: u64, reason: String },

    /// Consumer buffer requirements cannot be satisfied together.
    #[error("buffer negotiation failed: {0}")]
    Negotiation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for ISP node operations.
pub type Result<T> = std::result::Result<T, IspError>;
