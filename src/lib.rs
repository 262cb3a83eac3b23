// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst ISP Processing Node Library
//!
//! Per-frame orchestration of a fixed-function, firmware-controlled image
//! signal processor. For every frame the node negotiates buffer geometry,
//! waits for its data dependencies, runs the image-quality (IQ) modules
//! that turn calibration into registers and lookup tables, packs the result
//! into command buffers linked by patches, computes the clock and bandwidth
//! budget and submits the packet to the device.
//!
//! ## Features
//!
//! - **Resource Pools**: fixed-depth rings of command buffer slots backed by
//!   host memory or a Linux DMA heap, one slot per in-flight frame.
//! - **Command Buffers**: register range and lookup-table writes with
//!   cross-buffer patches committed in dependency order.
//! - **IQ Modules**: thirteen hardware blocks behind one [`iq::IqModule`]
//!   interface with selector caching, hysteresis enablement and
//!   double-buffered lookup tables.
//! - **Processing Node**: dependency resolution with resumable requests,
//!   frame assembly, striping and the clock/bandwidth budget.
//!
//! ## Example
//!
//! ```no_run
//! use edgefirst_isp::{
//!     calibration::TuningTree,
//!     cmdbuf::BufferHandle,
//!     device::LoopbackDevice,
//!     node::ProcessingNode,
//!     port::{PortBuffer, PortId},
//!     request::{FrameProperties, FrameRequest, SensorMode},
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (device, packets) = LoopbackDevice::new();
//! let mut node = ProcessingNode::builder()
//!     .with_device(device)
//!     .with_calibration(Arc::new(TuningTree::enable_all()))
//!     .initialize()?;
//!
//! let request = FrameRequest::new(1)
//!     .with_input(PortBuffer::new(PortId::Input, BufferHandle::external(1), 1920, 1080, 10))
//!     .with_output(PortBuffer::new(PortId::Full, BufferHandle::external(2), 1920, 1080, 16));
//! let properties = FrameProperties::default().with_sensor_mode(SensorMode::new(0, 1920, 1080, 10));
//! let outcome = node.execute_process_request(&request, &properties)?;
//! assert!(outcome.is_submitted());
//!
//! let packet = packets.recv()?;
//! node.on_request_complete(packet.request_id);
//! node.teardown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Requirements
//!
//! - **Linux**: DMA heap support (`/dev/dma_heap`) for the `system_heap` and
//!   `cma_heap` affinities. Host affinity runs anywhere.

pub mod bandwidth;
pub mod calibration;
pub mod cmdbuf;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod hysteresis;
pub mod iq;
pub mod lut;
pub mod metadata;
pub mod negotiate;
pub mod node;
pub mod pool;
pub mod port;
pub mod request;
pub mod schema;
pub mod settings;
pub mod striping;

pub use error::{IspError, Result};
