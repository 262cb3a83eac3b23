// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_isp::pool::DeviceAffinity;
use std::path::PathBuf;

/// Memory backing the node's pools.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum Memory {
    /// Host memory (simulation)
    Host,
    /// DMA system heap
    System,
    /// DMA CMA heap (physically contiguous)
    Cma,
}

impl From<Memory> for DeviceAffinity {
    fn from(memory: Memory) -> Self {
        match memory {
            Memory::Host => DeviceAffinity::Host,
            Memory::System => DeviceAffinity::SystemHeap,
            Memory::Cma => DeviceAffinity::CmaHeap,
        }
    }
}

/// Command-line arguments for the EdgeFirst ISP node.
///
/// Runs the processing node against the loopback device and a simulated
/// hardware thread, pacing frames at the target rate. Arguments can be
/// specified via command line or environment variables.
///
/// # Example
///
/// ```bash
/// # Via command line
/// edgefirst-isp --tuning tuning.json --frames 300 --striping
///
/// # Via environment variables
/// export TUNING=/etc/isp/tuning.json
/// export FPS=60
/// edgefirst-isp
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Node configuration JSON (profile, bandwidth constants, ...)
    #[arg(short, long, env = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Calibration tree JSON; every module enabled with defaults if omitted
    #[arg(short, long, env = "TUNING")]
    pub tuning: Option<PathBuf>,

    /// Frames to process, 0 runs until interrupted
    #[arg(short, long, env = "FRAMES", default_value = "300")]
    pub frames: u64,

    /// Sensor resolution in pixels (width height)
    #[arg(
        long,
        env = "SENSOR_SIZE",
        default_value = "3840 2160",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub sensor_size: Vec<u32>,

    /// Sensor bit depth
    #[arg(long, env = "BIT_DEPTH", default_value = "10")]
    pub bit_depth: u32,

    /// Output resolution in pixels (width height)
    #[arg(
        short,
        long,
        env = "OUTPUT_SIZE",
        default_value = "1920 1080",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub output_size: Vec<u32>,

    /// Target frame rate, overrides the configuration
    #[arg(long, env = "FPS")]
    pub fps: Option<u32>,

    /// Frames in flight, overrides the configuration
    #[arg(long, env = "QUEUE_DEPTH")]
    pub queue_depth: Option<usize>,

    /// Memory backing the pools
    #[arg(long, env = "MEMORY", default_value = "host", value_enum)]
    pub memory: Memory,

    /// Enable striping
    #[arg(long, env = "STRIPING")]
    pub striping: bool,

    /// Capture register and table snapshots in the metadata
    #[arg(long, env = "TUNING_DUMP")]
    pub tuning_dump: bool,

    /// Write frame metadata as JSON lines to this file
    #[arg(long, env = "METADATA")]
    pub metadata: Option<PathBuf>,

    /// Simulated hardware latency per frame in milliseconds
    #[arg(long, env = "LATENCY", default_value = "5")]
    pub latency: u64,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log to the systemd journal
    #[arg(long, env = "JOURNALD")]
    pub journald: bool,

    /// Enable Tokio async runtime console for debugging
    #[arg(long, env = "TOKIO_CONSOLE")]
    pub tokio_console: bool,

    /// Enable Tracy profiler for performance analysis
    #[arg(long, env = "TRACY")]
    pub tracy: bool,
}
