// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use args::Args;
use clap::Parser;
use edgefirst_isp::{
    calibration::TuningTree,
    cmdbuf::BufferHandle,
    config::NodeConfig,
    device::{spawn_hardware, Completion, LoopbackDevice},
    error::IspError,
    metadata::{JsonLinesSink, MetadataService, MetadataSink},
    node::ProcessingNode,
    port::{PortBuffer, PortId},
    request::{AecStats, AwbGains, AwbStats, FrameProperties, FrameRequest, ProcessOutcome, SensorMode},
};
use std::{error::Error, sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer};

mod args;

fn init_tracing(args: &Args) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));

    let journald = if args.journald {
        Some(tracing_journald::layer()?)
    } else {
        None
    };
    let tracy = if args.tracy {
        tracy_client::Client::start();
        Some(tracing_tracy::TracyLayer::default())
    } else {
        None
    };
    let console = args
        .tokio_console
        .then(|| console_subscriber::ConsoleLayer::builder().spawn());

    let subscriber = tracing_subscriber::registry().with(console).with(
        fmt::layer()
            .with_target(false)
            .and_then(journald)
            .and_then(tracy)
            .with_filter(filter),
    );
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

/// Statistics of a scene slowly going from daylight to low light and back,
/// enough to walk gain-triggered hysteresis across its band.
fn simulate_properties(frame: u64, sensor: &SensorMode) -> FrameProperties {
    let phase = (frame % 600) as f32 / 600.0 * std::f32::consts::TAU;
    let gain = 1.0 + 15.0 * (1.0 - phase.cos()) / 2.0;
    FrameProperties::default()
        .with_sensor_mode(sensor.clone())
        .with_aec(AecStats {
            real_gain: gain,
            exposure_ns: 33_000_000,
            lux_index: 350.0 / gain,
            drc_gain: 1.0 + gain / 16.0,
        })
        .with_awb(AwbStats {
            gains: AwbGains {
                r: 1.9,
                g: 1.0,
                b: 1.6,
            },
            cct: 5000.0,
        })
}

fn complete(node: &mut ProcessingNode, done: Completion) {
    if !done.ok {
        warn!("request {}: hardware rejected the packet", done.request_id);
    }
    node.on_request_complete(done.request_id);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(&args)?;

    let mut config = match &args.config {
        Some(path) => NodeConfig::from_path(path)?,
        None => NodeConfig::default(),
    };
    if let Some(fps) = args.fps {
        config.target_fps = fps;
    }
    if let Some(depth) = args.queue_depth {
        config.queue_depth = depth;
    }
    config.affinity = args.memory.into();
    config.striping |= args.striping;
    config.tuning_dump |= args.tuning_dump;

    let tuning = match &args.tuning {
        Some(path) => TuningTree::from_path(path)?,
        None => TuningTree::enable_all(),
    };

    let (device, packets) = LoopbackDevice::new();
    let (hardware, completions) = spawn_hardware(packets, Duration::from_millis(args.latency));

    let mut builder = ProcessingNode::builder()
        .with_config(config.clone())
        .with_device(device)
        .with_calibration(Arc::new(tuning));
    if let Some(path) = args.metadata.clone() {
        builder = builder.with_metadata(MetadataService::new(move || {
            Ok(Box::new(JsonLinesSink::create(&path)?) as Box<dyn MetadataSink>)
        }));
    }
    let mut node = builder.initialize()?;

    let sensor = SensorMode::new(0, args.sensor_size[0], args.sensor_size[1], args.bit_depth)
        .with_black_level(64 << args.bit_depth.saturating_sub(10))
        .with_max_fps(config.target_fps as f32);
    let input = PortBuffer::new(
        PortId::Input,
        BufferHandle::external(1),
        sensor.width,
        sensor.height,
        sensor.bit_depth,
    );
    let output = PortBuffer::new(
        PortId::Full,
        BufferHandle::external(2),
        args.output_size[0],
        args.output_size[1],
        16,
    );

    info!(
        "processing {}x{} at {} fps with {:?}",
        sensor.width,
        sensor.height,
        config.target_fps,
        node.module_kinds()
    );
    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / config.target_fps as f64));
    let mut frame = 0u64;
    while args.frames == 0 || frame < args.frames {
        interval.tick().await;
        while let Ok(Some(done)) = completions.try_recv() {
            complete(&mut node, done);
        }

        frame += 1;
        let request = FrameRequest::new(frame).with_input(input).with_output(output);
        let properties = simulate_properties(frame, &sensor);
        let outcome = match node.execute_process_request(&request, &properties) {
            Ok(ProcessOutcome::DependencyPending(pending)) => {
                debug!("frame {} pending on {:?}", frame, pending.missing);
                node.execute_process_request(&request.clone().resume(pending.resume), &properties)
            }
            other => other,
        };
        match outcome {
            Ok(ProcessOutcome::Submitted(summary)) => {
                if frame % u64::from(config.target_fps) == 0 {
                    info!(
                        "frame {}: {} modules, clock {} Hz, bandwidth {} B/s",
                        frame,
                        summary.enabled_modules.len(),
                        summary.clock.clock_hz,
                        summary.clock.uncompressed_bw + summary.clock.compressed_bw
                    );
                }
            }
            Ok(ProcessOutcome::DependencyPending(pending)) => {
                warn!("frame {} dropped, missing {:?}", frame, pending.missing);
            }
            Err(IspError::ResourceExhausted { pool, depth }) => {
                warn!("frame {} dropped, pool '{}' has all {} slots in flight", frame, pool, depth);
            }
            Err(e) => return Err(e.into()),
        }
    }

    while node.in_flight() > 0 {
        match completions.try_recv() {
            Ok(Some(done)) => complete(&mut node, done),
            Ok(None) => tokio::time::sleep(Duration::from_millis(1)).await,
            Err(_) => break,
        }
    }
    info!("processed {} frames", node.submitted());
    node.teardown()?;
    hardware
        .join()
        .map_err(|_| "simulated hardware thread panicked")?;
    Ok(())
}
