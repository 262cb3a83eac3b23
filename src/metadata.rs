// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Post-frame metadata publication.
//!
//! One [`MetadataService`] is shared by every node instance of a process.
//! Each node takes a [`MetadataWriter`] reference at initialization and
//! gives it back at teardown; the first reference opens the sink and the
//! last release closes it.

use crate::{
    bandwidth::ClockBandwidth,
    error::Result,
    iq::ModuleKind,
    settings::TuningDump,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    sync::Arc,
};
use tracing::{debug, warn};

/// What a frame publishes once it is submitted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameMetadata {
    pub request_id: u64,
    pub sequence_id: u32,
    /// Black level after pedestal derivation.
    pub black_level: u32,
    pub drc_gain: f32,
    /// Tone curve programmed this frame, empty when tone mapping is off.
    pub tone_curve: Vec<u32>,
    pub enabled_modules: Vec<ModuleKind>,
    pub clock: ClockBandwidth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuning: Option<TuningDump>,
}

/// Destination of frame metadata.
pub trait MetadataSink: Send {
    fn write(&mut self, metadata: &FrameMetadata) -> Result<()>;

    /// Called when the last writer reference is released.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Keeps records in memory. Clones share the same record list.
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<FrameMetadata>>>,
    closed: Arc<Mutex<bool>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<FrameMetadata> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

impl MetadataSink for MemorySink {
    fn write(&mut self, metadata: &FrameMetadata) -> Result<()> {
        self.records.lock().push(metadata.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        *self.closed.lock() = true;
        Ok(())
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesSink {
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }
}

impl MetadataSink for JsonLinesSink {
    fn write(&mut self, metadata: &FrameMetadata) -> Result<()> {
        serde_json::to_writer(&mut self.writer, metadata)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

type SinkFactory = Box<dyn FnMut() -> Result<Box<dyn MetadataSink>> + Send>;

struct ServiceState {
    factory: SinkFactory,
    sink: Option<Box<dyn MetadataSink>>,
    refs: usize,
}

impl ServiceState {
    fn release(&mut self) -> Result<()> {
        self.refs = self.refs.saturating_sub(1);
        if self.refs == 0 {
            if let Some(mut sink) = self.sink.take() {
                debug!("metadata sink closed");
                sink.close()?;
            }
        }
        Ok(())
    }
}

/// Reference-counted owner of the metadata sink. Clones share state.
#[derive(Clone)]
pub struct MetadataService {
    state: Arc<Mutex<ServiceState>>,
}

impl MetadataService {
    /// `factory` opens the sink each time the reference count leaves zero.
    pub fn new<F>(factory: F) -> Self
    where
        F: FnMut() -> Result<Box<dyn MetadataSink>> + Send + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(ServiceState {
                factory: Box::new(factory),
                sink: None,
                refs: 0,
            })),
        }
    }

    /// A service publishing into a clone of `sink`.
    pub fn memory(sink: &MemorySink) -> Self {
        let sink = sink.clone();
        Self::new(move || Ok(Box::new(sink.clone())))
    }

    /// Takes a reference, opening the sink if this is the first one.
    pub fn acquire(&self) -> Result<MetadataWriter> {
        let mut state = self.state.lock();
        if state.sink.is_none() {
            let sink = (state.factory)()?;
            state.sink = Some(sink);
            debug!("metadata sink opened");
        }
        state.refs += 1;
        Ok(MetadataWriter {
            state: Some(self.state.clone()),
        })
    }

    pub fn ref_count(&self) -> usize {
        self.state.lock().refs
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().sink.is_some()
    }
}

/// One node's reference to the [`MetadataService`]. Dropping it releases
/// the reference.
pub struct MetadataWriter {
    state: Option<Arc<Mutex<ServiceState>>>,
}

impl MetadataWriter {
    pub fn publish(&self, metadata: &FrameMetadata) -> Result<()> {
        let Some(state) = &self.state else {
            return Ok(());
        };
        match state.lock().sink.as_mut() {
            Some(sink) => sink.write(metadata),
            None => Ok(()),
        }
    }

    /// Gives the reference back; the last one closes the sink.
    pub fn release(mut self) -> Result<()> {
        match self.state.take() {
            Some(state) => state.lock().release(),
            None => Ok(()),
        }
    }
}

impl Drop for MetadataWriter {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            if let Err(e) = state.lock().release() {
                warn!("closing metadata sink: {}", e);
            }
        }
    }
}
