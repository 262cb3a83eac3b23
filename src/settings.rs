// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-frame IQ settings shared with firmware.
//!
//! Every module writes its enable bit and a few firmware parameter words
//! into the frame's [`IqSettingsBlock`], which is serialized into the
//! IQ-settings buffer and referenced from the frame buffer by patch.

use crate::{
    cmdbuf::CommandStream,
    error::Result,
    iq::{ModuleKind, ModuleSnapshot},
    schema::Schema,
};
use serde::Serialize;
use std::sync::OnceLock;

/// Firmware parameter words per module.
pub const FW_PARAM_WORDS: usize = 4;

/// Magic of the serialized settings block, "IQST".
pub const SETTINGS_MAGIC: u32 = 0x4951_5354;
pub const SETTINGS_VERSION: u32 = 1;

/// Fields of the serialized block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SettingsField {
    /// `[magic, version, request_lo, request_hi]`
    Header,
    /// Enable mask, one bit per module in processing order.
    EnableMask,
    /// Per module: `[enable, params...]`.
    Module,
}

/// Cached layout of the serialized block.
pub fn schema() -> &'static Schema<SettingsField> {
    static SCHEMA: OnceLock<Schema<SettingsField>> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        Schema::builder()
            .field(SettingsField::Header, 4)
            .field(SettingsField::EnableMask, 1)
            .array(SettingsField::Module, 1 + FW_PARAM_WORDS, ModuleKind::COUNT)
            .build()
    })
}

/// One module's entry.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ModuleSettings {
    pub enable: bool,
    pub params: [u32; FW_PARAM_WORDS],
}

/// Settings of one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IqSettingsBlock {
    request_id: u64,
    modules: [ModuleSettings; ModuleKind::COUNT],
}

impl IqSettingsBlock {
    /// All modules disabled. Modules not instantiated by the node stay so.
    pub fn new(request_id: u64) -> Self {
        Self {
            request_id,
            modules: [ModuleSettings::default(); ModuleKind::COUNT],
        }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn set(&mut self, kind: ModuleKind, settings: ModuleSettings) {
        self.modules[kind.index()] = settings;
    }

    pub fn get(&self, kind: ModuleKind) -> &ModuleSettings {
        &self.modules[kind.index()]
    }

    pub fn enabled_mask(&self) -> u32 {
        self.modules
            .iter()
            .enumerate()
            .filter(|(_, m)| m.enable)
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }

    /// Modules enabled this frame, in processing order.
    pub fn enabled(&self) -> Vec<ModuleKind> {
        ModuleKind::ALL
            .iter()
            .copied()
            .filter(|kind| self.get(*kind).enable)
            .collect()
    }

    /// Serializes the block at the start of `stream`.
    pub fn encode(&self, stream: &mut CommandStream<'_>) -> Result<()> {
        let schema = schema();
        let base = stream.reserve(schema.total_words())?;
        let header = schema.offset(SettingsField::Header);
        for (i, word) in [
            SETTINGS_MAGIC,
            SETTINGS_VERSION,
            self.request_id as u32,
            (self.request_id >> 32) as u32,
        ]
        .into_iter()
        .enumerate()
        {
            stream.set(base + header + i, word)?;
        }
        stream.set(base + schema.offset(SettingsField::EnableMask), self.enabled_mask())?;
        for (i, module) in self.modules.iter().enumerate() {
            let at = base + schema.element(SettingsField::Module, i);
            stream.set(at, module.enable as u32)?;
            for (j, param) in module.params.iter().enumerate() {
                stream.set(at + 1 + j, *param)?;
            }
        }
        Ok(())
    }
}

/// Register and table snapshots of every block for one frame, captured
/// when tuning metadata is enabled.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TuningDump {
    pub request_id: u64,
    pub snapshots: Vec<ModuleSnapshot>,
}

impl TuningDump {
    pub fn new(request_id: u64) -> Self {
        Self {
            request_id,
            snapshots: Vec::new(),
        }
    }

    pub fn push(&mut self, snapshot: ModuleSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn get(&self, kind: ModuleKind) -> Option<&ModuleSnapshot> {
        self.snapshots.iter().find(|s| s.kind == kind)
    }
}
