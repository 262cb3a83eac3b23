// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Flat buffer layouts described as an ordered list of typed fields.
//!
//! Firmware structures such as the frame-process header or the IQ settings
//! block are flat word arrays. A [`Schema`] lists their fields in order with
//! a size and repeat count; offsets are computed once when the schema is
//! built and looked up by key afterwards, so call sites never do offset
//! arithmetic themselves.

use std::fmt::Debug;

#[derive(Clone, Debug)]
struct FieldLayout<K> {
    key: K,
    offset: usize,
    words: usize,
    count: usize,
}

/// Immutable field layout keyed by `K`.
#[derive(Clone, Debug)]
pub struct Schema<K> {
    fields: Vec<FieldLayout<K>>,
    total: usize,
}

/// Accumulates fields in order.
#[derive(Debug)]
pub struct SchemaBuilder<K> {
    fields: Vec<FieldLayout<K>>,
    cursor: usize,
}

impl<K: Copy + PartialEq + Debug> SchemaBuilder<K> {
    /// A scalar field of `words` 32-bit words.
    pub fn field(self, key: K, words: usize) -> Self {
        self.array(key, words, 1)
    }

    /// `count` consecutive elements of `words` words each.
    pub fn array(mut self, key: K, words: usize, count: usize) -> Self {
        debug_assert!(
            self.fields.iter().all(|f| f.key != key),
            "duplicate schema field {key:?}"
        );
        self.fields.push(FieldLayout {
            key,
            offset: self.cursor,
            words,
            count,
        });
        self.cursor += words * count;
        self
    }

    pub fn build(self) -> Schema<K> {
        Schema {
            fields: self.fields,
            total: self.cursor,
        }
    }
}

impl<K: Copy + PartialEq + Debug> Schema<K> {
    pub fn builder() -> SchemaBuilder<K> {
        SchemaBuilder {
            fields: Vec::new(),
            cursor: 0,
        }
    }

    fn layout(&self, key: K) -> &FieldLayout<K> {
        self.fields
            .iter()
            .find(|f| f.key == key)
            .unwrap_or_else(|| panic!("field {key:?} not in schema"))
    }

    /// Word offset of a scalar field or of the first element of an array.
    pub fn offset(&self, key: K) -> usize {
        self.layout(key).offset
    }

    /// Word offset of element `index` of an array field.
    pub fn element(&self, key: K, index: usize) -> usize {
        let field = self.layout(key);
        assert!(index < field.count, "{key:?}[{index}] out of bounds");
        field.offset + index * field.words
    }

    /// Byte offset of element `index`, the unit patches use.
    pub fn element_bytes(&self, key: K, index: usize) -> u32 {
        (self.element(key, index) * 4) as u32
    }

    /// Words per element.
    pub fn words(&self, key: K) -> usize {
        self.layout(key).words
    }

    /// Element count of an array field.
    pub fn count(&self, key: K) -> usize {
        self.layout(key).count
    }

    /// Total size in words.
    pub fn total_words(&self) -> usize {
        self.total
    }

    pub fn total_bytes(&self) -> usize {
        self.total * 4
    }
}
