//! Metadata values and the ordered key/value map.
//!
//! The value model is a tagged union mirroring the GGUF value-type table,
//! with a single recursive case for arrays. Decoding and encoding live next
//! to the types so the two directions stay exact inverses of each other.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::cursor::{ByteReader, ByteWriter};
use crate::error::{GgufError, Result};

/// Deepest array nesting the codec will decode or encode.
pub const MAX_ARRAY_DEPTH: usize = 8;

/// Possible GGUF metadata value types, mapping to their u32 identifiers.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum ValueType {
    Uint8 = 0,
    Int8 = 1,
    Uint16 = 2,
    Int16 = 3,
    Uint32 = 4,
    Int32 = 5,
    Float32 = 6,
    Bool = 7,
    String = 8,
    Array = 9,
    Uint64 = 10,
    Int64 = 11,
    Float64 = 12,
}

impl ValueType {
    /// Convert a raw u32 type ID into a ValueType.
    ///
    /// Returns `None` if the type ID is not recognized.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(ValueType::Uint8),
            1 => Some(ValueType::Int8),
            2 => Some(ValueType::Uint16),
            3 => Some(ValueType::Int16),
            4 => Some(ValueType::Uint32),
            5 => Some(ValueType::Int32),
            6 => Some(ValueType::Float32),
            7 => Some(ValueType::Bool),
            8 => Some(ValueType::String),
            9 => Some(ValueType::Array),
            10 => Some(ValueType::Uint64),
            11 => Some(ValueType::Int64),
            12 => Some(ValueType::Float64),
            _ => None,
        }
    }

    /// Like [`ValueType::from_u32`], but an unknown tag is an error.
    pub fn try_from_u32(value: u32) -> Result<Self> {
        Self::from_u32(value).ok_or_else(|| GgufError::unknown_value_tag(value))
    }

    /// Smallest number of bytes a value of this type occupies on the wire.
    ///
    /// Used to reject length prefixes that cannot possibly be satisfied.
    pub fn min_encoded_size(self) -> u64 {
        match self {
            ValueType::Uint8 | ValueType::Int8 | ValueType::Bool => 1,
            ValueType::Uint16 | ValueType::Int16 => 2,
            ValueType::Uint32 | ValueType::Int32 | ValueType::Float32 => 4,
            ValueType::Uint64 | ValueType::Int64 | ValueType::Float64 => 8,
            // length prefix only
            ValueType::String => 8,
            // element tag + length prefix
            ValueType::Array => 12,
        }
    }
}

/// A parsed GGUF metadata value, holding the actual data.
///
/// Floats compare bitwise, so a value always equals itself after a round
/// trip even when it holds a NaN.
#[derive(Debug, Clone)]
pub enum MetadataValue {
    Uint8(u8),
    Int8(i8),
    Uint16(u16),
    Int16(i16),
    Uint32(u32),
    Int32(i32),
    Float32(f32),
    Bool(bool),
    String(String),
    Array(ValueType, Vec<MetadataValue>),
    Uint64(u64),
    Int64(i64),
    Float64(f64),
}

impl PartialEq for MetadataValue {
    fn eq(&self, other: &Self) -> bool {
        use MetadataValue::*;
        match (self, other) {
            (Uint8(a), Uint8(b)) => a == b,
            (Int8(a), Int8(b)) => a == b,
            (Uint16(a), Uint16(b)) => a == b,
            (Int16(a), Int16(b)) => a == b,
            (Uint32(a), Uint32(b)) => a == b,
            (Int32(a), Int32(b)) => a == b,
            (Float32(a), Float32(b)) => a.to_bits() == b.to_bits(),
            (Bool(a), Bool(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Array(ta, a), Array(tb, b)) => ta == tb && a == b,
            (Uint64(a), Uint64(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (Float64(a), Float64(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl MetadataValue {
    /// Build an array, checking that every element has `element_type`.
    pub fn array(element_type: ValueType, items: Vec<MetadataValue>) -> Result<Self> {
        check_homogeneous(element_type, &items)?;
        Ok(MetadataValue::Array(element_type, items))
    }

    /// Convenience constructor for the common array-of-strings case
    pub fn string_array<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MetadataValue::Array(
            ValueType::String,
            items
                .into_iter()
                .map(|s| MetadataValue::String(s.into()))
                .collect(),
        )
    }

    /// Get the type of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            MetadataValue::Uint8(_) => ValueType::Uint8,
            MetadataValue::Int8(_) => ValueType::Int8,
            MetadataValue::Uint16(_) => ValueType::Uint16,
            MetadataValue::Int16(_) => ValueType::Int16,
            MetadataValue::Uint32(_) => ValueType::Uint32,
            MetadataValue::Int32(_) => ValueType::Int32,
            MetadataValue::Float32(_) => ValueType::Float32,
            MetadataValue::Bool(_) => ValueType::Bool,
            MetadataValue::String(_) => ValueType::String,
            MetadataValue::Array(_, _) => ValueType::Array,
            MetadataValue::Uint64(_) => ValueType::Uint64,
            MetadataValue::Int64(_) => ValueType::Int64,
            MetadataValue::Float64(_) => ValueType::Float64,
        }
    }

    /// Attempt to extract a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Attempt to extract a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempt to extract an unsigned integer, widening as needed
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            MetadataValue::Uint64(n) => Some(*n),
            MetadataValue::Uint32(n) => Some(u64::from(*n)),
            MetadataValue::Uint16(n) => Some(u64::from(*n)),
            MetadataValue::Uint8(n) => Some(u64::from(*n)),
            _ => None,
        }
    }

    /// Attempt to extract a signed integer, widening as needed
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Int64(n) => Some(*n),
            MetadataValue::Int32(n) => Some(i64::from(*n)),
            MetadataValue::Int16(n) => Some(i64::from(*n)),
            MetadataValue::Int8(n) => Some(i64::from(*n)),
            _ => None,
        }
    }

    /// Attempt to extract a float value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Float64(f) => Some(*f),
            MetadataValue::Float32(f) => Some(f64::from(*f)),
            _ => None,
        }
    }

    /// Element type and items, if this is an array
    pub fn as_array(&self) -> Option<(ValueType, &[MetadataValue])> {
        match self {
            MetadataValue::Array(ty, items) => Some((*ty, items)),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<u32> for MetadataValue {
    fn from(n: u32) -> Self {
        MetadataValue::Uint32(n)
    }
}

impl From<u64> for MetadataValue {
    fn from(n: u64) -> Self {
        MetadataValue::Uint64(n)
    }
}

impl From<f32> for MetadataValue {
    fn from(f: f32) -> Self {
        MetadataValue::Float32(f)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

fn check_homogeneous(element_type: ValueType, items: &[MetadataValue]) -> Result<()> {
    if let Some((index, item)) = items
        .iter()
        .enumerate()
        .find(|(_, item)| item.value_type() != element_type)
    {
        return Err(GgufError::InvalidValue(format!(
            "array declared as {:?} holds a {:?} at index {}",
            element_type,
            item.value_type(),
            index
        )));
    }
    Ok(())
}

/// Ordered mapping from metadata key to value.
///
/// Keys are unique and keep their insertion order; replacing the value of an
/// existing key leaves it where it was, so rewriting a file only reorders
/// entries when the caller asks for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataMap {
    entries: Vec<(String, MetadataValue)>,
}

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.position(key).map(|i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut MetadataValue> {
        self.position(key).map(move |i| &mut self.entries[i].1)
    }

    /// Insert or replace, returning the previous value.
    ///
    /// New keys are appended; existing keys keep their position.
    pub fn insert(&mut self, key: impl Into<String>, value: MetadataValue) -> Option<MetadataValue> {
        let key = key.into();
        match self.position(&key) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Remove a key, preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<MetadataValue> {
        self.position(key).map(|i| self.entries.remove(i).1)
    }

    /// Iterate entries in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Read `n_kv` entries from the cursor.
    ///
    /// A repeated key is rejected: the map could not reproduce it and the
    /// header count would silently change on rewrite.
    pub fn read_from<R: Read>(
        reader: &mut ByteReader<R>,
        n_kv: u64,
        max_depth: usize,
    ) -> Result<Self> {
        // key length + value tag + smallest value
        let capacity = reader.plausible_count(n_kv, 8 + 4 + 1)?;
        let mut map = MetadataMap::with_capacity(capacity);

        for _ in 0..n_kv {
            let key = reader.read_string()?;
            let value_type = ValueType::try_from_u32(reader.read_u32()?)?;
            let value = read_value(reader, value_type, 0, max_depth)?;

            if map.contains_key(&key) {
                return Err(GgufError::InvalidValue(format!(
                    "duplicate metadata key '{}'",
                    key
                )));
            }
            map.entries.push((key, value));
        }

        Ok(map)
    }

    /// Write every entry in order: key, value tag, value.
    pub fn write_to<W: Write>(&self, writer: &mut ByteWriter<W>) -> Result<()> {
        for (key, value) in &self.entries {
            writer.write_string(key)?;
            writer.write_u32(value.value_type() as u32)?;
            write_value(writer, value, 0)?;
        }
        Ok(())
    }
}

impl<K: Into<String>> FromIterator<(K, MetadataValue)> for MetadataMap {
    fn from_iter<T: IntoIterator<Item = (K, MetadataValue)>>(iter: T) -> Self {
        let mut map = MetadataMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl IntoIterator for MetadataMap {
    type Item = (String, MetadataValue);
    type IntoIter = std::vec::IntoIter<(String, MetadataValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Read a single value of `value_type`.
///
/// `depth` counts the arrays already entered; arrays beyond `max_depth`
/// are refused before any element is decoded.
pub fn read_value<R: Read>(
    reader: &mut ByteReader<R>,
    value_type: ValueType,
    depth: usize,
    max_depth: usize,
) -> Result<MetadataValue> {
    Ok(match value_type {
        ValueType::Uint8 => MetadataValue::Uint8(reader.read_u8()?),
        ValueType::Int8 => MetadataValue::Int8(reader.read_i8()?),
        ValueType::Uint16 => MetadataValue::Uint16(reader.read_u16()?),
        ValueType::Int16 => MetadataValue::Int16(reader.read_i16()?),
        ValueType::Uint32 => MetadataValue::Uint32(reader.read_u32()?),
        ValueType::Int32 => MetadataValue::Int32(reader.read_i32()?),
        ValueType::Float32 => MetadataValue::Float32(reader.read_f32()?),
        ValueType::Bool => MetadataValue::Bool(reader.read_bool()?),
        ValueType::String => MetadataValue::String(reader.read_string()?),
        ValueType::Uint64 => MetadataValue::Uint64(reader.read_u64()?),
        ValueType::Int64 => MetadataValue::Int64(reader.read_i64()?),
        ValueType::Float64 => MetadataValue::Float64(reader.read_f64()?),
        ValueType::Array => {
            if depth >= max_depth {
                return Err(GgufError::NestingTooDeep(max_depth));
            }
            let element_type = ValueType::try_from_u32(reader.read_u32()?)?;
            let len = reader.read_u64()?;
            let count = reader.plausible_count(len, element_type.min_encoded_size())?;

            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(read_value(reader, element_type, depth + 1, max_depth)?);
            }
            MetadataValue::Array(element_type, items)
        }
    })
}

/// Write a single value (without its type tag).
pub fn write_value<W: Write>(
    writer: &mut ByteWriter<W>,
    value: &MetadataValue,
    depth: usize,
) -> Result<()> {
    match value {
        MetadataValue::Uint8(v) => writer.write_u8(*v),
        MetadataValue::Int8(v) => writer.write_i8(*v),
        MetadataValue::Uint16(v) => writer.write_u16(*v),
        MetadataValue::Int16(v) => writer.write_i16(*v),
        MetadataValue::Uint32(v) => writer.write_u32(*v),
        MetadataValue::Int32(v) => writer.write_i32(*v),
        MetadataValue::Float32(v) => writer.write_f32(*v),
        MetadataValue::Bool(v) => writer.write_bool(*v),
        MetadataValue::String(s) => writer.write_string(s),
        MetadataValue::Uint64(v) => writer.write_u64(*v),
        MetadataValue::Int64(v) => writer.write_i64(*v),
        MetadataValue::Float64(v) => writer.write_f64(*v),
        MetadataValue::Array(element_type, items) => {
            if depth >= MAX_ARRAY_DEPTH {
                return Err(GgufError::NestingTooDeep(MAX_ARRAY_DEPTH));
            }
            check_homogeneous(*element_type, items)?;
            writer.write_u32(*element_type as u32)?;
            writer.write_u64(items.len() as u64)?;
            for item in items {
                write_value(writer, item, depth + 1)?;
            }
            Ok(())
        }
    }
}
