//! Value Tree and Wire Codec
//!
//! Tag byte followed by a little-endian payload. Strings, composites, and
//! containers carry a u32 length/count prefix; the prefix is authoritative
//! and must match the actual payload.

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Default bound on nesting depth for decode and rewrite
pub const DEFAULT_DEPTH_LIMIT: u32 = 50;

const TAG_STR: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_BOOL: u8 = 0x04;
const TAG_SEQ: u8 = 0x05;
const TAG_MAP: u8 = 0x06;
const TAG_COMPOSITE: u8 = 0x07;

/// Leaf value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    /// UTF-8 text
    Str(String),
    /// Signed integer
    Int(i64),
    /// IEEE-754 double
    Float(f64),
    /// Boolean
    Bool(bool),
}

/// Recursive content value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Single leaf
    Scalar(Scalar),
    /// Ordered children
    Sequence(Vec<Value>),
    /// String-keyed children, ordered by key
    Mapping(BTreeMap<String, Value>),
    /// Raw bytes that are themselves an encoded value tree
    Composite(Vec<u8>),
}

impl Value {
    /// String scalar shorthand
    pub fn str(s: impl Into<String>) -> Self {
        Self::Scalar(Scalar::Str(s.into()))
    }

    /// Integer scalar shorthand
    pub fn int(i: i64) -> Self {
        Self::Scalar(Scalar::Int(i))
    }

    /// Wrap a value as a composite (encode it into raw bytes)
    pub fn composite_of(inner: &Value) -> Self {
        Self::Composite(encode(inner))
    }
}

/// Codec and rewrite failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    /// Undecodable bytes, a length prefix that disagrees with its payload,
    /// or nesting past the configured depth bound
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),
}

/// Encode a value tree to its wire form
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_into(value, &mut buf);
    buf
}

fn encode_into(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Scalar(Scalar::Str(s)) => {
            buf.put_u8(TAG_STR);
            buf.put_u32_le(s.len() as u32);
            buf.put_slice(s.as_bytes());
        }
        Value::Scalar(Scalar::Int(i)) => {
            buf.put_u8(TAG_INT);
            buf.put_i64_le(*i);
        }
        Value::Scalar(Scalar::Float(f)) => {
            buf.put_u8(TAG_FLOAT);
            buf.put_f64_le(*f);
        }
        Value::Scalar(Scalar::Bool(b)) => {
            buf.put_u8(TAG_BOOL);
            buf.put_u8(*b as u8);
        }
        Value::Sequence(items) => {
            buf.put_u8(TAG_SEQ);
            buf.put_u32_le(items.len() as u32);
            for item in items {
                encode_into(item, buf);
            }
        }
        Value::Mapping(entries) => {
            buf.put_u8(TAG_MAP);
            buf.put_u32_le(entries.len() as u32);
            for (key, child) in entries {
                buf.put_u32_le(key.len() as u32);
                buf.put_slice(key.as_bytes());
                encode_into(child, buf);
            }
        }
        Value::Composite(raw) => {
            buf.put_u8(TAG_COMPOSITE);
            buf.put_u32_le(raw.len() as u32);
            buf.put_slice(raw);
        }
    }
}

/// Decode a complete wire buffer back to a value tree
///
/// Trailing bytes after the top-level value are malformed: a composite's
/// length prefix claimed more (or less) than its payload actually holds.
pub fn decode(bytes: &[u8]) -> Result<Value, ContentError> {
    decode_with_limit(bytes, DEFAULT_DEPTH_LIMIT)
}

/// `decode` with an explicit nesting bound
pub fn decode_with_limit(bytes: &[u8], depth_limit: u32) -> Result<Value, ContentError> {
    let mut cursor = bytes;
    let value = decode_one(&mut cursor, 0, depth_limit)?;
    if !cursor.is_empty() {
        return Err(ContentError::MalformedEncoding(format!(
            "{} trailing bytes after value",
            cursor.len()
        )));
    }
    Ok(value)
}

fn decode_one(cursor: &mut &[u8], depth: u32, limit: u32) -> Result<Value, ContentError> {
    if depth > limit {
        return Err(ContentError::MalformedEncoding(format!(
            "nesting exceeds depth bound {limit}"
        )));
    }
    let tag = take_u8(cursor)?;
    match tag {
        TAG_STR => {
            let raw = take_bytes(cursor)?;
            let s = String::from_utf8(raw)
                .map_err(|_| ContentError::MalformedEncoding("non-utf8 string".into()))?;
            Ok(Value::Scalar(Scalar::Str(s)))
        }
        TAG_INT => {
            need(cursor, 8)?;
            Ok(Value::Scalar(Scalar::Int(cursor.get_i64_le())))
        }
        TAG_FLOAT => {
            need(cursor, 8)?;
            Ok(Value::Scalar(Scalar::Float(cursor.get_f64_le())))
        }
        TAG_BOOL => match take_u8(cursor)? {
            0 => Ok(Value::Scalar(Scalar::Bool(false))),
            1 => Ok(Value::Scalar(Scalar::Bool(true))),
            other => Err(ContentError::MalformedEncoding(format!(
                "invalid bool byte {other:#x}"
            ))),
        },
        TAG_SEQ => {
            let count = take_u32(cursor)? as usize;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(decode_one(cursor, depth + 1, limit)?);
            }
            Ok(Value::Sequence(items))
        }
        TAG_MAP => {
            let count = take_u32(cursor)? as usize;
            let mut entries = BTreeMap::new();
            for _ in 0..count {
                let raw_key = take_bytes(cursor)?;
                let key = String::from_utf8(raw_key)
                    .map_err(|_| ContentError::MalformedEncoding("non-utf8 key".into()))?;
                let child = decode_one(cursor, depth + 1, limit)?;
                entries.insert(key, child);
            }
            Ok(Value::Mapping(entries))
        }
        TAG_COMPOSITE => Ok(Value::Composite(take_bytes(cursor)?)),
        other => Err(ContentError::MalformedEncoding(format!(
            "unknown tag {other:#x}"
        ))),
    }
}

fn need(cursor: &&[u8], n: usize) -> Result<(), ContentError> {
    if cursor.len() < n {
        return Err(ContentError::MalformedEncoding(format!(
            "truncated: needed {n} bytes, found {}",
            cursor.len()
        )));
    }
    Ok(())
}

fn take_u8(cursor: &mut &[u8]) -> Result<u8, ContentError> {
    need(cursor, 1)?;
    Ok(cursor.get_u8())
}

fn take_u32(cursor: &mut &[u8]) -> Result<u32, ContentError> {
    need(cursor, 4)?;
    Ok(cursor.get_u32_le())
}

fn take_bytes(cursor: &mut &[u8]) -> Result<Vec<u8>, ContentError> {
    let len = take_u32(cursor)? as usize;
    need(cursor, len)?;
    let mut raw = vec![0u8; len];
    cursor.copy_to_slice(&mut raw);
    Ok(raw)
}
