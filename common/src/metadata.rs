use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::constants::MAX_METADATA_DEPTH;
use crate::namespace::Namespace;

/// Metadata that changed since the last committed baseline and is waiting
/// to be stored by a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataUpdate {
    pub namespace: Namespace,
    pub metadata: Value,
    pub fetched_at: DateTime<Utc>,
}

impl MetadataUpdate {
    #[must_use]
    pub fn new(namespace: Namespace, metadata: Value) -> Self {
        Self {
            namespace,
            metadata,
            fetched_at: Utc::now(),
        }
    }
}

/// Decodes exactly one JSON value of any type. Trailing non-whitespace
/// is rejected and nesting is allowed up to [`MAX_METADATA_DEPTH`] levels.
pub fn parse_metadata(bytes: &[u8]) -> Result<Value, serde_json::Error> {
    if exceeds_depth(bytes, MAX_METADATA_DEPTH) {
        return Err(serde_json::Error::custom(format!(
            "nesting exceeds {MAX_METADATA_DEPTH} levels"
        )));
    }

    let mut de = serde_json::Deserializer::from_slice(bytes);
    de.disable_recursion_limit();
    let value = Value::deserialize(serde_stacker::Deserializer::new(&mut de))?;
    de.end()?;
    Ok(value)
}

/// Bracket depth scan that skips string contents. Malformed input is left
/// to the parser.
fn exceeds_depth(bytes: &[u8], limit: usize) -> bool {
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;

    for &b in bytes {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth = depth.saturating_add(1);
                if depth > limit {
                    return true;
                }
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    false
}

/// Structural JSON equality.
///
/// Object key order is irrelevant, arrays compare element-wise in order.
/// Numbers compare by value: two integers compare exactly, otherwise both
/// sides are compared as `f64`, so `100` equals `100.0`. Walks the values
/// with an explicit stack, so nesting depth does not consume call stack.
#[must_use]
pub fn structurally_equal(a: &Value, b: &Value) -> bool {
    let mut pending = vec![(a, b)];

    while let Some(pair) = pending.pop() {
        match pair {
            (Value::Null, Value::Null) => {}
            (Value::Bool(l), Value::Bool(r)) if l == r => {}
            (Value::String(l), Value::String(r)) if l == r => {}
            (Value::Number(l), Value::Number(r)) if numbers_equal(l, r) => {}
            (Value::Array(l), Value::Array(r)) if l.len() == r.len() => {
                pending.extend(l.iter().zip(r));
            }
            (Value::Object(l), Value::Object(r)) if l.len() == r.len() => {
                for (key, x) in l {
                    let Some(y) = r.get(key) else {
                        return false;
                    };
                    pending.push((x, y));
                }
            }
            _ => return false,
        }
    }
    true
}

/// Numeric equality across the integer and float representations.
#[allow(clippy::float_cmp)]
fn numbers_equal(l: &Number, r: &Number) -> bool {
    if let (Some(x), Some(y)) = (l.as_i64(), r.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (l.as_u64(), r.as_u64()) {
        return x == y;
    }
    if l.is_f64() || r.is_f64() {
        return l.as_f64() == r.as_f64();
    }
    // A negative integer against one above i64::MAX.
    false
}
