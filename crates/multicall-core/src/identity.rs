//! Content-addressed call identities.
//!
//! Two reads with the same `(address, method, args, hash_args)` are the same physical call.
//! The identity is a SHA-256 digest over a canonical, type-tagged encoding of those fields,
//! so it is deterministic across threads and processes and independent of JSON object key
//! order.
//!
//! # Type Discrimination
//!
//! Each JSON value is prefixed with a discriminant byte before its content:
//! - Null: `0`
//! - Bool: `1` + value
//! - Number: `2` + sub-tag + little-endian bits
//! - String: `3` + length + bytes
//! - Array: `4` + length + each element
//! - Object: `5` + length + sorted `(key, value)` pairs
//!
//! Lengths are always written, so adjacent fields cannot run into each other
//! (`["ab", "c"]` and `["a", "bc"]` encode differently).

use crate::types::Call;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};

/// Feeds the canonical encoding of `value` into `hasher`.
pub fn hash_json_value(value: &Value, hasher: &mut Sha256) {
    match value {
        Value::Null => hasher.update([0u8]),
        Value::Bool(b) => hasher.update([1u8, u8::from(*b)]),
        Value::Number(n) => {
            hasher.update([2u8]);
            if let Some(i) = n.as_i64() {
                hasher.update([0u8]);
                hasher.update(i.to_le_bytes());
            } else if let Some(u) = n.as_u64() {
                hasher.update([1u8]);
                hasher.update(u.to_le_bytes());
            } else if let Some(f) = n.as_f64() {
                hasher.update([2u8]);
                hasher.update(f.to_bits().to_le_bytes());
            }
        }
        Value::String(s) => {
            hasher.update([3u8]);
            hash_str(s, hasher);
        }
        Value::Array(arr) => {
            hasher.update([4u8]);
            hasher.update((arr.len() as u64).to_le_bytes());
            for element in arr {
                hash_json_value(element, hasher);
            }
        }
        Value::Object(obj) => {
            hasher.update([5u8]);
            hasher.update((obj.len() as u64).to_le_bytes());

            let mut sorted_keys: Vec<&String> = obj.keys().collect();
            sorted_keys.sort_unstable();

            for key in sorted_keys {
                hash_str(key, hasher);
                if let Some(value) = obj.get(key) {
                    hash_json_value(value, hasher);
                }
            }
        }
    }
}

#[inline]
fn hash_str(s: &str, hasher: &mut Sha256) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

/// SHA-256 digest of the canonical encoding of a single JSON value.
///
/// Used for the "hash arguments before send" mode.
#[must_use]
pub fn digest_value(value: &Value) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hash_json_value(value, &mut hasher);
    hasher.finalize().into()
}

/// Stable content hash of one physical call.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallIdentity([u8; 32]);

impl CallIdentity {
    /// Computes the identity of `call`.
    ///
    /// The ABI is not part of the identity.
    #[must_use]
    pub fn of(call: &Call) -> Self {
        let mut hasher = Sha256::new();
        hash_str(&call.address, &mut hasher);
        hash_str(&call.method_name, &mut hasher);
        hasher.update((call.args.len() as u64).to_le_bytes());
        for arg in &call.args {
            hash_json_value(arg, &mut hasher);
        }
        hasher.update([u8::from(call.hash_args)]);
        Self(hasher.finalize().into())
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for CallIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CallIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallIdentity({}..)", &self.to_hex()[..12])
    }
}

impl FromStr for CallIdentity {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim_start_matches("0x"), &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for CallIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CallIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
