//! Content fingerprints for events and oracle snapshots.
//!
//! A fingerprint is the SHA256 digest of a value's bincode encoding. Two
//! oracle instances that hold equal snapshots report equal fingerprints, which
//! makes it cheap to compare replicas or confirm a restore.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Error, Result};
use crate::utils::constants::FINGERPRINT_LENGTH;

/// SHA256 digest of a serialized value
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LENGTH]);

impl Fingerprint {
    /// Fingerprint raw bytes
    pub fn digest(data: &[u8]) -> Self {
        let mut bytes = [0u8; FINGERPRINT_LENGTH];
        bytes.copy_from_slice(&Sha256::digest(data));
        Self(bytes)
    }

    /// Fingerprint any serializable value
    pub fn of<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let encoded = bincode::serialize(value).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Self::digest(&encoded))
    }

    /// Lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First eight hex characters, for log lines and status output
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse the hex form
    pub fn from_hex(s: &str) -> Result<Self> {
        let mut bytes = [0u8; FINGERPRINT_LENGTH];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| Error::InvalidParameter {
            name: "fingerprint".into(),
            reason: e.to_string(),
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
