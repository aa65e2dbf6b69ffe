/// Object identifiers
///
/// 12 bytes rendered as 24 lowercase hex characters: a 4-byte big-endian
/// creation timestamp, 5 process-random bytes, and a 3-byte counter.
use crate::error::{ApiError, ApiResult};
use rand::RngCore;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{
    fmt,
    str::FromStr,
    sync::{
        atomic::{AtomicU32, Ordering},
        OnceLock,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidObjectId;

impl fmt::Display for InvalidObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("object id must be 24 hexadecimal characters")
    }
}

impl std::error::Error for InvalidObjectId {}

fn process_unique() -> &'static [u8; 5] {
    static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
    PROCESS_UNIQUE.get_or_init(|| {
        let mut bytes = [0u8; 5];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    })
}

fn next_counter() -> u32 {
    static COUNTER: OnceLock<AtomicU32> = OnceLock::new();
    COUNTER
        .get_or_init(|| AtomicU32::new(rand::random::<u32>() & 0x00ff_ffff))
        .fetch_add(1, Ordering::Relaxed)
        & 0x00ff_ffff
}

impl ObjectId {
    /// Generate a fresh id
    pub fn new() -> Self {
        let secs = chrono::Utc::now().timestamp() as u32;
        let counter = next_counter();

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(process_unique());
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a request-supplied id, naming the entity in the error
    pub fn parse_param(raw: &str, what: &'static str) -> ApiResult<Self> {
        raw.trim().parse().map_err(|_| ApiError::InvalidId(what))
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ObjectId {
    type Err = InvalidObjectId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 24 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidObjectId);
        }

        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| InvalidObjectId)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<ObjectId> for serde_json::Value {
    fn from(id: ObjectId) -> Self {
        serde_json::Value::String(id.to_hex())
    }
}

impl From<&ObjectId> for serde_json::Value {
    fn from(id: &ObjectId) -> Self {
        serde_json::Value::String(id.to_hex())
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
