//! 12-byte document identifiers rendered as 24 lowercase hex characters
//!
//! Layout: 4-byte big-endian Unix seconds, 5 bytes fixed per process, 3-byte
//! big-endian counter seeded randomly.

use once_cell::sync::Lazy;
use rand::Rng;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const COUNTER_MASK: u32 = 0x00FF_FFFF;

struct ProcessSeed {
    unique: [u8; 5],
    counter: AtomicU32,
}

static SEED: Lazy<ProcessSeed> = Lazy::new(|| {
    let mut rng = rand::thread_rng();
    ProcessSeed {
        unique: rng.gen(),
        counter: AtomicU32::new(rng.gen_range(0..=COUNTER_MASK)),
    }
});

/// Document identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Fresh identifier for the current second
    pub fn new() -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let count = SEED.counter.fetch_add(1, Ordering::Relaxed) & COUNTER_MASK;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&(seconds as u32).to_be_bytes());
        bytes[4..9].copy_from_slice(&SEED.unique);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// 24 lowercase hex characters
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Seconds since the Unix epoch encoded in the identifier
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Whether `text` is exactly 24 hex characters
    pub fn is_valid(text: &str) -> bool {
        text.parse::<Self>().is_ok()
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = anyhow::Error;

    fn from_str(text: &str) -> anyhow::Result<Self> {
        if text.len() != 24 {
            anyhow::bail!("object id must be 24 hex characters, got {}", text.len());
        }
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(text, &mut bytes)?;
        Ok(Self(bytes))
    }
}
