use std::fmt;
use std::ops::Deref;

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{FtdError, Result, KIB, MIB};

/// Content of a generated buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Fill {
    /// Pseudo-random bytes, repeated every kilobyte
    #[default]
    Random,
    /// Every byte set to the given value
    Constant(u8),
}

impl Fill {
    /// Raw value meaning "random" on the command line and in config files
    pub const RANDOM_SENTINEL: i32 = -1;

    /// Parse the raw convention: -1 is random, 0..=255 is a constant byte.
    pub fn from_raw(value: i32) -> Result<Self> {
        match value {
            Self::RANDOM_SENTINEL => Ok(Fill::Random),
            0..=255 => Ok(Fill::Constant(value as u8)),
            _ => Err(FtdError::ConfigError(format!(
                "fill must be a value between [0,255] or -1, got {}",
                value
            ))),
        }
    }

    pub fn to_raw(self) -> i32 {
        match self {
            Fill::Random => Self::RANDOM_SENTINEL,
            Fill::Constant(byte) => byte as i32,
        }
    }
}

impl TryFrom<i32> for Fill {
    type Error = FtdError;

    fn try_from(value: i32) -> Result<Self> {
        Fill::from_raw(value)
    }
}

impl From<Fill> for i32 {
    fn from(fill: Fill) -> Self {
        fill.to_raw()
    }
}

impl fmt::Display for Fill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fill::Random => write!(f, "random"),
            Fill::Constant(byte) => write!(f, "0x{:02x}", byte),
        }
    }
}

/// Immutable byte buffer written verbatim to disk
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Buffer {
    bytes: Vec<u8>,
}

impl Buffer {
    /// Get the buffer contents
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Length in whole kilobytes
    pub fn size_kb(&self) -> u64 {
        (self.bytes.len() / KIB) as u64
    }

    /// Iterate over the whole 1 MiB slices of the buffer. A trailing
    /// partial megabyte is not yielded.
    pub fn megabyte_slices(&self) -> impl Iterator<Item = &[u8]> {
        self.bytes.chunks_exact(MIB)
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer").field("len", &self.bytes.len()).finish()
    }
}

/// Byte length of a `count_kb` kilobyte buffer, or a `ConfigError` if it
/// cannot be allocated on this platform.
pub fn buffer_len(count_kb: u64) -> Result<usize> {
    count_kb
        .checked_mul(KIB as u64)
        .and_then(|bytes| usize::try_from(bytes).ok())
        .filter(|&bytes| bytes <= isize::MAX as usize)
        .ok_or_else(|| {
            FtdError::ConfigError(format!("buffer of {} kilobytes is too large", count_kb))
        })
}

/// Create a buffer of `count_kb` kilobytes.
///
/// One 1 KiB block is generated and replicated with a bulk copy. Generating
/// large random buffers byte by byte gets disproportionately slow, so the
/// random block repeats every kilobyte.
pub fn create_buffer(count_kb: u64, fill: Fill) -> Result<Buffer> {
    let len = buffer_len(count_kb)?;
    debug!(count_kb, %fill, "creating buffer");
    let block = create_block(fill);
    let bytes = block.repeat(len / KIB);
    debug!(
        "created buffer of size {:.3} MB",
        bytes.len() as f64 / MIB as f64
    );
    Ok(Buffer { bytes })
}

fn create_block(fill: Fill) -> [u8; KIB] {
    let mut block = [0u8; KIB];
    match fill {
        Fill::Random => SmallRng::from_entropy().fill_bytes(&mut block),
        Fill::Constant(byte) => block.fill(byte),
    }
    block
}
