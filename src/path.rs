//! Derivation Path Resolution
//!
//! Parses BIP-32 path strings into the raw `u32` segment form a signing
//! device consumes, and resolves wallet-level (change, index) pairs
//! against an account prefix. Paths are recomputed per call, never
//! cached beyond one operation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hardened marker bit for BIP-32 derivation
pub const HARDENED: u32 = 0x8000_0000;

/// Errors raised while tokenizing a derivation path string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathParseError {
    #[error("derivation path must start with 'm'")]
    MissingPrefix,

    #[error("empty path segment")]
    EmptySegment,

    #[error("invalid path segment '{0}'")]
    InvalidSegment(String),

    #[error("path segment {0} exceeds maximum index")]
    SegmentOverflow(u32),
}

/// Ordered derivation path with the hardened bit folded into each segment.
///
/// `m/44'/5'/0'/0/1` parses to `[44|H, 5|H, 0|H, 0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivationPath {
    segments: Vec<u32>,
}

impl DerivationPath {
    pub fn new(segments: Vec<u32>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[u32] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<u32> {
        self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// New path with `suffix` appended after this path's segments.
    pub fn extended(&self, suffix: &[u32]) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + suffix.len());
        segments.extend_from_slice(&self.segments);
        segments.extend_from_slice(suffix);
        Self { segments }
    }

    /// Last `n` segments, or the whole path when shorter.
    pub fn suffix(&self, n: usize) -> &[u32] {
        let start = self.segments.len().saturating_sub(n);
        &self.segments[start..]
    }
}

impl FromStr for DerivationPath {
    type Err = PathParseError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let trimmed = path.trim();

        let rest = trimmed
            .strip_prefix("m")
            .or_else(|| trimmed.strip_prefix("M"))
            .ok_or(PathParseError::MissingPrefix)?;

        // "m" alone is the master node
        if rest.is_empty() {
            return Ok(Self::default());
        }

        let rest = rest.strip_prefix('/').ok_or(PathParseError::MissingPrefix)?;

        let mut segments = Vec::new();
        for segment in rest.split('/') {
            segments.push(parse_segment(segment)?);
        }
        Ok(Self { segments })
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for segment in &self.segments {
            if segment & HARDENED != 0 {
                write!(f, "/{}'", segment & !HARDENED)?;
            } else {
                write!(f, "/{}", segment)?;
            }
        }
        Ok(())
    }
}

/// Parse a single path segment, accepting `'`, `h`, or `H` as the
/// hardened marker.
fn parse_segment(s: &str) -> Result<u32, PathParseError> {
    let trimmed = s.trim();

    if trimmed.is_empty() {
        return Err(PathParseError::EmptySegment);
    }

    let (number, hardened) = match trimmed.strip_suffix(['\'', 'h', 'H']) {
        Some(stripped) => (stripped, true),
        None => (trimmed, false),
    };

    let index: u32 = number
        .parse()
        .map_err(|_| PathParseError::InvalidSegment(s.to_string()))?;

    if index >= HARDENED {
        return Err(PathParseError::SegmentOverflow(index));
    }

    Ok(if hardened { index | HARDENED } else { index })
}

/// Resolve a wallet-internal (change, index) pair against an account
/// derivation prefix. Pure function, no I/O.
pub fn resolve(prefix: &DerivationPath, change: u32, index: u32) -> DerivationPath {
    prefix.extended(&[change, index])
}
