//! Derivation paths in `["m", "44'", "0"]` form.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::curve::Curve;
use crate::error::{CryptoError, CryptoResult};

/// Offset added to an index to mark it hardened.
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// One path segment below the master node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildIndex {
    index: u32,
    hardened: bool,
}

impl ChildIndex {
    /// A hardened index. `index` must be below 2^31.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPath`] if `index` is out of range.
    pub fn hardened(index: u32) -> CryptoResult<Self> {
        Self::new(index, true)
    }

    /// A non-hardened index. `index` must be below 2^31.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPath`] if `index` is out of range.
    pub fn normal(index: u32) -> CryptoResult<Self> {
        Self::new(index, false)
    }

    fn new(index: u32, hardened: bool) -> CryptoResult<Self> {
        if index >= HARDENED_OFFSET {
            return Err(CryptoError::InvalidPath(format!(
                "index {index} must be below 2^31"
            )));
        }
        Ok(Self { index, hardened })
    }

    /// The index without the hardened bit.
    #[must_use]
    pub fn index(self) -> u32 {
        self.index
    }

    /// Whether this segment is hardened.
    #[must_use]
    pub fn is_hardened(self) -> bool {
        self.hardened
    }

    /// The serialized child number (hardened bit included).
    #[must_use]
    pub fn value(self) -> u32 {
        if self.hardened {
            self.index | HARDENED_OFFSET
        } else {
            self.index
        }
    }

    fn parse(segment: &str) -> CryptoResult<Self> {
        let (digits, hardened) = match segment.strip_suffix('\'') {
            Some(digits) => (digits, true),
            None => (segment, false),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CryptoError::InvalidPath(format!(
                "segment {segment:?} must match <digits> or <digits>'"
            )));
        }
        let index: u32 = digits.parse().map_err(|_| {
            CryptoError::InvalidPath(format!("segment {segment:?} is out of range"))
        })?;
        Self::new(index, hardened)
    }
}

impl fmt::Display for ChildIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hardened {
            write!(f, "{}'", self.index)
        } else {
            write!(f, "{}", self.index)
        }
    }
}

/// A validated derivation path rooted at `m`.
///
/// Serializes as the segment array, e.g. `["m", "44'", "60'"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivationPath {
    segments: Vec<ChildIndex>,
}

impl DerivationPath {
    /// Parse a path from its segment strings.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPath`] if the path does not start with
    /// `m`, has no child segments, or contains a malformed segment.
    pub fn parse<S: AsRef<str>>(segments: &[S]) -> CryptoResult<Self> {
        let Some((root, rest)) = segments.split_first() else {
            return Err(CryptoError::InvalidPath("path is empty".into()));
        };
        if root.as_ref() != "m" {
            return Err(CryptoError::InvalidPath(format!(
                "path must start with \"m\", got {:?}",
                root.as_ref()
            )));
        }
        if rest.is_empty() {
            return Err(CryptoError::InvalidPath(
                "path must contain at least one segment after \"m\"".into(),
            ));
        }
        let segments = rest
            .iter()
            .map(|s| ChildIndex::parse(s.as_ref()))
            .collect::<CryptoResult<Vec<_>>>()?;
        Ok(Self { segments })
    }

    /// Build a path from already validated segments.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPath`] if `segments` is empty.
    pub fn from_segments(segments: Vec<ChildIndex>) -> CryptoResult<Self> {
        if segments.is_empty() {
            return Err(CryptoError::InvalidPath(
                "path must contain at least one segment after \"m\"".into(),
            ));
        }
        Ok(Self { segments })
    }

    /// Child segments below `m`.
    #[must_use]
    pub fn segments(&self) -> &[ChildIndex] {
        &self.segments
    }

    /// Whether every segment is hardened.
    #[must_use]
    pub fn is_fully_hardened(&self) -> bool {
        self.segments.iter().all(|s| s.is_hardened())
    }

    /// Check that this path can be derived on `curve`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPath`] for non-hardened segments on a
    /// hardened-only curve.
    pub fn check_curve(&self, curve: Curve) -> CryptoResult<()> {
        if !curve.supports_unhardened() && !self.is_fully_hardened() {
            return Err(CryptoError::InvalidPath(format!(
                "{curve} only supports hardened derivation, got {self}"
            )));
        }
        Ok(())
    }

    /// Segment strings, `m` first.
    #[must_use]
    pub fn to_strings(&self) -> Vec<String> {
        std::iter::once("m".to_string())
            .chain(self.segments.iter().map(ToString::to_string))
            .collect()
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl Serialize for DerivationPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_strings().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DerivationPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
