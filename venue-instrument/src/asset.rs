use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Maximum number of characters an [`Asset`] may hold.
///
/// Binance's longest base assets (eg/ "1000SHIB") fit comfortably under this.
pub const ASSET_MAX_LEN: usize = 11;

/// Fixed-width, `Copy` identifier for an asset (eg/ "BTC", "USDT", "1000SHIB").
///
/// Stored as an uppercase-ASCII byte array rather than a heap-allocated `String` so that
/// [`Symbol`](crate::Symbol) stays `Copy` and can be used directly as a sorted-map key
/// without cloning.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Asset {
    bytes: [u8; ASSET_MAX_LEN],
    len: u8,
}

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum AssetError {
    #[error("asset '{0}' is empty")]
    Empty(String),
    #[error("asset '{0}' exceeds the {ASSET_MAX_LEN} character limit")]
    TooLong(String),
    #[error("asset '{0}' contains a non uppercase-ASCII character")]
    NotUppercaseAscii(String),
}

impl Asset {
    /// Construct an [`Asset`] from a native uppercase-ASCII form.
    ///
    /// Rejects empty input, input over [`ASSET_MAX_LEN`] characters, and any input
    /// containing a character outside `A-Z0-9`.
    pub fn new(native: &str) -> Result<Self, AssetError> {
        if native.is_empty() {
            return Err(AssetError::Empty(native.to_string()));
        }

        if native.len() > ASSET_MAX_LEN {
            return Err(AssetError::TooLong(native.to_string()));
        }

        if !native
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        {
            return Err(AssetError::NotUppercaseAscii(native.to_string()));
        }

        let mut bytes = [0u8; ASSET_MAX_LEN];
        bytes[..native.len()].copy_from_slice(native.as_bytes());

        Ok(Self {
            bytes,
            len: native.len() as u8,
        })
    }

    pub fn as_str(&self) -> &str {
        // Safety invariant upheld by `new`: `bytes[..len]` is always valid ASCII.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }
}

impl std::str::FromStr for Asset {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Display for Asset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::fmt::Debug for Asset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Asset({})", self.as_str())
    }
}

impl Serialize for Asset {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Asset {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Asset::new(&raw.to_uppercase()).map_err(serde::de::Error::custom)
    }
}
