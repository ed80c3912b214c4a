//! Core identifier and amount types shared across the crate.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Number of raw bytes in an [`Address`].
pub const ADDRESS_LEN: usize = 20;

/// A 20-byte account identifier, rendered as `0x` + 40 lowercase hex digits.
///
/// Addresses are opaque to this crate: they identify controllers, owners,
/// issuance recipients, and allow-list members, but nothing here interprets
/// their contents. The all-zero address is a sentinel and is rejected
/// wherever a real participant is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// The all-zero sentinel address.
    pub const ZERO: Self = Self([0u8; ADDRESS_LEN]);

    /// Creates an address from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Returns `true` if this is the all-zero sentinel.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Errors from parsing an [`Address`] out of a hex string.
#[derive(Debug, Error, PartialEq)]
pub enum ParseAddressError {
    /// The decoded byte length was not [`ADDRESS_LEN`].
    #[error("address must be {ADDRESS_LEN} bytes, got {got}")]
    InvalidLength {
        /// The decoded length.
        got: usize,
    },

    /// The string contained non-hex characters.
    #[error("invalid hex in address: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped)?;
        let len = bytes.len();
        let raw: [u8; ADDRESS_LEN] = bytes
            .try_into()
            .map_err(|_| ParseAddressError::InvalidLength { got: len })?;
        Ok(Self(raw))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
