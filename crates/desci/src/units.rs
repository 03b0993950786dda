//! Account addresses, ether amounts and transaction hashes.
//!
//! All three are stored as text in `SQLite` and travel as strings in JSON, so
//! each type round-trips through its `Display`/`FromStr` pair.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of wei in one ether.
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// Decimal places of an ether amount.
const ETHER_DECIMALS: u32 = 18;

static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("address pattern is valid"));

static HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("hash pattern is valid"));

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_str("0x")?;
    for b in bytes {
        write!(f, "{b:02x}")?;
    }
    Ok(())
}

fn decode_hex<const N: usize>(digits: &str) -> Option<[u8; N]> {
    let mut out = [0u8; N];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(digits.get(i * 2..i * 2 + 2)?, 16).ok()?;
    }
    Some(out)
}

/// A 20-byte account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 20]);

impl Address {
    /// The zero address.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Create an address from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Derive a deterministic address from a label.
    ///
    /// Takes the first 20 bytes of the BLAKE3 hash of `label`. Used for
    /// development accounts and the default contract address.
    #[must_use]
    pub fn derive(label: &str) -> Self {
        let hash = blake3::hash(label.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash.as_bytes()[..20]);
        Self(bytes)
    }

    /// Raw bytes of the address.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if !ADDRESS_RE.is_match(s) {
            return Err(Error::InvalidAddress(s.to_string()));
        }
        decode_hex(&s[2..])
            .map(Self)
            .ok_or_else(|| Error::InvalidAddress(s.to_string()))
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.to_string()
    }
}

/// An amount in wei.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Wei(u128);

impl Wei {
    /// Zero wei.
    pub const ZERO: Self = Self(0);

    /// Create an amount from a raw wei count.
    #[must_use]
    pub const fn new(wei: u128) -> Self {
        Self(wei)
    }

    /// Create an amount from a whole number of ether.
    #[must_use]
    pub const fn from_ether(ether: u64) -> Self {
        Self(ether as u128 * WEI_PER_ETHER)
    }

    /// Parse a decimal ether string such as `"10"` or `"0.1"`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAmount`] for malformed or negative input, more
    /// than 18 decimal places, or amounts too large to represent.
    pub fn parse_ether(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let value = Decimal::from_str(trimmed)
            .map_err(|e| Error::InvalidAmount(format!("{trimmed}: {e}")))?
            .normalize();

        if value.is_sign_negative() && !value.is_zero() {
            return Err(Error::InvalidAmount(format!("{trimmed}: must not be negative")));
        }
        if value.scale() > ETHER_DECIMALS {
            return Err(Error::InvalidAmount(format!(
                "{trimmed}: more than {ETHER_DECIMALS} decimal places"
            )));
        }

        value
            .checked_mul(Decimal::from(WEI_PER_ETHER as u64))
            .and_then(|wei| wei.trunc().to_u128())
            .map(Self)
            .ok_or_else(|| Error::InvalidAmount(format!("{trimmed}: out of range")))
    }

    /// Render the amount as a decimal ether string.
    #[must_use]
    pub fn format_ether(&self) -> String {
        let whole = self.0 / WEI_PER_ETHER;
        let frac = self.0 % WEI_PER_ETHER;
        if frac == 0 {
            return whole.to_string();
        }
        let digits = format!("{frac:018}");
        format!("{whole}.{}", digits.trim_end_matches('0'))
    }

    /// The raw wei count.
    #[must_use]
    pub const fn as_u128(&self) -> u128 {
        self.0
    }

    /// Check if the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Add two amounts, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Wei {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u128>()
            .map(Self)
            .map_err(|e| Error::InvalidAmount(format!("{s}: {e}")))
    }
}

impl TryFrom<String> for Wei {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Wei> for String {
    fn from(wei: Wei) -> Self {
        wei.to_string()
    }
}

impl std::iter::Sum for Wei {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.map(|w| w.0).fold(0u128, u128::saturating_add))
    }
}

/// A 32-byte transaction hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash([u8; 32]);

impl TxHash {
    /// Compute the hash of a contract call.
    ///
    /// Covers the block the call lands in, the sender, the method name and an
    /// arbitrary payload describing the arguments.
    #[must_use]
    pub fn compute(block_number: u64, from: &Address, method: &str, payload: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&block_number.to_le_bytes());
        hasher.update(from.as_bytes());
        hasher.update(method.as_bytes());
        hasher.update(payload.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

impl FromStr for TxHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if !HASH_RE.is_match(s) {
            return Err(Error::corrupt("events", format!("bad transaction hash: {s}")));
        }
        decode_hex(&s[2..])
            .map(Self)
            .ok_or_else(|| Error::corrupt("events", format!("bad transaction hash: {s}")))
    }
}

impl TryFrom<String> for TxHash {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TxHash> for String {
    fn from(hash: TxHash) -> Self {
        hash.to_string()
    }
}
