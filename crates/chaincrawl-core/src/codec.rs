//! Decode service for ledger-native scalar values.
//!
//! Event payloads carry base64-encoded top-level values: big-endian, with
//! leading zero bytes trimmed (an empty buffer is zero). Results are rendered
//! as strings so downstream consumers see one shape for every kind.
//!
//! Missing input is not an error. It decodes to the sentinel `"-1"` for the
//! fixed-width integer kinds and `""` for big integers and addresses.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bech32::{Bech32, Hrp};
use num_bigint::{BigInt, BigUint};
use thiserror::Error;

/// Human-readable prefix of ledger addresses.
pub const ADDRESS_HRP: &str = "erd";
/// Length in bytes of a raw ledger address.
pub const ADDRESS_LEN: usize = 32;

/// Sentinel returned for missing fixed-width integer input.
pub const MISSING_INTEGER: &str = "-1";
/// Sentinel returned for missing big-integer or address input.
pub const MISSING_BIG: &str = "";

/// Errors raised while decoding a present value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid base64 input: {0}")]
    Base64(String),

    #[error("{kind} value does not fit: got {len} bytes, at most {max} allowed")]
    Overflow {
        kind: ScalarKind,
        len: usize,
        max: usize,
    },

    #[error("Address must be 32 bytes, got {len}")]
    AddressLength { len: usize },

    #[error("Bech32 encoding failed: {0}")]
    Bech32(String),

    #[error("Unknown scalar kind: {0}")]
    UnknownKind(String),
}

/// The scalar kinds the decode service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    U8,
    U32,
    U64,
    I32,
    I64,
    BigUint,
    BigInt,
    Address,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 8] = [
        Self::U8,
        Self::U32,
        Self::U64,
        Self::I32,
        Self::I64,
        Self::BigUint,
        Self::BigInt,
        Self::Address,
    ];

    /// Byte width of fixed-width kinds.
    pub fn width(self) -> Option<usize> {
        match self {
            Self::U8 => Some(1),
            Self::U32 | Self::I32 => Some(4),
            Self::U64 | Self::I64 => Some(8),
            Self::BigUint | Self::BigInt | Self::Address => None,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, Self::I32 | Self::I64 | Self::BigInt)
    }

    /// The value returned when the input is missing.
    pub fn missing_sentinel(self) -> &'static str {
        match self.width() {
            Some(_) => MISSING_INTEGER,
            None => MISSING_BIG,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::BigUint => "biguint",
            Self::BigInt => "bigint",
            Self::Address => "address",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScalarKind {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| CodecError::UnknownKind(s.to_string()))
    }
}

/// Decode a base64 value of `kind`, or return the kind's sentinel when
/// `input` is `None`.
pub fn decode(input: Option<&str>, kind: ScalarKind) -> Result<String, CodecError> {
    let Some(input) = input else {
        return Ok(kind.missing_sentinel().to_string());
    };
    let bytes = BASE64
        .decode(input)
        .map_err(|e| CodecError::Base64(e.to_string()))?;
    decode_bytes(&bytes, kind)
}

/// Decode raw top-level bytes of `kind`.
pub fn decode_bytes(bytes: &[u8], kind: ScalarKind) -> Result<String, CodecError> {
    match kind {
        ScalarKind::U8 | ScalarKind::U32 | ScalarKind::U64 => {
            Ok(fixed_unsigned(bytes, kind)?.to_string())
        }
        ScalarKind::I32 | ScalarKind::I64 => Ok(fixed_signed(bytes, kind)?.to_string()),
        ScalarKind::BigUint => Ok(BigUint::from_bytes_be(bytes).to_string()),
        ScalarKind::BigInt => Ok(BigInt::from_signed_bytes_be(bytes).to_string()),
        ScalarKind::Address => address(bytes),
    }
}

fn check_width(bytes: &[u8], kind: ScalarKind) -> Result<(), CodecError> {
    let max = kind.width().unwrap_or(usize::MAX);
    if bytes.len() > max {
        return Err(CodecError::Overflow {
            kind,
            len: bytes.len(),
            max,
        });
    }
    Ok(())
}

fn fixed_unsigned(bytes: &[u8], kind: ScalarKind) -> Result<u64, CodecError> {
    check_width(bytes, kind)?;
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn fixed_signed(bytes: &[u8], kind: ScalarKind) -> Result<i64, CodecError> {
    check_width(bytes, kind)?;
    let Some(first) = bytes.first() else {
        return Ok(0);
    };
    // Sign-extend from the most significant byte present.
    let fill = if first & 0x80 != 0 { 0xff } else { 0x00 };
    let mut buf = [fill; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    Ok(i64::from_be_bytes(buf))
}

fn address(bytes: &[u8]) -> Result<String, CodecError> {
    if bytes.len() != ADDRESS_LEN {
        return Err(CodecError::AddressLength { len: bytes.len() });
    }
    let hrp = Hrp::parse(ADDRESS_HRP).map_err(|e| CodecError::Bech32(e.to_string()))?;
    bech32::encode::<Bech32>(hrp, bytes).map_err(|e| CodecError::Bech32(e.to_string()))
}

pub fn decode_u8(input: Option<&str>) -> Result<String, CodecError> {
    decode(input, ScalarKind::U8)
}

pub fn decode_u32(input: Option<&str>) -> Result<String, CodecError> {
    decode(input, ScalarKind::U32)
}

pub fn decode_u64(input: Option<&str>) -> Result<String, CodecError> {
    decode(input, ScalarKind::U64)
}

pub fn decode_i32(input: Option<&str>) -> Result<String, CodecError> {
    decode(input, ScalarKind::I32)
}

pub fn decode_i64(input: Option<&str>) -> Result<String, CodecError> {
    decode(input, ScalarKind::I64)
}

pub fn decode_big_uint(input: Option<&str>) -> Result<String, CodecError> {
    decode(input, ScalarKind::BigUint)
}

pub fn decode_big_int(input: Option<&str>) -> Result<String, CodecError> {
    decode(input, ScalarKind::BigInt)
}

pub fn decode_address(input: Option<&str>) -> Result<String, CodecError> {
    decode(input, ScalarKind::Address)
}

/// Lowercase hex of `bytes`.
pub fn encode_bytes(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Lowercase hex of each buffer, in order.
pub fn encode_array_bytes<B: AsRef<[u8]>>(items: &[B]) -> Vec<String> {
    items.iter().map(|b| hex::encode(b.as_ref())).collect()
}
