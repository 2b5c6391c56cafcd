//! Decimal-string encoding for 64-bit integer fields
//!
//! The host transport's numeric type is 32-bit, so every 64-bit field
//! (`archive_size`, `offset`, `length`, entry sizes and timestamps) crosses
//! the channel as a decimal string. This module provides the conversion plus
//! a serde `with`-module for deriving it on message fields.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid decimal-encoded integer: {0:?}")]
pub struct ParseDecimalError(pub String);

/// Formats a 64-bit integer as its decimal-string wire form.
pub fn encode(value: i64) -> String {
    value.to_string()
}

/// Parses a decimal-string wire field back into a 64-bit integer.
pub fn decode(text: &str) -> Result<i64, ParseDecimalError> {
    i64::from_str(text).map_err(|_| ParseDecimalError(text.to_owned()))
}

pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Display,
    S: Serializer,
{
    serializer.collect_str(value)
}

pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: FromStr,
    T::Err: Display,
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    text.parse().map_err(serde::de::Error::custom)
}
