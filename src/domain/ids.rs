// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validated identity and resource identifiers.
//!
//! Identity strings are validated once at the edge (registration, or
//! deserialization of a wire message) and carried as newtypes from then on so
//! a malformed identity can never reach the engine.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

#[allow(clippy::expect_used)]
static RIDER_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^USER_[0-9A-F]{8}$").expect("static regex"));
#[allow(clippy::expect_used)]
static DRIVER_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^DRIVER_[0-9A-F]{8}$").expect("static regex"));
#[allow(clippy::expect_used)]
static REQUEST_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").expect("static regex"));

macro_rules! validated_id {
    ($name:ident, $pattern:expr, $invalid_err:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: impl Into<String>) -> Result<Self, DispatchError> {
                let raw = raw.into();
                if $pattern.is_match(&raw) {
                    Ok(Self(raw))
                } else {
                    Err($invalid_err)
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = DispatchError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

validated_id!(RiderId, RIDER_ID_RE, DispatchError::InvalidUserId);
validated_id!(DriverId, DRIVER_ID_RE, DispatchError::InvalidDriverId);
validated_id!(RequestId, REQUEST_ID_RE, DispatchError::InvalidRequestId);

/// Server-assigned bid identifier, scoped to its owning request. Not
/// externally validated by regex (the server mints it, it's never parsed
/// from untrusted input in isolation — only as a field alongside a
/// `RequestId` which is validated).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BidId(String);

impl BidId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap a caller-supplied bid id as-is, e.g. from a wire message or REST
    /// path segment. Unlike the other identifiers, a `BidId` is never
    /// validated in isolation — it only has meaning alongside the
    /// `RequestId` it's looked up within, which is validated.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BidId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mint a fresh 24-hex request id, matching `^[0-9a-fA-F]{24}$`.
pub fn new_request_id() -> RequestId {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    RequestId(raw[..24].to_owned())
}

/// Mint a fresh rider id, matching `^USER_[0-9A-F]{8}$`.
pub fn new_rider_id() -> RiderId {
    let raw = uuid::Uuid::new_v4().simple().to_string().to_ascii_uppercase();
    RiderId(format!("USER_{}", &raw[..8]))
}

/// Mint a fresh driver id, matching `^DRIVER_[0-9A-F]{8}$`.
pub fn new_driver_id() -> DriverId {
    let raw = uuid::Uuid::new_v4().simple().to_string().to_ascii_uppercase();
    DriverId(format!("DRIVER_{}", &raw[..8]))
}

#[cfg(test)]
#[path = "ids_tests.rs"]
mod tests;
